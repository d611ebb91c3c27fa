//! HTML to markdown conversion.
//!
//! Walks the parsed document once, emitting markdown for the structural
//! elements a reader cares about (headings, paragraphs, lists, links, code,
//! quotes, tables) and dropping scripts, styles and other non-content nodes.
//! Relative links and images are resolved against the page URL.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Elements whose subtree never contributes content.
const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "head", "iframe", "object", "canvas", "form", "button", "select",
];

/// Elements rendered as their own paragraph.
const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "aside", "nav", "figure", "figcaption", "address",
    "dl", "dt", "dd", "details", "summary",
];

/// Title and markdown body of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedPage {
    pub title: Option<String>,
    pub markdown: String,
}

/// Convert an HTML document to markdown.
pub fn html_to_markdown(html: &str, base_url: &Url) -> ConvertedPage {
    let document = Html::parse_document(html);
    let title = extract_title(&document);

    let body = Selector::parse("body").expect("invalid selector");
    let root = document.select(&body).next().unwrap_or_else(|| document.root_element());

    let mut writer = Writer::new(base_url);
    writer.children(root);

    ConvertedPage { title, markdown: tidy(&writer.out) }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").expect("invalid selector");
    document
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|title| !title.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapse whitespace runs while keeping a single leading/trailing space
/// where the source had one, so adjacent inline nodes stay separated.
fn collapse_inline(text: &str) -> String {
    let words = collapse_whitespace(text);
    if words.is_empty() {
        return if text.is_empty() { String::new() } else { " ".to_string() };
    }

    let mut out = String::with_capacity(words.len() + 2);
    if text.starts_with(char::is_whitespace) {
        out.push(' ');
    }
    out.push_str(&words);
    if text.ends_with(char::is_whitespace) {
        out.push(' ');
    }
    out
}

fn tidy(markdown: &str) -> String {
    let trimmed_lines = markdown.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    BLANK_RUNS.replace_all(&trimmed_lines, "\n\n").trim().to_string()
}

struct Writer<'a> {
    base_url: &'a Url,
    out: String,
}

impl<'a> Writer<'a> {
    fn new(base_url: &'a Url) -> Self {
        Self { base_url, out: String::new() }
    }

    fn at_line_start(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    fn trim_trailing_spaces(&mut self) {
        let len = self.out.trim_end_matches(' ').len();
        self.out.truncate(len);
    }

    fn block_break(&mut self) {
        self.trim_trailing_spaces();
        if self.out.is_empty() || self.out.ends_with("\n\n") {
            return;
        }
        self.out.push_str(if self.out.ends_with('\n') { "\n" } else { "\n\n" });
    }

    fn line_break(&mut self) {
        self.trim_trailing_spaces();
        if !self.at_line_start() {
            self.out.push('\n');
        }
    }

    fn text(&mut self, raw: &str) {
        let text = collapse_inline(raw);
        if text.is_empty() {
            return;
        }
        if self.at_line_start() || self.out.ends_with(' ') {
            self.out.push_str(text.trim_start());
        } else {
            self.out.push_str(&text);
        }
    }

    fn inline(&mut self, markdown: &str) {
        self.out.push_str(markdown);
    }

    /// Render an element's children on their own and return the trimmed result.
    fn render(&self, el: ElementRef<'_>) -> String {
        let mut sub = Writer::new(self.base_url);
        sub.children(el);
        tidy(&sub.out)
    }

    fn children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                self.text(text);
            } else if let Some(child) = ElementRef::wrap(child) {
                self.element(child);
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            n if SKIPPED.contains(&n) => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = collapse_whitespace(&self.render(el));
                if !text.is_empty() {
                    self.block_break();
                    self.inline(&format!("{} {text}", "#".repeat(level)));
                    self.block_break();
                }
            }
            n if BLOCKS.contains(&n) => {
                self.block_break();
                self.children(el);
                self.block_break();
            }
            "br" => self.line_break(),
            "hr" => {
                self.block_break();
                self.inline("---");
                self.block_break();
            }
            "pre" => {
                let code: String = el.text().collect();
                self.block_break();
                self.inline(&format!("```\n{}\n```", code.trim_matches('\n')));
                self.block_break();
            }
            "code" => {
                let code: String = el.text().collect();
                if !code.trim().is_empty() {
                    self.inline(&format!("`{}`", code.trim()));
                }
            }
            "strong" | "b" => self.wrapped(el, "**"),
            "em" | "i" => self.wrapped(el, "*"),
            "a" => self.link(el),
            "img" => self.image(el),
            "ul" => self.list(el, false),
            "ol" => self.list(el, true),
            "blockquote" => {
                let inner = self.render(el);
                if !inner.is_empty() {
                    self.block_break();
                    let quoted = inner
                        .lines()
                        .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
                        .collect::<Vec<_>>()
                        .join("\n");
                    self.inline(&quoted);
                    self.block_break();
                }
            }
            "table" => self.table(el),
            _ => self.children(el),
        }
    }

    fn wrapped(&mut self, el: ElementRef<'_>, marker: &str) {
        let inner = collapse_whitespace(&self.render(el));
        if !inner.is_empty() {
            self.inline(&format!("{marker}{inner}{marker}"));
        }
    }

    fn resolve(&self, href: &str) -> Option<Url> {
        self.base_url
            .join(href.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
    }

    fn link(&mut self, el: ElementRef<'_>) {
        let text = collapse_whitespace(&self.render(el));
        if text.is_empty() {
            return;
        }
        match el.value().attr("href").and_then(|href| self.resolve(href)) {
            Some(href) => self.inline(&format!("[{text}]({href})")),
            None => self.inline(&text),
        }
    }

    fn image(&mut self, el: ElementRef<'_>) {
        let alt = el.value().attr("alt").map(collapse_whitespace).unwrap_or_default();
        if let Some(src) = el.value().attr("src").and_then(|src| self.resolve(src)) {
            self.inline(&format!("![{alt}]({src})"));
        }
    }

    fn list(&mut self, el: ElementRef<'_>, ordered: bool) {
        self.block_break();
        let items = el
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li");

        for (i, item) in items.enumerate() {
            let marker = if ordered { format!("{}. ", i + 1) } else { "- ".to_string() };
            let indent = " ".repeat(marker.len());
            let body = self.render(item);

            self.line_break();
            let mut lines = body.lines().filter(|line| !line.trim().is_empty());
            self.inline(&marker);
            if let Some(first) = lines.next() {
                self.inline(first);
            }
            for line in lines {
                self.inline(&format!("\n{indent}{line}"));
            }
        }
        self.block_break();
    }

    fn table(&mut self, el: ElementRef<'_>) {
        let row_selector = Selector::parse("tr").expect("invalid selector");
        let cell_selector = Selector::parse("th, td").expect("invalid selector");

        let rows: Vec<Vec<String>> = el
            .select(&row_selector)
            .map(|row| {
                row.select(&cell_selector)
                    .map(|cell| collapse_whitespace(&self.render(cell)).replace('|', "\\|"))
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();

        if rows.is_empty() {
            return;
        }

        self.block_break();
        for (i, row) in rows.iter().enumerate() {
            self.inline(&format!("| {} |\n", row.join(" | ")));
            if i == 0 {
                self.inline(&format!("|{}\n", " --- |".repeat(row.len())));
            }
        }
        self.block_break();
    }
}
