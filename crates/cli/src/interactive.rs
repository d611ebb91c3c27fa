//! Menu-driven session against a running gateway.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::client::GatewayClient;
use crate::render;

const MENU: &str = "\nSelect an action:
1. Crawl a URL
2. Generate content
3. Ask about a page
4. Add a chat turn
5. Get chat history
6. Clear chat history
7. Health
8. Exit";

struct Prompter<'a, R, W> {
    lines: Lines<R>,
    out: &'a mut W,
}

impl<R: AsyncBufRead + Unpin, W: Write> Prompter<'_, R, W> {
    /// Print a prompt and read one trimmed line. `None` on end of input.
    async fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.out, "{prompt}: ")?;
        self.out.flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{text}")?;
        Ok(())
    }
}

/// Run the menu loop until the user exits or input ends.
///
/// Request failures are printed and the loop continues.
pub async fn run<R, W>(client: &GatewayClient, input: R, out: &mut W, use_cache: bool) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut p = Prompter { lines: input.lines(), out };

    loop {
        p.say(MENU)?;
        let Some(choice) = p.ask("Enter your choice").await? else {
            return Ok(());
        };

        let reply = match choice.as_str() {
            "1" => {
                let Some(url) = p.ask("Enter the URL to crawl").await? else { return Ok(()) };
                client.crawl(&url, use_cache).await.map(|r| render::crawl(&r))
            }
            "2" => {
                let Some(prompt) = p.ask("Enter the prompt").await? else { return Ok(()) };
                client.generate(&prompt, use_cache).await.map(|r| render::generate(&r))
            }
            "3" => {
                let Some(url) = p.ask("Enter the URL").await? else { return Ok(()) };
                let Some(query) = p.ask("Enter your question").await? else { return Ok(()) };
                let Some(user_id) = p.ask("Enter the user ID (blank for none)").await? else { return Ok(()) };
                let user_id = Some(user_id.as_str()).filter(|u| !u.is_empty());
                client
                    .cag(&url, &query, user_id, user_id.is_some(), use_cache)
                    .await
                    .map(|r| render::cag(&r))
            }
            "4" => {
                let Some(user_id) = p.ask("Enter the user ID").await? else { return Ok(()) };
                let Some(message) = p.ask("Enter the message").await? else { return Ok(()) };
                let Some(role) = p.ask("Enter the role (user/assistant)").await? else { return Ok(()) };
                client.add_history(&user_id, &role, &message).await.map(|r| render::message(&r))
            }
            "5" => {
                let Some(user_id) = p.ask("Enter the user ID").await? else { return Ok(()) };
                client.history(&user_id).await.map(|r| render::history(&r))
            }
            "6" => {
                let Some(user_id) = p.ask("Enter the user ID").await? else { return Ok(()) };
                client.clear_history(&user_id).await.map(|r| render::message(&r))
            }
            "7" => client.health().await.map(|r| render::pretty(&r)),
            "8" | "q" | "quit" | "exit" => return Ok(()),
            _ => {
                p.say("Invalid choice. Please try again.")?;
                continue;
            }
        };

        match reply {
            Ok(text) => p.say(&text)?,
            Err(e) => p.say(&format!("error: {e:#}"))?,
        }
    }
}
