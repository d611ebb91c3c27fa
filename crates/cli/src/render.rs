//! Human-readable rendering of gateway replies.

use serde_json::Value;

fn flag(value: &Value) -> &'static str {
    if value.as_bool().unwrap_or(false) { "cached" } else { "fresh" }
}

pub fn crawl(reply: &Value) -> String {
    let title = reply["title"].as_str().filter(|t| !t.is_empty()).unwrap_or("(untitled)");
    format!(
        "{title} [{}, status {}]\n\n{}",
        flag(&reply["cached"]),
        reply["status_code"].as_u64().unwrap_or_default(),
        reply["markdown"].as_str().unwrap_or_default()
    )
}

pub fn generate(reply: &Value) -> String {
    format!("{}\n\n[{}]", reply["text"].as_str().unwrap_or_default(), flag(&reply["cached"]))
}

pub fn cag(reply: &Value) -> String {
    format!(
        "{}\n\n[page {}, answer {}, {:.2}s] source: {}",
        reply["response"].as_str().unwrap_or_default(),
        flag(&reply["crawl_cached"]),
        flag(&reply["llm_cached"]),
        reply["processing_time"].as_f64().unwrap_or_default(),
        reply["url"].as_str().unwrap_or_default()
    )
}

pub fn history(reply: &Value) -> String {
    let turns = reply["history"].as_array().map(Vec::as_slice).unwrap_or_default();
    if turns.is_empty() {
        return "(no history)".to_string();
    }
    turns
        .iter()
        .map(|turn| {
            format!("{}: {}", turn["role"].as_str().unwrap_or("?"), turn["message"].as_str().unwrap_or_default())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn message(reply: &Value) -> String {
    reply["message"].as_str().map_or_else(|| reply.to_string(), str::to_string)
}

pub fn pretty(reply: &Value) -> String {
    serde_json::to_string_pretty(reply).unwrap_or_else(|_| reply.to_string())
}
