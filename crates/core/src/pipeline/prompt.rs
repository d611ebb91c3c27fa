//! Prompt assembly.

use crate::history::HistoryTurn;

/// Build the question prompt around fetched page content.
pub fn base_prompt(markdown: &str, query: &str) -> String {
    format!(
        "Based on the following web content, please answer the user's question.\n\n\
         Web Content:\n{markdown}\n\n\
         User Question: {query}\n\n\
         Please provide a comprehensive answer based on the content above."
    )
}

/// Render prior turns as a context block, or an empty string when there are none.
pub fn history_block(turns: &[HistoryTurn]) -> String {
    if turns.is_empty() {
        return String::new();
    }

    let mut block = String::from("Previous conversation context:\n");
    for turn in turns {
        block.push_str(&format!("{}: {}\n", turn.role, turn.message));
    }
    block.push('\n');
    block
}

/// Full prompt: optional history context followed by the base prompt.
pub fn compose(markdown: &str, query: &str, history: &[HistoryTurn]) -> String {
    format!("{}{}", history_block(history), base_prompt(markdown, query))
}

/// Cache identity of a prompt.
///
/// Matching is exact after trimming surrounding whitespace and unifying line
/// endings; no other rewriting happens.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.trim().replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    fn turn(role: Role, message: &str, sequence: u64) -> HistoryTurn {
        HistoryTurn { user_id: "u1".into(), role, message: message.into(), sequence }
    }

    #[test]
    fn test_base_prompt_layout() {
        let prompt = base_prompt("# Example\nHello", "Summarize this page");
        assert_eq!(
            prompt,
            "Based on the following web content, please answer the user's question.\n\n\
             Web Content:\n# Example\nHello\n\n\
             User Question: Summarize this page\n\n\
             Please provide a comprehensive answer based on the content above."
        );
    }

    #[test]
    fn test_compose_without_history() {
        assert_eq!(compose("md", "q", &[]), base_prompt("md", "q"));
    }

    #[test]
    fn test_compose_with_history_prepends_block() {
        let turns = vec![turn(Role::User, "first question", 0), turn(Role::Assistant, "first answer", 1)];
        let prompt = compose("md", "q", &turns);

        assert!(prompt.starts_with(
            "Previous conversation context:\nuser: first question\nassistant: first answer\n\nBased on"
        ));
        assert!(prompt.ends_with(&base_prompt("md", "q")));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let turns = vec![turn(Role::User, "a", 0)];
        assert_eq!(compose("md", "q", &turns), compose("md", "q", &turns));
    }

    #[test]
    fn test_normalize_prompt() {
        assert_eq!(normalize_prompt("  hello\r\nworld \n"), "hello\nworld");
        assert_ne!(normalize_prompt("Hello"), normalize_prompt("hello"));
    }
}
