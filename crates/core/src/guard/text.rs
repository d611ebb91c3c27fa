//! Prompt and user-id checks.

use std::sync::LazyLock;

use regex::Regex;

pub const MIN_PROMPT_CHARS: usize = 3;
pub const MAX_PROMPT_CHARS: usize = 10_000;
pub const MAX_USER_ID_CHARS: usize = 100;

/// Substrings that mark markup or script injection, matched case-insensitively.
pub const UNSAFE_PATTERNS: &[&str] = &["<script", "javascript:", "data:", "vbscript:", "onload=", "onerror="];

static USER_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Why a piece of text was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextRejection {
    #[error("Prompt must be a non-empty string")]
    EmptyPrompt,

    #[error("Prompt must be at least 3 characters long")]
    PromptTooShort,

    #[error("Prompt too long (max 10000 characters)")]
    PromptTooLong,

    #[error("Prompt contains potentially unsafe content")]
    UnsafePrompt,

    #[error("User ID must be a non-empty string")]
    EmptyUserId,

    #[error("User ID too long (max 100 characters)")]
    UserIdTooLong,

    #[error("User ID can only contain letters, numbers, hyphens, and underscores")]
    InvalidUserId,
}

/// Validate free text sent to the model.
///
/// Length is measured on the trimmed text, in characters.
pub fn validate_prompt(text: &str) -> Result<(), TextRejection> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TextRejection::EmptyPrompt);
    }

    let len = trimmed.chars().count();
    if len < MIN_PROMPT_CHARS {
        return Err(TextRejection::PromptTooShort);
    }
    if len > MAX_PROMPT_CHARS {
        return Err(TextRejection::PromptTooLong);
    }

    let lower = trimmed.to_lowercase();
    if let Some(pattern) = UNSAFE_PATTERNS.iter().find(|p| lower.contains(*p)) {
        tracing::warn!(pattern, "unsafe prompt pattern detected");
        return Err(TextRejection::UnsafePrompt);
    }

    Ok(())
}

/// Validate a caller-supplied user id.
///
/// Surrounding whitespace is not stripped before the character check, so
/// `" u1"` is refused rather than silently aliased to `"u1"`.
pub fn validate_user_id(id: &str) -> Result<(), TextRejection> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(TextRejection::EmptyUserId);
    }
    if trimmed.chars().count() > MAX_USER_ID_CHARS {
        return Err(TextRejection::UserIdTooLong);
    }
    if !USER_ID_RE.is_match(id) {
        return Err(TextRejection::InvalidUserId);
    }
    Ok(())
}
