//! Input validation that runs before any stage touches the network.
//!
//! Every check returns a tagged rejection with a human-readable reason; the
//! orchestrator converts it into [`Error::ValidationFailed`].

pub mod ssrf;
pub mod text;
pub mod url;

use crate::Error;

pub use self::text::{TextRejection, validate_prompt, validate_user_id};
pub use self::url::{UrlGuard, UrlRejection, canonical_key, validate_url};
pub use ssrf::{SsrfError, is_private_or_reserved, validate_ip};

impl From<UrlRejection> for Error {
    fn from(rejection: UrlRejection) -> Self {
        Error::ValidationFailed(rejection.to_string())
    }
}

impl From<TextRejection> for Error {
    fn from(rejection: TextRejection) -> Self {
        Error::ValidationFailed(rejection.to_string())
    }
}
