//! Content-addressed cache key generation.

use sha2::{Digest, Sha256};

/// Key space a cached value belongs to.
///
/// Each namespace gets its own key prefix so crawl and model entries can be
/// listed, cleared and expired independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Crawl,
    Llm,
    History,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Crawl => "crawl",
            Namespace::Llm => "llm",
            Namespace::History => "history",
        }
    }

    /// Prefix including the separator, as used by `Store::delete_prefix`.
    pub fn key_prefix(self) -> String {
        format!("{}:", self.prefix())
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "crawl" => Some(Namespace::Crawl),
            "llm" => Some(Namespace::Llm),
            "history" => Some(Namespace::History),
            _ => None,
        }
    }
}

/// Compute a content-addressed cache key for a semantic input.
///
/// The namespace takes part in the digest as well as the prefix, so equal
/// inputs in different namespaces never share a digest.
pub fn derive_key(namespace: Namespace, input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.prefix().as_bytes());
    hasher.update(b"\n");
    hasher.update(input.as_bytes());
    format!("{}:{}", namespace.prefix(), hex::encode(hasher.finalize()))
}
