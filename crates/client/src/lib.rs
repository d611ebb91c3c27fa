//! Upstream HTTP clients for the CAG gateway.
//!
//! This crate provides the page crawler and the Gemini generation backend,
//! the concrete implementations of `cag_core::Crawler` and
//! `cag_core::LlmBackend` used by the server and CLI.

pub mod crawl;
pub mod gemini;

pub use crawl::{ConvertedPage, CrawlConfig, HttpCrawler, html_to_markdown};
pub use gemini::{GeminiBackend, GeminiConfig, GeminiError};
