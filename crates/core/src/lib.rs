//! Core types and the CAG pipeline.
//!
//! This crate provides:
//! - Durable key-value/list storage (SQLite or in-memory)
//! - Content-addressed caching with read-time TTL checks
//! - URL and text guards, per-client rate limiting
//! - Cache-or-compute fetch and generate stages, history, and the orchestrator
//! - Unified error types and layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod history;
pub mod pipeline;
pub mod ratelimit;
pub mod store;
pub mod upstream;

pub use cache::{CacheEntry, KeyedCache, Namespace, derive_key};
pub use config::{AppConfig, ConfigError, StoreKind};
pub use error::Error;
pub use history::{HistoryStore, HistoryTurn, Role};
pub use pipeline::{CagRequest, CagResponse, CrawlResult, GenerationResult, Orchestrator, Sources};
pub use ratelimit::{EndpointClass, RateLimiter};
pub use store::{MemoryStore, SqliteStore, Store};
pub use upstream::{CrawledPage, Crawler, LlmBackend, UpstreamError};
