//! Request-scoped CAG pipeline.
//!
//! Two cache-or-compute stages ([`FetchStage`], [`GenerateStage`]) and the
//! [`Orchestrator`] that validates, rate-limits and chains them with the
//! history side-channel.

pub mod fetch;
pub mod generate;
pub mod orchestrator;
pub mod prompt;

use std::future::Future;

use crate::cache::Coalescer;

pub use fetch::{CrawlResult, FetchStage};
pub use generate::{GenerationResult, GenerateStage};
pub use orchestrator::{CagRequest, CagResponse, Orchestrator, PipelineState, Sources};

/// Run upstream work on its own task so it completes even if the caller goes away.
///
/// With a coalescer, concurrent callers for the same key share one run.
/// Returns `None` if the task panicked.
pub(crate) async fn run_detached<V, F>(coalescer: Option<&Coalescer<V>>, key: &str, work: F) -> Option<V>
where
    V: Clone + Send + 'static,
    F: Future<Output = V> + Send + 'static,
{
    match coalescer {
        Some(coalescer) => coalescer.run(key, work).await,
        None => tokio::spawn(work).await.ok(),
    }
}
