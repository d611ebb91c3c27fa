//! Content-addressed caching for crawl results and model responses.
//!
//! Values are stored as JSON [`CacheEntry`] records in a [`Store`](crate::store::Store)
//! under `namespace:sha256` keys. Freshness is decided at read time from the
//! entry's own `created_at` and TTL, so a backing store that keeps rows past
//! their lifetime still reads as a miss. Store failures degrade to a miss or a
//! skipped write.

pub mod coalesce;
pub mod entry;
pub mod hash;
pub mod keyed;

pub use coalesce::Coalescer;
pub use entry::CacheEntry;
pub use hash::{Namespace, derive_key};
pub use keyed::KeyedCache;
