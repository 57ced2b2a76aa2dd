//! # readthru
//!
//! Two dependency-injected building blocks:
//!
//! - [`cache`] — a read-through cache that consults an upstream source on a
//!   miss, stores successful results forever, and deduplicates concurrent
//!   fetches per key.
//! - [`dispatch`] — a per-file pipeline that recognizes, validates, signs and
//!   sends documents, reporting the files it had to skip.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::convert::Infallible;
//! use readthru::cache::{Fetched, ReadThroughCache, upstream_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = ReadThroughCache::new(upstream_fn(|key: String| async move {
//!         Ok::<_, Infallible>(if key.is_empty() {
//!             Fetched::Unavailable
//!         } else {
//!             Fetched::Found(key.to_uppercase())
//!         })
//!     }));
//!
//!     println!("{:?}", cache.get("hello").await?);
//!     println!("{:?}", cache.stats());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod dispatch;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{BoxFuture, CacheConfig, CacheError, Fetched, Lookup, ReadThroughCache, Upstream};
pub use dispatch::{DispatchPolicy, FileSender, SendReport, SkipReason};
