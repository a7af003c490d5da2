//! thumbcache - disk-backed thumbnail cache with a bounded generation pipeline.
//!
//! This library stores expensive-to-produce image thumbnails on disk and
//! produces missing entries on demand through a fixed worker pool that
//! deduplicates in-flight work per cache key. A background cleaner keeps the
//! cache within an age and size budget.
//!
//! # High-Level API
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use thumbcache::cache::DiskCache;
//! use thumbcache::thumbnails::{
//!     ServiceConfig, ThumbnailService, ThumbnailSize, VipsResizer,
//! };
//!
//! let cache = DiskCache::new("/var/cache/thumbnails".into());
//! let service = ThumbnailService::new(
//!     cache,
//!     source_opener,
//!     Arc::new(VipsResizer::new()),
//!     ServiceConfig::default(),
//! );
//!
//! let thumb = service.submit_task(&file_id, ThumbnailSize::Medium).await?;
//! let file = service.open_result_timeout(&thumb, Duration::from_secs(10)).await?;
//! ```

pub mod cache;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod thumbnails;

/// Version of the thumbcache library.
///
/// Defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
