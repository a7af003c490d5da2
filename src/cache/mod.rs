//! Disk cache and background cleaner.
//!
//! The cache maps a [`crate::identity::FileId`] to a file under
//! `<root>/<YYYY-MM>/<encoded name>`. The [`Cleaner`] runs independently and
//! evicts entries that violate the age/size retention policy; readers and
//! writers must tolerate files disappearing between a presence check and a
//! later open.

mod cleaner;
mod disk;
mod path;
mod types;

pub use cleaner::{Cleaner, CleanerHandle, CleanupStats};
pub use disk::DiskCache;
pub use path::{cache_path, encode_name, month_bucket};
pub use types::{CacheError, CleanerConfig};
