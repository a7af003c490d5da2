//! Thumbnail generation service.
//!
//! [`ThumbnailService`] produces cache entries on demand through a fixed pool
//! of workers draining one bounded queue. At most one production runs per
//! derived key at any time; duplicate submissions are no-ops while the key is
//! in flight.

mod format;
mod id;
mod registry;
mod resizer;
mod service;

pub use format::{can_generate, ImageFormat, ThumbnailFormat, ThumbnailSize};
pub use id::ThumbnailId;
pub use registry::InProgressRegistry;
pub use resizer::{NoopResizer, ResizeError, Resizer, VipsResizer};
pub use service::{ByteStream, GenerateError, ServiceConfig, SourceOpener, ThumbnailService};
