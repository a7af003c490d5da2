//! Derived thumbnail identities.

use std::fmt;

use super::format::{ImageFormat, ThumbnailFormat, ThumbnailSize};
use crate::identity::FileId;

/// Identity of a thumbnail cache entry, derived from a source [`FileId`].
///
/// The derived path carries a `.thumbnail-<size>` marker and, for retargeted
/// formats, the output extension. Modification time and size are copied from
/// the source, so a changed source file yields a different derived identity
/// and thereby invalidates the old cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailId(FileId);

impl ThumbnailId {
    /// Derive the thumbnail identity for a source file.
    ///
    /// # Panics
    ///
    /// Panics if the source format is unsupported. Callers are required to
    /// check [`super::can_generate`] first.
    pub fn derive(id: &FileId, format: ThumbnailFormat, size: ThumbnailSize) -> Self {
        let image_format = ImageFormat::from_id(id)
            .unwrap_or_else(|| panic!("cannot derive thumbnail id for {:?}", id.ext()));

        let suffix = format!(".thumbnail-{}", size.marker());
        let path = match format.retarget_ext(image_format) {
            None => {
                // Strip the extension as it appears in the path, which may
                // differ in case from the normalized `FileId::ext`.
                let path = id.path();
                let ext_start = path.rfind('.').unwrap_or(path.len());
                format!("{}{}{}", &path[..ext_start], suffix, &path[ext_start..])
            }
            Some(new_ext) => format!("{}{}{}", id.path(), suffix, new_ext),
        };

        Self(FileId::new(path, id.mod_time(), id.size()))
    }

    /// The derived identity used as the cache key.
    pub fn as_file_id(&self) -> &FileId {
        &self.0
    }
}

impl fmt::Display for ThumbnailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_format_keeps_extension() {
        let id = FileId::new("/photos/cat.jpg", 100, 5);
        let thumb = ThumbnailId::derive(&id, ThumbnailFormat::Jpeg, ThumbnailSize::Medium);

        assert_eq!(thumb.as_file_id().path(), "/photos/cat.thumbnail-medium.jpg");
        assert_eq!(thumb.as_file_id().mod_time(), 100);
        assert_eq!(thumb.as_file_id().size(), 5);
    }

    #[test]
    fn test_retargeted_format_appends_new_extension() {
        let id = FileId::new("/photos/cat.heic", 100, 5);
        let thumb = ThumbnailId::derive(&id, ThumbnailFormat::Jpeg, ThumbnailSize::Small);

        assert_eq!(
            thumb.as_file_id().path(),
            "/photos/cat.heic.thumbnail-small.jpeg"
        );
    }

    #[test]
    fn test_uppercase_extension_is_preserved_case_insensitively() {
        let id = FileId::new("/photos/cat.PNG", 100, 5);
        let thumb = ThumbnailId::derive(&id, ThumbnailFormat::Avif, ThumbnailSize::Large);

        assert_eq!(
            thumb.as_file_id().path(),
            "/photos/cat.PNG.thumbnail-large.avif"
        );
    }

    #[test]
    fn test_source_change_invalidates_derived_identity() {
        let id = FileId::new("/photos/cat.jpg", 100, 5);
        let touched = FileId::new("/photos/cat.jpg", 200, 5);

        let a = ThumbnailId::derive(&id, ThumbnailFormat::Jpeg, ThumbnailSize::Medium);
        let b = ThumbnailId::derive(&touched, ThumbnailFormat::Jpeg, ThumbnailSize::Medium);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sizes_have_distinct_identities() {
        let id = FileId::new("/photos/cat.jpg", 100, 5);
        let small = ThumbnailId::derive(&id, ThumbnailFormat::Jpeg, ThumbnailSize::Small);
        let large = ThumbnailId::derive(&id, ThumbnailFormat::Jpeg, ThumbnailSize::Large);
        assert_ne!(small, large);
    }

    #[test]
    #[should_panic(expected = "cannot derive thumbnail id")]
    fn test_derive_panics_on_unsupported_format() {
        let id = FileId::new("/notes/readme.txt", 100, 5);
        let _ = ThumbnailId::derive(&id, ThumbnailFormat::Jpeg, ThumbnailSize::Medium);
    }
}
