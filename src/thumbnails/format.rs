//! Image format tables.
//!
//! A closed lookup table maps a source format (by extension, case-insensitive)
//! to the thumbnail policy: some formats keep their extension, some are
//! retargeted to the configured output format, everything else is rejected.

use crate::identity::FileId;

/// Source image formats the service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
    Heic,
    Avif,
}

impl ImageFormat {
    /// Detect the format from an identity's extension. Returns `None` for
    /// unsupported formats.
    pub fn from_id(id: &FileId) -> Option<Self> {
        Self::from_ext(&id.ext())
    }

    /// Detect the format from a lowercased extension with leading dot.
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            ".jpg" | ".jpeg" => Some(Self::Jpeg),
            ".png" => Some(Self::Png),
            ".gif" => Some(Self::Gif),
            ".webp" => Some(Self::Webp),
            ".heic" => Some(Self::Heic),
            ".avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// True for formats the resizer cannot safely process (animated gifs);
    /// the original bytes are always stored verbatim for them.
    pub fn passthrough_only(self) -> bool {
        matches!(self, Self::Gif)
    }

    /// True for formats that are always transcoded regardless of size because
    /// target viewers don't support them.
    pub fn always_transcode(self) -> bool {
        matches!(self, Self::Heic)
    }
}

/// Output format thumbnails are generated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbnailFormat {
    #[default]
    Jpeg,
    Avif,
}

impl ThumbnailFormat {
    /// Extension the thumbnail for `format` gets, or `None` when the source
    /// extension is kept.
    ///
    /// Jpeg, webp and avif sources keep their extension (webp/avif are
    /// already efficient and widely supported); gif keeps it because only the
    /// original bytes are ever stored; png and heic are retargeted.
    pub fn retarget_ext(self, format: ImageFormat) -> Option<&'static str> {
        let target = match self {
            Self::Jpeg => ".jpeg",
            Self::Avif => ".avif",
        };

        match format {
            ImageFormat::Png | ImageFormat::Heic => Some(target),
            ImageFormat::Jpeg if self == Self::Avif => Some(target),
            ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Webp | ImageFormat::Avif => None,
        }
    }
}

/// Thumbnail size classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbnailSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl ThumbnailSize {
    /// Marker inserted into derived paths.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// `vipsthumbnail --size` argument. The trailing `>` makes resizing
    /// conditional, so images smaller than the target are never enlarged.
    pub fn vips_size_arg(self) -> &'static str {
        match self {
            Self::Small => "256>",
            Self::Medium => "1024>",
            Self::Large => "2048>",
        }
    }
}

/// True if a thumbnail can be generated for this identity.
pub fn can_generate(id: &FileId) -> bool {
    ImageFormat::from_id(id).is_some()
}
