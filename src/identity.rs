//! Source file identities.
//!
//! A [`FileId`] is the fingerprint of a source file: its cleaned logical path,
//! modification time and size. Two identities are equal iff all fields are
//! equal, so a changed source file produces a different identity and therefore
//! a different cache entry.

use std::fmt;

/// Fingerprint of a source file.
///
/// The path is a slash-separated logical path (as reported by the storage
/// backend), cleaned on construction. `FileId` is not a cache key by itself;
/// the cache derives its filesystem path from it (see [`crate::cache`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId {
    /// Full cleaned path
    path: String,
    /// Final path segment
    name: String,
    /// Modification time, unix seconds
    mod_time: i64,
    /// Size in bytes
    size: u64,
}

impl FileId {
    /// Create a new identity with a cleaned path.
    pub fn new(path: impl AsRef<str>, mod_time: i64, size: u64) -> Self {
        let path = clean_path(path.as_ref());
        let name = base_name(&path).to_string();
        Self {
            path,
            name,
            mod_time,
            size,
        }
    }

    /// Full cleaned path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filename extension in lower case with leading dot (e.g. `.jpeg`),
    /// or an empty string if the name has none.
    pub fn ext(&self) -> String {
        file_ext(&self.name)
    }

    /// Modification time, unix seconds.
    pub fn mod_time(&self) -> i64 {
        self.mod_time
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}_s{}_{}", self.mod_time, self.size, self.path)
    }
}

/// Lowercased extension of a filename, with leading dot.
pub fn file_ext(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[idx..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Clean a slash-separated path: collapse repeated slashes, resolve `.` and
/// `..` segments, preserve a leading slash. An empty result becomes `.`.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            seg => segments.push(seg),
        }
    }

    let mut cleaned = String::new();
    if rooted {
        cleaned.push('/');
    }
    cleaned.push_str(&segments.join("/"));
    if cleaned.is_empty() {
        cleaned.push('.');
    }
    cleaned
}

/// Final segment of a cleaned path.
fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_cleans_path() {
        let id = FileId::new("/a//b/./c.jpg", 100, 5);
        assert_eq!(id.path(), "/a/b/c.jpg");
        assert_eq!(id.name(), "c.jpg");
    }

    #[test]
    fn test_file_id_resolves_parent_segments() {
        let id = FileId::new("/a/b/../c.jpg", 100, 5);
        assert_eq!(id.path(), "/a/c.jpg");

        let id = FileId::new("a/../../b.png", 100, 5);
        assert_eq!(id.path(), "../b.png");
    }

    #[test]
    fn test_file_id_ext_is_lowercased() {
        let id = FileId::new("/photos/IMG_0001.JPEG", 100, 5);
        assert_eq!(id.ext(), ".jpeg");
    }

    #[test]
    fn test_file_id_without_extension() {
        let id = FileId::new("/notes/readme", 100, 5);
        assert_eq!(id.ext(), "");
    }

    #[test]
    fn test_file_id_equality_over_all_fields() {
        let a = FileId::new("/a/1.jpg", 100, 5);
        let b = FileId::new("/a/1.jpg", 100, 5);
        let c = FileId::new("/a/1.jpg", 101, 5);
        let d = FileId::new("/a/1.jpg", 100, 6);
        let e = FileId::new("/b/1.jpg", 100, 5);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_ne!(a, e);
    }

    #[test]
    fn test_file_id_display() {
        let id = FileId::new("/a/1.jpg", 100, 5);
        assert_eq!(id.to_string(), "t100_s5_/a/1.jpg");
    }

    #[test]
    fn test_clean_path_empty() {
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("./"), ".");
    }
}
