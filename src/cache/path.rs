//! Cache path construction and filename encoding.
//!
//! A cache entry lives at `<root>/<YYYY-MM>/<encoded name>`. The month bucket
//! comes from the identity's modification time and bounds directory fan-out.
//! The encoded name folds the modification time, the size and the full path
//! into one filename, so two distinct identities never alias each other even
//! when their basenames collide.

use crate::identity::FileId;
use chrono::{TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Hex characters of the path hash kept in the encoded name.
const PATH_HASH_LEN: usize = 16;

/// Construct the full path for a cache entry.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use thumbcache::cache::cache_path;
/// use thumbcache::identity::FileId;
///
/// let id = FileId::new("/photos/Cat Photo.jpg", 1_700_000_000, 42);
/// let path = cache_path(&PathBuf::from("/cache"), &id);
///
/// let name = path.file_name().unwrap().to_str().unwrap();
/// assert!(path.starts_with("/cache/2023-11"));
/// assert!(name.starts_with("t1700000000_s42_"));
/// assert!(name.ends_with("_cat_photo.jpg"));
/// ```
pub fn cache_path(root: &Path, id: &FileId) -> PathBuf {
    root.join(month_bucket(id.mod_time())).join(encode_name(id))
}

/// Month bucket (`YYYY-MM`, UTC) for a modification time.
pub fn month_bucket(mod_time: i64) -> String {
    match Utc.timestamp_opt(mod_time, 0).single() {
        Some(ts) => ts.format("%Y-%m").to_string(),
        // Out-of-range timestamps land in a dedicated bucket instead of
        // aborting; the encoded name still disambiguates entries.
        None => "0000-00".to_string(),
    }
}

/// Encode an identity into a single filename:
/// `t<mod time>_s<size>_<path hash>_<sanitized basename>`.
///
/// The hash covers the full cleaned path, so identities that share a basename
/// (e.g. `/a/1.jpg` and `/b/1.jpg`) still get distinct names. The sanitized
/// basename is kept purely for operator readability.
pub fn encode_name(id: &FileId) -> String {
    let digest = Sha256::digest(id.path().as_bytes());
    let hash = &hex::encode(digest)[..PATH_HASH_LEN];

    format!(
        "t{}_s{}_{}_{}",
        id.mod_time(),
        id.size(),
        hash,
        sanitize(id.name()),
    )
}

/// Lowercase a name and replace every character outside `[a-z0-9.]` with `_`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
