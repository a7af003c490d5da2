//! Deduplication of concurrent generation requests.

use std::collections::HashSet;
use std::sync::Mutex;

use super::id::ThumbnailId;
use crate::identity::FileId;

/// Set of thumbnails currently being generated.
///
/// A task may only be scheduled by the caller that wins [`try_acquire`] for
/// its identity; everyone else waits for the winner's result. The winner
/// must call [`release`] when the entry either exists on disk or has been
/// rolled back, never earlier.
///
/// [`try_acquire`]: InProgressRegistry::try_acquire
/// [`release`]: InProgressRegistry::release
#[derive(Debug, Default)]
pub struct InProgressRegistry {
    in_progress: Mutex<HashSet<FileId>>,
}

impl InProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an identity for generation. Returns `true` for exactly one
    /// caller until the identity is released.
    pub fn try_acquire(&self, id: &ThumbnailId) -> bool {
        let mut set = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(id.as_file_id().clone())
    }

    /// Release a previously acquired identity.
    pub fn release(&self, id: &ThumbnailId) {
        let mut set = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(id.as_file_id());
    }

    /// Whether generation for the identity is currently in flight.
    pub fn contains(&self, id: &ThumbnailId) -> bool {
        let set = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(id.as_file_id())
    }

    /// Number of in-flight generations.
    pub fn len(&self) -> usize {
        let set = self.in_progress.lock().unwrap_or_else(|e| e.into_inner());
        set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::thumbnails::format::{ThumbnailFormat, ThumbnailSize};

    fn thumb(path: &str) -> ThumbnailId {
        let id = FileId::new(path, 100, 10);
        ThumbnailId::derive(&id, ThumbnailFormat::Jpeg, ThumbnailSize::Medium)
    }

    #[test]
    fn test_acquire_release_cycle() {
        let registry = InProgressRegistry::new();
        let id = thumb("/a/cat.jpg");

        assert!(registry.try_acquire(&id));
        assert!(registry.contains(&id));
        assert!(!registry.try_acquire(&id));

        registry.release(&id);
        assert!(!registry.contains(&id));
        assert!(registry.try_acquire(&id));
    }

    #[test]
    fn test_distinct_identities_are_independent() {
        let registry = InProgressRegistry::new();
        let a = thumb("/a/cat.jpg");
        let b = thumb("/b/cat.jpg");

        assert!(registry.try_acquire(&a));
        assert!(registry.try_acquire(&b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_of_unknown_identity_is_a_noop() {
        let registry = InProgressRegistry::new();
        registry.release(&thumb("/a/cat.jpg"));
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exactly_one_concurrent_acquirer_wins() {
        let registry = Arc::new(InProgressRegistry::new());
        let id = thumb("/a/cat.jpg");

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            handles.push(tokio::spawn(async move { registry.try_acquire(&id) }));
        }

        let results = futures::future::join_all(handles).await;
        let winners = results
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
