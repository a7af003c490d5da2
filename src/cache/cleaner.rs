//! Background cache cleaner.
//!
//! Periodically scans the cache directory and evicts entries per an age and
//! size policy: everything older than `max_age` always goes; if the remaining
//! entries still exceed `max_total_size`, the oldest of them (by mtime) are
//! evicted until the total fits the budget.
//!
//! The cleaner operates directly on the filesystem and takes no lock shared
//! with cache writers - every consumer of the cache must tolerate files
//! vanishing between a presence check and an open.
//!
//! # Usage
//!
//! ```ignore
//! use thumbcache::cache::{Cleaner, CleanerConfig};
//!
//! let config = CleanerConfig::new(cache_dir, max_age, max_total_size);
//! let handle = Cleaner::spawn(config);
//! // ...
//! handle.shutdown(Duration::from_secs(5)).await?;
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::types::{CacheError, CleanerConfig};

/// A file found during a cleanup scan.
#[derive(Debug, Clone, PartialEq)]
struct FileMeta {
    path: PathBuf,
    mod_time: SystemTime,
    size: u64,
}

/// Result of one cleanup cycle.
#[derive(Debug, Clone, Default)]
pub struct CleanupStats {
    /// Number of files removed
    pub files_removed: usize,
    /// Total bytes freed
    pub bytes_freed: u64,
    /// Number of files that could not be removed
    pub failures: usize,
}

/// Background cleaner enforcing the retention policy.
pub struct Cleaner;

/// Handle for stopping a running [`Cleaner`].
pub struct CleanerHandle {
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl Cleaner {
    /// Spawn the cleanup loop on the current tokio runtime.
    ///
    /// The first cycle runs immediately; subsequent cycles run on every tick
    /// of `config.check_interval`. The stop signal is observed at tick
    /// boundaries only - a cycle already in progress always finishes.
    pub fn spawn(config: CleanerConfig) -> CleanerHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let join = tokio::spawn(async move {
            info!(
                dir = %config.dir.display(),
                check_interval_secs = config.check_interval.as_secs(),
                max_age_secs = config.max_age.as_secs(),
                max_total_size = config.max_total_size,
                "Cache cleaner starting"
            );

            run_cycle(&config).await;

            loop {
                tokio::select! {
                    biased;

                    _ = loop_token.cancelled() => {
                        info!("Cache cleaner shutting down");
                        break;
                    }

                    _ = tokio::time::sleep(config.check_interval) => {
                        run_cycle(&config).await;
                    }
                }
            }
        });

        CleanerHandle { token, join }
    }
}

impl CleanerHandle {
    /// Signal the cleanup loop to stop and wait for it to finish.
    ///
    /// Returns [`CacheError::ShutdownTimeout`] if the loop (including any
    /// cycle in progress) does not finish within `timeout`.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), CacheError> {
        self.token.cancel();

        match tokio::time::timeout(timeout, self.join).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "Cache cleaner task ended abnormally");
                Ok(())
            }
            Err(_) => Err(CacheError::ShutdownTimeout(timeout)),
        }
    }
}

/// Run one cleanup cycle. Filesystem work happens in a blocking task.
async fn run_cycle(config: &CleanerConfig) {
    let config = config.clone();

    let stats = tokio::task::spawn_blocking(move || {
        debug!(dir = %config.dir.display(), "Starting cleanup cycle");

        let files = match collect_files(&config.dir) {
            Ok(files) => files,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // The cache directory appears with the first write.
                debug!(dir = %config.dir.display(), "Cache directory does not exist yet, skipping cycle");
                return None;
            }
            Err(err) => {
                error!(dir = %config.dir.display(), error = %err, "Couldn't enumerate cache files, skipping cycle");
                return None;
            }
        };

        let doomed = plan_eviction(
            files,
            SystemTime::now(),
            config.max_age,
            config.max_total_size,
        );
        if doomed.is_empty() {
            return None;
        }

        debug!(count = doomed.len(), "Evicting cache files");
        let stats = remove_files(doomed);
        prune_empty_dirs(&config.dir);
        Some(stats)
    })
    .await
    .unwrap_or_default();

    if let Some(stats) = stats {
        info!(
            files_removed = stats.files_removed,
            bytes_freed = stats.bytes_freed,
            failures = stats.failures,
            "Cleanup cycle complete"
        );
    }
}

/// Recursively collect all files (not directories) with mtime and size.
fn collect_files(dir: &Path) -> io::Result<Vec<FileMeta>> {
    let mut files = Vec::new();
    collect_files_into(dir, &mut files)?;
    Ok(files)
}

fn collect_files_into(dir: &Path, files: &mut Vec<FileMeta>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_files_into(&path, files)?;
        } else {
            let metadata = entry.metadata()?;
            files.push(FileMeta {
                path,
                mod_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: metadata.len(),
            });
        }
    }
    Ok(())
}

/// Decide which files to evict.
///
/// Files older than `max_age` are always evicted. If the remaining ("active")
/// files exceed `max_total_size`, the oldest active files are added to the
/// eviction set until the rest fit the budget. Pure function, so the policy
/// is unit-testable without a filesystem.
fn plan_eviction(
    files: Vec<FileMeta>,
    now: SystemTime,
    max_age: Duration,
    max_total_size: u64,
) -> Vec<FileMeta> {
    let min_mod_time = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut old = Vec::new();
    let mut active = Vec::new();
    let mut active_total: u64 = 0;

    for file in files {
        if file.mod_time < min_mod_time {
            old.push(file);
        } else {
            active_total += file.size;
            active.push(file);
        }
    }

    if active_total < max_total_size {
        // The age limit alone satisfies the budget.
        return old;
    }

    // Stable sort: ties keep encounter order.
    active.sort_by_key(|file| file.mod_time);

    let mut index = 0;
    for (i, file) in active.iter().enumerate() {
        active_total -= file.size;
        if active_total < max_total_size {
            index = i + 1;
            break;
        }
    }
    if index == 0 {
        // No prefix satisfies the budget; should not happen given the loop
        // above, evict everything active.
        index = active.len();
    }

    old.extend(active.drain(..index));
    old
}

/// Remove files one by one; failures are logged and counted, never fatal.
fn remove_files(files: Vec<FileMeta>) -> CleanupStats {
    let mut stats = CleanupStats::default();

    for file in files {
        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                stats.files_removed += 1;
                stats.bytes_freed += file.size;
            }
            Err(err) => {
                // The file may have been removed by a concurrent rollback.
                stats.failures += 1;
                warn!(path = %file.path.display(), error = %err, "Couldn't remove cache file");
            }
        }
    }

    stats
}

/// Remove month-bucket directories that eviction emptied, depth-first.
fn prune_empty_dirs(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            prune_empty_dirs(&path);
            // Fails silently when not empty.
            let _ = std::fs::remove_dir(&path);
        }
    }
}
