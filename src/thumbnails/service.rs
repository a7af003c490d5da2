//! Thumbnail production service.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{io, mem};

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::format::{ImageFormat, ThumbnailFormat, ThumbnailSize};
use super::id::ThumbnailId;
use super::registry::InProgressRegistry;
use super::resizer::{ResizeError, Resizer};
use crate::cache::{CacheError, DiskCache};
use crate::identity::FileId;
use crate::metrics::{MetricsSink, NullMetricsSink};

/// Errors from thumbnail submission, waiting and production.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("service was stopped")]
    Stopped,

    #[error("unsupported image format: {0:?}")]
    UnsupportedFormat(String),

    #[error("wait for thumbnail was cancelled")]
    Cancelled,

    #[error("timed out waiting for thumbnail")]
    WaitTimeout,

    #[error("timed out downloading source image")]
    SourceTimeout,

    #[error("source size mismatch: expected {expected} bytes, copied {copied}")]
    SizeMismatch { expected: u64, copied: u64 },

    #[error("workers did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Resize(#[from] ResizeError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Byte stream of a source image.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Provider of source image bytes, typically a remote storage client.
pub trait SourceOpener: Send + Sync {
    fn open<'a>(
        &'a self,
        id: &'a FileId,
    ) -> Pin<Box<dyn Future<Output = io::Result<ByteStream>> + Send + 'a>>;
}

/// Tuning knobs for [`ThumbnailService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Number of concurrent production workers.
    pub workers: usize,
    /// Capacity of the task queue; submissions block once it is full.
    pub queue_capacity: usize,
    /// Sources at most this many bytes are cached as-is instead of resized.
    /// Resizing very small images tends to enlarge them.
    pub use_original_threshold: u64,
    /// Output container for transcoded thumbnails.
    pub format: ThumbnailFormat,
    /// Hard limit on downloading the source bytes for one task.
    pub task_timeout: Duration,
    /// How often [`ThumbnailService::open_result`] re-checks for completion.
    pub poll_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 10_000,
            use_original_threshold: 200 * 1024,
            format: ThumbnailFormat::default(),
            task_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_use_original_threshold(mut self, threshold: u64) -> Self {
        self.use_original_threshold = threshold;
        self
    }

    pub fn with_format(mut self, format: ThumbnailFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

struct GenerateTask {
    file_id: FileId,
    thumbnail_id: ThumbnailId,
    use_original: bool,
    size: ThumbnailSize,
}

struct TaskStats {
    original_size: u64,
    thumbnail_size: u64,
    original_used: bool,
}

/// Produces thumbnails on demand through a fixed worker pool.
///
/// Submissions are deduplicated per derived key: while a production is in
/// flight, further submissions for the same key are accepted and ignored.
/// Results land in the [`DiskCache`]; waiters poll with
/// [`open_result`](Self::open_result).
pub struct ThumbnailService {
    inner: Arc<ServiceInner>,
    tasks: mpsc::Sender<GenerateTask>,
    shutdown_token: CancellationToken,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

struct ServiceInner {
    cache: DiskCache,
    opener: Arc<dyn SourceOpener>,
    resizer: Arc<dyn Resizer>,
    metrics: Arc<dyn MetricsSink>,
    registry: InProgressRegistry,
    config: ServiceConfig,
    stopped: AtomicBool,
}

impl ThumbnailService {
    /// Create the service and start its workers.
    pub fn new(cache: DiskCache, opener: Arc<dyn SourceOpener>, resizer: Arc<dyn Resizer>, config: ServiceConfig) -> Self {
        Self::with_metrics(cache, opener, resizer, config, Arc::new(NullMetricsSink))
    }

    pub fn with_metrics(
        cache: DiskCache,
        opener: Arc<dyn SourceOpener>,
        resizer: Arc<dyn Resizer>,
        config: ServiceConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let (tasks, receiver) = mpsc::channel(config.queue_capacity);
        let inner = Arc::new(ServiceInner {
            cache,
            opener,
            resizer,
            metrics,
            registry: InProgressRegistry::new(),
            config,
            stopped: AtomicBool::new(false),
        });

        let shutdown_token = CancellationToken::new();
        let workers = spawn_workers(&inner, receiver, &shutdown_token);

        Self {
            inner,
            tasks,
            shutdown_token,
            workers: std::sync::Mutex::new(workers),
        }
    }

    /// Queue production of a thumbnail and return its derived cache key.
    ///
    /// Returns immediately: the thumbnail appears in the cache later, or
    /// never if production fails. If a production for the same key is
    /// already in flight the call is a no-op. Blocks only when the task
    /// queue is full.
    pub async fn submit_task(
        &self,
        id: &FileId,
        size: ThumbnailSize,
    ) -> Result<ThumbnailId, GenerateError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(GenerateError::Stopped);
        }
        let Some(format) = ImageFormat::from_id(id) else {
            return Err(GenerateError::UnsupportedFormat(id.ext()));
        };

        let use_original = if format.passthrough_only() {
            true
        } else if format.always_transcode() {
            false
        } else {
            id.size() < self.inner.config.use_original_threshold
        };

        let thumbnail_id = ThumbnailId::derive(id, self.inner.config.format, size);
        if !self.inner.registry.try_acquire(&thumbnail_id) {
            // Already in flight.
            return Ok(thumbnail_id);
        }

        let task = GenerateTask {
            file_id: id.clone(),
            thumbnail_id: thumbnail_id.clone(),
            use_original,
            size,
        };
        if self.tasks.send(task).await.is_err() {
            // Queue was closed by shutdown after the stopped check above.
            self.inner.registry.release(&thumbnail_id);
            return Err(GenerateError::Stopped);
        }
        Ok(thumbnail_id)
    }

    /// Whether a thumbnail exists or its production is under way.
    ///
    /// In-flight production counts as ready so that callers do not submit
    /// duplicates; a subsequent [`open_result`](Self::open_result) may still
    /// have to wait.
    pub fn is_ready(&self, id: &ThumbnailId) -> bool {
        self.inner.registry.contains(id) || self.inner.cache.check(id.as_file_id()).is_ok()
    }

    /// Wait until no production is in flight for the key, then open the
    /// cached thumbnail.
    ///
    /// Cancelling the token stops the wait but not the production itself.
    /// A [`CacheError::Miss`] after the wait means production failed, or
    /// was never submitted.
    pub async fn open_result(
        &self,
        id: &ThumbnailId,
        cancel: &CancellationToken,
    ) -> Result<tokio::fs::File, GenerateError> {
        while self.inner.registry.contains(id) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }
        }

        let file = self.inner.cache.open(id.as_file_id())?;
        Ok(tokio::fs::File::from_std(file))
    }

    /// [`open_result`](Self::open_result) with a deadline instead of a token.
    pub async fn open_result_timeout(
        &self,
        id: &ThumbnailId,
        timeout: Duration,
    ) -> Result<tokio::fs::File, GenerateError> {
        let cancel = CancellationToken::new();
        tokio::time::timeout(timeout, self.open_result(id, &cancel))
            .await
            .map_err(|_| GenerateError::WaitTimeout)?
    }

    /// Stop the service: reject new submissions, drop queued tasks without
    /// running them, and wait for in-flight tasks to finish.
    ///
    /// On expiry returns [`GenerateError::ShutdownTimeout`] while workers may
    /// still be running.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), GenerateError> {
        self.inner.stopped.store(true, Ordering::Release);
        self.shutdown_token.cancel();

        let workers = {
            let mut guard = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            mem::take(&mut *guard)
        };
        let wait = async {
            for handle in workers {
                if let Err(err) = handle.await {
                    warn!(error = %err, "thumbnail worker panicked");
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| GenerateError::ShutdownTimeout(timeout))?;

        info!("thumbnail service stopped");
        Ok(())
    }
}

fn spawn_workers(
    inner: &Arc<ServiceInner>,
    receiver: mpsc::Receiver<GenerateTask>,
    shutdown_token: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(Mutex::new(receiver));

    (0..inner.config.workers)
        .map(|worker| {
            let inner = Arc::clone(inner);
            let receiver = Arc::clone(&receiver);
            let token = shutdown_token.clone();

            tokio::spawn(async move {
                debug!(worker, "thumbnail worker started");
                loop {
                    let task = {
                        let mut rx = receiver.lock().await;
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => {
                                // Close the queue so late submissions fail,
                                // then drop everything still buffered.
                                rx.close();
                                while let Ok(task) = rx.try_recv() {
                                    inner.registry.release(&task.thumbnail_id);
                                }
                                None
                            }
                            task = rx.recv() => task,
                        }
                    };
                    let Some(task) = task else { break };
                    inner.run_task(task).await;
                }
                debug!(worker, "thumbnail worker stopped");
            })
        })
        .collect()
}

impl ServiceInner {
    async fn run_task(&self, task: GenerateTask) {
        let started = Instant::now();
        let result = self.process_task(&task).await;
        let elapsed = started.elapsed();

        match result {
            Err(err) => {
                // The cache entry must not survive a failed production.
                if let Err(err) = self.cache.remove(task.thumbnail_id.as_file_id()) {
                    if !err.is_miss() {
                        warn!(
                            file = %task.file_id,
                            error = %err,
                            "failed to roll back thumbnail after production error",
                        );
                    }
                }
                self.metrics.generation_error();
                error!(file = %task.file_id, error = %err, "thumbnail production failed");
            }
            Ok(stats) if stats.original_used => {
                self.metrics.original_used();
                self.metrics.observe_original_size(stats.original_size);
                debug!(
                    file = %task.file_id,
                    size = stats.original_size,
                    "cached original image as its own thumbnail",
                );
            }
            Ok(stats) => {
                self.metrics.observe_original_size(stats.original_size);
                self.metrics.observe_task_duration(elapsed);
                if stats.thumbnail_size > 0 {
                    self.metrics
                        .observe_size_ratio(stats.original_size as f64 / stats.thumbnail_size as f64);
                }

                // Growing by a few KiB is normal for tiny inputs; anything
                // bigger deserves attention.
                const REPORT_THRESHOLD: u64 = 10 * 1024;
                if stats.thumbnail_size > stats.original_size + REPORT_THRESHOLD {
                    warn!(
                        file = %task.file_id,
                        original_size = stats.original_size,
                        thumbnail_size = stats.thumbnail_size,
                        "thumbnail is larger than the original image",
                    );
                } else {
                    debug!(
                        file = %task.file_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        original_size = stats.original_size,
                        thumbnail_size = stats.thumbnail_size,
                        "thumbnail generated",
                    );
                }
            }
        }

        self.registry.release(&task.thumbnail_id);
    }

    async fn process_task(&self, task: &GenerateTask) -> Result<TaskStats, GenerateError> {
        let cache_path = self.cache.path_for_write(task.thumbnail_id.as_file_id())?;

        // The resize tool operates on files, so the source bytes always go
        // through a private temp file first.
        let temp = tempfile::NamedTempFile::new()?;
        let temp_path = temp.path().to_path_buf();

        let download = async {
            let mut source = self.opener.open(&task.file_id).await?;
            let mut file = tokio::fs::File::create(&temp_path).await?;
            let copied = tokio::io::copy(&mut source, &mut file).await?;
            file.sync_all().await?;
            Ok::<_, GenerateError>(copied)
        };
        let original_size = tokio::time::timeout(self.config.task_timeout, download)
            .await
            .map_err(|_| GenerateError::SourceTimeout)??;

        if original_size != task.file_id.size() {
            return Err(GenerateError::SizeMismatch {
                expected: task.file_id.size(),
                copied: original_size,
            });
        }

        if task.use_original {
            // Byte copy, not a rename: the temp dir and the cache can live
            // on different mounts.
            let mut source = tokio::fs::File::open(&temp_path).await?;
            let mut dest = tokio::fs::File::create(&cache_path).await?;
            let copied = tokio::io::copy(&mut source, &mut dest).await?;
            dest.sync_all().await?;
            if copied != original_size {
                return Err(GenerateError::SizeMismatch {
                    expected: original_size,
                    copied,
                });
            }
            return Ok(TaskStats {
                original_size,
                thumbnail_size: copied,
                original_used: true,
            });
        }

        self.resizer
            .resize(&temp_path, &cache_path, &task.thumbnail_id, task.size)
            .await?;

        let thumbnail_size = tokio::fs::metadata(&cache_path).await?.len();
        Ok(TaskStats {
            original_size,
            thumbnail_size,
            original_used: false,
        })
    }
}
