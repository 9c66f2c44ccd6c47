use crate::{
    output_dir_for, Config, CrawlError, ErrorEvent, ErrorKind, RenderBackend, RenderResource,
    ResourceLease, ResourcePool, TaskRegistry, Viewport,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Shared receiving end of the work queue
pub type WorkQueue = Arc<Mutex<mpsc::Receiver<String>>>;

/// Per-worker copy of the settings a worker needs
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub output_dir: PathBuf,
    pub wait: Duration,
    pub viewport: Viewport,
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            wait: config.wait,
            viewport: config.viewport.clone(),
        }
    }
}

pub struct CrawlWorker<B: RenderBackend> {
    id: usize,
    pool: ResourcePool<B>,
    tasks: TaskRegistry<B::Resource>,
    settings: WorkerSettings,
    processed_count: Arc<AtomicUsize>,
    error_count: Arc<AtomicUsize>,
}

impl<B: RenderBackend> CrawlWorker<B> {
    pub fn new(
        id: usize,
        pool: ResourcePool<B>,
        tasks: TaskRegistry<B::Resource>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id,
            pool,
            tasks,
            settings,
            processed_count: Arc::new(AtomicUsize::new(0)),
            error_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take URLs from the shared queue until it is closed and drained.
    pub async fn run(&self, queue: WorkQueue, errors: mpsc::Sender<ErrorEvent>) -> WorkerStats {
        info!("Starting crawl worker {}", self.id);

        loop {
            let url = {
                let mut receiver = queue.lock().await;
                receiver.recv().await
            };

            match url {
                Some(url) => {
                    let failures = self.process_url(&url, &errors).await;
                    self.processed_count.fetch_add(1, Ordering::Relaxed);
                    if failures > 0 {
                        self.error_count.fetch_add(failures, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }

        let stats = self.get_stats();
        info!(
            "Crawl worker {} stopped after {} URLs ({} errors)",
            self.id, stats.processed_count, stats.error_count
        );
        stats
    }

    /// Load `url` and run the task pipeline against it. Returns the number of
    /// error events raised.
    async fn process_url(&self, url: &str, errors: &mpsc::Sender<ErrorEvent>) -> usize {
        debug!("Worker {} processing {}", self.id, url);

        let lease = match self.load(url).await {
            Ok(lease) => lease,
            Err(event) => {
                self.report(errors, event).await;
                return 1;
            }
        };

        let mut failures = 0;
        let dir = output_dir_for(&self.settings.output_dir, url);

        match tokio::fs::create_dir_all(&dir).await {
            Ok(()) => {
                for task in self.tasks.pipeline() {
                    debug!(
                        "Worker {} running task {} (tier {}) for {}",
                        self.id,
                        task.name(),
                        task.priority(),
                        url
                    );
                    if let Err(e) = task.execute(url, &dir, lease.resource()).await {
                        let error = match e {
                            CrawlError::TaskFailed { .. } => e,
                            other => CrawlError::task(task.name(), other),
                        };
                        self.report(errors, ErrorEvent::new(url, ErrorKind::Task, error))
                            .await;
                        failures += 1;
                    }
                }
            }
            Err(e) => {
                let error = CrawlError::task(
                    "create output directory",
                    format!("{}: {}", dir.display(), e),
                );
                self.report(errors, ErrorEvent::new(url, ErrorKind::Task, error))
                    .await;
                failures += 1;
            }
        }

        lease.release().await;
        failures
    }

    /// Allocate a resource, navigate it to `url` and wait for the page to settle.
    ///
    /// The lease is released on every failure path after allocation.
    async fn load(&self, url: &str) -> Result<ResourceLease<B>, ErrorEvent> {
        let lease = self
            .pool
            .allocate(&self.settings.viewport)
            .await
            .map_err(|e| ErrorEvent::new(url, ErrorKind::Allocation, e))?;

        let shutdown = self.pool.shutdown_signal().clone();
        let navigated = tokio::select! {
            result = lease.resource().navigate(url) => result.map_err(|e| match e {
                CrawlError::NavigationFailed(_) | CrawlError::Cancelled => e,
                other => CrawlError::NavigationFailed(other.to_string()),
            }),
            _ = shutdown.cancelled() => Err(CrawlError::Cancelled),
        };

        if let Err(e) = navigated {
            lease.release().await;
            return Err(ErrorEvent::new(url, ErrorKind::Navigation, e));
        }

        tokio::select! {
            _ = tokio::time::sleep(self.settings.wait) => Ok(lease),
            _ = shutdown.cancelled() => {
                lease.release().await;
                Err(ErrorEvent::new(url, ErrorKind::Navigation, CrawlError::Cancelled))
            }
        }
    }

    async fn report(&self, errors: &mpsc::Sender<ErrorEvent>, event: ErrorEvent) {
        if let Err(e) = errors.send(event).await {
            warn!("Worker {} could not report error: {}", self.id, e.0);
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            processed_count: self.processed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    pub processed_count: usize,
    pub error_count: usize,
}
