//! Crawl orchestration
//!
//! Wires the dispatcher, the workers, the resource pool and the error
//! reporter together and runs them until every target has been processed.

use crate::{
    format_duration, Config, CrawlError, CrawlWorker, Dispatcher, ErrorEvent, ErrorReporter,
    ReadErrorPolicy, RenderBackend, ReportSummary, ResourcePool, Shutdown, TaskRegistry,
    WorkerSettings, WorkerStats,
};
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// Queue depth between the dispatcher and the workers.
const WORK_QUEUE_CAPACITY: usize = 1;

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub dispatched: usize,
    pub workers: Vec<WorkerStats>,
    pub errors: ReportSummary,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.workers.iter().map(|w| w.processed_count).sum()
    }
}

/// Runs a crawl over a render backend `B` with a fixed task registry.
///
/// # Examples
///
/// ```rust,no_run
/// use spydom::{default_tasks, ChromeBackend, Config, Orchestrator, Shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let backend = ChromeBackend::launch(&config).await?;
///     let tasks = default_tasks(config.screenshot_format);
///     let orchestrator = Orchestrator::new(config, backend, tasks, Shutdown::new())?;
///
///     let summary = orchestrator.run_file("targets.txt").await?;
///     println!("processed {} URLs", summary.processed());
///
///     orchestrator.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct Orchestrator<B: RenderBackend> {
    config: Config,
    pool: ResourcePool<B>,
    tasks: TaskRegistry<B::Resource>,
    shutdown: Shutdown,
}

impl<B: RenderBackend> Orchestrator<B> {
    pub fn new(
        config: Config,
        backend: B,
        tasks: TaskRegistry<B::Resource>,
        shutdown: Shutdown,
    ) -> Result<Self, CrawlError> {
        config.validate()?;
        let pool = ResourcePool::new(backend, config.threads, shutdown.clone());

        Ok(Self {
            config,
            pool,
            tasks,
            shutdown,
        })
    }

    pub fn pool(&self) -> &ResourcePool<B> {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<RunSummary, CrawlError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| CrawlError::TargetsOpen(format!("{}: {}", path.display(), e)))?;

        self.run(BufReader::new(file)).await
    }

    /// Crawl every target read from `targets` and wait for all workers.
    ///
    /// Per-URL failures are logged by the reporter and counted in the summary;
    /// only fatal errors are returned as `Err`.
    pub async fn run<R>(&self, targets: R) -> Result<RunSummary, CrawlError>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let started = Instant::now();
        let threads = self.config.threads;
        info!("Starting crawl with {} workers", threads);

        let (error_tx, error_rx) = mpsc::channel::<ErrorEvent>(threads * 4);
        let reporter = ErrorReporter::spawn(error_rx);

        let (queue_tx, queue_rx) = mpsc::channel::<String>(WORK_QUEUE_CAPACITY);
        let queue = Arc::new(Mutex::new(queue_rx));

        let settings = WorkerSettings::from(&self.config);
        let workers: Vec<_> = (0..threads)
            .map(|id| {
                let worker =
                    CrawlWorker::new(id, self.pool.clone(), self.tasks.clone(), settings.clone());
                let queue = queue.clone();
                let errors = error_tx.clone();
                tokio::spawn(async move { worker.run(queue, errors).await })
            })
            .collect();
        // Workers now hold the only senders; the reporter ends when they all finish.
        drop(error_tx);

        let report = tokio::spawn(Dispatcher::new(targets, queue_tx).run())
            .await
            .map_err(|e| CrawlError::Internal(format!("dispatcher task failed: {e}")))?;

        let mut deferred = None;
        if let Some(read_error) = report.read_error {
            match self.config.on_read_error {
                ReadErrorPolicy::Abort => {
                    self.shutdown.trigger();
                    for worker in &workers {
                        worker.abort();
                    }
                    return Err(read_error);
                }
                ReadErrorPolicy::Drain => {
                    warn!("{}; draining {} dispatched URLs", read_error, report.dispatched);
                    deferred = Some(read_error);
                }
            }
        }

        let mut worker_stats = Vec::with_capacity(threads);
        for (id, joined) in join_all(workers).await.into_iter().enumerate() {
            match joined {
                Ok(stats) => worker_stats.push(stats),
                Err(e) => error!("Worker {} did not complete: {}", id, e),
            }
        }

        let errors = reporter
            .await
            .map_err(|e| CrawlError::Internal(format!("error reporter failed: {e}")))?;

        if let Some(read_error) = deferred {
            return Err(read_error);
        }

        let elapsed = started.elapsed();
        info!(
            "Crawl finished: {} URLs across {} workers in {}",
            report.dispatched,
            worker_stats.len(),
            format_duration(elapsed)
        );

        Ok(RunSummary {
            dispatched: report.dispatched,
            workers: worker_stats,
            errors,
            elapsed,
        })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down crawler...");
        self.pool.shutdown().await;
    }
}
