//! Test doubles shared by the unit tests, plus end-to-end runs of the
//! orchestrator against them.

use crate::{CrawlError, Priority, RenderBackend, RenderResource, Shutdown, Task, Viewport};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockCounters {
    attempts: AtomicUsize,
    allocated: AtomicUsize,
    released: AtomicUsize,
}

/// In-memory render backend with scriptable failures.
#[derive(Clone, Default)]
pub struct MockBackend {
    counters: Arc<MockCounters>,
    /// 1-based allocation attempts that fail
    fail_allocations: HashSet<usize>,
    fail_navigation: Option<String>,
    allocation_delay: Duration,
    navigation_delay: Duration,
    release_delay: Duration,
    /// Fired just before an allocation succeeds
    shutdown_on_allocate: Option<Shutdown>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_allocations(mut self, attempts: impl IntoIterator<Item = usize>) -> Self {
        self.fail_allocations.extend(attempts);
        self
    }

    pub fn fail_navigation_containing(mut self, pattern: &str) -> Self {
        self.fail_navigation = Some(pattern.to_string());
        self
    }

    pub fn allocation_delay(mut self, delay: Duration) -> Self {
        self.allocation_delay = delay;
        self
    }

    pub fn navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    pub fn release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = delay;
        self
    }

    pub fn shutdown_on_allocate(mut self, shutdown: &Shutdown) -> Self {
        self.shutdown_on_allocate = Some(shutdown.clone());
        self
    }

    pub fn allocated(&self) -> usize {
        self.counters.allocated.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderBackend for MockBackend {
    type Resource = MockResource;

    async fn allocate(&self, viewport: &Viewport) -> Result<MockResource, CrawlError> {
        let attempt = self.counters.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::task::yield_now().await;
        if !self.allocation_delay.is_zero() {
            tokio::time::sleep(self.allocation_delay).await;
        }

        if self.fail_allocations.contains(&attempt) {
            return Err(CrawlError::AllocationFailed(format!(
                "mock allocation {attempt} refused"
            )));
        }

        self.counters.allocated.fetch_add(1, Ordering::SeqCst);
        if let Some(shutdown) = &self.shutdown_on_allocate {
            shutdown.trigger();
        }
        Ok(MockResource {
            id: attempt,
            viewport: viewport.clone(),
            fail_navigation: self.fail_navigation.clone(),
            navigation_delay: self.navigation_delay,
        })
    }

    async fn release(&self, _resource: MockResource) {
        if !self.release_delay.is_zero() {
            tokio::time::sleep(self.release_delay).await;
        }
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockResource {
    pub id: usize,
    pub viewport: Viewport,
    fail_navigation: Option<String>,
    navigation_delay: Duration,
}

#[async_trait]
impl RenderResource for MockResource {
    async fn navigate(&self, url: &str) -> Result<(), CrawlError> {
        tokio::task::yield_now().await;
        if !self.navigation_delay.is_zero() {
            tokio::time::sleep(self.navigation_delay).await;
        }
        match &self.fail_navigation {
            Some(pattern) if url.contains(pattern.as_str()) => Err(CrawlError::NavigationFailed(
                format!("mock could not reach {url}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Records `(url, task name)` for every task execution.
#[derive(Clone, Default)]
pub struct TaskLog {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl TaskLog {
    pub fn names_for(&self, url: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

struct RecordingTask {
    name: String,
    priority: Priority,
    fail: bool,
    log: TaskLog,
}

#[async_trait]
impl Task<MockResource> for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    async fn execute(
        &self,
        url: &str,
        output_dir: &Path,
        _resource: &MockResource,
    ) -> Result<(), CrawlError> {
        assert!(output_dir.is_dir(), "output directory created before tasks");
        self.log
            .entries
            .lock()
            .unwrap()
            .push((url.to_string(), self.name.clone()));
        tokio::task::yield_now().await;

        if self.fail {
            Err(CrawlError::task(&self.name, "mock failure"))
        } else {
            Ok(())
        }
    }
}

pub fn recording_task(
    name: &str,
    priority: Priority,
    fail: bool,
    log: &TaskLog,
) -> Arc<dyn Task<MockResource>> {
    Arc::new(RecordingTask {
        name: name.to_string(),
        priority,
        fail,
        log: log.clone(),
    })
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::{Config, Orchestrator, ReadErrorPolicy, Shutdown, TaskRegistry};
    use std::collections::HashMap;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, BufReader, ReadBuf};
    use tokio_test::{assert_err, assert_ok};

    fn test_config(root: &Path, threads: usize) -> Config {
        Config {
            threads,
            wait: Duration::from_millis(1),
            output_dir: root.to_path_buf(),
            ..Default::default()
        }
    }

    fn orchestrator(
        config: Config,
        backend: MockBackend,
        tasks: Vec<Arc<dyn Task<MockResource>>>,
    ) -> Orchestrator<MockBackend> {
        Orchestrator::new(config, backend, TaskRegistry::new(tasks), Shutdown::new()).unwrap()
    }

    fn dir_count(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn test_three_targets_with_one_allocation_failure() {
        let root = tempfile::tempdir().unwrap();
        let backend = MockBackend::new().fail_allocations([3]);
        let log = TaskLog::default();
        let crawler = orchestrator(
            test_config(root.path(), 2),
            backend.clone(),
            vec![recording_task("shot", Priority::First, false, &log)],
        );

        let input = "a.test\nhttp://b.test\nc.test\n";
        let summary = assert_ok!(crawler.run(BufReader::new(input.as_bytes())).await);

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.processed(), 3);
        assert_eq!(summary.workers.len(), 2);
        assert_eq!(summary.errors.allocation_errors, 1);
        assert_eq!(summary.errors.total(), 1);

        // Exactly the two URLs that loaded got a directory
        assert_eq!(dir_count(root.path()), 2);
        let failed = summary.errors.failed_urls.iter().next().unwrap().clone();
        for url in ["https://a.test", "http://b.test", "https://c.test"] {
            let dir = crate::output_dir_for(root.path(), url);
            assert_eq!(dir.is_dir(), url != failed, "{url}");
        }
        assert_eq!(backend.allocated(), backend.released());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_url_processed_exactly_once() {
        let input: String = (0..60).map(|i| format!("host{i}.test/page\n")).collect();

        for threads in [1, 3, 8] {
            let root = tempfile::tempdir().unwrap();
            let log = TaskLog::default();
            let crawler = orchestrator(
                test_config(root.path(), threads),
                MockBackend::new(),
                vec![recording_task("visit", Priority::First, false, &log)],
            );

            let summary = crawler
                .run(BufReader::new(io::Cursor::new(input.clone().into_bytes())))
                .await
                .unwrap();
            assert_eq!(summary.dispatched, 60);
            assert_eq!(summary.processed(), 60);

            let mut seen: HashMap<String, usize> = HashMap::new();
            for (url, _) in log.entries() {
                *seen.entry(url).or_default() += 1;
            }
            assert_eq!(seen.len(), 60, "threads = {threads}");
            assert!(seen.values().all(|count| *count == 1), "threads = {threads}");
            assert_eq!(dir_count(root.path()), 60);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tier_order_holds_per_url_under_concurrency() {
        let root = tempfile::tempdir().unwrap();
        let log = TaskLog::default();
        let backend = MockBackend::new();
        let crawler = orchestrator(
            test_config(root.path(), 4),
            backend.clone(),
            vec![
                recording_task("metadata", Priority::Third, false, &log),
                recording_task("dom", Priority::Second, true, &log),
                recording_task("screenshot", Priority::First, false, &log),
                recording_task("links", Priority::Second, false, &log),
            ],
        );

        let input: String = (0..12).map(|i| format!("site{i}.test\n")).collect();
        let summary = crawler
            .run(BufReader::new(io::Cursor::new(input.into_bytes())))
            .await
            .unwrap();

        for i in 0..12 {
            assert_eq!(
                log.names_for(&format!("https://site{i}.test")),
                vec!["screenshot", "dom", "links", "metadata"]
            );
        }
        assert_eq!(summary.errors.task_errors, 12);
        assert_eq!(backend.allocated(), 12);
        assert_eq!(backend.released(), 12);
    }

    #[tokio::test]
    async fn test_navigation_failures_are_reported_and_released() {
        let root = tempfile::tempdir().unwrap();
        let backend = MockBackend::new().fail_navigation_containing("down");
        let crawler = orchestrator(test_config(root.path(), 2), backend.clone(), Vec::new());

        let input = "up.test\ndown.test\ndown.test/again\nup.test/two\n";
        let summary = crawler.run(BufReader::new(input.as_bytes())).await.unwrap();

        assert_eq!(summary.errors.navigation_errors, 2);
        assert_eq!(backend.allocated(), 4);
        assert_eq!(backend.released(), 4);
        assert_eq!(crawler.pool().get_stats().await.outstanding, 0);
        assert!(root.path().join("https-up.test").is_dir());
        assert!(!root.path().join("https-down.test").exists());
    }

    #[tokio::test]
    async fn test_run_completes_when_queue_closes() {
        let root = tempfile::tempdir().unwrap();
        let crawler = orchestrator(test_config(root.path(), 5), MockBackend::new(), Vec::new());

        // Fewer URLs than workers, so most workers only ever see the closed queue
        let run = crawler.run(BufReader::new("one.test\ntwo.test\n".as_bytes()));
        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("all workers should observe the closed queue")
            .unwrap();

        assert_eq!(summary.workers.len(), 5);
        assert_eq!(summary.processed(), 2);
    }

    #[tokio::test]
    async fn test_empty_targets() {
        let root = tempfile::tempdir().unwrap();
        let crawler = orchestrator(test_config(root.path(), 3), MockBackend::new(), Vec::new());

        let summary = crawler.run(BufReader::new("".as_bytes())).await.unwrap();
        assert_eq!(summary.dispatched, 0);
        assert_eq!(summary.errors.total(), 0);
        assert_eq!(dir_count(root.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_targets_file_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let crawler = orchestrator(test_config(root.path(), 1), MockBackend::new(), Vec::new());

        let err = assert_err!(crawler.run_file(root.path().join("nope.txt")).await);
        assert!(matches!(err, CrawlError::TargetsOpen(_)));
        assert!(err.is_fatal());
    }

    /// Yields `lines`, then fails on the next read.
    struct BrokenTargets {
        lines: Option<&'static [u8]>,
    }

    impl AsyncRead for BrokenTargets {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.lines.take() {
                Some(lines) => {
                    buf.put_slice(lines);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "read failed"))),
            }
        }
    }

    #[tokio::test]
    async fn test_read_error_aborts_run() {
        let root = tempfile::tempdir().unwrap();
        let crawler = orchestrator(test_config(root.path(), 2), MockBackend::new(), Vec::new());

        let targets = BufReader::new(BrokenTargets {
            lines: Some(b"a.test\n"),
        });
        let err = assert_err!(crawler.run(targets).await);

        assert!(matches!(err, CrawlError::TargetsRead(_)));
        assert!(crawler.pool().shutdown_signal().is_triggered());
    }

    #[tokio::test]
    async fn test_read_error_drains_dispatched_urls() {
        let root = tempfile::tempdir().unwrap();
        let log = TaskLog::default();
        let config = Config {
            on_read_error: ReadErrorPolicy::Drain,
            ..test_config(root.path(), 2)
        };
        let crawler = orchestrator(
            config,
            MockBackend::new(),
            vec![recording_task("shot", Priority::First, false, &log)],
        );

        let targets = BufReader::new(BrokenTargets {
            lines: Some(b"a.test\nb.test\n"),
        });
        let err = assert_err!(crawler.run(targets).await);

        assert!(matches!(err, CrawlError::TargetsRead(_)));
        assert_eq!(log.names_for("https://a.test"), vec!["shot"]);
        assert_eq!(log.names_for("https://b.test"), vec!["shot"]);
        assert!(!crawler.pool().shutdown_signal().is_triggered());
    }

    #[tokio::test]
    async fn test_error_events_carry_kind_and_url() {
        let root = tempfile::tempdir().unwrap();
        let log = TaskLog::default();
        let backend = MockBackend::new()
            .fail_allocations([1])
            .fail_navigation_containing("nav-fail");
        let crawler = orchestrator(
            test_config(root.path(), 1),
            backend,
            vec![recording_task("broken", Priority::Second, true, &log)],
        );

        let input = "alloc-fail.test\nnav-fail.test\ntask-fail.test\n";
        let summary = crawler.run(BufReader::new(input.as_bytes())).await.unwrap();

        assert_eq!(summary.errors.allocation_errors, 1);
        assert_eq!(summary.errors.navigation_errors, 1);
        assert_eq!(summary.errors.task_errors, 1);
        assert_eq!(summary.errors.failed_urls.len(), 3);
        assert_eq!(summary.workers[0].error_count, 3);
    }
}
