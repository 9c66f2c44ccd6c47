//! Fan-in error reporting
//!
//! Workers send [`ErrorEvent`]s over a shared channel; a single reporter task
//! logs each one. The reporter keeps receiving until every sender is gone, so
//! a worker's send can never wait on a consumer that has already stopped.

use crate::{CrawlError, ErrorKind};
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub url: String,
    pub kind: ErrorKind,
    pub error: CrawlError,
}

impl ErrorEvent {
    pub fn new(url: impl Into<String>, kind: ErrorKind, error: CrawlError) -> Self {
        Self {
            url: url.into(),
            kind,
            error,
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Allocation | ErrorKind::Navigation => {
                write!(f, "failed to load {}: {}", self.url, self.error)
            }
            ErrorKind::Task => write!(f, "failed to run task for {}: {}", self.url, self.error),
        }
    }
}

/// Counts of everything the reporter logged during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub allocation_errors: usize,
    pub navigation_errors: usize,
    pub task_errors: usize,
    pub failed_urls: BTreeSet<String>,
}

impl ReportSummary {
    fn record(&mut self, event: &ErrorEvent) {
        match event.kind {
            ErrorKind::Allocation => self.allocation_errors += 1,
            ErrorKind::Navigation => self.navigation_errors += 1,
            ErrorKind::Task => self.task_errors += 1,
        }
        self.failed_urls.insert(event.url.clone());
    }

    pub fn total(&self) -> usize {
        self.allocation_errors + self.navigation_errors + self.task_errors
    }
}

pub struct ErrorReporter {
    events: mpsc::Receiver<ErrorEvent>,
}

impl ErrorReporter {
    pub fn new(events: mpsc::Receiver<ErrorEvent>) -> Self {
        Self { events }
    }

    /// Start the reporter. Must be spawned before any worker can send.
    pub fn spawn(events: mpsc::Receiver<ErrorEvent>) -> JoinHandle<ReportSummary> {
        tokio::spawn(Self::new(events).run())
    }

    pub async fn run(mut self) -> ReportSummary {
        let mut summary = ReportSummary::default();

        while let Some(event) = self.events.recv().await {
            error!(url = %event.url, kind = %event.kind, "{}", event);
            summary.record(&event);
        }

        summary
    }
}
