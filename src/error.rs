use std::fmt;
use thiserror::Error;
use tokio::sync::AcquireError;

#[derive(Debug, Clone, Error)]
pub enum CrawlError {
    #[error("error allocating render resource from pool: {0}")]
    AllocationFailed(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("task {task} failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("failed to open targets file: {0}")]
    TargetsOpen(String),

    #[error("error while reading targets file: {0}")]
    TargetsRead(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrawlError {
    pub fn task(task: impl Into<String>, reason: impl fmt::Display) -> Self {
        CrawlError::TaskFailed {
            task: task.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that end the whole run rather than a single URL or task.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::BrowserLaunchFailed(_)
                | CrawlError::ConfigurationError(_)
                | CrawlError::TargetsOpen(_)
                | CrawlError::TargetsRead(_)
                | CrawlError::Internal(_)
        )
    }
}

/// Which stage of a URL's processing produced an error event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Allocation,
    Navigation,
    Task,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Allocation => write!(f, "allocation"),
            ErrorKind::Navigation => write!(f, "navigation"),
            ErrorKind::Task => write!(f, "task"),
        }
    }
}

impl From<AcquireError> for CrawlError {
    fn from(err: AcquireError) -> Self {
        CrawlError::AllocationFailed(err.to_string())
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(err: std::io::Error) -> Self {
        CrawlError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(err: serde_json::Error) -> Self {
        CrawlError::SerializationError(err.to_string())
    }
}
