//! Page-processing tasks and the ordered registry that drives them

use crate::CrawlError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Priority tier of a task. Tier 1 runs first, tier 3 last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum Priority {
    First = 1,
    Second = 2,
    Third = 3,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::First, Priority::Second, Priority::Third];

    pub fn tier(self) -> u8 {
        self as u8
    }

    pub fn from_tier(tier: u8) -> Option<Self> {
        match tier {
            1 => Some(Priority::First),
            2 => Some(Priority::Second),
            3 => Some(Priority::Third),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tier())
    }
}

/// A unit of per-page work run against a loaded render resource `R`.
///
/// Tasks keep no state between URLs; anything they produce goes into
/// `output_dir` or comes from the resource.
#[async_trait]
pub trait Task<R: Send + Sync>: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> Priority;

    async fn execute(&self, url: &str, output_dir: &Path, resource: &R) -> Result<(), CrawlError>;
}

/// Ordered set of tasks, fixed for the lifetime of a run.
pub struct TaskRegistry<R: Send + Sync> {
    tasks: Arc<Vec<Arc<dyn Task<R>>>>,
}

impl<R: Send + Sync> TaskRegistry<R> {
    pub fn new(tasks: Vec<Arc<dyn Task<R>>>) -> Self {
        Self {
            tasks: Arc::new(tasks),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in execution order: by ascending tier, registry order within a tier.
    pub fn pipeline(&self) -> impl Iterator<Item = &Arc<dyn Task<R>>> + '_ {
        Priority::ALL.into_iter().flat_map(move |tier| {
            self.tasks
                .iter()
                .filter(move |task| task.priority() == tier)
        })
    }
}

impl<R: Send + Sync> Clone for TaskRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
        }
    }
}

impl<R: Send + Sync> FromIterator<Arc<dyn Task<R>>> for TaskRegistry<R> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Task<R>>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
