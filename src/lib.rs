//! # spydom
//!
//! A concurrent crawl orchestrator. Given a file of target URLs, spydom renders
//! each page in headless Chrome, waits for client-side load, and runs a
//! prioritized pipeline of page-processing tasks against it, writing results
//! into one output directory per target.
//!
//! ## Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Dispatcher`] | Reads and normalizes targets, feeds the shared work queue |
//! | [`ResourcePool`] | Bounded set of render resources (browser tabs) |
//! | [`CrawlWorker`] | Takes a URL, loads it, runs the task pipeline, releases |
//! | [`TaskRegistry`] | Ordered tasks, executed by ascending [`Priority`] tier |
//! | [`ErrorReporter`] | Logs every per-URL and per-task failure |
//! | [`Orchestrator`] | Wires everything up and waits for all workers |
//!
//! URL flow is one-way: dispatcher → queue → workers → reporter. The queue
//! hands each URL to exactly one worker, and a worker holds at most one
//! resource at a time.
//!
//! ## Failure handling
//!
//! - **Allocation / navigation errors** are reported and the worker moves on
//!   to the next URL. Any resource already held is released first.
//! - **Task errors** are reported individually; remaining tasks for the URL
//!   still run.
//! - **Startup and targets-file errors** end the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spydom::{default_tasks, ChromeBackend, Config, Orchestrator, Shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.resolve_output_dir()?;
//!
//!     let backend = ChromeBackend::launch(&config).await?;
//!     let tasks = default_tasks(config.screenshot_format);
//!     let orchestrator = Orchestrator::new(config, backend, tasks, Shutdown::new())?;
//!
//!     orchestrator.run_file("targets.txt").await?;
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! spydom --threads 4 --wait 3s --output results/ targets.txt
//! ```

/// Configuration and Chrome launch settings
pub mod config;

/// Error types and error classification
pub mod error;

/// Process-wide cancellation signal
pub mod shutdown;

/// Render backend traits
pub mod render;

/// Headless Chrome render backend
pub mod chrome;

/// Bounded render resource pool
pub mod resource_pool;

/// Task trait, priority tiers and the task registry
pub mod task;

/// Default Chrome tasks (screenshot, DOM, metadata)
pub mod tasks;

/// Targets file reader feeding the work queue
pub mod dispatcher;

/// Error event fan-in and logging
pub mod reporter;

/// Crawl workers
pub mod worker;

/// Run lifecycle
pub mod orchestrator;

/// Command-line interface implementation
pub mod cli;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod tests;

pub use chrome::*;
pub use cli::*;
pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use orchestrator::*;
pub use render::*;
pub use reporter::*;
pub use resource_pool::*;
pub use shutdown::*;
pub use task::*;
pub use tasks::*;
pub use utils::*;
pub use worker::*;
