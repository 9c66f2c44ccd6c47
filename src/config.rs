//! Configuration management with serde serialization/deserialization
//!
//! This module provides the run configuration for the crawler, the render
//! viewport, and the Chrome launch settings derived from them.

use crate::CrawlError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for a crawl run
///
/// Controls the worker count, the post-load wait, where results are written and
/// how the browser is launched.
///
/// # Examples
///
/// ```rust
/// use spydom::Config;
/// use std::time::Duration;
///
/// // Use default configuration
/// let config = Config::default();
/// assert_eq!(config.threads, 10);
///
/// // Create custom configuration
/// let config = Config {
///     threads: 4,
///     wait: Duration::from_millis(500),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of concurrent workers, which is also the resource pool capacity (default: 10)
    pub threads: usize,

    /// Fixed delay after navigation before any task touches the page (default: 2 seconds)
    ///
    /// Gives client-side rendering time to settle.
    pub wait: Duration,

    /// Root directory for per-target output (default: `spydom_output`)
    pub output_dir: PathBuf,

    /// Browser viewport used by every render resource for the whole run
    pub viewport: Viewport,

    /// Image format written by the screenshot task (default: PNG)
    pub screenshot_format: OutputFormat,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for page loads (default: Chrome default)
    pub user_agent: Option<String>,

    /// Run Chrome without a visible window (default: true)
    pub headless: bool,

    /// What to do when the targets file fails mid-read (default: abort)
    pub on_read_error: ReadErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 10,
            wait: Duration::from_secs(2),
            output_dir: PathBuf::from("spydom_output"),
            viewport: Viewport::default(),
            screenshot_format: OutputFormat::Png,
            chrome_path: None,
            user_agent: None,
            headless: true,
            on_read_error: ReadErrorPolicy::Abort,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.threads == 0 {
            return Err(CrawlError::ConfigurationError(
                "Thread count must be greater than 0".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(CrawlError::ConfigurationError(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(CrawlError::ConfigurationError(
                "Output directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Make `output_dir` absolute, relative to the current directory.
    pub fn resolve_output_dir(&mut self) -> Result<&Path, CrawlError> {
        if !self.output_dir.is_absolute() {
            let cwd = std::env::current_dir().map_err(|e| {
                CrawlError::ConfigurationError(format!("Failed to open output directory: {e}"))
            })?;
            self.output_dir = cwd.join(&self.output_dir);
        }
        Ok(&self.output_dir)
    }
}

/// Browser viewport configuration for render resources
///
/// # Examples
///
/// ```rust
/// use spydom::Viewport;
///
/// let desktop = Viewport::default();
/// assert_eq!((desktop.width, desktop.height), (1920, 1080));
///
/// let small = Viewport::new(1280, 720);
/// assert!(!small.mobile);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,

    /// Whether to emulate a mobile device (default: false)
    pub mobile: bool,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
            mobile: false,
        }
    }
}

/// Supported screenshot formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG format - lossless compression, captured natively
    Png,
    /// JPEG format - converted from the PNG capture
    Jpeg,
    /// WebP format - converted from the PNG capture
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(CrawlError::ConfigurationError(format!(
                "unsupported output format: {other}"
            ))),
        }
    }
}

/// Policy applied when reading the targets file fails part way through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadErrorPolicy {
    /// Fail the run immediately without waiting for in-flight workers
    Abort,
    /// Close the queue, let workers finish what was dispatched, then fail
    Drain,
}

/// Generate Chrome command-line arguments based on configuration
///
/// ```rust
/// use spydom::{Config, get_chrome_args};
///
/// let args = get_chrome_args(&Config::default());
/// assert!(args.contains(&"--window-size=1920,1080".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let unique_id = std::process::id();

    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--ignore-certificate-errors".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir=/tmp/spydom-chromium-{unique_id}"),
    ];

    if config.headless {
        args.insert(0, "--headless".to_string());
    }

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, CrawlError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config));

    if !config.headless {
        builder = builder.with_head();
    }

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(CrawlError::BrowserLaunchFailed)
}
