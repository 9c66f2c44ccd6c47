use crate::{parse_duration, Config, CrawlError, OutputFormat, ReadErrorPolicy};
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "spydom")]
#[command(about = "Render target URLs in headless Chrome and run page tasks against them")]
#[command(override_usage = "spydom [OPTIONS] [TARGETS FILE]")]
#[command(version)]
pub struct Cli {
    #[arg(short = 't', long, help = "Number of threads to run [default: 10]")]
    pub threads: Option<usize>,

    #[arg(
        short = 'w',
        long,
        value_parser = parse_duration,
        help = "Time to wait for the page to load before running tasks, e.g. 500ms or 2s [default: 2s]"
    )]
    pub wait: Option<Duration>,

    #[arg(short = 'o', long, help = "The directory to store output in [default: spydom_output]")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "The width of the browser window to use [default: 1920]")]
    pub width: Option<u32>,

    #[arg(long, help = "The height of the browser window to use [default: 1080]")]
    pub height: Option<u32>,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Screenshot format (png, jpeg, webp)")]
    pub format: Option<OutputFormat>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Show the browser window instead of running headless")]
    pub headful: bool,

    #[arg(long, help = "On a targets read error, finish dispatched URLs before exiting")]
    pub drain_on_read_error: bool,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Newline-delimited file of target URLs
    #[arg(value_name = "TARGETS FILE")]
    pub targets: Option<String>,
}

impl Cli {
    /// The targets file, if one was given and is non-empty.
    pub fn targets_file(&self) -> Option<PathBuf> {
        self.targets
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    pub fn usage() -> String {
        Self::command().render_help().to_string()
    }

    /// Override `config` with every flag that was given.
    pub fn apply(&self, config: &mut Config) {
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(wait) = self.wait {
            config.wait = wait;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(width) = self.width {
            config.viewport.width = width;
        }
        if let Some(height) = self.height {
            config.viewport.height = height;
        }
        if let Some(format) = self.format {
            config.screenshot_format = format;
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        if self.headful {
            config.headless = false;
        }
        if self.drain_on_read_error {
            config.on_read_error = ReadErrorPolicy::Drain;
        }
    }
}

/// How a crawl started from the command line ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Stopped early by SIGINT or SIGTERM
    Interrupted,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::Interrupted => 130,
        }
    }
}

pub async fn load_config(args: &Cli) -> Result<Config, CrawlError> {
    let mut config = if let Some(config_path) = &args.config {
        let config_content = tokio::fs::read_to_string(config_path).await.map_err(|e| {
            CrawlError::ConfigurationError(format!("{}: {}", config_path.display(), e))
        })?;
        serde_json::from_str(&config_content)?
    } else {
        Config::default()
    };

    args.apply(&mut config);
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Threads: {}", config.threads);
    info!("Wait: {:?}", config.wait);
    info!(
        "Viewport: {}x{}",
        config.viewport.width, config.viewport.height
    );

    Ok(config)
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
}
