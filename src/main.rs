use anyhow::Context;
use clap::Parser;
use spydom::{
    default_tasks, load_config, setup_logging, ChromeBackend, Cli, Orchestrator, RunOutcome,
    Shutdown,
};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args = Cli::parse();

    let Some(targets) = args.targets_file() else {
        eprintln!("Please supply a targets file");
        eprintln!("{}", Cli::usage());
        std::process::exit(1);
    };

    if let Err(e) = setup_logging(args.verbose) {
        eprintln!("Failed to set up logging: {e}");
        std::process::exit(1);
    }

    info!("Starting spydom v{}", env!("CARGO_PKG_VERSION"));

    match run(args, targets).await {
        Ok(RunOutcome::Completed) => {}
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Cli, targets: PathBuf) -> anyhow::Result<RunOutcome> {
    let mut config = load_config(&args).await?;
    config
        .resolve_output_dir()
        .context("Failed to open output directory")?;
    info!("Output directory: {}", config.output_dir.display());

    let shutdown = Shutdown::new();
    let backend = ChromeBackend::launch(&config)
        .await
        .context("failed to create browser pool")?;
    let tasks = default_tasks(config.screenshot_format);
    let orchestrator = Orchestrator::new(config, backend, tasks, shutdown.clone())?;

    let mut signal_handler = setup_shutdown_handler(shutdown);

    let result = tokio::select! {
        result = orchestrator.run_file(&targets) => {
            info!("Crawl completed");
            result.map(|_| RunOutcome::Completed)
        }
        _ = &mut signal_handler => {
            info!("Received shutdown signal");
            Ok(RunOutcome::Interrupted)
        }
    };

    signal_handler.abort();
    orchestrator.shutdown().await;
    let outcome = result?;

    info!("spydom stopped");
    Ok(outcome)
}

/// Trigger `shutdown` on SIGINT or SIGTERM.
fn setup_shutdown_handler(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                warn!("Failed to create SIGTERM handler: {}", e);
                None
            }
        };

        let terminate = async {
            match sigterm.as_mut() {
                Some(sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            Ok(()) = signal::ctrl_c() => {
                info!("Received SIGINT");
            }
            _ = terminate => {
                info!("Received SIGTERM");
            }
        }

        shutdown.trigger();
    })
}
