//! nextcloud-influx daemon entry point
//!
//! Loads settings, builds one client per Nextcloud instance, then hands over
//! to the [`Reporter`] loop until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use nextcloud_influx::{heartbeat, InfluxSink, NextcloudInstance, Reporter, Settings};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Report Nextcloud serverinfo metrics to InfluxDB
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Run a single reporting cycle, then exit
    #[arg(long)]
    once: bool,

    /// Settings file, may be repeated (default: default.toml, user.toml)
    #[arg(long = "config", value_name = "FILE")]
    config: Vec<PathBuf>,

    /// Validate settings and exit
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn config_paths(&self) -> Vec<PathBuf> {
        if self.config.is_empty() {
            nextcloud_influx::config::DEFAULT_FILES
                .iter()
                .map(PathBuf::from)
                .collect()
        } else {
            self.config.clone()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli.config_paths()) {
        Ok(settings) => settings,
        Err(code) => return code,
    };
    init_logging(&settings.log_level);

    if cli.check {
        print_summary(&settings);
        return ExitCode::SUCCESS;
    }

    let shutdown = spawn_shutdown_listener();
    exit_code(run(settings, cli.once, shutdown).await)
}

fn load_settings(paths: &[PathBuf]) -> Result<Settings, ExitCode> {
    Settings::load(paths).map_err(|e| {
        init_logging("info");
        error!("Invalid configuration: {}", e);
        ExitCode::FAILURE
    })
}

fn exit_code(outcome: Result<()>) -> ExitCode {
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Unexpected exception: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings, once: bool, shutdown: watch::Receiver<bool>) -> Result<()> {
    info!("nextcloud-influx v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut instances = Vec::with_capacity(settings.instances.len());
    for config in &settings.instances {
        let instance = NextcloudInstance::new(config.clone())
            .with_context(|| format!("Failed to set up instance {}", config.name))?;
        instances.push(instance);
    }

    if tracing::enabled!(Level::INFO) {
        for instance in &instances {
            tokio::select! {
                biased;
                _ = requested(shutdown.clone()) => {
                    info!("Shutdown requested, stopping.");
                    return Ok(());
                }
                _ = instance.probe() => {}
            }
        }
    }

    let sink = InfluxSink::new(&settings.influxdb, settings.request_timeout)
        .context("Failed to create InfluxDB client")?;

    let reporter = Reporter::new(
        instances,
        Box::new(sink),
        heartbeat::from_env(),
        settings.reporting_interval,
    )
    .single_run(once);

    reporter
        .run(shutdown)
        .await
        .context("Reporter execution failed")
}

/// Resolves once shutdown is requested, never if the sender is gone
async fn requested(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Flip the returned flag on Ctrl-C or SIGTERM
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    let signal = shutdown_signal();

    tokio::spawn(async move {
        signal.await;
        info!("Interrupt received");
        tx.send(true).ok();
    });

    rx
}

// Handlers are installed when this is called, not when the future is first polled
#[cfg(unix)]
fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());

    async move {
        match (interrupt, terminate) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {}
                    _ = terminate.recv() => {}
                }
            }
            _ => {
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        tokio::signal::ctrl_c().await.ok();
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().ok();
}

fn print_summary(settings: &Settings) {
    println!("InfluxDB: {} (database {})", settings.influxdb.base_url(), settings.influxdb.database);
    println!(
        "Interval: {}",
        humantime::format_duration(settings.reporting_interval)
    );
    for instance in &settings.instances {
        println!(
            "Instance {}: {} (timeout {}, verify_ssl {})",
            instance.name,
            instance.url,
            humantime::format_duration(instance.timeout),
            instance.verify_ssl
        );
    }
}
