//! Poll loop: fetch -> flatten -> write for every instance, then heartbeat
//!
//! Instances are polled one after the other in configuration order. A failing
//! instance is logged and skipped; it never aborts the cycle.

use crate::error::PollError;
use crate::heartbeat::Heartbeat;
use crate::instance::NextcloudInstance;
use crate::sink::{Measurement, MetricsSink};
use chrono::Local;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Outcome of one pass over all instances
#[derive(Debug, Default)]
pub struct CycleReport {
    pub written: Vec<String>,
    pub failed: Vec<(String, PollError)>,
    /// Set when shutdown was requested before every instance was polled
    pub interrupted: bool,
}

pub struct Reporter {
    instances: Vec<NextcloudInstance>,
    sink: Box<dyn MetricsSink>,
    heartbeat: Box<dyn Heartbeat>,
    interval: Duration,
    single_run: bool,
}

impl Reporter {
    pub fn new(
        instances: Vec<NextcloudInstance>,
        sink: Box<dyn MetricsSink>,
        heartbeat: Box<dyn Heartbeat>,
        interval: Duration,
    ) -> Self {
        Self {
            instances,
            sink,
            heartbeat,
            interval,
            single_run: false,
        }
    }

    /// Stop after the first cycle
    pub fn single_run(mut self, single_run: bool) -> Self {
        self.single_run = single_run;
        self
    }

    /// Run cycles until shutdown is requested (or once in single-run mode)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            "Running daemon, reporting to InfluxDB at {} every {}.",
            self.sink.describe(),
            humantime::format_duration(self.interval)
        );

        loop {
            let report = self.run_cycle(&shutdown).await;
            if report.interrupted {
                info!("Shutdown requested, stopping.");
                return Ok(());
            }

            self.beat();

            if self.single_run {
                info!("Finished single run.");
                return Ok(());
            }

            if self.pause(&mut shutdown).await {
                info!("Shutdown requested, stopping.");
                return Ok(());
            }
        }
    }

    /// Sleep for the reporting interval. Returns true if shutdown was requested meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);
        let mut closed = false;

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed(), if !closed => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => {}
                    // sender gone: nobody can ask us to stop anymore
                    Err(_) => closed = true,
                },
            }
        }
    }

    /// Poll every instance once. Failures are logged and collected, never returned.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let mut report = CycleReport::default();

        for instance in &self.instances {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }

            match self.report_instance(instance).await {
                Ok(()) => report.written.push(instance.name().to_string()),
                Err(e) => {
                    log_failure(instance.name(), &e);
                    report.failed.push((instance.name().to_string(), e));
                }
            }
        }

        debug!(
            "Cycle done: {} written, {} failed",
            report.written.len(),
            report.failed.len()
        );
        report
    }

    async fn report_instance(&self, instance: &NextcloudInstance) -> Result<(), PollError> {
        let fields = instance.report().await?;
        let measurement = Measurement::for_instance(instance.name(), fields);
        self.sink.write(&measurement).await?;
        debug!(instance = %instance.name(), "Reported {} fields", measurement.fields.len());
        Ok(())
    }

    fn beat(&self) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S %z");
        self.heartbeat
            .notify(&format!("Last report to InfluxDB at {timestamp}"));
        self.heartbeat.ready();
    }
}

fn log_failure(instance: &str, err: &PollError) {
    match err {
        PollError::Remote { status, body } => {
            error!(instance, "Got unexpected response {}, {}", status, body)
        }
        PollError::Transport(e) => warn!(instance, "Request failed: {}", e),
        PollError::Structure(e) => error!(instance, "Malformed serverinfo response: {}", e),
        PollError::Sink(e) => error!(instance, "Failed to write to InfluxDB: {}", e),
    }
}
