//! Runs a set of link monitors side by side.

use std::time::Duration;

use linkwatch_types::{LinkFailure, LinkIdentity, RunSummary};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::duration::format_duration;
use crate::error::LinkError;
use crate::monitor::{LinkMonitor, MonitorConfig, TICK};

/// Owns every configured monitor for one run.
///
/// Each link's id is its position in the configured list.
///
/// # Example
///
/// ```rust,no_run
/// use linkwatch::{MonitorConfig, Orchestrator};
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), linkwatch::LinkError> {
/// let summary = Orchestrator::new(
///     ["udpin:0.0.0.0:14550", "/dev/ttyUSB0:57600"],
///     MonitorConfig::new(1, 1),
///     CancellationToken::new(),
/// )
/// .with_duration(Some(Duration::from_secs(60)))
/// .execute()
/// .await?;
///
/// for path in summary.artifact_paths() {
///     println!("{}", path.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Orchestrator {
    links: Vec<String>,
    config: MonitorConfig,
    shutdown: CancellationToken,
    duration: Option<Duration>,
    active: Vec<LinkMonitor>,
    started_at: Option<Instant>,
    stopped: bool,
}

impl Orchestrator {
    pub fn new<I, S>(links: I, config: MonitorConfig, shutdown: CancellationToken) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            links: links.into_iter().map(Into::into).collect(),
            config,
            shutdown,
            duration: None,
            active: Vec::new(),
            started_at: None,
            stopped: false,
        }
    }

    /// Stop on our own after `duration`; `None` runs until cancelled.
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Number of monitors that started successfully.
    pub fn active_links(&self) -> usize {
        self.active.len()
    }

    /// Start every monitor in order. Links that fail are logged and left
    /// out; the run only fails when none start.
    pub async fn start(&mut self) -> Result<usize, LinkError> {
        for (id, descriptor) in self.links.iter().enumerate() {
            if self.shutdown.is_cancelled() {
                warn!("Shutdown requested, not starting {}", descriptor);
                continue;
            }
            let mut monitor = LinkMonitor::new(id, descriptor.clone(), self.config.clone());
            match monitor.start(&self.shutdown).await {
                Ok(()) => self.active.push(monitor),
                Err(err) => error!("Failed to start monitor for {}: {}", descriptor, err),
            }
        }

        if self.active.is_empty() {
            error!("No monitors started successfully");
            return Err(LinkError::NoActiveLinks);
        }
        self.started_at = Some(Instant::now());
        info!(
            "Monitoring {} of {} link(s)",
            self.active.len(),
            self.links.len()
        );
        Ok(self.active.len())
    }

    /// Wait until the duration elapses or shutdown is requested.
    pub async fn run(&mut self) {
        let started_at = *self.started_at.get_or_insert_with(Instant::now);
        let mut poll = interval(TICK);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = poll.tick() => {
                    if let Some(limit) = self.duration {
                        if started_at.elapsed() >= limit {
                            info!("Test duration of {} reached", format_duration(limit));
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Stop every active monitor concurrently and collect their reports.
    ///
    /// Returns `None` when the run was already stopped.
    pub async fn stop(&mut self) -> Option<RunSummary> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        info!("Stopping all monitors...");

        let handles: Vec<(LinkIdentity, _)> = self
            .active
            .drain(..)
            .map(|mut monitor| {
                let identity = monitor.identity().clone();
                (identity, tokio::spawn(async move { monitor.stop().await }))
            })
            .collect();

        let mut summary = RunSummary::default();
        for (link, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(LinkError::from(err)),
            };
            match result {
                Ok(report) => summary.reports.push(report),
                Err(err) => {
                    error!("[{}] Error stopping monitor: {}", link.id, err);
                    summary.failures.push(LinkFailure {
                        link,
                        error: err.to_string(),
                    });
                }
            }
        }
        summary.reports.sort_by_key(|r| r.link.id);
        summary.failures.sort_by_key(|f| f.link.id);

        log_summary(&summary);
        Some(summary)
    }

    /// Start, run and stop in one call.
    pub async fn execute(mut self) -> Result<RunSummary, LinkError> {
        self.start().await?;
        self.run().await;
        Ok(self.stop().await.unwrap_or_default())
    }
}

fn log_summary(summary: &RunSummary) {
    info!("{}", "=".repeat(60));
    info!("Test Complete");
    info!("Total links tested: {}", summary.links_tested());
    info!("Generated files:");
    for report in &summary.reports {
        info!("  Link {} ({}):", report.link.id, report.link.descriptor);
        if let Some(path) = &report.metrics_path {
            info!("    Metrics CSV: {}", path.display());
        }
        if let Some(path) = &report.histogram_path {
            info!("    Histogram CSV: {}", path.display());
        }
        for problem in &report.errors {
            warn!("    Error: {}", problem);
        }
    }
    for failure in &summary.failures {
        warn!(
            "  Link {} ({}) failed: {}",
            failure.link.id, failure.link.descriptor, failure.error
        );
    }
    info!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> MonitorConfig {
        MonitorConfig::new(1, 1)
            .with_output_dir(dir)
            .with_handshake_timeout(Duration::from_millis(200))
            .with_open_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn no_usable_links_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            ["not-a-descriptor", "udpin:127.0.0.1:0"],
            config(dir.path()),
            CancellationToken::new(),
        );
        let err = orchestrator.start().await.unwrap_err();
        assert!(matches!(err, LinkError::NoActiveLinks));
        assert_eq!(orchestrator.active_links(), 0);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator =
            Orchestrator::new(Vec::<String>::new(), config(dir.path()), CancellationToken::new());
        let first = orchestrator.stop().await.unwrap();
        assert_eq!(first.links_tested(), 0);
        assert!(orchestrator.stop().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn run_ends_when_duration_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator =
            Orchestrator::new(Vec::<String>::new(), config(dir.path()), CancellationToken::new())
                .with_duration(Some(Duration::from_secs(3)));
        let begin = Instant::now();
        orchestrator.run().await;
        assert!(begin.elapsed() >= Duration::from_secs(3));
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn run_ends_on_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let mut orchestrator =
            Orchestrator::new(Vec::<String>::new(), config(dir.path()), shutdown.clone());

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });
        orchestrator.run().await;
        assert!(shutdown.is_cancelled());
    }
}
