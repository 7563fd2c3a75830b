//! Periodic scheduler for a [`Feeder`].
//!
//! The loop task owns the feeder by value, so exactly one run is ever in
//! flight and window state needs no lock. Ticks that fall due while a run is
//! still executing are skipped rather than queued.
//!
//! Stopping signals the loop. An in-flight run is dropped at its next
//! suspension point; because the engine only mutates state between external
//! calls, dropping it is equivalent to the run hitting its deadline.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::{Feeder, RunReport};

/// Callback invoked with every finished run report.
pub type ReportSink = Box<dyn FnMut(&RunReport) + Send + 'static>;

/// Timer-driven lifecycle wrapper around a [`Feeder`].
pub struct FeederService {
    poll_period: Duration,
    run_timeout: Duration,
    feeder: Option<Feeder>,
    running: Option<Running>,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Feeder>,
}

impl FeederService {
    pub fn new(feeder: Feeder, poll_period: Duration, run_timeout: Duration) -> Self {
        Self {
            poll_period,
            run_timeout,
            feeder: Some(feeder),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the run loop. The first run starts immediately.
    pub fn start(&mut self, mut on_report: ReportSink) -> Result<()> {
        if self.running.is_some() {
            bail!("feeder service already started");
        }
        let Some(mut feeder) = self.feeder.take() else {
            bail!("feeder service has no feeder");
        };

        let poll_period = self.poll_period;
        let run_timeout = self.run_timeout;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        info!(
            poll_period_ms = poll_period.as_millis() as u64,
            run_timeout_ms = run_timeout.as_millis() as u64,
            "starting blockhash feeder"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                let deadline = Instant::now() + run_timeout;
                let report = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => {
                        debug!("feeder stopped during run; in-flight run cancelled");
                        break;
                    }
                    report = feeder.run_once(deadline) => report,
                };
                on_report(&report);
            }
            feeder
        });

        self.running = Some(Running { stop_tx, task });
        Ok(())
    }

    /// Stop the loop and wait for it to exit. A no-op when not running.
    ///
    /// The feeder, with its window state, is kept so the service can be
    /// started again.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        info!("stopping blockhash feeder");
        // Fails only if the loop already exited and dropped its receiver.
        let _ = running.stop_tx.send(true);
        let feeder = running.task.await.context("feeder task panicked")?;
        self.feeder = Some(feeder);
        Ok(())
    }

    /// Feeder state while stopped.
    pub fn feeder(&self) -> Option<&Feeder> {
        self.feeder.as_ref()
    }
}
