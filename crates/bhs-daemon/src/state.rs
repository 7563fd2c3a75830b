//! Shared runtime state for bhs-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Feeder run reports flow
//! in through [`AppState::report_sink`] and are folded into the status
//! snapshot and rebroadcast on the SSE bus.

use std::sync::Arc;
use std::time::Duration;

use bhs_feeder::{ReportSink, RunReport, WindowParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::debug;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Run(RunReport),
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Run(_) => "run",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Returned by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    /// "idle" | "running" | "stopped"
    pub state: String,
    pub config_hash: Option<String>,
    pub window: Option<WindowParams>,
    pub poll_period_secs: Option<u64>,
    pub last_run: Option<RunReport>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub total_aborted_runs: u64,
    pub total_writes: u64,
}

impl StatusSnapshot {
    fn idle() -> Self {
        Self {
            daemon_uptime_secs: uptime_secs(),
            state: "idle".to_string(),
            config_hash: None,
            window: None,
            poll_period_secs: None,
            last_run: None,
            last_run_at: None,
            total_runs: 0,
            total_aborted_runs: 0,
            total_writes: 0,
        }
    }

    fn record(&mut self, report: &RunReport) {
        self.total_runs += 1;
        if report.abort().is_some() {
            self.total_aborted_runs += 1;
        }
        self.total_writes += report.written.len() as u64;
        self.last_run = Some(report.clone());
        self.last_run_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub status: Arc<RwLock<StatusSnapshot>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::with_snapshot(StatusSnapshot::idle())
    }

    /// State seeded with the effective config the feeder runs with.
    pub fn for_config(config_hash: &str, window: WindowParams, poll_period: Duration) -> Self {
        let mut snap = StatusSnapshot::idle();
        snap.config_hash = Some(config_hash.to_string());
        snap.window = Some(window);
        snap.poll_period_secs = Some(poll_period.as_secs());
        Self::with_snapshot(snap)
    }

    fn with_snapshot(snap: StatusSnapshot) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "bhs-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            status: Arc::new(RwLock::new(snap)),
        }
    }

    pub async fn set_state(&self, state: &str) {
        self.status.write().await.state = state.to_string();
    }

    /// A sink for [`bhs_feeder::FeederService::start`].
    ///
    /// The service calls the sink synchronously from its loop; reports are
    /// handed to a recorder task so the loop never waits on the status lock.
    /// Must be called inside a Tokio runtime.
    pub fn report_sink(self: &Arc<Self>) -> ReportSink {
        let (tx, mut rx) = mpsc::unbounded_channel::<RunReport>();
        let state = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                state.status.write().await.record(&report);
                let _ = state.bus.send(BusMsg::Run(report));
            }
            debug!("report sink closed");
        });
        Box::new(move |report: &RunReport| {
            let _ = tx.send(report.clone());
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
