//! Scenario: several coordinators feed one feeder through a fan-out source.
//!
//! # Invariants under test
//!
//! 1. Open requests from every upstream are archived.
//! 2. With namespacing, an id reused by two upstreams only closes the request
//!    of the upstream that fulfilled it.
//! 3. A failing upstream fails the whole fetch, so no partial view is acted on.

use std::sync::Arc;
use std::time::Duration;

use bhs_feeder::{EventSource, FanOutSource, Feeder, Phase, RunAbort, WindowParams};
use bhs_testkit::{MemoryArchive, MemorySource, ScriptedHeight};
use tokio::time::Instant;

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

#[tokio::test]
async fn namespaced_ids_do_not_cross_close() {
    let v1 = Arc::new(MemorySource::named("v1"));
    let v2 = Arc::new(MemorySource::named("v2"));
    v1.request("42", 96);
    v2.request("42", 97);
    v2.fulfill("42", 98);

    let sources: Vec<Arc<dyn EventSource>> = vec![v1.clone(), v2.clone()];
    let archive = Arc::new(MemoryArchive::new());
    let mut feeder = Feeder::new(
        Arc::new(FanOutSource::new(sources).namespaced()),
        archive.clone(),
        Arc::new(ScriptedHeight::at(100)),
        WindowParams::new(2, 5),
    );

    let report = feeder.run_once(deadline()).await;
    assert!(report.is_completed());
    assert_eq!(archive.writes(), vec![96]);
}

#[tokio::test]
async fn failing_upstream_aborts_run() {
    let v1 = Arc::new(MemorySource::named("v1"));
    let v2 = Arc::new(MemorySource::named("v2"));
    v1.request("a", 96);
    v2.set_fulfillments_failing(true);

    let sources: Vec<Arc<dyn EventSource>> = vec![v1, v2];
    let archive = Arc::new(MemoryArchive::new());
    let mut feeder = Feeder::new(
        Arc::new(FanOutSource::new(sources)),
        archive.clone(),
        Arc::new(ScriptedHeight::at(100)),
        WindowParams::new(2, 5),
    );

    let report = feeder.run_once(deadline()).await;
    match report.abort() {
        Some(RunAbort::FetchFailed { phase, error }) => {
            assert_eq!(*phase, Phase::Fulfillments);
            assert!(error.contains("v2"), "error should name the upstream: {error}");
        }
        other => panic!("expected fulfillment fetch failure, got {other:?}"),
    }
    assert!(archive.writes().is_empty());
}
