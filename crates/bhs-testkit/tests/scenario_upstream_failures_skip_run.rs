//! Scenario: transient upstream failures never corrupt window state.
//!
//! # Invariants under test
//!
//! 1. Height, request or fulfillment fetch failures abort the run before any
//!    write, prune or lower-bound update.
//! 2. A failed write records nothing locally; the block is retried and written
//!    on the next run.
//! 3. A failed write for one block does not stop other blocks in the same run.

use std::sync::Arc;
use std::time::Duration;

use bhs_feeder::{Feeder, Phase, RunAbort, WindowParams};
use bhs_testkit::{MemoryArchive, MemorySource, ScriptedHeight};
use tokio::time::Instant;

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

fn aborted_phase(abort: Option<&RunAbort>) -> Option<Phase> {
    match abort {
        Some(RunAbort::FetchFailed { phase, .. }) => Some(*phase),
        _ => None,
    }
}

#[tokio::test]
async fn fetch_failures_abort_without_mutation() {
    let source = Arc::new(MemorySource::new());
    let archive = Arc::new(MemoryArchive::new());
    let height = Arc::new(ScriptedHeight::at(95));
    source.request("r91", 91);

    let mut feeder = Feeder::new(
        source.clone(),
        archive.clone(),
        height.clone(),
        WindowParams::new(2, 5),
    );
    feeder.run_once(deadline()).await;
    assert!(feeder.is_stored(91));
    assert_eq!(feeder.last_lower_bound(), Some(90));

    // Height moves on, so a completed run would prune 91.
    height.set(100);

    height.set_failing(true);
    let r = feeder.run_once(deadline()).await;
    assert_eq!(aborted_phase(r.abort()), Some(Phase::Height));
    assert!(r.height.is_none());
    height.set_failing(false);

    source.set_requests_failing(true);
    let r = feeder.run_once(deadline()).await;
    assert_eq!(aborted_phase(r.abort()), Some(Phase::Requests));
    source.set_requests_failing(false);

    source.set_fulfillments_failing(true);
    let r = feeder.run_once(deadline()).await;
    assert_eq!(aborted_phase(r.abort()), Some(Phase::Fulfillments));
    source.set_fulfillments_failing(false);

    assert!(feeder.is_stored(91), "aborted runs must not prune");
    assert_eq!(feeder.last_lower_bound(), Some(90));
    assert_eq!(archive.writes(), vec![91]);

    let r = feeder.run_once(deadline()).await;
    assert!(r.is_completed());
    assert!(!feeder.is_stored(91));
    assert_eq!(feeder.last_lower_bound(), Some(95));
}

#[tokio::test]
async fn failed_write_is_retried_next_run() {
    let source = Arc::new(MemorySource::new());
    let archive = Arc::new(MemoryArchive::new());
    source.request("a", 96);
    source.request("b", 97);
    archive.fail_writes_for(96);

    let mut feeder = Feeder::new(
        source,
        archive.clone(),
        Arc::new(ScriptedHeight::at(100)),
        WindowParams::new(2, 5),
    );

    let first = feeder.run_once(deadline()).await;
    assert!(first.is_completed());
    assert_eq!(first.write_failures, vec![96]);
    assert_eq!(first.written, vec![97]);
    assert!(!feeder.is_stored(96));

    archive.clear_write_failures();
    let second = feeder.run_once(deadline()).await;
    assert_eq!(second.written, vec![96]);
    assert_eq!(archive.writes(), vec![97, 96]);
}
