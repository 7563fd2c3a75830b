//! Scenario: local state never outlives the scan window.
//!
//! # Invariants under test
//!
//! 1. A block recorded in one run is dropped once a later run's lower bound
//!    moves past it.
//! 2. Over many runs the recorded set never holds a block below the latest
//!    run's `from_block`.
//! 3. Blocks at or above `from_block` survive pruning.

use std::sync::Arc;
use std::time::Duration;

use bhs_feeder::{Feeder, WindowParams};
use bhs_testkit::{MemoryArchive, MemorySource, ScriptedHeight};
use tokio::time::Instant;

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

#[tokio::test]
async fn block_behind_new_lower_bound_is_pruned() {
    let source = Arc::new(MemorySource::new());
    let archive = Arc::new(MemoryArchive::new());
    let height = Arc::new(ScriptedHeight::at(95));
    source.request("req-91", 91);
    source.request("req-96", 96);

    let mut feeder = Feeder::new(
        source,
        archive.clone(),
        height.clone(),
        WindowParams::new(2, 5),
    );

    // Window [90, 93].
    let first = feeder.run_once(deadline()).await;
    assert_eq!(first.written, vec![91]);
    assert!(feeder.is_stored(91));
    assert_eq!(feeder.last_lower_bound(), Some(90));

    // Window [95, 98]: 91 falls into [90, 95) and is dropped.
    height.set(100);
    let second = feeder.run_once(deadline()).await;
    assert_eq!(second.written, vec![96]);
    assert_eq!(second.pruned, 1);
    assert!(!feeder.is_stored(91));
    assert!(feeder.is_stored(96));
    assert_eq!(feeder.last_lower_bound(), Some(95));
}

#[tokio::test]
async fn recorded_set_stays_within_window_over_many_runs() {
    let source = Arc::new(MemorySource::new());
    let archive = Arc::new(MemoryArchive::new());
    let height = Arc::new(ScriptedHeight::at(0));
    for block in 0..200 {
        source.request(&format!("req-{block}"), block);
    }

    let mut feeder = Feeder::new(
        source,
        archive.clone(),
        height.clone(),
        WindowParams::new(3, 20),
    );

    for h in (10..200).step_by(7) {
        height.set(h);
        let report = feeder.run_once(deadline()).await;
        assert!(report.is_completed());
        let from_block = report.window.unwrap().from_block;
        assert!(
            feeder.stored_blocks().iter().all(|b| *b >= from_block),
            "height {h}: recorded blocks {:?} below {from_block}",
            feeder.stored_blocks()
        );
        assert!(feeder.stored_blocks().len() <= 18);
    }

    // Each block was written once across all runs.
    let mut writes = archive.writes();
    let total = writes.len();
    writes.dedup();
    assert_eq!(writes.len(), total);
}
