//! Scenario: the scheduler drives the feeder end to end.
//!
//! # Invariants under test
//!
//! 1. Each tick produces one report; a request is archived once across ticks.
//! 2. New requests appearing between ticks are picked up by the next run.
//! 3. A failing tick does not stop the loop; the next tick still runs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bhs_feeder::{Feeder, FeederService, RunReport, WindowParams};
use bhs_testkit::{MemoryArchive, MemorySource, ScriptedHeight};

#[tokio::test(start_paused = true)]
async fn service_archives_new_requests_across_ticks() {
    let source = Arc::new(MemorySource::new());
    let archive = Arc::new(MemoryArchive::new());
    let height = Arc::new(ScriptedHeight::at(100));
    source.request("a", 96);

    let feeder = Feeder::new(
        source.clone(),
        archive.clone(),
        height.clone(),
        WindowParams::new(2, 5),
    );
    let mut svc = FeederService::new(feeder, Duration::from_secs(15), Duration::from_secs(10));

    let reports: Arc<Mutex<Vec<RunReport>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    svc.start(Box::new(move |r| sink.lock().unwrap().push(r.clone())))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(archive.writes(), vec![96]);

    height.set_failing(true);
    tokio::time::sleep(Duration::from_secs(15)).await;
    height.set_failing(false);

    source.request("b", 99);
    height.set(102);
    tokio::time::sleep(Duration::from_secs(15)).await;

    svc.stop().await.unwrap();

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports[0].is_completed());
    assert!(reports[1].abort().is_some());
    assert!(reports[2].is_completed());
    assert_eq!(archive.writes(), vec![96, 99]);
}
