//! In-memory collaborators for exercising a [`bhs_feeder::Feeder`] without a
//! ledger.
//!
//! All doubles are `Arc`-shareable: hand one clone to the feeder and keep the
//! other to script upstream state between runs and to inspect what the feeder
//! did.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use bhs_feeder::{Archive, BlockNumber, Event, EventSource, HeightProvider};

// ---------------------------------------------------------------------------
// Height
// ---------------------------------------------------------------------------

/// Chain tip that tests move by hand.
#[derive(Debug, Default)]
pub struct ScriptedHeight {
    height: AtomicU64,
    fail: AtomicBool,
}

impl ScriptedHeight {
    pub fn at(height: BlockNumber) -> Self {
        Self {
            height: AtomicU64::new(height),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set(&self, height: BlockNumber) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl HeightProvider for ScriptedHeight {
    async fn height(&self) -> Result<BlockNumber> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("head unavailable");
        }
        Ok(self.height.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Event source
// ---------------------------------------------------------------------------

/// Request/fulfillment log that filters like a real coordinator query.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    requests: Mutex<Vec<Event>>,
    fulfillments: Mutex<Vec<Event>>,
    fail_requests: AtomicBool,
    fail_fulfillments: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn request(&self, id: &str, block: BlockNumber) {
        self.requests.lock().unwrap().push(Event::new(id, block));
    }

    pub fn fulfill(&self, id: &str, block: BlockNumber) {
        self.fulfillments.lock().unwrap().push(Event::new(id, block));
    }

    pub fn set_requests_failing(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn set_fulfillments_failing(&self, fail: bool) {
        self.fail_fulfillments.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl EventSource for MemorySource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn requests(&self, from_block: BlockNumber, to_block: BlockNumber) -> Result<Vec<Event>> {
        if self.fail_requests.load(Ordering::SeqCst) {
            bail!("{}: log query failed", self.name);
        }
        Ok(self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block >= from_block && e.block <= to_block)
            .cloned()
            .collect())
    }

    async fn fulfillments(&self, from_block: BlockNumber) -> Result<Vec<Event>> {
        if self.fail_fulfillments.load(Ordering::SeqCst) {
            bail!("{}: log query failed", self.name);
        }
        Ok(self
            .fulfillments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.block >= from_block)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// Blockhash store with an ordered write log and injectable failures.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    held: Mutex<BTreeSet<BlockNumber>>,
    writes: Mutex<Vec<BlockNumber>>,
    checks: AtomicUsize,
    fail_checks: AtomicBool,
    fail_writes_for: Mutex<BTreeSet<BlockNumber>>,
    failed_commits: Mutex<BTreeSet<BlockNumber>>,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `block` out of band, as another operator would.
    pub fn preload(&self, block: BlockNumber) {
        self.held.lock().unwrap().insert(block);
    }

    pub fn holds(&self, block: BlockNumber) -> bool {
        self.held.lock().unwrap().contains(&block)
    }

    /// Every accepted write, in issue order.
    pub fn writes(&self) -> Vec<BlockNumber> {
        self.writes.lock().unwrap().clone()
    }

    /// Number of `is_archived` calls served.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn set_checks_failing(&self, fail: bool) {
        self.fail_checks.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes_for(&self, block: BlockNumber) {
        self.fail_writes_for.lock().unwrap().insert(block);
    }

    pub fn clear_write_failures(&self) {
        self.fail_writes_for.lock().unwrap().clear();
    }

    /// Undo an accepted write for `block`, as a store transaction that was
    /// queued but rejected by the node. Reported by the next
    /// `take_failed_writes`.
    pub fn fail_commit(&self, block: BlockNumber) {
        self.held.lock().unwrap().remove(&block);
        self.failed_commits.lock().unwrap().insert(block);
    }

    /// Make every write take `delay` before it is accepted.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.write_delay.lock().unwrap() = delay;
    }
}

#[async_trait::async_trait]
impl Archive for MemoryArchive {
    async fn is_archived(&self, block: BlockNumber) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_checks.load(Ordering::SeqCst) {
            bail!("getBlockhash call failed for block {block}");
        }
        Ok(self.holds(block))
    }

    async fn archive(&self, block: BlockNumber) -> Result<()> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes_for.lock().unwrap().contains(&block) {
            bail!("store queue rejected block {block}");
        }
        self.writes.lock().unwrap().push(block);
        self.held.lock().unwrap().insert(block);
        Ok(())
    }

    fn take_failed_writes(&self) -> Vec<BlockNumber> {
        std::mem::take(&mut *self.failed_commits.lock().unwrap())
            .into_iter()
            .collect()
    }
}
