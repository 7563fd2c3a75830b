//! Reconciliation engine.
//!
//! One [`Feeder::run_once`] call:
//!
//! 1. reads the chain height and derives the scan window,
//! 2. lists requests inside the window and fulfillments since its lower bound,
//! 3. correlates them into the set of blocks that still have open requests,
//! 4. forgets blocks whose queued writes the archive reports as failed, then
//!    makes sure each pending block's hash is archived (local cache, then the
//!    archive itself, then a write),
//! 5. prunes the local cache below the new lower bound.
//!
//! Every external call is bounded by the run deadline. Window state is only
//! mutated synchronously between external calls, so a run abandoned at any
//! suspension point (deadline, or the future being dropped) leaves the state
//! exactly as the last completed step left it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    Archive, BlockNumber, Event, EventSource, HeightProvider, Phase, ScanWindow, WindowParams,
};

/// Why a run stopped early.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunAbort {
    /// An external call failed.
    FetchFailed { phase: Phase, error: String },
    /// A fulfillment closed a request that is not in the window.
    UnknownFulfillment {
        request_id: String,
        fulfillment_block: BlockNumber,
    },
    /// The run deadline passed while waiting on `phase`.
    DeadlineExceeded { phase: Phase },
}

impl std::fmt::Display for RunAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunAbort::FetchFailed { phase, error } => {
                write!(f, "{phase} call failed: {error}")
            }
            RunAbort::UnknownFulfillment {
                request_id,
                fulfillment_block,
            } => write!(
                f,
                "fulfillment at block {fulfillment_block} references unknown request {request_id}"
            ),
            RunAbort::DeadlineExceeded { phase } => {
                write!(f, "run deadline exceeded during {phase}")
            }
        }
    }
}

impl std::error::Error for RunAbort {}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// Window parameters can never yield work; nothing was fetched.
    Inert,
    Aborted(RunAbort),
}

/// Observable summary of a single run.
///
/// Informational only: nothing in the engine branches on a past report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub height: Option<BlockNumber>,
    pub window: Option<ScanWindow>,
    /// Blocks with at least one unfulfilled request.
    pub pending_blocks: usize,
    /// Pending blocks skipped because this feeder already recorded them.
    pub cached: usize,
    /// Pending blocks the archive already held.
    pub already_archived: usize,
    /// Blocks whose write was accepted this run.
    pub written: Vec<BlockNumber>,
    /// Blocks whose write failed this run.
    pub write_failures: Vec<BlockNumber>,
    /// Blocks recorded by an earlier run whose queued write later failed to
    /// commit. They are no longer recorded and get checked again.
    pub failed_commits: Vec<BlockNumber>,
    /// Archive checks that failed and fell through to a write.
    pub check_failures: usize,
    pub pruned: usize,
    pub stored_len: usize,
}

impl RunReport {
    fn new(stored_len: usize) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            height: None,
            window: None,
            pending_blocks: 0,
            cached: 0,
            already_archived: 0,
            written: Vec::new(),
            write_failures: Vec::new(),
            failed_commits: Vec::new(),
            check_failures: 0,
            pruned: 0,
            stored_len,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn abort(&self) -> Option<&RunAbort> {
        match &self.outcome {
            RunOutcome::Aborted(a) => Some(a),
            _ => None,
        }
    }
}

/// Keeps blocks with open requests archived before they leave the ledger's
/// native lookup window.
pub struct Feeder {
    source: Arc<dyn EventSource>,
    archive: Arc<dyn Archive>,
    height: Arc<dyn HeightProvider>,
    params: WindowParams,

    /// Blocks known archived within the current window.
    stored: HashSet<BlockNumber>,
    /// `from_block` of the last completed run.
    last_lower_bound: Option<BlockNumber>,
}

impl Feeder {
    pub fn new(
        source: Arc<dyn EventSource>,
        archive: Arc<dyn Archive>,
        height: Arc<dyn HeightProvider>,
        params: WindowParams,
    ) -> Self {
        if params.is_inert() {
            warn!(
                wait_blocks = params.wait_blocks,
                lookback_blocks = params.lookback_blocks,
                "lookback_blocks must exceed wait_blocks; feeder will never find work"
            );
        }
        Self {
            source,
            archive,
            height,
            params,
            stored: HashSet::new(),
            last_lower_bound: None,
        }
    }

    pub fn params(&self) -> WindowParams {
        self.params
    }

    pub fn is_stored(&self, block: BlockNumber) -> bool {
        self.stored.contains(&block)
    }

    /// Recorded blocks, ascending.
    pub fn stored_blocks(&self) -> Vec<BlockNumber> {
        let mut blocks: Vec<_> = self.stored.iter().copied().collect();
        blocks.sort_unstable();
        blocks
    }

    pub fn last_lower_bound(&self) -> Option<BlockNumber> {
        self.last_lower_bound
    }

    /// Execute one reconciliation pass. Never fails; see the report.
    pub async fn run_once(&mut self, deadline: Instant) -> RunReport {
        let mut report = RunReport::new(self.stored.len());
        debug!("feeder run starting");

        let height = match bounded(deadline, Phase::Height, self.height.height()).await {
            Ok(h) => h,
            Err(abort) => {
                error!(phase = %Phase::Height, error = %abort, "failed to fetch chain height");
                report.outcome = RunOutcome::Aborted(abort);
                return report;
            }
        };
        report.height = Some(height);

        let window = self.params.window_at(height);
        report.window = Some(window);
        if self.params.is_inert() {
            warn!(
                height,
                wait_blocks = self.params.wait_blocks,
                lookback_blocks = self.params.lookback_blocks,
                "scan window is empty; skipping run"
            );
            report.outcome = RunOutcome::Inert;
            return report;
        }
        let from_block = window.from_block;
        let to_block = window.to_block;

        let requests = match bounded(
            deadline,
            Phase::Requests,
            self.source.requests(from_block, to_block),
        )
        .await
        {
            Ok(r) => r,
            Err(abort) => {
                error!(height, from_block, to_block, error = %abort, "failed to fetch requests");
                report.outcome = RunOutcome::Aborted(abort);
                return report;
            }
        };

        let fulfillments = match bounded(
            deadline,
            Phase::Fulfillments,
            self.source.fulfillments(from_block),
        )
        .await
        {
            Ok(f) => f,
            Err(abort) => {
                error!(height, from_block, to_block, error = %abort, "failed to fetch fulfillments");
                report.outcome = RunOutcome::Aborted(abort);
                return report;
            }
        };

        let pending = match self.open_request_blocks(&requests, &fulfillments) {
            Ok(p) => p,
            Err(abort) => {
                error!(height, from_block, to_block, error = %abort, "request/fulfillment correlation failed; aborting run");
                report.outcome = RunOutcome::Aborted(abort);
                return report;
            }
        };
        report.pending_blocks = pending.len();

        for block in self.archive.take_failed_writes() {
            if self.stored.remove(&block) {
                warn!(block, height, "queued blockhash write failed to commit; rechecking");
            }
            report.failed_commits.push(block);
        }

        for block in pending {
            if self.stored.contains(&block) {
                report.cached += 1;
                continue;
            }

            match bounded(deadline, Phase::ArchiveCheck, self.archive.is_archived(block)).await {
                Ok(true) => {
                    info!(block, height, "blockhash already archived");
                    self.stored.insert(block);
                    report.already_archived += 1;
                    continue;
                }
                Ok(false) => {}
                Err(abort @ RunAbort::DeadlineExceeded { .. }) => {
                    warn!(block, height, error = %abort, "run deadline reached");
                    report.outcome = RunOutcome::Aborted(abort);
                    report.stored_len = self.stored.len();
                    return report;
                }
                Err(err) => {
                    warn!(block, error = %err, "failed to check whether block is archived; storing anyway");
                    report.check_failures += 1;
                }
            }

            match bounded(deadline, Phase::ArchiveWrite, self.archive.archive(block)).await {
                Ok(()) => {
                    info!(block, height, "stored blockhash");
                    self.stored.insert(block);
                    report.written.push(block);
                }
                Err(abort @ RunAbort::DeadlineExceeded { .. }) => {
                    warn!(block, height, error = %abort, "run deadline reached");
                    report.outcome = RunOutcome::Aborted(abort);
                    report.stored_len = self.stored.len();
                    return report;
                }
                Err(err) => {
                    error!(block, error = %err, "failed to store blockhash");
                    report.write_failures.push(block);
                }
            }
        }

        report.pruned = self.prune(from_block);
        self.last_lower_bound = Some(from_block);
        report.stored_len = self.stored.len();

        info!(
            height,
            from_block,
            to_block,
            pending = report.pending_blocks,
            written = report.written.len(),
            write_failures = report.write_failures.len(),
            pruned = report.pruned,
            stored = report.stored_len,
            "feeder run completed"
        );
        report
    }

    /// Blocks that still hold at least one unfulfilled request, ascending.
    fn open_request_blocks(
        &self,
        requests: &[Event],
        fulfillments: &[Event],
    ) -> Result<Vec<BlockNumber>, RunAbort> {
        let mut block_to_requests: BTreeMap<BlockNumber, HashSet<&str>> = BTreeMap::new();
        let mut request_to_block: HashMap<&str, BlockNumber> = HashMap::new();

        for req in requests {
            block_to_requests
                .entry(req.block)
                .or_default()
                .insert(req.id.as_str());
            request_to_block.insert(req.id.as_str(), req.block);
        }

        for ful in fulfillments {
            let Some(block) = request_to_block.get(ful.id.as_str()) else {
                return Err(RunAbort::UnknownFulfillment {
                    request_id: ful.id.clone(),
                    fulfillment_block: ful.block,
                });
            };
            if let Some(ids) = block_to_requests.get_mut(block) {
                ids.remove(ful.id.as_str());
            }
        }

        Ok(block_to_requests
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(block, _)| block)
            .collect())
    }

    /// Drop recorded blocks below `from_block`. Returns how many were dropped.
    ///
    /// Covers `[last_lower_bound, from_block)` as well as anything left below
    /// the previous bound after the reported height went backwards. Skipped
    /// before the first completed run. Blocks at or above `from_block` are
    /// always kept.
    fn prune(&mut self, from_block: BlockNumber) -> usize {
        if self.last_lower_bound.is_none() {
            return 0;
        }
        let before = self.stored.len();
        self.stored.retain(|b| *b >= from_block);
        before - self.stored.len()
    }
}

/// Await `fut` until `deadline`, folding both failure modes into [`RunAbort`].
async fn bounded<T, F>(deadline: Instant, phase: Phase, fut: F) -> Result<T, RunAbort>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(err)) => Err(RunAbort::FetchFailed {
            phase,
            error: format!("{err:#}"),
        }),
        Err(_) => Err(RunAbort::DeadlineExceeded { phase }),
    }
}
