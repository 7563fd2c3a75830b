//! Sliding scan window.
//!
//! Each run derives `[from_block, to_block]` from the current chain height:
//!
//! - `from_block = height - lookback_blocks`
//! - `to_block   = height - wait_blocks`
//!
//! Both subtractions saturate at zero, so a young chain (height smaller than
//! either offset) yields a window anchored at block 0 instead of wrapping.

use serde::{Deserialize, Serialize};

use crate::BlockNumber;

/// Window parameters, constant for the lifetime of a feeder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowParams {
    /// Blocks to stay behind the tip before a block is settled enough to check.
    pub wait_blocks: u64,
    /// Blocks behind the tip where the scan for open requests starts.
    pub lookback_blocks: u64,
}

impl WindowParams {
    pub fn new(wait_blocks: u64, lookback_blocks: u64) -> Self {
        Self {
            wait_blocks,
            lookback_blocks,
        }
    }

    /// `true` when `lookback_blocks <= wait_blocks`.
    ///
    /// Such a feeder never finds work: every window it computes is empty.
    pub fn is_inert(&self) -> bool {
        self.lookback_blocks <= self.wait_blocks
    }

    /// Window for chain height `height`.
    ///
    /// Inert parameters produce an empty window regardless of height.
    pub fn window_at(&self, height: BlockNumber) -> ScanWindow {
        let from_block = height.saturating_sub(self.lookback_blocks);
        let to_block = height.saturating_sub(self.wait_blocks);
        ScanWindow {
            from_block,
            to_block,
            empty: self.is_inert() || from_block > to_block,
        }
    }
}

/// Closed block range scanned by one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub from_block: BlockNumber,
    pub to_block: BlockNumber,
    empty: bool,
}

impl ScanWindow {
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn contains(&self, block: BlockNumber) -> bool {
        !self.empty && block >= self.from_block && block <= self.to_block
    }
}

impl std::fmt::Display for ScanWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.empty {
            write!(f, "[{}, {}] (empty)", self.from_block, self.to_block)
        } else {
            write!(f, "[{}, {}]", self.from_block, self.to_block)
        }
    }
}
