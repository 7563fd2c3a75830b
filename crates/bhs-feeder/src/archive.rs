//! Archive and chain-height boundaries.

use std::sync::Arc;

use anyhow::Result;

use crate::BlockNumber;

/// Persistent blockhash store.
///
/// `is_archived` must map an "absent" answer from the ledger (a reverted call)
/// to `Ok(false)`; only failures to obtain an answer are errors.
///
/// `archive` may be queued: `Ok(())` means the write was accepted for
/// eventual commitment, not that it is already durable. A queued write that
/// later fails to commit must be reported through `take_failed_writes`, or
/// the feeder will treat the block as stored until it leaves the window.
#[async_trait::async_trait]
pub trait Archive: Send + Sync {
    async fn is_archived(&self, block: BlockNumber) -> Result<bool>;

    async fn archive(&self, block: BlockNumber) -> Result<()>;

    /// Blocks whose accepted writes have since failed to commit. Each block
    /// is reported once.
    fn take_failed_writes(&self) -> Vec<BlockNumber> {
        Vec::new()
    }
}

#[async_trait::async_trait]
impl<T: Archive + ?Sized> Archive for Arc<T> {
    async fn is_archived(&self, block: BlockNumber) -> Result<bool> {
        (**self).is_archived(block).await
    }

    async fn archive(&self, block: BlockNumber) -> Result<()> {
        (**self).archive(block).await
    }

    fn take_failed_writes(&self) -> Vec<BlockNumber> {
        (**self).take_failed_writes()
    }
}

/// Current chain tip.
#[async_trait::async_trait]
pub trait HeightProvider: Send + Sync {
    async fn height(&self) -> Result<BlockNumber>;
}

#[async_trait::async_trait]
impl<T: HeightProvider + ?Sized> HeightProvider for Arc<T> {
    async fn height(&self) -> Result<BlockNumber> {
        (**self).height().await
    }
}
