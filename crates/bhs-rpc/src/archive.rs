//! Blockhash store contract as an [`Archive`].
//!
//! Reads are direct `eth_call`s. Writes are encoded here and handed to a
//! bounded queue; a [`StoreSubmitter`] task drains it and submits
//! transactions, so a slow node never stalls a feeder run on a write.
//! Submissions that fail are parked in [`FailedStores`], which the archive
//! hands back to the feeder so the block is checked and queued again.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use bhs_feeder::{Archive, BlockNumber};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::abi::{encode_uint256_call, GET_BLOCKHASH_SELECTOR, STORE_SELECTOR};
use crate::{to_quantity, RpcClient, RpcError, TransactionRequest};

/// Matches the native blockhash window: at most one store per block in it
/// can ever be useful.
pub const STORE_QUEUE_CAPACITY: usize = 256;

/// An encoded `store(uint256)` waiting to be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub block: BlockNumber,
    pub to: String,
    pub data: String,
}

pub fn store_queue(capacity: usize) -> (mpsc::Sender<StoreCall>, mpsc::Receiver<StoreCall>) {
    mpsc::channel(capacity)
}

/// Blocks whose store transaction was rejected, shared between the
/// submitter that records them and the archive that reports them.
#[derive(Debug, Clone, Default)]
pub struct FailedStores {
    blocks: Arc<Mutex<BTreeSet<BlockNumber>>>,
}

impl FailedStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, block: BlockNumber) {
        self.lock().insert(block);
    }

    pub fn contains(&self, block: BlockNumber) -> bool {
        self.lock().contains(&block)
    }

    /// Remove and return every recorded block, ascending.
    pub fn drain(&self) -> Vec<BlockNumber> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, BTreeSet<BlockNumber>> {
        self.blocks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct BlockhashStoreArchive {
    client: RpcClient,
    address: String,
    queue: mpsc::Sender<StoreCall>,
    failed: FailedStores,
}

impl BlockhashStoreArchive {
    pub fn new(
        client: RpcClient,
        address: impl Into<String>,
        queue: mpsc::Sender<StoreCall>,
        failed: FailedStores,
    ) -> Self {
        Self {
            client,
            address: address.into(),
            queue,
            failed,
        }
    }
}

#[async_trait::async_trait]
impl Archive for BlockhashStoreArchive {
    /// `getBlockhash` reverts for blocks the store does not hold, which the
    /// node reports as an error object. That is a definite "no"; only failures
    /// to reach the node or read its answer are errors.
    async fn is_archived(&self, block: BlockNumber) -> Result<bool> {
        let data = encode_uint256_call(GET_BLOCKHASH_SELECTOR, block);
        match self.client.eth_call(&self.address, &data).await {
            Ok(ret) => Ok(ret.trim_start_matches("0x").len() >= 64),
            Err(RpcError::Rpc { code, message, .. }) => {
                debug!(block, code, %message, "getBlockhash reverted; block not archived");
                Ok(false)
            }
            Err(e) => Err(e).with_context(|| format!("getBlockhash({block}) failed")),
        }
    }

    async fn archive(&self, block: BlockNumber) -> Result<()> {
        let call = StoreCall {
            block,
            to: self.address.clone(),
            data: encode_uint256_call(STORE_SELECTOR, block),
        };
        match self.queue.try_send(call) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => bail!("store queue full; dropping store for block {block}"),
            Err(TrySendError::Closed(_)) => bail!("store queue closed; submitter is not running"),
        }
    }

    fn take_failed_writes(&self) -> Vec<BlockNumber> {
        self.failed.drain()
    }
}

/// Drains the store queue into `eth_sendTransaction`.
///
/// A rejected submission is recorded in [`FailedStores`]. The feeder picks it
/// up on its next run, forgets the block, and queues it again while the
/// block is still in the scan window.
pub struct StoreSubmitter {
    client: RpcClient,
    from: String,
    gas_limit: u64,
    rx: mpsc::Receiver<StoreCall>,
    failed: FailedStores,
}

impl StoreSubmitter {
    pub fn new(
        client: RpcClient,
        from: impl Into<String>,
        gas_limit: u64,
        rx: mpsc::Receiver<StoreCall>,
        failed: FailedStores,
    ) -> Self {
        Self {
            client,
            from: from.into(),
            gas_limit,
            rx,
            failed,
        }
    }

    /// Run until every queue sender is dropped.
    pub async fn run(mut self) {
        while let Some(call) = self.rx.recv().await {
            let tx = TransactionRequest {
                from: self.from.clone(),
                to: call.to,
                gas: to_quantity(self.gas_limit),
                data: call.data,
            };
            match self.client.send_transaction(&tx).await {
                Ok(hash) => info!(block = call.block, tx_hash = %hash, "store transaction submitted"),
                Err(e) => {
                    error!(block = call.block, error = %e, "store transaction failed");
                    self.failed.record(call.block);
                }
            }
        }
        debug!("store queue closed; submitter exiting");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(queue: mpsc::Sender<StoreCall>) -> BlockhashStoreArchive {
        let client = RpcClient::new("http://127.0.0.1:1").unwrap();
        BlockhashStoreArchive::new(
            client,
            "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            queue,
            FailedStores::new(),
        )
    }

    #[tokio::test]
    async fn archive_enqueues_encoded_store_call() {
        let (tx, mut rx) = store_queue(4);
        archive(tx).archive(0x64).await.unwrap();

        let call = rx.recv().await.unwrap();
        assert_eq!(call.block, 100);
        assert_eq!(call.to, "0x5fbdb2315678afecb367f032d93f642f64180aa3");
        assert!(call.data.starts_with("0x6057361d"));
        assert!(call.data.ends_with("64"));
    }

    #[tokio::test]
    async fn full_or_closed_queue_is_a_write_failure() {
        let (tx, rx) = store_queue(1);
        let a = archive(tx);
        a.archive(1).await.unwrap();

        let err = a.archive(2).await.unwrap_err().to_string();
        assert!(err.contains("full"), "{err}");

        drop(rx);
        let err = a.archive(3).await.unwrap_err().to_string();
        assert!(err.contains("closed"), "{err}");
    }

    #[tokio::test]
    async fn rejected_submission_is_reported_once() {
        let (tx, rx) = store_queue(4);
        let failed = FailedStores::new();
        let client = RpcClient::new("http://127.0.0.1:1").unwrap();
        let a = BlockhashStoreArchive::new(client.clone(), "0x01", tx, failed.clone());
        let submitter = StoreSubmitter::new(client, "0x02", 21_000, rx, failed.clone()).spawn();

        a.archive(7).await.unwrap();
        drop(a);
        submitter.await.unwrap();

        assert!(failed.contains(7));
        assert_eq!(failed.drain(), vec![7]);
        assert!(failed.drain().is_empty());
    }
}
