//! Ethereum-style JSON-RPC adapters for the blockhash feeder.
//!
//! - [`RpcClient`]: minimal JSON-RPC 2.0 over HTTP.
//! - [`ChainHeight`]: `eth_blockNumber` as a [`bhs_feeder::HeightProvider`].
//! - [`CoordinatorLogSource`]: `eth_getLogs` over one coordinator contract as
//!   a [`bhs_feeder::EventSource`], decoded through a [`LogSchema`].
//! - [`BlockhashStoreArchive`] + [`StoreSubmitter`]: the archive contract as a
//!   [`bhs_feeder::Archive`]; writes go through a bounded queue.

mod abi;
mod archive;
mod client;
mod height;
mod logs;

pub use abi::{encode_uint256_call, GET_BLOCKHASH_SELECTOR, STORE_SELECTOR};
pub use archive::{
    store_queue, BlockhashStoreArchive, FailedStores, StoreCall, StoreSubmitter,
    STORE_QUEUE_CAPACITY,
};
pub use client::{parse_quantity, to_quantity, BlockTag, Log, LogFilter, RpcClient, RpcError, TransactionRequest};
pub use height::ChainHeight;
pub use logs::{CoordinatorLogSource, IdLocation, LogSchema};
