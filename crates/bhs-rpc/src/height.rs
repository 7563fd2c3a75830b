use anyhow::{Context, Result};
use bhs_feeder::{BlockNumber, HeightProvider};

use crate::RpcClient;

/// Chain tip from `eth_blockNumber`.
#[derive(Clone, Debug)]
pub struct ChainHeight {
    client: RpcClient,
}

impl ChainHeight {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HeightProvider for ChainHeight {
    async fn height(&self) -> Result<BlockNumber> {
        self.client
            .block_number()
            .await
            .context("eth_blockNumber failed")
    }
}
