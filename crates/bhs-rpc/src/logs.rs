//! Coordinator event logs as an [`EventSource`].
//!
//! A [`LogSchema`] says which topic0 marks a request and a fulfillment, and
//! where each log carries the request id. Ids are normalized to lowercase
//! `0x` + 64 hex so a request id taken from a data word matches the same id
//! taken from an indexed topic.

use anyhow::{anyhow, Context, Result};
use bhs_feeder::{BlockNumber, Event, EventSource};

use crate::abi::{data_word, decode_hex, normalize_word};
use crate::{parse_quantity, BlockTag, Log, LogFilter, RpcClient};

/// Where a log carries the request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdLocation {
    /// Indexed parameter: `topics[n]` (`topics[0]` is the event signature).
    Topic(usize),
    /// Non-indexed parameter: 32-byte word `n` of `data`.
    DataWord(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSchema {
    pub request_topic: String,
    pub request_id: IdLocation,
    pub fulfillment_topic: String,
    pub fulfillment_id: IdLocation,
}

impl LogSchema {
    /// `RandomnessRequest(bytes32,uint256,bytes32,address,uint256,bytes32)` /
    /// `RandomnessRequestFulfilled(bytes32,uint256)`.
    pub fn vrf_v1() -> Self {
        Self {
            request_topic: "0x56bd374744a66d531874338def36c906e3a6cf31176eb1e9afd9f1de69725d51"
                .to_string(),
            request_id: IdLocation::DataWord(4),
            fulfillment_topic:
                "0xa2e7a402243ebda4a69ceeb3dfb682943b7a9b3ac66d6eefa8db65894009611c".to_string(),
            fulfillment_id: IdLocation::DataWord(0),
        }
    }

    /// `RandomWordsRequested(bytes32,uint256,uint256,uint64,uint16,uint32,uint32,address)` /
    /// `RandomWordsFulfilled(uint256,uint256,uint96,bool)`.
    pub fn vrf_v2() -> Self {
        Self {
            request_topic: "0x63373d1c4696214b898952999c9aaec57dac1ee2723cec59bea6888f489a9772"
                .to_string(),
            request_id: IdLocation::DataWord(0),
            fulfillment_topic:
                "0x7dffc5ae5ee4e2e4df1651cf6ad329a73cebdb728f37ea0187b9b17e036756e4".to_string(),
            fulfillment_id: IdLocation::Topic(1),
        }
    }
}

/// Requests and fulfillments of one coordinator contract.
#[derive(Clone, Debug)]
pub struct CoordinatorLogSource {
    name: String,
    client: RpcClient,
    address: String,
    schema: LogSchema,
}

impl CoordinatorLogSource {
    pub fn new(
        name: impl Into<String>,
        client: RpcClient,
        address: impl Into<String>,
        schema: LogSchema,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            address: address.into(),
            schema,
        }
    }

    async fn fetch(
        &self,
        topic: &str,
        id_at: IdLocation,
        from_block: BlockTag,
        to_block: BlockTag,
    ) -> Result<Vec<Event>> {
        let filter = LogFilter {
            address: self.address.clone(),
            from_block,
            to_block,
            topics: vec![topic.to_string()],
        };
        let logs = self
            .client
            .get_logs(&filter)
            .await
            .with_context(|| format!("eth_getLogs failed for {}", self.address))?;

        logs.iter()
            .map(|log| {
                decode_event(log, id_at).with_context(|| {
                    format!(
                        "undecodable log in tx {}",
                        log.transaction_hash.as_deref().unwrap_or("<unknown>")
                    )
                })
            })
            .collect()
    }
}

fn decode_event(log: &Log, id_at: IdLocation) -> Result<Event> {
    let block = match &log.block_number {
        Some(b) => parse_quantity(b)?,
        None => return Err(anyhow!("log has no block number")),
    };
    let id = match id_at {
        IdLocation::Topic(i) => {
            let topic = log
                .topics
                .get(i)
                .ok_or_else(|| anyhow!("log has {} topics, id expected at topic {i}", log.topics.len()))?;
            normalize_word(topic)?
        }
        IdLocation::DataWord(i) => data_word(&decode_hex(&log.data)?, i)?,
    };
    Ok(Event::new(id, block))
}

#[async_trait::async_trait]
impl EventSource for CoordinatorLogSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn requests(
        &self,
        from_block: BlockNumber,
        to_block: BlockNumber,
    ) -> Result<Vec<Event>> {
        self.fetch(
            &self.schema.request_topic,
            self.schema.request_id,
            BlockTag::Number(from_block),
            BlockTag::Number(to_block),
        )
        .await
    }

    async fn fulfillments(&self, from_block: BlockNumber) -> Result<Vec<Event>> {
        self.fetch(
            &self.schema.fulfillment_topic,
            self.schema.fulfillment_id,
            BlockTag::Number(from_block),
            BlockTag::Latest,
        )
        .await
    }
}
