//! Assemble a running feeder from a validated [`FeederConfig`].

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bhs_config::FeederConfig;
use bhs_feeder::{EventSource, FanOutSource, Feeder, FeederService};
use bhs_rpc::{
    store_queue, BlockhashStoreArchive, ChainHeight, CoordinatorLogSource, FailedStores, LogSchema,
    RpcClient, StoreSubmitter, STORE_QUEUE_CAPACITY,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct FeederStack {
    pub service: FeederService,
    /// Store transaction submitter; ends once the feeder and its archive are
    /// dropped.
    pub submitter: JoinHandle<()>,
}

/// Build (but do not start) the feeder service and start the store
/// submitter.
///
/// When `chain.chain_id` is configured the node is asked for its chain id
/// first, and a mismatch is fatal.
pub async fn build_feeder(cfg: &FeederConfig) -> Result<FeederStack> {
    let client = RpcClient::new(cfg.chain.rpc_url.clone())?;

    if let Some(expected) = cfg.chain.chain_id {
        let actual = client
            .chain_id()
            .await
            .context("eth_chainId failed during startup")?;
        if actual != expected {
            bail!("chain id mismatch: config expects {expected}, node reports {actual}");
        }
    }

    let sources = coordinator_sources(cfg, &client);
    let mut source = FanOutSource::new(sources);
    if cfg.namespace_ids {
        source = source.namespaced();
    }
    info!(coordinators = source.len(), namespace_ids = cfg.namespace_ids, "event sources ready");

    let (queue_tx, queue_rx) = store_queue(STORE_QUEUE_CAPACITY);
    let failed = FailedStores::new();
    let submitter = StoreSubmitter::new(
        client.clone(),
        cfg.archive.from_address.clone(),
        cfg.archive.gas_limit,
        queue_rx,
        failed.clone(),
    )
    .spawn();
    let archive = BlockhashStoreArchive::new(
        client.clone(),
        cfg.archive.address.clone(),
        queue_tx,
        failed,
    );

    for w in cfg.window_warnings() {
        warn!("{w}");
    }

    let feeder = Feeder::new(
        Arc::new(source),
        Arc::new(archive),
        Arc::new(ChainHeight::new(client)),
        cfg.window_params(),
    );

    Ok(FeederStack {
        service: FeederService::new(feeder, cfg.poll_period(), cfg.run_timeout()),
        submitter,
    })
}

fn coordinator_sources(cfg: &FeederConfig, client: &RpcClient) -> Vec<Arc<dyn EventSource>> {
    let mut sources: Vec<Arc<dyn EventSource>> = Vec::new();
    if let Some(addr) = &cfg.coordinators.v1_address {
        sources.push(Arc::new(CoordinatorLogSource::new(
            "v1",
            client.clone(),
            addr.clone(),
            LogSchema::vrf_v1(),
        )));
    }
    if let Some(addr) = &cfg.coordinators.v2_address {
        sources.push(Arc::new(CoordinatorLogSource::new(
            "v2",
            client.clone(),
            addr.clone(),
            LogSchema::vrf_v2(),
        )));
    }
    sources
}
