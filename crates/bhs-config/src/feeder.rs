//! Typed view of the effective config.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use bhs_feeder::WindowParams;
use serde::{Deserialize, Serialize};

use crate::{load_layered_yaml, LoadedConfig};

/// Size of the ledger's native blockhash window. Blocks further back than
/// this can no longer have their hash stored.
pub const MAX_USEFUL_LOOKBACK: u64 = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeederConfig {
    pub chain: ChainConfig,
    pub feeder: WindowConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub coordinators: CoordinatorsConfig,
    /// Prefix request ids with the coordinator name before correlation.
    #[serde(default)]
    pub namespace_ids: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    pub rpc_url: String,
    /// When set, the daemon refuses to start against a node reporting a
    /// different chain id.
    #[serde(default)]
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub wait_blocks: u64,
    pub lookback_blocks: u64,
    #[serde(default = "default_poll_period_secs")]
    pub poll_period_secs: u64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Blockhash store contract.
    pub address: String,
    /// Node-managed account that signs `store` transactions.
    pub from_address: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorsConfig {
    #[serde(default)]
    pub v1_address: Option<String>,
    #[serde(default)]
    pub v2_address: Option<String>,
}

fn default_poll_period_secs() -> u64 {
    15
}

fn default_run_timeout_secs() -> u64 {
    10
}

fn default_gas_limit() -> u64 {
    500_000
}

impl FeederConfig {
    /// Deserialize and validate the merged document.
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        let cfg: FeederConfig = serde_json::from_value(loaded.config_json.clone())
            .context("CONFIG_INVALID: config does not match the feeder schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Hard errors only. Questionable but runnable settings are reported by
    /// [`FeederConfig::window_warnings`].
    pub fn validate(&self) -> Result<()> {
        if self.chain.rpc_url.trim().is_empty() {
            bail!("CONFIG_INVALID field=/chain/rpc_url: must not be empty");
        }
        if self.feeder.poll_period_secs == 0 {
            bail!("CONFIG_INVALID field=/feeder/poll_period_secs: must be > 0");
        }
        if self.feeder.run_timeout_secs == 0 {
            bail!("CONFIG_INVALID field=/feeder/run_timeout_secs: must be > 0");
        }
        check_address("/archive/address", &self.archive.address)?;
        check_address("/archive/from_address", &self.archive.from_address)?;

        let coords = &self.coordinators;
        if coords.v1_address.is_none() && coords.v2_address.is_none() {
            bail!("CONFIG_INVALID field=/coordinators: at least one coordinator address is required");
        }
        if let Some(a) = &coords.v1_address {
            check_address("/coordinators/v1_address", a)?;
        }
        if let Some(a) = &coords.v2_address {
            check_address("/coordinators/v2_address", a)?;
        }
        Ok(())
    }

    /// Settings that load fine but make the feeder useless or partially
    /// blind. Sorted, stable wording.
    pub fn window_warnings(&self) -> Vec<String> {
        let w = &self.feeder;
        let mut out = Vec::new();
        if w.lookback_blocks <= w.wait_blocks {
            out.push(format!(
                "lookback_blocks ({}) <= wait_blocks ({}): scan window is always empty",
                w.lookback_blocks, w.wait_blocks
            ));
        }
        if w.lookback_blocks > MAX_USEFUL_LOOKBACK {
            out.push(format!(
                "lookback_blocks ({}) > {}: blocks older than the native window cannot be stored",
                w.lookback_blocks, MAX_USEFUL_LOOKBACK
            ));
        }
        out
    }

    pub fn window_params(&self) -> WindowParams {
        WindowParams::new(self.feeder.wait_blocks, self.feeder.lookback_blocks)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.feeder.poll_period_secs)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.feeder.run_timeout_secs)
    }
}

/// Load, merge, hash and type-check config files in one step.
pub fn load_feeder_config(paths: &[&str]) -> Result<(LoadedConfig, FeederConfig)> {
    let loaded = load_layered_yaml(paths)?;
    let cfg = FeederConfig::from_loaded(&loaded)?;
    Ok((loaded, cfg))
}

fn check_address(field: &str, value: &str) -> Result<()> {
    let body = value.strip_prefix("0x").unwrap_or("");
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("CONFIG_INVALID field={field}: expected 0x-prefixed 20-byte hex address");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_layered_yaml_from_strings;

    const MINIMAL: &str = r#"
chain:
  rpc_url: "http://127.0.0.1:8545"
feeder:
  wait_blocks: 3
  lookback_blocks: 100
archive:
  address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
  from_address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
coordinators:
  v2_address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
"#;

    fn parse(docs: &[&str]) -> Result<FeederConfig> {
        FeederConfig::from_loaded(&load_layered_yaml_from_strings(docs)?)
    }

    #[test]
    fn defaults_are_applied() {
        let cfg = parse(&[MINIMAL]).unwrap();
        assert_eq!(cfg.poll_period(), Duration::from_secs(15));
        assert_eq!(cfg.run_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.archive.gas_limit, 500_000);
        assert!(!cfg.namespace_ids);
        assert_eq!(cfg.chain.chain_id, None);
        assert_eq!(cfg.window_params(), WindowParams::new(3, 100));
        assert!(cfg.window_warnings().is_empty());
    }

    #[test]
    fn address_check_requires_prefix_and_length() {
        assert!(check_address("/x", "0x5FbDB2315678afecb367f032d93F642f64180aa3").is_ok());
        assert!(check_address("/x", "5FbDB2315678afecb367f032d93F642f64180aa3").is_err());
        assert!(check_address("/x", "0x5FbDB2315678afecb367f032d93F642f64180a").is_err());
        assert!(check_address("/x", "0xZZbDB2315678afecb367f032d93F642f64180aa3").is_err());
    }
}
