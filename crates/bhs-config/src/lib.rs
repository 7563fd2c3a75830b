//! Layered YAML configuration for the blockhash feeder.
//!
//! Documents are merged in order (later overrides earlier), converted to JSON,
//! canonicalized and hashed. The hash identifies the effective config a
//! process runs with; operators compare it across hosts and restarts.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

mod feeder;

pub use feeder::{
    load_feeder_config, ArchiveConfig, ChainConfig, CoordinatorsConfig, FeederConfig,
    WindowConfig, MAX_USEFUL_LOOKBACK,
};

/// Leaf string values starting with any of these are rejected with
/// CONFIG_SECRET_DETECTED. Credentials belong in the node's keystore or the
/// environment, never in a hashed config file.
const SECRET_PREFIXES: &[&str] = &[
    "-----BEGIN", // PEM private keys
    "sk-",        // OpenAI style
    "sk_live",    // Stripe live
    "sk_test",    // Stripe test
    "AKIA",       // AWS access key ID
    "ghp_",       // GitHub PAT
    "gho_",       // GitHub OAuth
    "glpat-",     // GitLab PAT
    "xoxb-",      // Slack bot token
    "xoxp-",      // Slack user token
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Read, merge and hash the YAML files at `paths`, in order.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut layers = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config layer {path}"))?;
        layers.push((path.to_string(), raw));
    }
    merge_layers(layers.iter().map(|(name, raw)| (name.as_str(), raw.as_str())))
}

/// Same as [`load_layered_yaml`] for documents already in memory. Layers are
/// named `#0`, `#1`, ... in errors.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let names: Vec<String> = (0..yaml_docs.len()).map(|i| format!("#{i}")).collect();
    merge_layers(names.iter().map(String::as_str).zip(yaml_docs.iter().copied()))
}

fn merge_layers<'a>(layers: impl Iterator<Item = (&'a str, &'a str)>) -> Result<LoadedConfig> {
    let mut merged = Value::Object(serde_json::Map::new());
    for (name, raw) in layers {
        let layer: serde_yaml::Value = serde_yaml::from_str(raw)
            .with_context(|| format!("config layer {name}: invalid yaml"))?;
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {name}: not representable as json"))?;
        match layer {
            // An empty or comment-only overlay changes nothing.
            Value::Null => continue,
            Value::Object(_) => overlay(&mut merged, layer),
            _ => bail!("CONFIG_INVALID layer={name}: top-level document must be a mapping"),
        }
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Apply `layer` on top of `base`. Mappings merge key by key, anything else
/// replaces. A `null` in the layer removes the key, so an overlay can unset an
/// optional field and still hash the same as a base that never set it.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                if value.is_null() {
                    base_map.remove(&key);
                    continue;
                }
                match base_map.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

// serde_json's default Map is key-sorted, so compact serialization is
// already canonical for a given document.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_string_leaves(v, "", &mut leaves);

    for (ptr, s) in leaves {
        if looks_like_secret(s) {
            bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
        }
    }
    Ok(())
}

fn collect_string_leaves<'a>(v: &'a Value, prefix: &str, out: &mut Vec<(String, &'a str)>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_string_leaves(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_string_leaves(vv, &next, out);
            }
        }
        Value::String(s) => {
            let p = if prefix.is_empty() { "/" } else { prefix };
            out.push((p.to_string(), s.as_str()));
        }
        _ => {}
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p)) || is_raw_private_key(t)
}

/// 32 bytes of hex, with or without `0x`. Addresses are 20 bytes and never
/// match.
fn is_raw_private_key(s: &str) -> bool {
    let body = s.strip_prefix("0x").unwrap_or(s);
    body.len() == 64 && body.chars().all(|c| c.is_ascii_hexdigit())
}
