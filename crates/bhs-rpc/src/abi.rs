//! Just enough ABI encoding for the two archive calls.

use anyhow::{bail, Result};

/// `getBlockhash(uint256)`
pub const GET_BLOCKHASH_SELECTOR: [u8; 4] = [0xe9, 0x41, 0x3d, 0x38];

/// `store(uint256)`
pub const STORE_SELECTOR: [u8; 4] = [0x60, 0x57, 0x36, 0x1d];

/// `0x`-prefixed call data for a single-`uint256` function.
pub fn encode_uint256_call(selector: [u8; 4], value: u64) -> String {
    format!("0x{}{:064x}", hex::encode(selector), value)
}

/// Strip `0x` and decode.
pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(body)?)
}

/// 32-byte word `index` of ABI-encoded `data`, as lowercase `0x` hex.
pub(crate) fn data_word(data: &[u8], index: usize) -> Result<String> {
    let start = index * 32;
    let Some(word) = data.get(start..start + 32) else {
        bail!(
            "log data too short: need word {index} ({} bytes), have {} bytes",
            start + 32,
            data.len()
        );
    };
    Ok(format!("0x{}", hex::encode(word)))
}

/// Normalize a 32-byte hex topic to lowercase `0x` form.
pub(crate) fn normalize_word(s: &str) -> Result<String> {
    let bytes = decode_hex(s)?;
    if bytes.len() != 32 {
        bail!("expected 32-byte word, got {} bytes", bytes.len());
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}
