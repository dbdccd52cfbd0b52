use alloy::primitives::B256;
use anyhow::{Context, Result, bail};

/// Parse a 32-byte price feed id, with or without a `0x` prefix.
pub fn parse_feed_id(feed_id: &str) -> Result<B256> {
    let s = feed_id.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("invalid feed id: {}", feed_id))?;
    if bytes.len() != 32 {
        bail!("feed id must be 32 bytes, got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

/// `0x`-prefixed lowercase hex, the form the feed service expects in queries.
pub fn feed_id_hex(feed_id: &B256) -> String {
    format!("0x{}", hex::encode(feed_id))
}
