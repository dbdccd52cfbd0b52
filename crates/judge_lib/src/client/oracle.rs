use alloy::primitives::{B256, Bytes};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::{error::OracleError, feed::feed_id_hex};

/// Source of signed price-update payloads.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Latest signed update for `feed_id`, or `None` when the feed service
    /// has nothing to offer.
    async fn fetch_latest_update(&self, feed_id: B256) -> Result<Option<Bytes>, OracleError>;
}

#[derive(Debug, Deserialize)]
struct LatestUpdateResponse {
    binary: Option<BinaryUpdate>,
}

#[derive(Debug, Deserialize)]
struct BinaryUpdate {
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    data: Vec<String>,
}

/// Pyth Hermes price service client.
pub struct HermesOracle {
    client: Client,
    base_url: String,
}

impl HermesOracle {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build oracle HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn decode_latest_update(body: &str) -> Result<Option<Bytes>, OracleError> {
    let response: LatestUpdateResponse =
        serde_json::from_str(body).map_err(|err| OracleError::Decode(err.to_string()))?;

    let Some(binary) = response.binary else {
        return Ok(None);
    };
    if let Some(encoding) = binary.encoding.as_deref() {
        if encoding != "hex" {
            return Err(OracleError::Decode(format!(
                "unsupported encoding: {}",
                encoding
            )));
        }
    }
    let Some(first) = binary.data.first() else {
        return Ok(None);
    };

    let hex_str = first.strip_prefix("0x").unwrap_or(first);
    if hex_str.is_empty() {
        return Ok(None);
    }
    let bytes = hex::decode(hex_str).map_err(|err| OracleError::Decode(err.to_string()))?;
    Ok(Some(Bytes::from(bytes)))
}

#[async_trait]
impl Oracle for HermesOracle {
    async fn fetch_latest_update(&self, feed_id: B256) -> Result<Option<Bytes>, OracleError> {
        let url = format!("{}/v2/updates/price/latest", self.base_url);
        let body = self
            .client
            .get(&url)
            .query(&[("ids[]", feed_id_hex(&feed_id))])
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| OracleError::Request(err.to_string()))?
            .text()
            .await
            .map_err(|err| OracleError::Request(err.to_string()))?;

        let update = decode_latest_update(&body)?;
        debug!(
            feed_id = %feed_id_hex(&feed_id),
            bytes = update.as_ref().map(|u| u.len()).unwrap_or(0),
            "fetched price update"
        );
        Ok(update)
    }
}
