use alloy::primitives::{Address, B256};
use anyhow::{Context, Result, anyhow, bail};
use judge_lib::feed::parse_feed_id;
use std::{env, str::FromStr};

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub rpc_timeout_ms: u64,
    pub receipt_poll_ms: u64,

    pub judge_private_key: Option<String>,
    pub judge_key_path: Option<String>,

    pub contract_address: Address,
    pub pyth_contract_address: Address,
    pub price_feed_id: B256,
    pub hermes_url: String,
    pub oracle_timeout_ms: u64,

    pub tick_period_in_secs: u64,

    pub start_round_gas_limit: u64,
    pub oracle_update_gas_limit: u64,
    pub finalize_gas_base: u64,
    pub finalize_gas_per_prediction: u64,
    pub finalize_gas_floor: u64,
    pub finalize_gas_ceiling: u64,

    pub start_confirm_timeout_secs: u64,
    pub oracle_confirm_timeout_secs: u64,
    pub finalize_confirm_timeout_secs: u64,

    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,

    pub log_level: String,
    pub log_format: String,
    pub log_color: bool,

    pub tx_log_path: Option<String>,
    pub keeper_instance_id: String,
}

pub fn load() -> Result<RuntimeConfig> {
    let _ = dotenvy::dotenv();
    load_from(|key| env::var(key).ok())
}

pub fn load_from<F>(lookup: F) -> Result<RuntimeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let rpc_url = get("RPC_URL").context("RPC_URL must be set")?;
    let chain_id = env_parse(&get, "CHAIN_ID", None)?;
    let rpc_timeout_ms = env_parse(&get, "RPC_TIMEOUT_MS", Some(10_000))?;
    let receipt_poll_ms = env_parse(&get, "RECEIPT_POLL_MS", Some(1_000))?;

    let judge_private_key = get("JUDGE_PRIVATE_KEY");
    let judge_key_path = get("JUDGE_KEY_PATH");
    if judge_private_key.is_none() && judge_key_path.is_none() {
        bail!("JUDGE_PRIVATE_KEY or JUDGE_KEY_PATH must be set");
    }

    let contract_address = env_parse(&get, "CONTRACT_ADDRESS", None)?;
    let pyth_contract_address = env_parse(&get, "PYTH_CONTRACT_ADDRESS", None)?;
    let price_feed_id = get("PRICE_FEED_ID")
        .context("PRICE_FEED_ID must be set")
        .and_then(|v| parse_feed_id(&v).context("PRICE_FEED_ID is invalid"))?;
    let hermes_url =
        get("HERMES_URL").unwrap_or_else(|| "https://hermes.pyth.network".to_string());
    let oracle_timeout_ms = env_parse(&get, "ORACLE_TIMEOUT_MS", Some(10_000))?;

    let tick_period_in_secs = env_parse(&get, "TICK_PERIOD_IN_SECS", Some(5))?;
    if tick_period_in_secs == 0 {
        bail!("TICK_PERIOD_IN_SECS must be positive");
    }

    let start_round_gas_limit = env_parse(&get, "START_ROUND_GAS_LIMIT", Some(500_000))?;
    let oracle_update_gas_limit = env_parse(&get, "ORACLE_UPDATE_GAS_LIMIT", Some(500_000))?;
    let finalize_gas_base = env_parse(&get, "FINALIZE_GAS_BASE", Some(2_500_000))?;
    let finalize_gas_per_prediction =
        env_parse(&get, "FINALIZE_GAS_PER_PREDICTION", Some(300_000))?;
    let finalize_gas_floor = env_parse(&get, "FINALIZE_GAS_FLOOR", Some(3_000_000))?;
    let finalize_gas_ceiling = env_parse(&get, "FINALIZE_GAS_CEILING", Some(8_000_000))?;
    if finalize_gas_floor > finalize_gas_ceiling {
        bail!(
            "FINALIZE_GAS_FLOOR ({}) must not exceed FINALIZE_GAS_CEILING ({})",
            finalize_gas_floor,
            finalize_gas_ceiling
        );
    }

    let start_confirm_timeout_secs = env_parse(&get, "START_CONFIRM_TIMEOUT_SECS", Some(60))?;
    let oracle_confirm_timeout_secs = env_parse(&get, "ORACLE_CONFIRM_TIMEOUT_SECS", Some(120))?;
    let finalize_confirm_timeout_secs =
        env_parse(&get, "FINALIZE_CONFIRM_TIMEOUT_SECS", Some(120))?;

    let backoff_base_secs = env_parse(&get, "BACKOFF_BASE_SECS", Some(30))?;
    let backoff_max_secs = env_parse(&get, "BACKOFF_MAX_SECS", Some(120))?;

    let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    let log_format = get("LOG_FORMAT").unwrap_or_else(|| "json".to_string());
    let log_color = env_parse(&get, "LOG_COLOR", Some(false))?;

    let tx_log_path = get("TX_LOG_PATH");
    let keeper_instance_id = get("KEEPER_INSTANCE_ID").unwrap_or_else(default_instance_id);

    Ok(RuntimeConfig {
        rpc_url,
        chain_id,
        rpc_timeout_ms,
        receipt_poll_ms,
        judge_private_key,
        judge_key_path,
        contract_address,
        pyth_contract_address,
        price_feed_id,
        hermes_url,
        oracle_timeout_ms,
        tick_period_in_secs,
        start_round_gas_limit,
        oracle_update_gas_limit,
        finalize_gas_base,
        finalize_gas_per_prediction,
        finalize_gas_floor,
        finalize_gas_ceiling,
        start_confirm_timeout_secs,
        oracle_confirm_timeout_secs,
        finalize_confirm_timeout_secs,
        backoff_base_secs,
        backoff_max_secs,
        log_level,
        log_format,
        log_color,
        tx_log_path,
        keeper_instance_id,
    })
}

/// Parse `key`, falling back to `default` when unset. A value that is
/// present but malformed is an error, never silently defaulted.
fn env_parse<G, T>(get: &G, key: &str, default: Option<T>) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} is invalid ({}): {}", key, raw, e)),
        None => default.ok_or_else(|| anyhow!("{} must be set", key)),
    }
}

fn default_instance_id() -> String {
    let host = env::var("HOSTNAME").unwrap_or_else(|_| "judge".to_string());
    format!("{}:{}", host, std::process::id())
}
