use crate::{
    config::RuntimeConfig,
    keepers::{backoff::BackoffPolicy, finalize_round::FinalizeGasPolicy},
};
use anyhow::{Context, Result};
use judge_lib::{
    Address, B256,
    client::{
        ledger::{EvmLedger, Ledger},
        oracle::{HermesOracle, Oracle},
        rpc::Rpc,
    },
    storage::{TxLog, TxLogConfig, TxLogger},
    wallet::load_signer,
};
use std::{sync::Arc, time::Duration};
use tracing::info;

pub mod config;
pub mod keepers;
pub mod logging;

#[cfg(test)]
pub(crate) mod testing;

/// Deployment constants the keeper operations read on every tick.
#[derive(Clone, Debug)]
pub struct KeeperSettings {
    pub feed_id: B256,
    pub start_round_gas_limit: u64,
    pub oracle_update_gas_limit: u64,
    pub finalize_gas: FinalizeGasPolicy,
    pub start_confirm_timeout: Duration,
    pub oracle_confirm_timeout: Duration,
    pub finalize_confirm_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl KeeperSettings {
    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self {
            feed_id: cfg.price_feed_id,
            start_round_gas_limit: cfg.start_round_gas_limit,
            oracle_update_gas_limit: cfg.oracle_update_gas_limit,
            finalize_gas: FinalizeGasPolicy {
                base: cfg.finalize_gas_base,
                per_prediction: cfg.finalize_gas_per_prediction,
                floor: cfg.finalize_gas_floor,
                ceiling: cfg.finalize_gas_ceiling,
            },
            start_confirm_timeout: Duration::from_secs(cfg.start_confirm_timeout_secs),
            oracle_confirm_timeout: Duration::from_secs(cfg.oracle_confirm_timeout_secs),
            finalize_confirm_timeout: Duration::from_secs(cfg.finalize_confirm_timeout_secs),
            backoff: BackoffPolicy {
                base_delay_secs: cfg.backoff_base_secs,
                max_delay_secs: cfg.backoff_max_secs,
            },
        }
    }
}

pub struct App {
    ledger: Arc<dyn Ledger>,
    oracle: Arc<dyn Oracle>,
    settings: KeeperSettings,
    tx_log: Option<TxLogger>,
    judge_address: Option<Address>,
}

impl App {
    pub fn init_from(cfg: RuntimeConfig) -> Result<Self> {
        let rpc = Rpc::new(&cfg.rpc_url, cfg.rpc_timeout_ms, cfg.receipt_poll_ms)?;
        let signer = load_signer(
            cfg.judge_private_key.as_deref(),
            cfg.judge_key_path.as_deref(),
        )?;
        let ledger = EvmLedger::new(
            rpc,
            signer,
            cfg.chain_id,
            cfg.contract_address,
            cfg.pyth_contract_address,
        );
        let judge_address = ledger.signer_address();
        let oracle = HermesOracle::new(&cfg.hermes_url, cfg.oracle_timeout_ms)?;

        info!(
            judge = %judge_address,
            contract = %cfg.contract_address,
            oracle_contract = %cfg.pyth_contract_address,
            chain_id = cfg.chain_id,
            "judge keeper initialized"
        );

        let mut app = Self::new(
            Arc::new(ledger),
            Arc::new(oracle),
            KeeperSettings::from_config(&cfg),
        );
        app.judge_address = Some(judge_address);

        if let Some(path) = &cfg.tx_log_path {
            let tx_log = TxLogger::start(TxLogConfig::new(path, cfg.keeper_instance_id.clone()))
                .with_context(|| format!("failed to open tx log at {path}"))?;
            app = app.with_tx_log(tx_log);
        }
        Ok(app)
    }

    pub fn new(ledger: Arc<dyn Ledger>, oracle: Arc<dyn Oracle>, settings: KeeperSettings) -> Self {
        Self {
            ledger,
            oracle,
            settings,
            tx_log: None,
            judge_address: None,
        }
    }

    pub fn with_tx_log(mut self, tx_log: TxLogger) -> Self {
        self.tx_log = Some(tx_log);
        self
    }

    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    pub fn oracle(&self) -> &dyn Oracle {
        self.oracle.as_ref()
    }

    pub fn settings(&self) -> &KeeperSettings {
        &self.settings
    }

    pub fn judge_address(&self) -> Option<Address> {
        self.judge_address
    }

    /// No-op when the tx log is disabled.
    pub fn record_tx(&self, entry: TxLog) {
        if let Some(tx_log) = &self.tx_log {
            tx_log.record(entry);
        }
    }

    /// Flush pending tx log rows.
    pub fn shutdown(self) {
        if let Some(tx_log) = self.tx_log {
            tx_log.shutdown();
        }
    }
}
