use judge_lib::{
    B256, TxHash,
    client::ledger::TxParams,
    error::LedgerError,
    storage::{TxLog, TxOp, TxStatus},
    types::{PriceUpdate, Round},
};
use tracing::{error, info, warn};

use crate::App;

/// Gas sizing for the finalize call: a base covering the on-chain oracle
/// read plus a per-prediction term for scoring, clamped to `[floor, ceiling]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinalizeGasPolicy {
    pub base: u64,
    pub per_prediction: u64,
    pub floor: u64,
    pub ceiling: u64,
}

impl Default for FinalizeGasPolicy {
    fn default() -> Self {
        Self {
            base: 2_500_000,
            per_prediction: 300_000,
            floor: 3_000_000,
            ceiling: 8_000_000,
        }
    }
}

impl FinalizeGasPolicy {
    pub fn gas_limit(&self, prediction_count: u64) -> u64 {
        let scaled = self
            .base
            .saturating_add(prediction_count.saturating_mul(self.per_prediction));
        scaled.min(self.ceiling).max(self.floor)
    }
}

/// Inputs of one finalize transaction. Rebuilt on every attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FinalizeTxPlan {
    pub gas_limit: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub feed_id: B256,
}

impl FinalizeTxPlan {
    pub fn params(&self) -> TxParams {
        TxParams {
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { block_number: Option<u64> },
    /// Broadcast; the next tick observes the `finalized` flag.
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Submitted {
        tx_hash: TxHash,
        oracle_tx: TxHash,
        confirmation: Confirmation,
    },
    /// No fresh price; the round stays open and is retried next tick.
    OracleUnavailable,
    AlreadyKnown,
    /// The contract refused the finalize call, usually because the round is
    /// already finalized.
    Rejected { tx_hash: TxHash, oracle_tx: TxHash },
}

impl FinalizeOutcome {
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Submitted { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// The finalize call reads the price the oracle update just posted, so the
/// second phase only runs after the first has a success receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
enum FinalizePhase {
    Oracle,
    Finalize { oracle_tx: TxHash },
    Done(FinalizeOutcome),
}

struct FinalizeAttempt<'a> {
    app: &'a App,
    round: &'a Round,
}

/// Post a fresh oracle price, then finalize `round`. Only called once the
/// round is past its deadline and not yet finalized.
pub async fn finalize_round(
    app: &App,
    round: &Round,
    now: i64,
) -> Result<FinalizeOutcome, LedgerError> {
    info!(
        round_id = round.id,
        prediction_count = round.prediction_count,
        overdue_secs = now - round.deadline,
        "round ready for finalization"
    );
    if round.is_empty() {
        warn!(round_id = round.id, "no predictions submitted this round");
    }

    let attempt = FinalizeAttempt { app, round };
    let mut phase = FinalizePhase::Oracle;
    loop {
        phase = match phase {
            FinalizePhase::Oracle => attempt.oracle_phase().await?,
            FinalizePhase::Finalize { oracle_tx } => attempt.finalize_phase(oracle_tx).await?,
            FinalizePhase::Done(outcome) => return Ok(outcome),
        };
    }
}

impl FinalizeAttempt<'_> {
    fn log(
        &self,
        op: TxOp,
        status: TxStatus,
        tx_hash: Option<TxHash>,
        params: &TxParams,
        error_message: Option<String>,
    ) {
        self.app.record_tx(TxLog {
            op,
            round_id: Some(self.round.id),
            tx_hash: tx_hash.map(|h| h.to_string()),
            nonce: Some(params.nonce),
            gas_limit: Some(params.gas_limit),
            status,
            error_message,
        });
    }

    async fn fetch_price_update(&self) -> Result<Option<PriceUpdate>, LedgerError> {
        let feed_id = self.app.settings().feed_id;
        let payload = match self.app.oracle().fetch_latest_update(feed_id).await {
            Ok(Some(payload)) if !payload.is_empty() => payload,
            Ok(_) => {
                warn!(round_id = self.round.id, "oracle returned no price update");
                return Ok(None);
            }
            Err(err) => {
                warn!(round_id = self.round.id, error = %err, "oracle unavailable");
                return Ok(None);
            }
        };

        let fee = self.app.ledger().quote_update_fee(&payload).await?;
        Ok(Some(PriceUpdate { payload, fee }))
    }

    async fn oracle_phase(&self) -> Result<FinalizePhase, LedgerError> {
        let Some(update) = self.fetch_price_update().await? else {
            return Ok(FinalizePhase::Done(FinalizeOutcome::OracleUnavailable));
        };

        let ledger = self.app.ledger();
        let settings = self.app.settings();
        let params = TxParams {
            nonce: ledger.current_nonce().await?,
            gas_limit: settings.oracle_update_gas_limit,
            gas_price: ledger.current_gas_price().await?,
        };
        info!(
            round_id = self.round.id,
            bytes = update.payload.len(),
            fee = %update.fee,
            nonce = params.nonce,
            "submitting oracle price update"
        );

        let tx_hash = match ledger
            .submit_oracle_update(&update.payload, update.fee, params)
            .await
        {
            Ok(hash) => hash,
            Err(err) if err.is_benign() => {
                warn!(error = %err, "oracle update already pending, skipping");
                self.log(
                    TxOp::OracleUpdate,
                    TxStatus::AlreadyKnown,
                    None,
                    &params,
                    Some(err.to_string()),
                );
                return Ok(FinalizePhase::Done(FinalizeOutcome::AlreadyKnown));
            }
            Err(err) => {
                self.log(
                    TxOp::OracleUpdate,
                    TxStatus::Rejected,
                    None,
                    &params,
                    Some(err.to_string()),
                );
                return Err(err);
            }
        };

        let receipt = match ledger
            .wait_for_receipt(tx_hash, settings.oracle_confirm_timeout)
            .await
        {
            Ok(receipt) => receipt,
            Err(err) => {
                self.log(
                    TxOp::OracleUpdate,
                    TxStatus::Timeout,
                    Some(tx_hash),
                    &params,
                    Some(err.to_string()),
                );
                return Err(err);
            }
        };
        if !receipt.success {
            error!(%tx_hash, "oracle update transaction reverted");
            self.log(TxOp::OracleUpdate, TxStatus::Reverted, Some(tx_hash), &params, None);
            return Err(LedgerError::Reverted(tx_hash));
        }

        info!(%tx_hash, block_number = receipt.block_number, "oracle price posted");
        self.log(TxOp::OracleUpdate, TxStatus::Confirmed, Some(tx_hash), &params, None);
        Ok(FinalizePhase::Finalize { oracle_tx: tx_hash })
    }

    /// Re-read so gas tracks the count as the contract will see it.
    async fn fresh_prediction_count(&self) -> u64 {
        match self.app.ledger().round_by_id(self.round.id).await {
            Ok((_, _, _, prediction_count, ..)) => prediction_count,
            Err(err) => {
                warn!(
                    round_id = self.round.id,
                    error = %err,
                    "could not refresh prediction count, using snapshot"
                );
                self.round.prediction_count
            }
        }
    }

    async fn finalize_phase(&self, oracle_tx: TxHash) -> Result<FinalizePhase, LedgerError> {
        let ledger = self.app.ledger();
        let settings = self.app.settings();
        let prediction_count = self.fresh_prediction_count().await;

        // Nonce is read after the oracle update confirmed; reusing the
        // earlier value would collide with it.
        let plan = FinalizeTxPlan {
            gas_limit: settings.finalize_gas.gas_limit(prediction_count),
            nonce: ledger.current_nonce().await?,
            gas_price: ledger.current_gas_price().await?,
            feed_id: settings.feed_id,
        };
        let params = plan.params();
        info!(
            round_id = self.round.id,
            prediction_count,
            gas_limit = plan.gas_limit,
            nonce = plan.nonce,
            "submitting finalize"
        );

        let tx_hash = match ledger.submit_finalize(plan.feed_id, params).await {
            Ok(hash) => hash,
            Err(err) if err.is_benign() => {
                warn!(error = %err, "finalize already pending, skipping");
                self.log(
                    TxOp::FinalizeRound,
                    TxStatus::AlreadyKnown,
                    None,
                    &params,
                    Some(err.to_string()),
                );
                return Ok(FinalizePhase::Done(FinalizeOutcome::AlreadyKnown));
            }
            Err(err) => {
                self.log(
                    TxOp::FinalizeRound,
                    TxStatus::Rejected,
                    None,
                    &params,
                    Some(err.to_string()),
                );
                return Err(err);
            }
        };

        let outcome = match ledger
            .wait_for_receipt(tx_hash, settings.finalize_confirm_timeout)
            .await
        {
            Ok(receipt) if receipt.success => {
                info!(round_id = self.round.id, %tx_hash, "round finalized");
                self.log(TxOp::FinalizeRound, TxStatus::Confirmed, Some(tx_hash), &params, None);
                FinalizeOutcome::Submitted {
                    tx_hash,
                    oracle_tx,
                    confirmation: Confirmation::Confirmed {
                        block_number: receipt.block_number,
                    },
                }
            }
            Ok(_) => {
                warn!(
                    round_id = self.round.id,
                    %tx_hash,
                    "finalize reverted, round may already be finalized"
                );
                self.log(TxOp::FinalizeRound, TxStatus::Reverted, Some(tx_hash), &params, None);
                FinalizeOutcome::Rejected { tx_hash, oracle_tx }
            }
            Err(err) => {
                info!(
                    round_id = self.round.id,
                    %tx_hash,
                    error = %err,
                    "finalize submitted, confirmation left to the next tick"
                );
                self.log(TxOp::FinalizeRound, TxStatus::Submitted, Some(tx_hash), &params, None);
                FinalizeOutcome::Submitted {
                    tx_hash,
                    oracle_tx,
                    confirmation: Confirmation::Pending,
                }
            }
        };
        Ok(FinalizePhase::Done(outcome))
    }
}
