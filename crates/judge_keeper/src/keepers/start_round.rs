use judge_lib::{
    TxHash,
    client::ledger::TxParams,
    error::LedgerError,
    storage::{TxLog, TxOp, TxStatus},
    types::Round,
};
use tracing::{error, info, warn};

use crate::{
    App,
    keepers::backoff::{BackoffGate, BackoffState},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started { tx_hash: TxHash, block_number: Option<u64> },
    /// Nothing queued; the contract would reject the call anyway.
    PoolEmpty,
    BackoffPending { streak: u64, remaining_secs: u64 },
    /// An equivalent transaction is already pending.
    AlreadyKnown,
}

impl StartOutcome {
    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Started { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}

/// Open a new round if the pool and backoff allow it. `previous` is the
/// latest round (already finalized), or `None` before the first round.
/// `pending_work` is the pool size read this tick.
pub async fn try_start_round(
    app: &App,
    backoff: &mut BackoffState,
    previous: Option<&Round>,
    pending_work: u64,
    now: i64,
) -> Result<StartOutcome, LedgerError> {
    let ledger = app.ledger();
    let settings = app.settings();

    if pending_work == 0 {
        info!("pending work pool is empty, not starting a round");
        return Ok(StartOutcome::PoolEmpty);
    }

    match previous {
        Some(prev) => {
            if let BackoffGate::Waiting {
                streak,
                remaining_secs,
            } = backoff.observe(&settings.backoff, prev, now)
            {
                info!(
                    round_id = prev.id,
                    streak,
                    remaining_secs,
                    "waiting out empty-round backoff"
                );
                return Ok(StartOutcome::BackoffPending {
                    streak,
                    remaining_secs,
                });
            }
        }
        None => info!("no round yet, starting the first one"),
    }

    let params = TxParams {
        nonce: ledger.current_nonce().await?,
        gas_limit: settings.start_round_gas_limit,
        gas_price: ledger.current_gas_price().await?,
    };
    let next_round_id = previous.map(|r| r.id + 1).unwrap_or(1);
    info!(
        round_id = next_round_id,
        pending_work,
        nonce = params.nonce,
        "submitting start round"
    );

    let log = |status: TxStatus, tx_hash: Option<TxHash>, error_message: Option<String>| {
        app.record_tx(TxLog {
            op: TxOp::StartRound,
            round_id: Some(next_round_id),
            tx_hash: tx_hash.map(|h| h.to_string()),
            nonce: Some(params.nonce),
            gas_limit: Some(params.gas_limit),
            status,
            error_message,
        })
    };

    let tx_hash = match ledger.submit_start_round(params).await {
        Ok(hash) => hash,
        Err(err) if err.is_benign() => {
            warn!(error = %err, "start round already pending, skipping");
            log(TxStatus::AlreadyKnown, None, Some(err.to_string()));
            return Ok(StartOutcome::AlreadyKnown);
        }
        Err(err) => {
            log(TxStatus::Rejected, None, Some(err.to_string()));
            return Err(err);
        }
    };

    let receipt = match ledger
        .wait_for_receipt(tx_hash, settings.start_confirm_timeout)
        .await
    {
        Ok(receipt) => receipt,
        Err(err) => {
            log(TxStatus::Timeout, Some(tx_hash), Some(err.to_string()));
            return Err(err);
        }
    };

    if !receipt.success {
        error!(%tx_hash, "start round transaction reverted");
        log(TxStatus::Reverted, Some(tx_hash), None);
        return Err(LedgerError::Reverted(tx_hash));
    }

    info!(
        %tx_hash,
        block_number = receipt.block_number,
        "round start confirmed"
    );
    log(TxStatus::Confirmed, Some(tx_hash), None);
    Ok(StartOutcome::Started {
        tx_hash,
        block_number: receipt.block_number,
    })
}
