use judge_lib::{client::ledger::Ledger, error::LedgerError, types::Round};

/// `None` when no round has ever been opened. No retries here; a failed
/// read aborts the tick.
pub async fn read_current_round(ledger: &dyn Ledger) -> Result<Option<Round>, LedgerError> {
    let round_id = ledger.current_round_id().await?;
    if round_id == 0 {
        return Ok(None);
    }

    let fields = ledger.round_by_id(round_id).await?;
    Ok(Some(Round::from_tuple(round_id, fields)))
}

/// What a tick should do, derived fresh from the latest snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoundState {
    NoRound,
    Finalized(Round),
    BeforeDeadline(Round),
    PastDeadline(Round),
}

impl RoundState {
    pub fn classify(round: Option<Round>, now: i64) -> Self {
        match round {
            None => Self::NoRound,
            Some(r) if r.finalized => Self::Finalized(r),
            Some(r) if r.is_past_deadline(now) => Self::PastDeadline(r),
            Some(r) => Self::BeforeDeadline(r),
        }
    }
}
