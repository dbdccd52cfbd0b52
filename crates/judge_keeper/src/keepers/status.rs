use chrono::{DateTime, Utc};
use judge_lib::types::Round;
use serde::Serialize;
use std::fmt;

use super::backoff::{BackoffPolicy, BackoffState};

/// What the keeper last observed, published after every tick.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub round: Option<Round>,
    pub backoff: BackoffState,
    /// Pool size, read on ticks that consider starting a round.
    pub pending_work: Option<u64>,
    /// Unix seconds of the tick that produced this snapshot; 0 before the
    /// first tick.
    pub observed_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RoundPhase {
    NoRound,
    Active,
    Judging,
    Finalized,
}

impl RoundPhase {
    pub fn of(round: Option<&Round>, now: i64) -> Self {
        match round {
            None => Self::NoRound,
            Some(r) if r.finalized => Self::Finalized,
            Some(r) if r.is_past_deadline(now) => Self::Judging,
            Some(_) => Self::Active,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoRound => "NO ROUND",
            Self::Active => "ACTIVE",
            Self::Judging => "JUDGING",
            Self::Finalized => "FINALIZED",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoundReport {
    pub id: u64,
    pub for_block: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub prediction_count: u64,
    pub elapsed_secs: i64,
    pub remaining_secs: i64,
    /// `None` until finalized, and when nobody won.
    pub winner: Option<String>,
    pub actual_price: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusReport {
    pub phase: RoundPhase,
    pub round: Option<RoundReport>,
    pub pending_work: Option<u64>,
    pub empty_round_streak: u64,
    pub backoff_delay_secs: u64,
    pub backoff_remaining_secs: u64,
    pub observed_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub fn from_snapshot(snapshot: &StatusSnapshot, policy: &BackoffPolicy) -> Self {
        let now = snapshot.observed_at;
        let round = snapshot.round.as_ref().map(|r| RoundReport {
            id: r.id,
            for_block: r.for_block,
            start_time: DateTime::from_timestamp(r.start_time, 0),
            deadline: DateTime::from_timestamp(r.deadline, 0),
            prediction_count: r.prediction_count,
            elapsed_secs: r.elapsed_secs(now),
            remaining_secs: r.remaining_secs(now),
            winner: (r.finalized && !r.winner.is_empty()).then(|| r.winner.clone()),
            actual_price: r.actual_price_display(),
        });

        Self {
            phase: RoundPhase::of(snapshot.round.as_ref(), now),
            round,
            pending_work: snapshot.pending_work,
            empty_round_streak: snapshot.backoff.consecutive_empty_rounds,
            backoff_delay_secs: snapshot.backoff.current_wait_secs(policy),
            backoff_remaining_secs: snapshot.backoff.remaining_secs(policy, now),
            observed_at: DateTime::from_timestamp(now, 0),
        }
    }
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl StatusReport {
    fn fmt_pending_work(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pending_work {
            Some(0) => writeln!(f, "Pending work: 0 (Empty)"),
            Some(n) => writeln!(f, "Pending work: {n} (Ready)"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(round) = &self.round else {
            writeln!(f, "No round started yet")?;
            self.fmt_pending_work(f)?;
            return write!(f, "Empty-round streak: {}", self.empty_round_streak);
        };

        writeln!(f, "Round #{}: {}", round.id, self.phase.label())?;
        writeln!(f, "- For block: #{}", round.for_block)?;
        writeln!(f, "- Start: {}", fmt_time(round.start_time))?;
        writeln!(f, "- Deadline: {}", fmt_time(round.deadline))?;
        writeln!(f, "- Predictions: {}", round.prediction_count)?;
        writeln!(f, "- Elapsed: {}s", round.elapsed_secs)?;
        writeln!(f, "- Remaining: {}s", round.remaining_secs)?;

        match self.phase {
            RoundPhase::Finalized => {
                match &round.winner {
                    Some(winner) => writeln!(f, "- Winner: {winner}")?,
                    None => writeln!(f, "- Winner: No winner")?,
                }
                if let Some(price) = round.actual_price {
                    writeln!(f, "- Actual price: {price:.2}")?;
                }
            }
            RoundPhase::Active => writeln!(
                f,
                "- Accepting predictions for {} more seconds",
                round.remaining_secs
            )?,
            RoundPhase::Judging => {
                writeln!(f, "- Submission window closed, waiting for finalization")?
            }
            RoundPhase::NoRound => {}
        }

        self.fmt_pending_work(f)?;
        write!(
            f,
            "Empty-round streak: {} (delay {}s, {}s remaining)",
            self.empty_round_streak, self.backoff_delay_secs, self.backoff_remaining_secs
        )
    }
}
