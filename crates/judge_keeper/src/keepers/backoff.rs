use judge_lib::types::Round;
use serde::Serialize;
use tracing::info;

/// Escalating patience after rounds that closed with no submissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_secs: 30,
            max_delay_secs: 120,
        }
    }
}

impl BackoffPolicy {
    /// `min(base * streak, max)`; non-decreasing in `streak`.
    pub fn wait_secs(&self, streak: u64) -> u64 {
        self.base_delay_secs
            .saturating_mul(streak)
            .min(self.max_delay_secs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffGate {
    Open,
    Waiting { streak: u64, remaining_secs: u64 },
}

/// Process-local; resets on restart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackoffState {
    pub consecutive_empty_rounds: u64,
    pub last_empty_round_at: Option<i64>,
    /// Round already counted toward the streak, so repeated ticks over the
    /// same finalized round escalate only once.
    pub last_empty_round_id: Option<u64>,
}

impl BackoffState {
    pub fn on_empty_round(&mut self, policy: &BackoffPolicy, now: i64) -> u64 {
        self.consecutive_empty_rounds = self.consecutive_empty_rounds.saturating_add(1);
        self.last_empty_round_at = Some(now);
        policy.wait_secs(self.consecutive_empty_rounds)
    }

    pub fn on_non_empty_round(&mut self) {
        self.consecutive_empty_rounds = 0;
        self.last_empty_round_at = None;
        self.last_empty_round_id = None;
    }

    pub fn current_wait_secs(&self, policy: &BackoffPolicy) -> u64 {
        policy.wait_secs(self.consecutive_empty_rounds)
    }

    pub fn remaining_secs(&self, policy: &BackoffPolicy, now: i64) -> u64 {
        match self.last_empty_round_at {
            None => 0,
            Some(at) => {
                let elapsed = now.saturating_sub(at).max(0) as u64;
                self.current_wait_secs(policy).saturating_sub(elapsed)
            }
        }
    }

    pub fn is_wait_elapsed(&self, policy: &BackoffPolicy, now: i64) -> bool {
        self.remaining_secs(policy, now) == 0
    }

    /// Fold the previous round into the streak and report whether a new
    /// round may start yet.
    pub fn observe(&mut self, policy: &BackoffPolicy, previous: &Round, now: i64) -> BackoffGate {
        if !previous.is_empty() {
            if self.consecutive_empty_rounds > 0 {
                info!(
                    round_id = previous.id,
                    prediction_count = previous.prediction_count,
                    "round had predictions, backoff reset"
                );
            }
            self.on_non_empty_round();
            return BackoffGate::Open;
        }

        if self.last_empty_round_id != Some(previous.id) {
            let wait_secs = self.on_empty_round(policy, now);
            self.last_empty_round_id = Some(previous.id);
            info!(
                round_id = previous.id,
                streak = self.consecutive_empty_rounds,
                wait_secs,
                "round closed with no predictions"
            );
        }

        match self.remaining_secs(policy, now) {
            0 => BackoffGate::Open,
            remaining_secs => BackoffGate::Waiting {
                streak: self.consecutive_empty_rounds,
                remaining_secs,
            },
        }
    }
}
