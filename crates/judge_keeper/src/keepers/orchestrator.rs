use judge_lib::{error::LedgerError, types::Round};
use tokio::sync::watch;
use tracing::{debug, info};

use super::{
    backoff::BackoffState,
    finalize_round::{FinalizeOutcome, finalize_round},
    round_state::{RoundState, read_current_round},
    start_round::{StartOutcome, try_start_round},
    status::StatusSnapshot,
};
use crate::App;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Start(StartOutcome),
    /// The current round is still accepting predictions.
    Waiting { round_id: u64, remaining_secs: i64 },
    Finalize { round_id: u64, outcome: FinalizeOutcome },
}

/// Owns the backoff state and drives one keeper decision per tick.
pub struct Orchestrator {
    app: App,
    backoff: BackoffState,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl Orchestrator {
    pub fn new(app: App) -> Self {
        let (status_tx, _) = watch::channel(StatusSnapshot::default());
        Self {
            app,
            backoff: BackoffState::default(),
            status_tx,
        }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    pub fn into_app(self) -> App {
        self.app
    }

    /// Read the current round and take at most one action on it. Errors
    /// leave the backoff state as it was; the next tick retries.
    pub async fn tick(&mut self, now: i64) -> Result<TickOutcome, LedgerError> {
        let round = read_current_round(self.app.ledger()).await?;
        let state = RoundState::classify(round.clone(), now);

        let pending_work = match &state {
            RoundState::NoRound | RoundState::Finalized(_) => {
                Some(self.app.ledger().pending_work_count().await?)
            }
            RoundState::BeforeDeadline(_) | RoundState::PastDeadline(_) => None,
        };
        // A busy round clears the streak even when nothing can start yet.
        match &state {
            RoundState::Finalized(previous) if !previous.is_empty() => {
                self.backoff.observe(&self.app.settings().backoff, previous, now);
            }
            _ => {}
        }
        self.publish(round, pending_work, now);

        let outcome = match state {
            RoundState::NoRound => {
                let outcome = try_start_round(
                    &self.app,
                    &mut self.backoff,
                    None,
                    pending_work.unwrap_or_default(),
                    now,
                )
                .await?;
                TickOutcome::Start(outcome)
            }
            RoundState::Finalized(previous) => {
                let outcome = try_start_round(
                    &self.app,
                    &mut self.backoff,
                    Some(&previous),
                    pending_work.unwrap_or_default(),
                    now,
                )
                .await?;
                TickOutcome::Start(outcome)
            }
            RoundState::BeforeDeadline(round) => {
                let remaining_secs = round.remaining_secs(now);
                debug!(
                    round_id = round.id,
                    remaining_secs,
                    prediction_count = round.prediction_count,
                    "round accepting predictions"
                );
                TickOutcome::Waiting {
                    round_id: round.id,
                    remaining_secs,
                }
            }
            RoundState::PastDeadline(round) => {
                let outcome = finalize_round(&self.app, &round, now).await?;
                TickOutcome::Finalize {
                    round_id: round.id,
                    outcome,
                }
            }
        };

        // Backoff may have moved during the start decision.
        self.status_tx
            .send_modify(|snapshot| snapshot.backoff = self.backoff.clone());
        if let TickOutcome::Start(StartOutcome::Started { tx_hash, .. }) = &outcome {
            info!(%tx_hash, "new round opened");
        }
        Ok(outcome)
    }

    fn publish(&self, round: Option<Round>, pending_work: Option<u64>, now: i64) {
        self.status_tx.send_replace(StatusSnapshot {
            round,
            backoff: self.backoff.clone(),
            pending_work,
            observed_at: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        keepers::finalize_round::Confirmation,
        testing::{Call, fake_app},
    };

    fn open_round(prediction_count: u64, finalized: bool) -> judge_lib::types::RoundTuple {
        (100, 1_000, 1_060, prediction_count, finalized, String::new(), 0)
    }

    #[tokio::test]
    async fn starts_first_round_when_work_is_pending() {
        let (app, ledger, _) = fake_app();
        ledger.state().pending_work = 2;
        let mut orch = Orchestrator::new(app);

        let outcome = orch.tick(1_000).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Start(StartOutcome::Started { .. })));
        assert_eq!(ledger.state().round_id, 1);
    }

    #[tokio::test]
    async fn idle_without_pending_work() {
        let (app, ledger, _) = fake_app();
        let mut orch = Orchestrator::new(app);

        for now in [1_000, 1_005, 1_010] {
            let outcome = orch.tick(now).await.unwrap();
            assert_eq!(outcome, TickOutcome::Start(StartOutcome::PoolEmpty));
        }
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn waits_before_deadline() {
        let (app, ledger, oracle) = fake_app();
        ledger.put_round(1, open_round(3, false));
        let mut orch = Orchestrator::new(app);

        let outcome = orch.tick(1_030).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Waiting {
                round_id: 1,
                remaining_secs: 30
            }
        );
        assert!(ledger.calls().is_empty());
        assert_eq!(oracle.requests(), 0);
    }

    #[tokio::test]
    async fn finalizes_at_deadline() {
        let (app, ledger, _) = fake_app();
        ledger.put_round(1, open_round(3, false));
        let mut orch = Orchestrator::new(app);

        let outcome = orch.tick(1_060).await.unwrap();
        let TickOutcome::Finalize { round_id, outcome } = outcome else {
            panic!("expected finalize, got {outcome:?}");
        };
        assert_eq!(round_id, 1);
        assert!(matches!(
            outcome,
            FinalizeOutcome::Submitted {
                confirmation: Confirmation::Confirmed { .. },
                ..
            }
        ));
        assert!(ledger.state().rounds[&1].4);
    }

    #[tokio::test]
    async fn full_cycle_with_empty_round_backoff() {
        let (app, ledger, _) = fake_app();
        ledger.state().pending_work = 1;
        ledger.state().clock = 1_000;
        let mut orch = Orchestrator::new(app);

        // Round 1 opens and runs out its window with no predictions.
        assert!(matches!(
            orch.tick(1_000).await.unwrap(),
            TickOutcome::Start(StartOutcome::Started { .. })
        ));
        assert!(matches!(
            orch.tick(1_030).await.unwrap(),
            TickOutcome::Waiting { round_id: 1, .. }
        ));
        assert!(matches!(
            orch.tick(1_060).await.unwrap(),
            TickOutcome::Finalize { round_id: 1, .. }
        ));

        // Finalized and empty: wait out the base delay before reopening.
        assert_eq!(
            orch.tick(1_065).await.unwrap(),
            TickOutcome::Start(StartOutcome::BackoffPending {
                streak: 1,
                remaining_secs: 30
            })
        );
        assert_eq!(orch.backoff().consecutive_empty_rounds, 1);
        assert_eq!(
            orch.tick(1_080).await.unwrap(),
            TickOutcome::Start(StartOutcome::BackoffPending {
                streak: 1,
                remaining_secs: 15
            })
        );
        assert!(matches!(
            orch.tick(1_095).await.unwrap(),
            TickOutcome::Start(StartOutcome::Started { .. })
        ));
        assert_eq!(ledger.state().round_id, 2);
        assert_eq!(orch.backoff().consecutive_empty_rounds, 1);
    }

    #[tokio::test]
    async fn oracle_outage_leaves_round_open() {
        let (app, ledger, oracle) = fake_app();
        oracle.set_payload(None);
        ledger.put_round(1, open_round(3, false));
        let mut orch = Orchestrator::new(app);

        for now in [1_060, 1_065] {
            let outcome = orch.tick(now).await.unwrap();
            assert_eq!(
                outcome,
                TickOutcome::Finalize {
                    round_id: 1,
                    outcome: FinalizeOutcome::OracleUnavailable
                }
            );
        }
        assert!(ledger.calls().is_empty());
        assert!(!ledger.state().rounds[&1].4);
    }

    #[tokio::test]
    async fn read_failure_keeps_backoff_and_retries() {
        let (app, ledger, _) = fake_app();
        ledger.state().fail_reads = true;
        let mut orch = Orchestrator::new(app);

        let err = orch.tick(1_000).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(orch.backoff(), &BackoffState::default());

        ledger.state().fail_reads = false;
        assert_eq!(
            orch.tick(1_005).await.unwrap(),
            TickOutcome::Start(StartOutcome::PoolEmpty)
        );
    }

    #[tokio::test]
    async fn publishes_status_after_each_tick() {
        let (app, ledger, _) = fake_app();
        ledger.state().pending_work = 1;
        ledger.put_round(4, open_round(0, true));
        let mut orch = Orchestrator::new(app);
        let mut rx = orch.subscribe();

        orch.tick(1_100).await.unwrap();
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.observed_at, 1_100);
        assert_eq!(snapshot.round.as_ref().map(|r| r.id), Some(4));
        assert_eq!(snapshot.backoff.consecutive_empty_rounds, 1);
        assert_eq!(snapshot.pending_work, Some(1));
        assert_eq!(orch.status(), snapshot);
    }

    #[tokio::test]
    async fn busy_round_resets_streak_while_pool_is_empty() {
        let (app, ledger, _) = fake_app();
        ledger.put_round(7, open_round(5, true));
        let mut orch = Orchestrator::new(app);
        orch.backoff = BackoffState {
            consecutive_empty_rounds: 3,
            last_empty_round_at: Some(1_050),
            last_empty_round_id: Some(6),
        };

        let outcome = orch.tick(1_100).await.unwrap();
        assert_eq!(outcome, TickOutcome::Start(StartOutcome::PoolEmpty));
        assert_eq!(orch.backoff(), &BackoffState::default());

        let status = orch.status();
        assert_eq!(status.backoff.consecutive_empty_rounds, 0);
        assert_eq!(status.pending_work, Some(0));
        assert!(ledger.calls().is_empty());
    }

    #[tokio::test]
    async fn running_round_skips_pool_read() {
        let (app, ledger, _) = fake_app();
        ledger.state().pending_work = 9;
        ledger.put_round(1, open_round(3, false));
        let mut orch = Orchestrator::new(app);

        orch.tick(1_010).await.unwrap();
        assert_eq!(orch.status().pending_work, None);
    }

    #[tokio::test]
    async fn nonces_advance_across_all_three_writes() {
        let (app, ledger, _) = fake_app();
        ledger.state().pending_work = 1;
        let mut orch = Orchestrator::new(app);

        orch.tick(0).await.unwrap();
        orch.tick(60).await.unwrap();

        let nonces: Vec<u64> = ledger
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::StartRound(p) => Some(p.nonce),
                Call::OracleUpdate { params, .. } | Call::Finalize { params, .. } => {
                    Some(params.nonce)
                }
                Call::Wait(_) => None,
            })
            .collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }
}
