use anyhow::Result;
use judge_keeper::{
    App, config,
    keepers::{
        finalize_round::FinalizeOutcome,
        orchestrator::{Orchestrator, TickOutcome},
        start_round::StartOutcome,
    },
};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load()?;
    judge_keeper::logging::init_tracing(&cfg);

    let period = Duration::from_secs(cfg.tick_period_in_secs);
    let start = Instant::now();
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(period_secs = cfg.tick_period_in_secs, "starting judge keeper");
    let app = App::init_from(cfg)?;
    let mut orchestrator = Orchestrator::new(app);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }

        let now = chrono::Utc::now().timestamp();
        match orchestrator.tick(now).await {
            Ok(TickOutcome::Start(StartOutcome::Started { tx_hash, block_number })) => {
                info!(%tx_hash, block_number, "started round");
            }
            Ok(TickOutcome::Finalize {
                round_id,
                outcome: FinalizeOutcome::Submitted { tx_hash, .. },
            }) => {
                info!(round_id, %tx_hash, "finalize submitted");
            }
            Ok(outcome) => {
                tracing::debug!(?outcome, "tick complete");
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "tick failed, retrying next tick");
            }
            Err(e) => {
                error!(error = %e, "tick error");
            }
        }
    }

    orchestrator.into_app().shutdown();
    Ok(())
}
