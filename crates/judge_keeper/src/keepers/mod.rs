pub mod backoff;
pub mod finalize_round;
pub mod orchestrator;
pub mod round_state;
pub mod start_round;
pub mod status;
