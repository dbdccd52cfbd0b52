use serde::Serialize;

/// `predictionRounds(id)` fields in contract order:
/// (forBlock, startTime, deadline, predictionCount, finalized, winner, actualPrice).
pub type RoundTuple = (u64, i64, i64, u64, bool, String, i64);

/// Fixed-point scale of `actual_price`.
pub const PRICE_SCALE: f64 = 1e8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Round {
    pub id: u64,
    pub for_block: u64,
    pub start_time: i64,
    pub deadline: i64,
    pub prediction_count: u64,
    pub finalized: bool,
    /// Empty until finalized.
    pub winner: String,
    /// Scaled by [`PRICE_SCALE`]; only meaningful once `finalized`.
    pub actual_price: i64,
}

impl Round {
    pub fn from_tuple(id: u64, fields: RoundTuple) -> Self {
        let (for_block, start_time, deadline, prediction_count, finalized, winner, actual_price) =
            fields;
        Self {
            id,
            for_block,
            start_time,
            deadline,
            prediction_count,
            finalized,
            winner,
            actual_price,
        }
    }

    pub fn is_past_deadline(&self, now: i64) -> bool {
        now >= self.deadline
    }

    pub fn remaining_secs(&self, now: i64) -> i64 {
        (self.deadline - now).max(0)
    }

    pub fn elapsed_secs(&self, now: i64) -> i64 {
        (now - self.start_time).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.prediction_count == 0
    }

    pub fn actual_price_display(&self) -> Option<f64> {
        self.finalized.then_some(self.actual_price as f64 / PRICE_SCALE)
    }
}
