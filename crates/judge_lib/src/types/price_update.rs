use alloy::primitives::{Bytes, U256};

/// Signed price blob from the feed service plus the fee the oracle contract
/// charges to post it. Re-fetched on every finalize attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceUpdate {
    pub payload: Bytes,
    pub fee: U256,
}
