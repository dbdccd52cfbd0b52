pub mod client;
pub mod error;
pub mod feed;
pub mod storage;
pub mod types;
pub mod wallet;

pub use alloy::primitives::{Address, B256, Bytes, TxHash, U256};
