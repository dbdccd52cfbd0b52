//! In-memory ledger and oracle used by the keeper tests.

use async_trait::async_trait;
use judge_lib::{
    B256, Bytes, TxHash, U256,
    client::{
        ledger::{Ledger, TxParams, TxReceipt},
        oracle::Oracle,
    },
    error::{LedgerError, OracleError},
    types::RoundTuple,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{
    App, KeeperSettings,
    keepers::{backoff::BackoffPolicy, finalize_round::FinalizeGasPolicy},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    StartRound,
    OracleUpdate,
    Finalize,
}

/// Writes and receipt waits, in submission order. Reads are not recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    StartRound(TxParams),
    OracleUpdate { fee: U256, params: TxParams },
    Finalize { feed_id: B256, params: TxParams },
    Wait(TxHash),
}

pub struct LedgerState {
    pub round_id: u64,
    pub rounds: HashMap<u64, RoundTuple>,
    pub pending_work: u64,
    pub nonce: u64,
    pub gas_price: u128,
    pub update_fee: U256,
    pub fail_reads: bool,
    /// Send error returned for every submission.
    pub submit_error: Option<String>,
    pub submit_error_for: HashMap<Op, String>,
    /// Ops whose receipts come back with a failed status.
    pub revert: HashSet<Op>,
    /// Ops whose receipts never arrive.
    pub unconfirmed: HashSet<Op>,
    /// Start time given to rounds opened through the fake.
    pub clock: i64,
    pub round_secs: i64,
    pub calls: Vec<Call>,
    sent: HashMap<TxHash, (Op, u64)>,
    tx_count: u64,
}

pub struct FakeLedger {
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                round_id: 0,
                rounds: HashMap::new(),
                pending_work: 0,
                nonce: 0,
                gas_price: 1_000_000_000,
                update_fee: U256::from(1u64),
                fail_reads: false,
                submit_error: None,
                submit_error_for: HashMap::new(),
                revert: HashSet::new(),
                unconfirmed: HashSet::new(),
                clock: 0,
                round_secs: 60,
                calls: Vec::new(),
                sent: HashMap::new(),
                tx_count: 0,
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    /// Store a round and make it the current one.
    pub fn put_round(&self, id: u64, fields: RoundTuple) {
        let mut state = self.state();
        state.rounds.insert(id, fields);
        state.round_id = state.round_id.max(id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> Result<T, LedgerError> {
        let state = self.state();
        if state.fail_reads {
            return Err(LedgerError::Read("connection refused".to_string()));
        }
        Ok(f(&state))
    }

    fn submit(&self, op: Op, call: Call, nonce: u64) -> Result<TxHash, LedgerError> {
        let mut state = self.state();
        state.calls.push(call);
        let configured = state
            .submit_error_for
            .get(&op)
            .cloned()
            .or_else(|| state.submit_error.clone());
        if let Some(message) = configured {
            return Err(LedgerError::from_submit_message(message));
        }

        state.tx_count += 1;
        state.nonce = nonce + 1;
        let tx_hash = B256::left_padding_from(&state.tx_count.to_be_bytes());
        let round_id = state.round_id;
        state.sent.insert(tx_hash, (op, round_id));
        Ok(tx_hash)
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn current_round_id(&self) -> Result<u64, LedgerError> {
        self.read(|s| s.round_id)
    }

    async fn round_by_id(&self, round_id: u64) -> Result<RoundTuple, LedgerError> {
        self.read(|s| s.rounds.get(&round_id).cloned())?
            .ok_or_else(|| LedgerError::Read(format!("round {round_id} not found")))
    }

    async fn pending_work_count(&self) -> Result<u64, LedgerError> {
        self.read(|s| s.pending_work)
    }

    async fn current_nonce(&self) -> Result<u64, LedgerError> {
        self.read(|s| s.nonce)
    }

    async fn current_gas_price(&self) -> Result<u128, LedgerError> {
        self.read(|s| s.gas_price)
    }

    async fn quote_update_fee(&self, _payload: &Bytes) -> Result<U256, LedgerError> {
        self.read(|s| s.update_fee)
    }

    async fn submit_start_round(&self, params: TxParams) -> Result<TxHash, LedgerError> {
        self.submit(Op::StartRound, Call::StartRound(params), params.nonce)
    }

    async fn submit_oracle_update(
        &self,
        _payload: &Bytes,
        fee: U256,
        params: TxParams,
    ) -> Result<TxHash, LedgerError> {
        self.submit(
            Op::OracleUpdate,
            Call::OracleUpdate { fee, params },
            params.nonce,
        )
    }

    async fn submit_finalize(
        &self,
        feed_id: B256,
        params: TxParams,
    ) -> Result<TxHash, LedgerError> {
        self.submit(Op::Finalize, Call::Finalize { feed_id, params }, params.nonce)
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, LedgerError> {
        let mut state = self.state();
        state.calls.push(Call::Wait(tx_hash));
        let Some(&(op, round_id)) = state.sent.get(&tx_hash) else {
            return Err(LedgerError::Read(format!("unknown transaction {tx_hash}")));
        };
        if state.unconfirmed.contains(&op) {
            return Err(LedgerError::ConfirmationTimeout {
                hash: tx_hash,
                secs: timeout.as_secs(),
            });
        }

        let mut success = !state.revert.contains(&op);
        if success {
            match op {
                Op::StartRound => {
                    let id = state.round_id + 1;
                    let start = state.clock;
                    let deadline = start + state.round_secs;
                    state.rounds.insert(
                        id,
                        (id * 10, start, deadline, 0, false, String::new(), 0),
                    );
                    state.round_id = id;
                }
                Op::OracleUpdate => {}
                Op::Finalize => match state.rounds.get_mut(&round_id) {
                    Some(round) if !round.4 => round.4 = true,
                    _ => success = false,
                },
            }
        }

        Ok(TxReceipt {
            tx_hash,
            success,
            block_number: Some(1),
        })
    }
}

pub struct FakeOracle {
    payload: Mutex<Option<Vec<u8>>>,
    failing: AtomicBool,
    requests: AtomicUsize,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self {
            payload: Mutex::new(Some(vec![0x50, 0x4e, 0x41, 0x55])),
            failing: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_payload(&self, payload: Option<Vec<u8>>) {
        *self.payload.lock().unwrap() = payload;
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for FakeOracle {
    async fn fetch_latest_update(&self, _feed_id: B256) -> Result<Option<Bytes>, OracleError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(OracleError::Request("503 Service Unavailable".to_string()));
        }
        Ok(self.payload.lock().unwrap().clone().map(Bytes::from))
    }
}

pub fn test_settings() -> KeeperSettings {
    KeeperSettings {
        feed_id: B256::repeat_byte(0x11),
        start_round_gas_limit: 500_000,
        oracle_update_gas_limit: 500_000,
        finalize_gas: FinalizeGasPolicy::default(),
        start_confirm_timeout: Duration::from_secs(60),
        oracle_confirm_timeout: Duration::from_secs(120),
        finalize_confirm_timeout: Duration::from_secs(120),
        backoff: BackoffPolicy::default(),
    }
}

pub fn fake_app() -> (App, Arc<FakeLedger>, Arc<FakeOracle>) {
    let ledger = Arc::new(FakeLedger::new());
    let oracle = Arc::new(FakeOracle::new());
    let app = App::new(ledger.clone(), oracle.clone(), test_settings());
    (app, ledger, oracle)
}
