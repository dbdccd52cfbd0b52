use rusqlite::{Connection, Result as SqlResult, params};
use std::fs::create_dir_all;
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, warn};

use super::schema::create_tables;

#[derive(Clone, Debug)]
pub struct TxLogConfig {
    pub path: String,
    pub batch_max: usize,
    pub batch_ms: u64,
    pub queue_cap: usize,
    pub retention_days: u64,
    pub keeper_instance_id: String,
}

impl TxLogConfig {
    pub fn new(path: impl Into<String>, keeper_instance_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            batch_max: 64,
            batch_ms: 1_000,
            queue_cap: 1_024,
            retention_days: 30,
            keeper_instance_id: keeper_instance_id.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxOp {
    StartRound,
    OracleUpdate,
    FinalizeRound,
}

impl TxOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartRound => "start_round",
            Self::OracleUpdate => "oracle_update",
            Self::FinalizeRound => "finalize_round",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed,
    /// Broadcast, receipt not awaited to completion.
    Submitted,
    Reverted,
    Timeout,
    AlreadyKnown,
    Rejected,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Submitted => "submitted",
            Self::Reverted => "reverted",
            Self::Timeout => "timeout",
            Self::AlreadyKnown => "already_known",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TxLog {
    pub op: TxOp,
    pub round_id: Option<u64>,
    pub tx_hash: Option<String>,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub status: TxStatus,
    pub error_message: Option<String>,
}

/// Append-only audit trail of submitted transactions, written by a
/// background thread so recording never blocks a tick.
pub struct TxLogger {
    tx: SyncSender<TxLog>,
    handle: JoinHandle<()>,
}

impl TxLogger {
    pub fn start(cfg: TxLogConfig) -> SqlResult<Self> {
        if let Some(parent) = Path::new(&cfg.path).parent() {
            let _ = create_dir_all(parent);
        }
        let conn = Connection::open(&cfg.path)?;
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        conn.busy_timeout(Duration::from_millis(5000))?;
        create_tables(&conn)?;

        let (tx, rx) = sync_channel::<TxLog>(cfg.queue_cap);
        let handle = thread::spawn(move || writer_loop(conn, rx, cfg));

        Ok(Self { tx, handle })
    }

    /// Queue an entry; dropped with a warning when the writer falls behind.
    pub fn record(&self, entry: TxLog) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                warn!(op = entry.op.as_str(), "tx log queue full, dropping entry")
            }
            Err(TrySendError::Disconnected(_)) => warn!("tx log writer stopped"),
        }
    }

    /// Flush everything queued and stop the writer thread.
    pub fn shutdown(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            error!("tx log writer panicked");
        }
    }
}

fn writer_loop(mut conn: Connection, rx: Receiver<TxLog>, cfg: TxLogConfig) {
    let mut buffer: Vec<TxLog> = Vec::with_capacity(cfg.batch_max);
    let mut last_flush = Instant::now();
    let flush_interval = Duration::from_millis(cfg.batch_ms);
    let mut last_retention = Instant::now();
    let retention_interval = Duration::from_secs(3600);

    loop {
        let disconnected = match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(item) => {
                buffer.push(item);
                false
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => true,
        };

        let need_time_flush = last_flush.elapsed() >= flush_interval;
        let need_size_flush = buffer.len() >= cfg.batch_max;

        if !buffer.is_empty() && (need_time_flush || need_size_flush || disconnected) {
            if let Err(err) = flush(&mut conn, &mut buffer, &cfg.keeper_instance_id) {
                error!(error = %err, "tx log flush failed");
                buffer.clear();
            }
            last_flush = Instant::now();

            if last_retention.elapsed() >= retention_interval {
                let _ = conn.execute(
                    "DELETE FROM tx_log WHERE timestamp < datetime('now', ?)",
                    [format!("-{} days", cfg.retention_days)],
                );
                last_retention = Instant::now();
            }
        }

        if disconnected {
            let _ = conn.execute("PRAGMA wal_checkpoint(TRUNCATE)", []);
            return;
        }
    }
}

fn flush(conn: &mut Connection, buffer: &mut Vec<TxLog>, instance_id: &str) -> SqlResult<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO tx_log (
                keeper_instance_id, op, round_id, tx_hash, nonce,
                gas_limit, status, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for e in buffer.drain(..) {
            stmt.execute(params![
                instance_id,
                e.op.as_str(),
                e.round_id.map(|v| v as i64),
                e.tx_hash,
                e.nonce.map(|v| v as i64),
                e.gas_limit.map(|v| v as i64),
                e.status.as_str(),
                e.error_message,
            ])?;
        }
    }
    tx.commit()
}
