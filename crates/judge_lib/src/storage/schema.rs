use rusqlite::{Connection, Result};

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS tx_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
            keeper_instance_id TEXT NOT NULL,         -- hostname:pid unless configured
            op TEXT NOT NULL,                         -- start_round|oracle_update|finalize_round
            round_id INTEGER,
            tx_hash TEXT,
            nonce INTEGER,
            gas_limit INTEGER,
            status TEXT NOT NULL,                     -- confirmed|submitted|reverted|timeout|already_known|rejected
            error_message TEXT
        )
        "#,
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_log_ts ON tx_log(timestamp)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_log_round ON tx_log(round_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_log_hash ON tx_log(tx_hash)",
        [],
    )?;

    Ok(())
}
