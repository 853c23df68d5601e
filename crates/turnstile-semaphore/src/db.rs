use rusqlite::Connection;

use crate::error::Result;

/// Initialise the semaphore schema in `conn`.
///
/// Creates the `semaphores` table (idempotent) and an index on `expires_at`
/// so the external reaper's "expired rows" poll stays cheap. The uniqueness
/// of `key` is what turns concurrent creation into a detectable race.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS semaphores (
            key         TEXT    NOT NULL PRIMARY KEY,
            value       INTEGER NOT NULL,
            expires_at  TEXT    NOT NULL    -- ISO-8601
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_semaphores_expires_at
            ON semaphores (expires_at);
        ",
    )?;
    Ok(())
}
