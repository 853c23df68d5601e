use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use turnstile_core::ConcurrencyControlled;

use crate::{
    db::init_db,
    error::{Result, SemaphoreError},
    types::Semaphore,
};

/// Handle to the shared `semaphores` table.
///
/// Cheaply cloneable; the connection is shared behind a mutex so worker
/// threads within one process can issue operations concurrently. Across
/// processes nothing coordinates but the SQL itself: every mutation is a
/// single conditional statement whose row count tells us whether we won.
#[derive(Clone)]
pub struct SemaphoreStore {
    conn: Arc<Mutex<Connection>>,
}

impl SemaphoreStore {
    /// Wrap a connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Try to acquire one permit for the job's concurrency key.
    ///
    /// Never blocks on contention: `Ok(false)` means every permit is
    /// currently claimed and the caller should retry later. On success the
    /// row's lease is refreshed to `now + concurrency_duration`.
    pub fn wait(&self, job: &dyn ConcurrencyControlled) -> Result<bool> {
        let key = job.concurrency_key();
        let limit = effective_limit(job);
        let expires_at = lease_expiry(job);

        let conn = self.conn.lock().expect("semaphore connection poisoned");
        match find_value(&conn, key)? {
            // Row exists: a permit is free only if the guarded decrement
            // actually lands. The value check here is a cheap pre-filter;
            // the UPDATE predicate is what makes it safe.
            Some(value) => Ok(value > 0 && attempt_decrement(&conn, key, &expires_at)?),
            None => attempt_creation(&conn, key, limit, &expires_at),
        }
    }

    /// Release one permit: increment the counter unless it already sits at
    /// the job's limit. Returns whether the increment happened, so a stray
    /// or duplicate signal can never inflate the counter.
    pub fn signal(&self, job: &dyn ConcurrencyControlled) -> Result<bool> {
        let key = job.concurrency_key();
        let limit = effective_limit(job);
        let expires_at = lease_expiry(job);

        let conn = self.conn.lock().expect("semaphore connection poisoned");
        let changed = conn.execute(
            "UPDATE semaphores SET value = value + 1, expires_at = ?2
             WHERE key = ?1 AND value < ?3",
            params![key, expires_at, limit],
        )?;
        debug!(key = %key, released = changed > 0, "signal");
        Ok(changed > 0)
    }

    /// Bulk-release permits for a batch of finished jobs in one statement.
    ///
    /// Each distinct key is incremented once, however many jobs in the batch
    /// share it. Callers release permits they hold, which is what keeps the
    /// counters below their limits without a per-key guard here. Returns the
    /// number of rows touched.
    pub fn signal_all<'a, I, J>(&self, jobs: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a J>,
        J: ConcurrencyControlled + 'a,
    {
        let keys: Vec<&str> = jobs.into_iter().map(|j| j.concurrency_key()).collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "UPDATE semaphores SET value = value + 1 WHERE key IN ({placeholders})"
        );

        let conn = self.conn.lock().expect("semaphore connection poisoned");
        let changed = conn.execute(&sql, rusqlite::params_from_iter(keys.iter()))?;
        debug!(keys = keys.len(), rows = changed, "signal_all");
        Ok(changed)
    }

    /// Look up one row. Introspection and test support.
    pub fn find(&self, key: &str) -> Result<Option<Semaphore>> {
        let conn = self.conn.lock().expect("semaphore connection poisoned");
        let row = conn
            .query_row(
                "SELECT key, value, expires_at FROM semaphores WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        row.map(into_semaphore).transpose()
    }

    /// Rows with at least one free permit.
    pub fn available(&self) -> Result<Vec<Semaphore>> {
        self.select_where("value > 0", &[])
    }

    /// Rows whose lease has lapsed as of `now` — crashed holders that never
    /// signalled. Consumed by an external reaper; this core never deletes.
    pub fn expired(&self, now: DateTime<Utc>) -> Result<Vec<Semaphore>> {
        let cutoff = now.to_rfc3339();
        self.select_where("expires_at < ?1", &[&cutoff as &dyn rusqlite::ToSql])
    }

    fn select_where(
        &self,
        predicate: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Semaphore>> {
        let conn = self.conn.lock().expect("semaphore connection poisoned");
        let sql = format!(
            "SELECT key, value, expires_at FROM semaphores WHERE {predicate} ORDER BY key"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(String, i64, String)> = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(into_semaphore).collect()
    }
}

/// Register the key and claim its first permit in one atomic statement.
///
/// `ON CONFLICT DO NOTHING` folds "does the row exist" and "create it" into
/// a single insert, so losing the creation race is just a zero-row result:
/// with limit 1 the sole permit is already claimed by the winner, otherwise
/// spare permits may remain and the loser retries as a plain decrement.
fn attempt_creation(conn: &Connection, key: &str, limit: i64, expires_at: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO semaphores (key, value, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (key) DO NOTHING",
        params![key, limit - 1, expires_at],
    )?;
    if inserted > 0 {
        debug!(key = %key, limit, "semaphore created");
        Ok(true)
    } else if limit == 1 {
        Ok(false)
    } else {
        attempt_decrement(conn, key, expires_at)
    }
}

/// The compare-and-swap: take a permit only if one is free at write time.
fn attempt_decrement(conn: &Connection, key: &str, expires_at: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE semaphores SET value = value - 1, expires_at = ?2
         WHERE key = ?1 AND value > 0",
        params![key, expires_at],
    )?;
    Ok(changed > 0)
}

fn find_value(conn: &Connection, key: &str) -> Result<Option<i64>> {
    let value = conn
        .query_row("SELECT value FROM semaphores WHERE key = ?1", [key], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?;
    Ok(value)
}

fn effective_limit(job: &dyn ConcurrencyControlled) -> i64 {
    i64::from(job.concurrency_limit().unwrap_or(1).max(1))
}

fn lease_expiry(job: &dyn ConcurrencyControlled) -> String {
    (Utc::now() + job.concurrency_duration()).to_rfc3339()
}

fn into_semaphore((key, value, expires_at): (String, i64, String)) -> Result<Semaphore> {
    let parsed = DateTime::parse_from_rfc3339(&expires_at)
        .map_err(|_| SemaphoreError::CorruptTimestamp {
            key: key.clone(),
            value: expires_at,
        })?
        .with_timezone(&Utc);
    Ok(Semaphore {
        key,
        value,
        expires_at: parsed,
    })
}
