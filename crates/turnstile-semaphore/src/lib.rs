//! `turnstile-semaphore` — a distributed counting semaphore over SQLite.
//!
//! Many independent worker processes share one `semaphores` table; every
//! mutation is a single predicate-guarded statement, so mutual exclusion
//! holds under arbitrary process interleavings without any in-process lock.
//!
//! # Protocol
//!
//! | operation | statement | succeeds when |
//! |---|---|---|
//! | `wait` (no row) | `INSERT … ON CONFLICT DO NOTHING` | the insert wins the creation race |
//! | `wait` (row)    | `UPDATE … SET value = value - 1 WHERE value > 0` | a permit was still free |
//! | `signal`        | `UPDATE … SET value = value + 1 WHERE value < limit` | the counter was below the limit |
//!
//! A `false` from [`SemaphoreStore::wait`] means "try again later", never an
//! error. Rows carry an `expires_at` lease so an external reaper can reclaim
//! permits from crashed holders; this crate only writes the timestamp and
//! exposes the [`SemaphoreStore::expired`] query.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, SemaphoreError};
pub use store::SemaphoreStore;
pub use types::Semaphore;
