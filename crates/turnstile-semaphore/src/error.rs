use thiserror::Error;

/// Errors that can occur within the semaphore subsystem.
///
/// The creation race (two processes inserting the same key) is recovered
/// internally and never surfaces here; anything that does is fatal to the
/// attempt and left to the caller.
#[derive(Debug, Error)]
pub enum SemaphoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored timestamp failed to parse back as RFC 3339.
    #[error("Corrupt expires_at for key {key}: {value}")]
    CorruptTimestamp { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, SemaphoreError>;
