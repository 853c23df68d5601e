use thiserror::Error;

/// Failure reported by the job store when persisting an enqueue.
///
/// Opaque by design: the scheduler only routes it, the embedding
/// application decides what it means.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EnqueueError(pub String);

/// Errors that can occur within the recurring-schedule subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A configured task's schedule has out-of-range or unusable fields.
    #[error("Invalid schedule for task {key}: {reason}")]
    InvalidSchedule { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
