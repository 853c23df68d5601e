use chrono::Duration;

/// Default lease length when a job does not specify one (3 minutes).
pub const DEFAULT_CONCURRENCY_DURATION_SECS: i64 = 180;

/// What the semaphore needs to know about a job to limit its concurrency.
///
/// Implemented by whatever job record the embedding application persists;
/// [`JobDescriptor`] is a ready-made value type for callers (and tests)
/// that don't have their own.
pub trait ConcurrencyControlled {
    /// The logical resource name this job serializes access to.
    fn concurrency_key(&self) -> &str;

    /// Maximum number of jobs sharing the key that may run at once.
    /// `None` means 1.
    fn concurrency_limit(&self) -> Option<u32> {
        None
    }

    /// Lease length: how long a claimed permit is considered held before an
    /// external reaper may reclaim it from a crashed holder.
    fn concurrency_duration(&self) -> Duration;
}

/// Plain concurrency settings for one job.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub concurrency_key: String,
    pub concurrency_limit: Option<u32>,
    pub concurrency_duration: Duration,
}

impl JobDescriptor {
    /// Descriptor with the default limit (1) and lease length.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            concurrency_key: key.into(),
            concurrency_limit: None,
            concurrency_duration: Duration::seconds(DEFAULT_CONCURRENCY_DURATION_SECS),
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.concurrency_duration = duration;
        self
    }
}

impl ConcurrencyControlled for JobDescriptor {
    fn concurrency_key(&self) -> &str {
        &self.concurrency_key
    }

    fn concurrency_limit(&self) -> Option<u32> {
        self.concurrency_limit
    }

    fn concurrency_duration(&self) -> Duration {
        self.concurrency_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults() {
        let job = JobDescriptor::new("mailer/42");
        assert_eq!(job.concurrency_key(), "mailer/42");
        assert_eq!(job.concurrency_limit(), None);
        assert_eq!(
            job.concurrency_duration(),
            Duration::seconds(DEFAULT_CONCURRENCY_DURATION_SECS)
        );
    }

    #[test]
    fn descriptor_builders() {
        let job = JobDescriptor::new("imports")
            .with_limit(5)
            .with_duration(Duration::seconds(30));
        assert_eq!(job.concurrency_limit(), Some(5));
        assert_eq!(job.concurrency_duration(), Duration::seconds(30));
    }
}
