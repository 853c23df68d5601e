use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use turnstile_core::{RecurringTaskConfig, Schedule};

use crate::error::EnqueueError;
use crate::schedule::compute_next_run;

/// Everything the job store needs to persist one execution of a recurring
/// task. Opaque to the scheduler beyond the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPayload {
    /// The recurring task this execution belongs to.
    pub task_key: String,
    /// Job class name resolved by the worker-side dispatcher.
    pub class: String,
    /// Pass-through JSON arguments.
    pub args: serde_json::Value,
    pub queue: Option<String>,
    pub priority: Option<i32>,
}

/// The job-record persistence seam.
///
/// `scheduled_at` is the run time the firing was armed for, not the instant
/// it actually fired — downstream deduplication keys off the logical time.
pub trait Enqueue: Send + Sync {
    fn enqueue(
        &self,
        payload: &TaskPayload,
        scheduled_at: DateTime<Utc>,
    ) -> std::result::Result<(), EnqueueError>;
}

/// One configured recurring job, bound to the enqueue collaborator.
///
/// Immutable after [`RecurringTask::wrap`]; the schedule only reads it.
#[derive(Clone)]
pub struct RecurringTask {
    key: String,
    schedule: Schedule,
    payload: TaskPayload,
    enqueuer: Arc<dyn Enqueue>,
}

impl RecurringTask {
    /// Build a task from its plain configuration record.
    pub fn wrap(config: RecurringTaskConfig, enqueuer: Arc<dyn Enqueue>) -> Self {
        let payload = TaskPayload {
            task_key: config.key.clone(),
            class: config.class,
            args: config.args,
            queue: config.queue,
            priority: config.priority,
        };
        Self {
            key: config.key,
            schedule: config.schedule,
            payload,
            enqueuer,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Next run time strictly after `now`, or `None` when the schedule
    /// cannot produce one.
    pub fn next_run_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        compute_next_run(&self.schedule, now)
    }

    /// How long until the next run, clamped to zero when it is already due.
    pub fn delay_from(&self, now: DateTime<Utc>) -> std::time::Duration {
        self.next_run_time(now)
            .and_then(|target| (target - now).to_std().ok())
            .unwrap_or_default()
    }

    /// Hand this task's payload to the job store, stamped with the logical
    /// run time the firing was armed for.
    pub fn enqueue(&self, scheduled_at: DateTime<Utc>) -> std::result::Result<(), EnqueueError> {
        self.enqueuer.enqueue(&self.payload, scheduled_at)
    }

    /// Introspection snapshot: the task as configured.
    pub fn describe(&self) -> serde_json::Value {
        json!({
            "key": self.key,
            "schedule": self.schedule,
            "class": self.payload.class,
            "args": self.payload.args,
            "queue": self.payload.queue,
            "priority": self.payload.priority,
        })
    }
}

impl std::fmt::Debug for RecurringTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringTask")
            .field("key", &self.key)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}
