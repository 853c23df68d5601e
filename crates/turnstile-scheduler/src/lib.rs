//! `turnstile-scheduler` — in-process recurring-job scheduling.
//!
//! Converts a static list of recurring-task definitions into live,
//! cancellable tokio timers. Each firing re-arms the task for its next
//! occurrence *before* handing the enqueue payload to the job store, so a
//! slow or failing enqueue can never stall the schedule, and recomputes the
//! next run from "now" so a delayed firing never drifts or double-fires.
//!
//! Errors escaping a firing are routed to the process-wide
//! [`turnstile_core::LifecycleHooks`] error callbacks; cancellation during
//! normal unload is expected and stays quiet.

pub mod error;
pub mod recurring;
pub mod schedule;
pub mod task;

pub use error::{EnqueueError, Result, SchedulerError};
pub use recurring::RecurringSchedule;
pub use schedule::compute_next_run;
pub use task::{Enqueue, RecurringTask, TaskPayload};
