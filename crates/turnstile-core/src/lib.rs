//! `turnstile-core` — shared types for the Turnstile job-queue core.
//!
//! Holds the pieces both halves of the system consume: the job descriptor
//! trait the semaphore reads concurrency settings from, the TOML/env
//! configuration loader, and the lifecycle hook registry that routes
//! background-thread errors to whoever registered for them.

pub mod config;
pub mod error;
pub mod hooks;
pub mod job;

pub use config::{DatabaseConfig, RecurringTaskConfig, Schedule, TurnstileConfig};
pub use error::{CoreError, Result};
pub use hooks::{LifecycleHooks, ThreadError};
pub use job::{ConcurrencyControlled, JobDescriptor};
