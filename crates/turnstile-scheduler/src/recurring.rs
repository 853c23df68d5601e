use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use turnstile_core::{LifecycleHooks, RecurringTaskConfig, ThreadError};

use crate::error::{Result, SchedulerError};
use crate::schedule::validate;
use crate::task::{Enqueue, RecurringTask};

/// A live one-shot timer for a task's next occurrence.
struct ArmedTimer {
    abort: AbortHandle,
    /// Epoch current when this timer was armed; a bumped epoch makes it inert.
    epoch: u64,
    /// The run time the timer was armed for — stamped onto the enqueue.
    target: DateTime<Utc>,
}

/// The live mapping from recurring-task key to its armed timer.
///
/// Owns every timer it arms; at most one timer per task key is live at any
/// time. Timer callbacks fire on runtime worker threads, so the mapping is a
/// concurrent map and all shared state lives behind `Arc`.
///
/// Unloading and an in-flight firing can race; the epoch counter resolves
/// it: [`RecurringSchedule::unload_tasks`] bumps the epoch before cancelling,
/// and a firing armed under a stale epoch neither re-arms nor enqueues — it
/// removes its own leftover entry and stops. No enqueue ever happens after
/// unload returns. A timer also never starts until its map entry is in
/// place, so a near-immediate firing cannot be clobbered by the arm call
/// that created it.
pub struct RecurringSchedule {
    inner: Arc<Inner>,
}

struct Inner {
    configured: Vec<RecurringTask>,
    armed: DashMap<String, ArmedTimer>,
    hooks: Arc<LifecycleHooks>,
    epoch: AtomicU64,
}

impl RecurringSchedule {
    /// Wrap the configured task definitions, binding each to the job store.
    ///
    /// Rejects definitions whose schedule fields are out of range; nothing
    /// is armed until [`RecurringSchedule::load_tasks`].
    pub fn new(
        configs: Vec<RecurringTaskConfig>,
        enqueuer: Arc<dyn Enqueue>,
        hooks: Arc<LifecycleHooks>,
    ) -> Result<Self> {
        let mut configured = Vec::with_capacity(configs.len());
        for config in configs {
            validate(&config.schedule).map_err(|reason| SchedulerError::InvalidSchedule {
                key: config.key.clone(),
                reason,
            })?;
            configured.push(RecurringTask::wrap(config, Arc::clone(&enqueuer)));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                configured,
                armed: DashMap::new(),
                hooks,
                epoch: AtomicU64::new(0),
            }),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.inner.configured.is_empty()
    }

    /// Arm a timer for every configured task, superseding prior entries.
    pub fn load_tasks(&self) {
        for task in &self.inner.configured {
            arm(&self.inner, task.clone());
        }
    }

    /// Arm (or re-arm) the timer for one task.
    pub fn load_task(&self, task: &RecurringTask) {
        arm(&self.inner, task.clone());
    }

    /// Cancel every armed timer and clear the mapping.
    ///
    /// Cancellation racing an in-flight firing is expected and is never
    /// reported as an error.
    pub fn unload_tasks(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        for entry in self.inner.armed.iter() {
            entry.value().abort.abort();
        }
        self.inner.armed.clear();
        debug!("recurring tasks unloaded");
    }

    /// Snapshot of the configured tasks, keyed by task key.
    pub fn tasks(&self) -> HashMap<String, serde_json::Value> {
        self.inner
            .configured
            .iter()
            .map(|task| (task.key().to_string(), task.describe()))
            .collect()
    }

    /// The run time the named task is currently armed for, if any.
    pub fn armed_run_time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.inner.armed.get(key).map(|entry| entry.target)
    }
}

impl std::fmt::Debug for RecurringSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.inner.configured.iter().map(|t| t.key()).collect();
        f.debug_struct("RecurringSchedule")
            .field("configured", &keys)
            .field("armed", &self.inner.armed.len())
            .finish()
    }
}

/// Arm a one-shot timer for the task's next occurrence.
///
/// The spawned callback re-arms the task *before* enqueuing, from a fresh
/// "now", so a slow or failing enqueue never stalls the series and a late
/// firing never drifts the schedule or produces catch-up runs.
fn arm(inner: &Arc<Inner>, task: RecurringTask) {
    let now = Utc::now();
    let Some(target) = task.next_run_time(now) else {
        warn!(key = %task.key(), "task has no computable next run; not armed");
        return;
    };
    let delay = (target - now).to_std().unwrap_or_default();
    let epoch = inner.epoch.load(Ordering::SeqCst);
    let key = task.key().to_string();

    let timer_inner = Arc::clone(inner);
    let timer_task = task;
    let (armed_tx, armed_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        // Hold until our map entry is in place. Without this, a timer with
        // a near-zero delay could fire and re-arm before the arming call's
        // insert lands; that insert would then clobber the fresh entry and
        // cancel its timer, silently ending the series.
        if armed_rx.await.is_err() {
            return;
        }

        tokio::time::sleep(delay).await;

        // Armed under an epoch that has since been unloaded: stay inert.
        // The entry may have landed after the unload's clear, so drop it
        // rather than leave a target armed that will never fire.
        if timer_inner.epoch.load(Ordering::SeqCst) != epoch {
            timer_inner
                .armed
                .remove_if(timer_task.key(), |_, timer| timer.epoch == epoch);
            return;
        }

        arm(&timer_inner, timer_task.clone());

        if let Err(err) = timer_task.enqueue(target) {
            timer_inner
                .hooks
                .handle_thread_error(&ThreadError::Execution(err.to_string()));
        }
    });

    // Observe the timer's outcome: a panic reaches the error hook, while a
    // cancelled timer is the normal unload path and stays quiet.
    let abort = handle.abort_handle();
    let hooks = Arc::clone(&inner.hooks);
    let watched_key = key.clone();
    tokio::spawn(async move {
        if let Err(err) = handle.await {
            if err.is_panic() {
                hooks.handle_thread_error(&ThreadError::Panic(format!(
                    "recurring task {watched_key}: {err}"
                )));
            }
        }
    });

    debug!(key = %key, %target, "recurring task armed");
    if let Some(superseded) = inner.armed.insert(key, ArmedTimer { abort, epoch, target }) {
        // A fired timer's own entry is replaced by its re-arm; aborting it
        // then is a no-op. A genuinely pending timer gets cancelled here.
        superseded.abort.abort();
    }
    // Release the timer only now that its entry is in place.
    let _ = armed_tx.send(());
}
