use std::panic::{self, AssertUnwindSafe};
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, error};

/// An error that escaped a background thread or timer callback, in the shape
/// hooks receive it.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// A task's own execution failed (e.g. an enqueue hit the database).
    #[error("{0}")]
    Execution(String),

    /// A callback panicked; the payload is the panic message when extractable.
    #[error("panic: {0}")]
    Panic(String),
}

type Callback = Box<dyn Fn() + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&ThreadError) + Send + Sync>;

/// Registry for process-lifecycle callbacks.
///
/// Owned by the top-level supervisor and passed into workers, dispatchers and
/// schedulers as `Arc<LifecycleHooks>` — there is deliberately no global
/// instance. Registering nothing is fine: every dispatch path is a silent
/// no-op when its list is empty.
pub struct LifecycleHooks {
    on_start: RwLock<Vec<Callback>>,
    on_stop: RwLock<Vec<Callback>>,
    on_thread_error: RwLock<Vec<ErrorCallback>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self {
            on_start: RwLock::new(Vec::new()),
            on_stop: RwLock::new(Vec::new()),
            on_thread_error: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback to run when the process starts.
    pub fn on_start<F: Fn() + Send + Sync + 'static>(&self, f: F) {
        self.on_start.write().expect("hook registry poisoned").push(Box::new(f));
    }

    /// Register a callback to run when the process stops.
    pub fn on_stop<F: Fn() + Send + Sync + 'static>(&self, f: F) {
        self.on_stop.write().expect("hook registry poisoned").push(Box::new(f));
    }

    /// Register the process-wide error callback. May be called more than
    /// once; every registered callback sees every error.
    pub fn on_thread_error<F: Fn(&ThreadError) + Send + Sync + 'static>(&self, f: F) {
        self.on_thread_error
            .write()
            .expect("hook registry poisoned")
            .push(Box::new(f));
    }

    /// Deliver `error` to every registered error callback.
    ///
    /// With no callbacks registered the error is only logged — a missing
    /// hook must never take the process down.
    pub fn handle_thread_error(&self, err: &ThreadError) {
        let callbacks = self.on_thread_error.read().expect("hook registry poisoned");
        if callbacks.is_empty() {
            error!(%err, "unhandled thread error (no error hook registered)");
            return;
        }
        for callback in callbacks.iter() {
            callback(err);
        }
    }

    /// Run every start hook. A panicking hook is routed to the error
    /// callbacks; the remaining hooks still run.
    pub fn run_start_hooks(&self) {
        self.run_list(&self.on_start, "start");
    }

    /// Run every stop hook, with the same error isolation as start hooks.
    pub fn run_stop_hooks(&self) {
        self.run_list(&self.on_stop, "stop");
    }

    /// Drop every registered callback. Test isolation.
    pub fn clear(&self) {
        self.on_start.write().expect("hook registry poisoned").clear();
        self.on_stop.write().expect("hook registry poisoned").clear();
        self.on_thread_error.write().expect("hook registry poisoned").clear();
    }

    fn run_list(&self, list: &RwLock<Vec<Callback>>, kind: &str) {
        let callbacks = list.read().expect("hook registry poisoned");
        debug!(kind, count = callbacks.len(), "running lifecycle hooks");
        for callback in callbacks.iter() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                let message = panic_message(payload);
                self.handle_thread_error(&ThreadError::Panic(message));
            }
        }
    }
}

impl Default for LifecycleHooks {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn start_and_stop_hooks_run_once_each() {
        let hooks = LifecycleHooks::new();
        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&started);
        hooks.on_start(move || {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&stopped);
        hooks.on_stop(move || {
            s.fetch_add(1, Ordering::SeqCst);
        });

        hooks.run_start_hooks();
        hooks.run_stop_hooks();

        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_start_hook_routes_to_error_hook() {
        let hooks = LifecycleHooks::new();
        let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&errors);
        hooks.on_thread_error(move |err| {
            sink.lock().unwrap().push(err.to_string());
        });
        hooks.on_start(|| panic!("everything is broken"));

        hooks.run_start_hooks();

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("everything is broken"));
    }

    #[test]
    fn missing_error_hook_is_a_no_op() {
        let hooks = LifecycleHooks::new();
        // Must not panic or crash.
        hooks.handle_thread_error(&ThreadError::Execution("db gone".into()));
    }

    #[test]
    fn clear_drops_all_callbacks() {
        let hooks = LifecycleHooks::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        hooks.on_start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        hooks.clear();
        hooks.run_start_hooks();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
