//! Process exit hook that tears down registered environments.
//!
//! Installed once per process on first registration. It fires from
//! `atexit` on normal exit and from the SIGINT/SIGTERM handler, and every
//! registered runtime is torn down at most once across both paths.

use std::sync::{Arc, Mutex, Once, PoisonError};

use crate::runtime::ContainerRuntime;

static PENDING: Mutex<Vec<Arc<dyn ContainerRuntime>>> = Mutex::new(Vec::new());
static INSTALL: Once = Once::new();

/// Exit status used after an interrupt, as a shell would report SIGINT.
const INTERRUPTED: i32 = 130;

pub fn register(runtime: Arc<dyn ContainerRuntime>) {
    tracing::debug!(project = %runtime.project(), "Registering environment teardown");
    PENDING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(runtime);

    INSTALL.call_once(install);
}

/// Tears down everything registered so far. Safe to call repeatedly.
pub fn run_now() {
    let pending = std::mem::take(&mut *PENDING.lock().unwrap_or_else(PoisonError::into_inner));
    for runtime in pending {
        if let Err(e) = runtime.teardown() {
            eprintln!("teardown of {} failed: {e}", runtime.project());
        }
    }
}

/// Registered runtimes reporting `project` that have not been torn down yet.
#[cfg(test)]
pub(crate) fn pending_for(project: &str) -> usize {
    PENDING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .filter(|runtime| runtime.project() == project)
        .count()
}

extern "C" fn at_exit() {
    run_now();
}

fn install() {
    // SAFETY: `at_exit` is a plain `extern "C"` function with no captured
    // state; registering it has no other preconditions.
    let status = unsafe { libc::atexit(at_exit) };
    if status != 0 {
        tracing::warn!("Could not register exit hook, environments outlive the process");
    }

    if let Err(e) = ctrlc::set_handler(|| {
        run_now();
        std::process::exit(INTERRUPTED);
    }) {
        tracing::warn!(error = %e, "Could not install signal handler for teardown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRuntime;
    use serial_test::serial;

    #[test]
    #[serial(teardown)]
    fn test_run_now_tears_down_each_runtime_once() {
        let runtime = Arc::new(ScriptedRuntime::new());
        PENDING
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(runtime.clone());

        run_now();
        run_now();
        assert_eq!(runtime.count("teardown"), 1);
    }
}
