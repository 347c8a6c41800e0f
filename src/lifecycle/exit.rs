//! Process exit and the exit watchdog.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ShutdownError;
use crate::observability::metrics;

/// Exit code used by every forced exit.
pub const FORCED_EXIT_CODE: i32 = 1;

/// How long the process may linger after the shutdown sequence completes.
pub const EXIT_WATCHDOG: Duration = Duration::from_secs(1);

/// Ends the process. Injected so forced exits can be observed in tests.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// Exits through [`std::process::exit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdExit;

impl ProcessExit for StdExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Arm the exit watchdog.
///
/// Runs on a detached OS thread, outside the Tokio runtime and the timer
/// ledger, so neither a timer purge nor a blocked runtime shutdown can
/// prevent it from firing. If the process exits first the thread dies with it.
pub fn arm_watchdog(exit: Arc<dyn ProcessExit>, after: Duration) {
    let spawned = std::thread::Builder::new()
        .name("exit-watchdog".into())
        .spawn(move || {
            std::thread::sleep(after);
            let err = ShutdownError::ExitWatchdogTriggered(after);
            tracing::error!(error = %err, "Forcing process exit");
            metrics::record_forced_exit("exit_watchdog");
            exit.exit(FORCED_EXIT_CODE);
        });

    match spawned {
        Ok(_) => tracing::debug!(after = ?after, "Exit watchdog armed"),
        Err(e) => tracing::error!(error = %e, "Failed to arm exit watchdog"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<i32>>);

    impl ProcessExit for Recorder {
        fn exit(&self, code: i32) {
            self.0.lock().unwrap().push(code);
        }
    }

    #[test]
    fn test_watchdog_fires_with_failure_code() {
        let recorder = Arc::new(Recorder::default());
        arm_watchdog(recorder.clone(), Duration::from_millis(20));

        assert!(recorder.0.lock().unwrap().is_empty());
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(*recorder.0.lock().unwrap(), vec![FORCED_EXIT_CODE]);
    }
}
