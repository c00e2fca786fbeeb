//! Process lifecycle: graceful shutdown with a bounded grace period.
//!
//! Three things start a shutdown: a fatal (non-operational) classified error,
//! a termination signal, and a failed background task. In every case the
//! [`ShutdownCoordinator`] logs that shutdown has started, wakes whoever is
//! waiting on [`ShutdownCoordinator::wait`] (the HTTP listener), and arms a
//! timer that force-exits the process once the grace period has elapsed,
//! whether or not the graceful sequence has finished.

pub mod hooks;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

pub use hooks::{catch_handled, install_panic_hook, install_signal_handler};

/// Grace period used when none is configured.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Why the process is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// A request produced an error no classification rule recognised.
    FatalError { description: String, message: String },
    /// SIGINT, SIGTERM or SIGHUP.
    Signal,
    /// A background task failed or panicked outside any request.
    UncaughtFailure { message: String },
}

impl ShutdownReason {
    /// Process exit code for this reason.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal => 0,
            ShutdownReason::FatalError { .. } | ShutdownReason::UncaughtFailure { .. } => 1,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::FatalError {
                description,
                message,
            } => write!(f, "fatal error ({}): {}", description, message),
            ShutdownReason::Signal => write!(f, "termination signal"),
            ShutdownReason::UncaughtFailure { message } => {
                write!(f, "uncaught failure: {}", message)
            }
        }
    }
}

/// Asks the process to shut down. Must return promptly.
pub trait ShutdownRequester: Send + Sync {
    fn request_shutdown(&self, reason: ShutdownReason);
}

/// Terminates the process.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// [`ProcessExit`] backed by `std::process::exit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

struct Inner {
    grace_period: Duration,
    runtime: Handle,
    exit: Arc<dyn ProcessExit>,
    state: watch::Sender<Option<ShutdownReason>>,
    exited: AtomicBool,
}

impl Inner {
    fn exit_once(&self, code: i32) {
        if !self.exited.swap(true, Ordering::SeqCst) {
            self.exit.exit(code);
        }
    }
}

/// Coordinates graceful shutdown and the forced exit that backs it up.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("grace_period", &self.inner.grace_period)
            .field("reason", &*self.inner.state.borrow())
            .field("exited", &self.inner.exited.load(Ordering::SeqCst))
            .finish()
    }
}

impl ShutdownCoordinator {
    /// Creates a coordinator that exits through `std::process::exit`.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn new(grace_period: Duration) -> Self {
        Self::with_exit(grace_period, Arc::new(StdProcessExit))
    }

    /// Creates a coordinator with a custom exit action.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn with_exit(grace_period: Duration, exit: Arc<dyn ProcessExit>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                grace_period,
                runtime: Handle::current(),
                exit,
                state,
                exited: AtomicBool::new(false),
            }),
        }
    }

    pub fn grace_period(&self) -> Duration {
        self.inner.grace_period
    }

    /// Returns true once any shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// The reason of the first shutdown request, if any.
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.inner.state.borrow().clone()
    }

    /// Resolves with the reason once a shutdown has been requested.
    pub async fn wait(&self) -> ShutdownReason {
        let mut receiver = self.inner.state.subscribe();
        let reason = match receiver.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        match reason {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }

    /// Marks the graceful sequence as complete and exits with the exit code of
    /// the shutdown reason (0 when nothing requested the shutdown).
    pub fn finish(&self) {
        let code = self.reason().map_or(0, |reason| reason.exit_code());
        tracing::info!(code, "----- SHUTDOWN COMPLETE -----");
        self.inner.exit_once(code);
    }

    /// [`finish`](Self::finish) after the graceful sequence returned `outcome`.
    ///
    /// A failed sequence counts as an uncaught failure, so it exits with a
    /// failure code unless an earlier reason already decided the code.
    pub fn finish_with<E: fmt::Display>(&self, outcome: &Result<(), E>) {
        if let Err(error) = outcome {
            self.request_shutdown(ShutdownReason::UncaughtFailure {
                message: error.to_string(),
            });
        }
        self.finish();
    }

    fn arm_force_exit(&self, code: i32) {
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(inner.grace_period).await;
            if !inner.exited.load(Ordering::SeqCst) {
                tracing::error!(
                    grace_period = ?inner.grace_period,
                    "----- FORCED SHUTDOWN -----"
                );
            }
            inner.exit_once(code);
        });
    }
}

impl ShutdownRequester for ShutdownCoordinator {
    fn request_shutdown(&self, reason: ShutdownReason) {
        let code = reason.exit_code();
        let first = self.inner.state.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });

        if !first {
            tracing::debug!(%reason, "shutdown already in progress, ignoring request");
            return;
        }

        match reason {
            ShutdownReason::Signal => {
                tracing::warn!(%reason, "----- STARTING SHUTDOWN -----");
            }
            _ => {
                tracing::error!(%reason, "----- STARTING SHUTDOWN -----");
            }
        }
        self.arm_force_exit(code);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ProcessExit;
    use std::sync::Mutex;

    /// Records exit codes instead of exiting.
    #[derive(Debug, Default)]
    pub struct RecordingExit {
        codes: Mutex<Vec<i32>>,
    }

    impl RecordingExit {
        pub fn codes(&self) -> Vec<i32> {
            self.codes.lock().unwrap().clone()
        }
    }

    impl ProcessExit for RecordingExit {
        fn exit(&self, code: i32) {
            self.codes.lock().unwrap().push(code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingExit;
    use super::*;

    fn coordinator(grace: Duration) -> (ShutdownCoordinator, Arc<RecordingExit>) {
        let exit = Arc::new(RecordingExit::default());
        let coordinator = ShutdownCoordinator::with_exit(grace, exit.clone());
        (coordinator, exit)
    }

    fn fatal() -> ShutdownReason {
        ShutdownReason::FatalError {
            description: "UNCLASSIFIED_ERROR".to_string(),
            message: "x is not a function".to_string(),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ShutdownReason::Signal.exit_code(), 0);
        assert_eq!(fatal().exit_code(), 1);
        assert_eq!(
            ShutdownReason::UncaughtFailure {
                message: "boom".to_string()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            fatal().to_string(),
            "fatal error (UNCLASSIFIED_ERROR): x is not a function"
        );
        assert_eq!(ShutdownReason::Signal.to_string(), "termination signal");
    }

    #[tokio::test]
    async fn test_first_request_wins() {
        let (coordinator, _exit) = coordinator(Duration::from_secs(60));
        assert!(!coordinator.is_shutting_down());

        coordinator.request_shutdown(fatal());
        coordinator.request_shutdown(ShutdownReason::Signal);

        assert!(coordinator.is_shutting_down());
        assert_eq!(coordinator.reason(), Some(fatal()));
    }

    #[tokio::test]
    async fn test_wait_resolves_after_request() {
        let (coordinator, _exit) = coordinator(Duration::from_secs(60));
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait().await })
        };

        tokio::task::yield_now().await;
        coordinator.request_shutdown(ShutdownReason::Signal);

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait() should resolve")
            .unwrap();
        assert_eq!(reason, ShutdownReason::Signal);
    }

    #[tokio::test]
    async fn test_wait_resolves_immediately_when_already_requested() {
        let (coordinator, _exit) = coordinator(Duration::from_secs(60));
        coordinator.request_shutdown(fatal());
        let reason = tokio::time::timeout(Duration::from_millis(100), coordinator.wait())
            .await
            .unwrap();
        assert_eq!(reason, fatal());
    }

    #[tokio::test]
    async fn test_forced_exit_after_grace_period() {
        let (coordinator, exit) = coordinator(Duration::from_millis(20));
        coordinator.request_shutdown(fatal());
        assert!(exit.codes().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(exit.codes(), vec![1]);
    }

    #[tokio::test]
    async fn test_finish_before_grace_period_exits_once() {
        let (coordinator, exit) = coordinator(Duration::from_millis(50));
        coordinator.request_shutdown(ShutdownReason::Signal);
        coordinator.finish();
        assert_eq!(exit.codes(), vec![0]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(exit.codes(), vec![0]);
    }

    #[tokio::test]
    async fn test_finish_with_error_exits_with_failure() {
        let (coordinator, exit) = coordinator(Duration::from_secs(60));
        coordinator.finish_with(&Err::<(), _>("address in use"));

        assert_eq!(exit.codes(), vec![1]);
        assert_eq!(
            coordinator.reason(),
            Some(ShutdownReason::UncaughtFailure {
                message: "address in use".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_finish_with_keeps_earlier_reason() {
        let (signalled, signalled_exit) = coordinator(Duration::from_secs(60));
        signalled.request_shutdown(ShutdownReason::Signal);
        signalled.finish_with(&Ok::<(), String>(()));
        assert_eq!(signalled_exit.codes(), vec![0]);

        let (failed, failed_exit) = coordinator(Duration::from_secs(60));
        failed.request_shutdown(fatal());
        failed.finish_with(&Err::<(), _>("listener closed"));
        assert_eq!(failed_exit.codes(), vec![1]);
        assert_eq!(failed.reason(), Some(fatal()));
    }

    #[tokio::test]
    async fn test_no_timer_without_request() {
        let (_coordinator, exit) = coordinator(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(exit.codes().is_empty());
    }
}
