//! Wiring from process-level events to the shutdown coordinator.

use futures::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;

use super::{ShutdownCoordinator, ShutdownReason, ShutdownRequester};
use crate::error::RawError;

/// Requests a graceful shutdown on SIGINT, SIGTERM or SIGHUP.
///
/// Can only be installed once per process.
pub fn install_signal_handler(coordinator: &ShutdownCoordinator) -> io::Result<()> {
    let coordinator = coordinator.clone();
    ctrlc::set_handler(move || {
        coordinator.request_shutdown(ShutdownReason::Signal);
    })
    .map_err(|e| io::Error::other(e.to_string()))
}

tokio::task_local! {
    static PANIC_HANDLED: ();
}

/// Polls `future`, catching any panic it raises.
///
/// Panics raised inside are handled by the caller, so the hook from
/// [`install_panic_hook`] only logs them and does not request a shutdown.
pub async fn catch_handled<F: Future>(future: F) -> std::thread::Result<F::Output> {
    PANIC_HANDLED
        .scope((), AssertUnwindSafe(future).catch_unwind())
        .await
}

fn panic_is_handled() -> bool {
    PANIC_HANDLED.try_with(|_| ()).is_ok()
}

/// Routes panic reports through `tracing`, then the previous hook.
///
/// A panic outside [`catch_handled`] (a detached task, a plain thread) is an
/// uncaught failure and requests a shutdown with
/// [`ShutdownReason::UncaughtFailure`].
pub fn install_panic_hook(coordinator: &ShutdownCoordinator) {
    let coordinator = coordinator.clone();
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let raw = RawError::from_panic(info.payload());
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();

        if panic_is_handled() {
            tracing::error!(%location, "panic: {}", raw.message);
        } else {
            tracing::error!(%location, "UNCAUGHT PANIC: {}", raw.message);
            coordinator.request_shutdown(ShutdownReason::UncaughtFailure {
                message: format!("panicked at {}: {}", location, raw.message),
            });
        }
        previous(info);
    }));
}

impl ShutdownCoordinator {
    /// Spawns a background task whose failure is fatal to the process.
    ///
    /// If the task returns an error or panics, a shutdown is requested with
    /// [`ShutdownReason::UncaughtFailure`].
    pub fn spawn_supervised<F, E>(&self, name: &'static str, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let coordinator = self.clone();
        self.inner.runtime.spawn(async move {
            let message = match catch_handled(task).await {
                Ok(Ok(())) => return,
                Ok(Err(error)) => format!("{}: {}", name, error),
                Err(panic) => format!("{} panicked: {}", name, RawError::from_panic(&*panic).message),
            };
            tracing::error!(task = name, "UNHANDLED BACKGROUND FAILURE: {}", message);
            coordinator.request_shutdown(ShutdownReason::UncaughtFailure { message });
        })
    }
}
