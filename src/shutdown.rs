//! Cooperative cancellation shared by the consumer loop and the workflow.
//!
//! A `watch` channel carries a single flag; flipping it to `true` asks every holder of a
//! receiver to stop at its next checkpoint.

use std::time::Duration;
use tokio::sync::watch;

pub type ShutdownSignal = watch::Receiver<bool>;
pub type ShutdownTrigger = watch::Sender<bool>;

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    watch::channel(false)
}

pub fn is_cancelled(shutdown: &ShutdownSignal) -> bool {
    *shutdown.borrow()
}

/// Sleeps for `duration` unless shutdown is requested first.
///
/// Returns `true` when the full duration elapsed and `false` when cancelled. A dropped
/// trigger can no longer cancel anything, so the sleep then simply runs to completion.
pub async fn sleep_or_cancel(duration: Duration, shutdown: &mut ShutdownSignal) -> bool {
    if is_cancelled(shutdown) {
        return false;
    }
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = shutdown.changed() => match changed {
                Ok(()) if is_cancelled(shutdown) => return false,
                Ok(()) => continue,
                Err(_) => {
                    (&mut sleep).await;
                    return true;
                }
            },
        }
    }
}
