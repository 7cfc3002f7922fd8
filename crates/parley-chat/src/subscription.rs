use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parley_store::{RealtimeStore, Snapshot, StorePath, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ChatError;

/// Snapshots a watch has to deliver before its backoff is reset.
const HEALTHY_AFTER: usize = 2;

/// Delay between resubscription attempts after a lost watch.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

/// Handle to a live subscription. Cancelling stops delivery; so does
/// dropping the handle.
#[must_use = "dropping a Subscription cancels it"]
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
    cancelled: AtomicBool,
}

impl Subscription {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Stop delivery. Returns `false` if the subscription was already
    /// cancelled, in which case nothing happens.
    pub fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Watch `path` until cancelled, handing every snapshot to `on_snapshot`.
///
/// A failed or ended watch is logged as a lost subscription and retried
/// with backoff, which only resets once a watch has delivered a change
/// after its initial snapshot. The store sends a full snapshot when the new
/// watch starts, so changes made during the gap are not lost.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_watch<F>(
    store: Arc<dyn RealtimeStore>,
    path: StorePath,
    retry: RetryPolicy,
    mut on_snapshot: F,
) -> Subscription
where
    F: FnMut(Snapshot) + Send + 'static,
{
    let token = CancellationToken::new();
    let task_token = token.clone();

    tokio::spawn(async move {
        let mut delay = retry.initial;

        loop {
            let watched = tokio::select! {
                biased;
                _ = task_token.cancelled() => break,
                watched = store.watch(&path) => watched,
            };

            match watched {
                Ok(mut stream) => {
                    let mut received = 0usize;
                    loop {
                        let item = tokio::select! {
                            biased;
                            _ = task_token.cancelled() => return,
                            item = stream.next() => item,
                        };

                        match item {
                            Some(Ok(snapshot)) => {
                                // The first snapshot is a plain read; only a change
                                // pushed after it shows the watch is live
                                received += 1;
                                if received == HEALTHY_AFTER {
                                    delay = retry.initial;
                                }
                                if task_token.is_cancelled() {
                                    return;
                                }
                                on_snapshot(snapshot);
                            }
                            Some(Err(e)) => {
                                report_lost(&path, e);
                                break;
                            }
                            None => {
                                report_lost(&path, StoreError::Closed);
                                break;
                            }
                        }
                    }
                }
                Err(e) => report_lost(&path, e),
            }

            debug!("Resubscribing to '{}' in {:?}", path, delay);
            tokio::select! {
                biased;
                _ = task_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = retry.next(delay);
        }

        info!("Subscription to '{}' cancelled", path);
    });

    Subscription::new(token)
}

fn report_lost(path: &StorePath, cause: StoreError) {
    let transient = cause.is_transient();
    let err = ChatError::SubscriptionLost(cause);
    match std::error::Error::source(&err) {
        Some(cause) if transient => warn!("{} on '{}': {}", err, path, cause),
        Some(cause) => error!("{} on '{}': {}", err, path, cause),
        None => warn!("{} on '{}'", err, path),
    }
}
