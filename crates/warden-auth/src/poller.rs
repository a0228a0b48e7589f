//! Background polling of the pending role-request count.
//!
//! Only admins review role requests, so the poller refuses to start for any
//! other identity and stops by itself once the session stops being admin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use warden_client::PortalClient;

use crate::error::Result;
use crate::roles::{Role, RoleRequests};
use crate::session::Identity;

/// Default delay between fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Anything that can report how many role requests await review.
#[async_trait]
pub trait PendingCountSource: Send + Sync {
    async fn pending_count(&self) -> Result<u64>;
}

#[async_trait]
impl PendingCountSource for RoleRequests {
    async fn pending_count(&self) -> Result<u64> {
        RoleRequests::pending_count(self).await
    }
}

#[async_trait]
impl PendingCountSource for PortalClient {
    async fn pending_count(&self) -> Result<u64> {
        Ok(self.roles().pending_count().await?)
    }
}

fn is_admin(identity: &Option<Identity>) -> bool {
    identity.as_ref().is_some_and(|i| i.role == Role::Admin)
}

/// Handle to a running poller. Dropping it stops the poller.
#[derive(Debug)]
pub struct PendingApprovalPoller {
    count_rx: watch::Receiver<Option<u64>>,
    cancel: CancellationToken,
    stopped: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl PendingApprovalPoller {
    /// Start polling if the current identity is an admin.
    ///
    /// The first fetch happens immediately. Returns `None` for non-admins.
    /// A zero `interval` falls back to [`DEFAULT_POLL_INTERVAL`].
    pub fn start(
        source: Arc<dyn PendingCountSource>,
        identity: watch::Receiver<Option<Identity>>,
        interval: Duration,
    ) -> Option<Self> {
        if !is_admin(&identity.borrow()) {
            tracing::debug!("Pending-approval poller not started: identity is not admin");
            return None;
        }

        let interval = if interval.is_zero() {
            tracing::debug!("Zero poll interval, using the default");
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };

        let (count_tx, count_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let stopped = Arc::new(Mutex::new(false));

        let task = tokio::spawn(poll_loop(
            source,
            identity,
            interval,
            count_tx,
            cancel.clone(),
            stopped.clone(),
        ));

        tracing::info!(interval_secs = interval.as_secs(), "Pending-approval poller started");
        Some(Self {
            count_rx,
            cancel,
            stopped,
            task: Some(task),
        })
    }

    /// Last successfully fetched count, `None` until the first success.
    pub fn count(&self) -> Option<u64> {
        *self.count_rx.borrow()
    }

    /// Watch the count.
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.count_rx.clone()
    }

    /// Whether the poller has stopped, by request or because the role changed.
    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Stop polling. No fetch result is applied after this returns.
    pub fn stop(&self) {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            *stopped = true;
            self.cancel.cancel();
            tracing::debug!("Pending-approval poller stopped");
        }
    }

    /// Stop and wait for the background task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::debug!(error = %e, "Poller task ended abnormally");
        }
    }
}

impl Drop for PendingApprovalPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    source: Arc<dyn PendingCountSource>,
    mut identity: watch::Receiver<Option<Identity>>,
    interval: Duration,
    count_tx: watch::Sender<Option<u64>>,
    cancel: CancellationToken,
    stopped: Arc<Mutex<bool>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = identity.changed() => {
                if changed.is_err() || !is_admin(&identity.borrow_and_update()) {
                    tracing::debug!("Identity no longer admin, stopping poller");
                    *stopped.lock() = true;
                    cancel.cancel();
                    break;
                }
            }
            _ = ticker.tick() => {
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = source.pending_count() => result,
                };
                match result {
                    Ok(count) => {
                        let guard = stopped.lock();
                        if *guard || !is_admin(&identity.borrow()) {
                            break;
                        }
                        count_tx.send_replace(Some(count));
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Pending count fetch failed, keeping last value");
                    }
                }
            }
        }
    }
}
