use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Owns the controller's background event-subscription slot.
///
/// The task is a heartbeat only: it performs no network I/O and ends as soon
/// as its token is cancelled. At most one task runs at a time.
pub struct SubscriptionManager {
    event_url: Option<String>,
    active: Mutex<Option<CancellationToken>>,
}

impl SubscriptionManager {
    pub fn new(event_url: Option<String>) -> Self {
        Self {
            event_url,
            active: Mutex::new(None),
        }
    }

    pub fn event_url(&self) -> Option<&str> {
        self.event_url.as_deref()
    }

    /// Starts the heartbeat loop, cancelling the previous one if any.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, heartbeat: Duration, parent: &CancellationToken) {
        let token = parent.child_token();
        let previous = self
            .active
            .lock()
            .expect("subscription mutex poisoned")
            .replace(token.clone());
        if let Some(previous) = previous {
            debug!("Replacing active subscription");
            previous.cancel();
        }

        let event_url = self.event_url.clone();
        let period = heartbeat.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Subscription heartbeat stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        trace!("Subscription heartbeat ({:?})", event_url);
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        let active = self
            .active
            .lock()
            .expect("subscription mutex poisoned")
            .take();
        if let Some(token) = active {
            token.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .expect("subscription mutex poisoned")
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
