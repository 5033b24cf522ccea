// ── Reactive roster stream ──
//
// Subscription handle over the live roster's watch channel.

use std::sync::Arc;

use tokio::sync::watch;

use crate::roster::Roster;

/// A subscription to the live roster.
///
/// Gives point-in-time access plus change notification via
/// [`changed`](Self::changed).
pub struct RosterStream {
    current: Arc<Roster>,
    receiver: watch::Receiver<Arc<Roster>>,
}

impl RosterStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Roster>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation (or at the last `changed`).
    pub fn current(&self) -> &Arc<Roster> {
        &self.current
    }

    /// The latest snapshot, which may be newer than `current`.
    pub fn latest(&self) -> Arc<Roster> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Arc<Roster>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }
}
