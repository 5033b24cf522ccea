// ── Live roster ──
//
// Owns the roster and keeps it current from one availability subscription
// at a time. Every change is published through a `watch` channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use devhub_api::{
    AuthContext, AvailabilitySubscription, AvailabilityTransport, ReconnectConfig,
    SubscriptionStatus,
};

use crate::convert;
use crate::model::DeviceSnapshot;
use crate::roster::Roster;
use crate::stream::RosterStream;

/// Which scope the roster follows, and how that feed is doing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStatus {
    pub scope: Option<String>,
    pub status: Option<SubscriptionStatus>,
}

/// Roster kept current by the availability feed.
///
/// Following a new scope cancels the previous subscription first; batches
/// still in flight from the old scope are discarded. Dropping the store
/// stops its feed.
pub struct LiveRoster {
    inner: Arc<LiveInner>,
}

struct LiveInner {
    roster: watch::Sender<Arc<Roster>>,
    feed: watch::Sender<FeedStatus>,
    /// Bumped whenever the feed is stopped or replaced. A pump only writes
    /// while its generation is current.
    generation: AtomicU64,
    pump: Mutex<Option<Pump>>,
}

struct Pump {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LiveInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn apply_batch(&self, generation: u64, batch: &[DeviceSnapshot]) -> usize {
        let mut changed = 0;
        self.roster.send_if_modified(|roster| {
            if !self.is_current(generation) {
                return false;
            }
            changed = Arc::make_mut(roster).apply(batch);
            changed > 0
        });
        changed
    }

    fn publish_status(&self, generation: u64, status: SubscriptionStatus) {
        self.feed.send_if_modified(|feed| {
            if !self.is_current(generation) || feed.status == Some(status) {
                return false;
            }
            feed.status = Some(status);
            true
        });
    }

    /// Invalidate the running pump, if any. Caller holds the pump slot.
    fn stop_locked(&self, slot: &mut Option<Pump>) {
        // Serialized with `apply_batch` through the roster channel's lock.
        self.roster.send_if_modified(|_| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            false
        });
        if let Some(pump) = slot.take() {
            pump.cancel.cancel();
            pump.task.abort();
            debug!("availability pump stopped");
        }
        self.feed.send_replace(FeedStatus::default());
    }
}

impl LiveRoster {
    pub fn new(seed: Roster) -> Self {
        let (roster, _) = watch::channel(Arc::new(seed));
        let (feed, _) = watch::channel(FeedStatus::default());
        Self {
            inner: Arc::new(LiveInner {
                roster,
                feed,
                generation: AtomicU64::new(0),
                pump: Mutex::new(None),
            }),
        }
    }

    /// Current roster (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Roster> {
        self.inner.roster.borrow().clone()
    }

    pub fn subscribe(&self) -> RosterStream {
        RosterStream::new(self.inner.roster.subscribe())
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.inner.feed.borrow().clone()
    }

    pub fn feed_receiver(&self) -> watch::Receiver<FeedStatus> {
        self.inner.feed.subscribe()
    }

    /// Replace the roster wholesale, e.g. after re-reading inventory.
    pub fn reseed(&self, roster: Roster) {
        self.inner.roster.send_replace(Arc::new(roster));
    }

    /// Merge snapshots directly, outside any feed. Returns the number of
    /// entries that changed.
    pub fn apply(&self, batch: &[DeviceSnapshot]) -> usize {
        let mut changed = 0;
        self.inner.roster.send_if_modified(|roster| {
            changed = Arc::make_mut(roster).apply(batch);
            changed > 0
        });
        changed
    }

    /// Follow the availability feed for `scope`, replacing any current one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn follow<T: AvailabilityTransport>(
        &self,
        transport: Arc<T>,
        scope: impl Into<String>,
        auth: AuthContext,
        reconnect: ReconnectConfig,
    ) {
        let scope = scope.into();
        let mut slot = self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.stop_locked(&mut slot);

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let subscription = AvailabilitySubscription::spawn(transport, scope.clone(), auth, reconnect);
        self.inner.feed.send_replace(FeedStatus {
            scope: Some(scope.clone()),
            status: Some(subscription.status()),
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            Arc::clone(&self.inner),
            generation,
            subscription,
            cancel.clone(),
        ));
        *slot = Some(Pump { cancel, task });
        info!(%scope, "following availability feed");
    }

    /// Stop following. The roster keeps its last state.
    pub fn stop(&self) {
        let mut slot = self.inner.pump.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.stop_locked(&mut slot);
    }

    pub fn scope(&self) -> Option<String> {
        self.inner.feed.borrow().scope.clone()
    }
}

impl Drop for LiveRoster {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forward one subscription into the roster until cancelled or closed.
async fn pump(
    inner: Arc<LiveInner>,
    generation: u64,
    mut subscription: AvailabilitySubscription,
    cancel: CancellationToken,
) {
    let mut status_rx = subscription.status_receiver();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                inner.publish_status(generation, status);
            }
            batch = subscription.next_batch() => {
                let Some(batch) = batch else { break };
                let snapshots = convert::snapshots_from_batch(&batch, Some(Utc::now()));
                let changed = inner.apply_batch(generation, &snapshots);
                debug!(records = batch.len(), changed, "applied availability batch");
            }
        }
    }

    inner.publish_status(generation, subscription.status());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::future::Future;
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::StreamExt;
    use secrecy::SecretString;

    use devhub_api::availability::BodyStream;
    use devhub_api::{Error, ErrorKind, SubscriptionState};

    use super::*;
    use crate::model::{DeviceId, RosterEntry};

    /// Serves a fixed body per scope and holds the connection open.
    #[derive(Default)]
    struct ScopedTransport {
        opened: Mutex<Vec<String>>,
    }

    impl ScopedTransport {
        fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl AvailabilityTransport for ScopedTransport {
        fn open(
            &self,
            scope: &str,
            _auth: &AuthContext,
        ) -> impl Future<Output = Result<BodyStream, Error>> + Send {
            self.opened.lock().unwrap().push(scope.to_owned());
            let body: Result<BodyStream, Error> = match scope {
                "ws-1" => Ok(held(b"data: [{\"UDID\":\"a\",\"InUse\":true,\"InUseBy\":\"bob\"}]\n\n")),
                "ws-2" => Ok(held(b"data: [{\"udid\":\"b\",\"available\":false}]\n\n")),
                _ => Err(Error::Authentication {
                    message: "scope not permitted".into(),
                }),
            };
            async move { body }
        }
    }

    fn held(chunk: &'static [u8]) -> BodyStream {
        futures_util::stream::iter(vec![Ok(Bytes::from_static(chunk))])
            .chain(futures_util::stream::pending())
            .boxed()
    }

    fn seed() -> Roster {
        let mut a = RosterEntry::new("a");
        a.connected = true;
        a.available = true;
        let mut b = RosterEntry::new("b");
        b.connected = true;
        b.available = true;
        [a, b].into_iter().collect()
    }

    fn auth() -> AuthContext {
        AuthContext::new(SecretString::from("t".to_string()), "alice")
    }

    #[tokio::test(start_paused = true)]
    async fn feed_updates_roster_and_notifies() {
        let live = LiveRoster::new(seed());
        let mut stream = live.subscribe();
        let transport = Arc::new(ScopedTransport::default());

        live.follow(Arc::clone(&transport), "ws-1", auth(), ReconnectConfig::default());

        let roster = stream.changed().await.unwrap();
        let a = roster.get(&DeviceId::from("a")).unwrap();
        assert!(a.in_use);
        assert_eq!(a.in_use_by.as_deref(), Some("bob"));
        assert!(a.last_seen.is_some());
        assert!(!roster.get(&DeviceId::from("b")).unwrap().in_use);
        assert_eq!(live.scope().as_deref(), Some("ws-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_scope_cancels_previous_feed() {
        let live = LiveRoster::new(seed());
        let mut stream = live.subscribe();
        let transport = Arc::new(ScopedTransport::default());

        live.follow(Arc::clone(&transport), "ws-1", auth(), ReconnectConfig::default());
        stream.changed().await.unwrap();

        live.follow(Arc::clone(&transport), "ws-2", auth(), ReconnectConfig::default());
        let roster = stream.changed().await.unwrap();
        assert!(!roster.get(&DeviceId::from("b")).unwrap().available);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.opened(), vec!["ws-1", "ws-2"]);
        assert_eq!(live.scope().as_deref(), Some("ws-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_reported_through_feed_status() {
        let live = LiveRoster::new(seed());
        let transport = Arc::new(ScopedTransport::default());
        let mut feed = live.feed_receiver();

        live.follow(transport, "forbidden", auth(), ReconnectConfig::default());

        let status = feed
            .wait_for(|f| f.status.is_some_and(|s| s.state == SubscriptionState::Closed))
            .await
            .unwrap()
            .clone();
        assert_eq!(status.status.unwrap().last_error, Some(ErrorKind::Auth));
        assert_eq!(live.snapshot().as_ref(), &seed());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resets_feed_and_keeps_roster() {
        let live = LiveRoster::new(seed());
        let mut stream = live.subscribe();
        let transport = Arc::new(ScopedTransport::default());

        live.follow(transport, "ws-1", auth(), ReconnectConfig::default());
        stream.changed().await.unwrap();

        live.stop();
        assert_eq!(live.feed_status(), FeedStatus::default());
        assert!(live.snapshot().get(&DeviceId::from("a")).unwrap().in_use);
    }

    #[test]
    fn direct_apply_publishes_only_on_change() {
        let live = LiveRoster::new(seed());
        let mut rx = live.subscribe();

        let mut snap = DeviceSnapshot::new("a");
        snap.available = Some(true);
        assert_eq!(live.apply(&[snap]), 0);
        assert_eq!(rx.latest().as_ref(), rx.current().as_ref());

        let mut snap = DeviceSnapshot::new("a");
        snap.available = Some(false);
        assert_eq!(live.apply(&[snap]), 1);
        assert!(!rx.latest().get(&DeviceId::from("a")).unwrap().available);
    }
}
