//! Live device-availability feed with auto-reconnect.
//!
//! Opens `GET /available-devices?workspaceId={scope}` as a long-lived
//! server-push body, decodes it with [`sse::frames`](crate::sse::frames) and
//! delivers every availability array as one batch, in arrival order. When the
//! body fails or ends, the subscription waits a fixed delay and reconnects
//! with a fresh decoder, forever, until cancelled.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use devhub_api::availability::{AvailabilitySubscription, HttpAvailabilityTransport, ReconnectConfig};
//!
//! let transport = Arc::new(HttpAvailabilityTransport::new(http, base_url));
//! let mut sub = AvailabilitySubscription::spawn(transport, "ws-1", auth, ReconnectConfig::default());
//!
//! while let Some(batch) = sub.next_batch().await {
//!     println!("{} devices", batch.len());
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::AuthContext;
use crate::error::{Error, ErrorKind};
use crate::sse;
use crate::transport::endpoint;

/// A raw response body, chunk by chunk.
pub type BodyStream = BoxStream<'static, Result<Bytes, Error>>;

/// One decoded availability payload: an array of per-device records.
///
/// Records are left as raw JSON; the hub spells fields several ways and
/// normalization belongs to the consumer.
pub type AvailabilityBatch = Vec<serde_json::Value>;

// ── Subscription status ──────────────────────────────────────────────

/// Lifecycle of one availability subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

/// Observable status: current state plus the most recent failure, if any.
///
/// `last_error` is cleared as soon as a batch is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub state: SubscriptionState,
    pub last_error: Option<ErrorKind>,
}

impl SubscriptionStatus {
    const fn connecting() -> Self {
        Self {
            state: SubscriptionState::Connecting,
            last_error: None,
        }
    }

    /// `true` while the feed is down and being retried.
    pub fn is_unavailable(&self) -> bool {
        self.state == SubscriptionState::Reconnecting
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Fixed-delay reconnection policy. No backoff growth, no retry limit.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Wait between a failure and the next connection attempt. Default: 1s.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

// ── Transport seam ───────────────────────────────────────────────────

/// Opens one streaming connection to the availability feed.
///
/// The HTTP implementation is [`HttpAvailabilityTransport`]; tests substitute
/// scripted bodies.
pub trait AvailabilityTransport: Send + Sync + 'static {
    fn open(
        &self,
        scope: &str,
        auth: &AuthContext,
    ) -> impl Future<Output = Result<BodyStream, Error>> + Send;
}

/// Availability feed over HTTP with a bearer header.
#[derive(Debug, Clone)]
pub struct HttpAvailabilityTransport {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpAvailabilityTransport {
    /// `http` should be a streaming client (no total request timeout), see
    /// [`TransportConfig::build_streaming_client`](crate::transport::TransportConfig::build_streaming_client).
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The feed URL for `scope`.
    pub fn feed_url(&self, scope: &str) -> Result<Url, Error> {
        let mut url = endpoint(&self.base_url, "available-devices")?;
        url.query_pairs_mut().append_pair("workspaceId", scope);
        Ok(url)
    }
}

impl AvailabilityTransport for HttpAvailabilityTransport {
    async fn open(&self, scope: &str, auth: &AuthContext) -> Result<BodyStream, Error> {
        let url = self.feed_url(scope)?;
        tracing::debug!(%url, "opening availability feed");

        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, auth.bearer())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: format!("availability feed rejected credential (HTTP {status})"),
            });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::Transport))
            .boxed())
    }
}

// ── AvailabilitySubscription ─────────────────────────────────────────

/// Handle to one running availability subscription for a single scope.
///
/// Scope is fixed for the lifetime of the handle; to follow a different
/// workspace, cancel this one and spawn another. Dropping the handle cancels.
pub struct AvailabilitySubscription {
    scope: String,
    status_tx: Arc<watch::Sender<SubscriptionStatus>>,
    status_rx: watch::Receiver<SubscriptionStatus>,
    batches: mpsc::UnboundedReceiver<AvailabilityBatch>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AvailabilitySubscription {
    /// Spawn the background connect/read/reconnect loop.
    ///
    /// Returns immediately; the first connection attempt happens on the
    /// runtime. Must be called from within a Tokio runtime.
    pub fn spawn<T: AvailabilityTransport>(
        transport: Arc<T>,
        scope: impl Into<String>,
        auth: AuthContext,
        reconnect: ReconnectConfig,
    ) -> Self {
        let scope = scope.into();
        let (status_tx, status_rx) = watch::channel(SubscriptionStatus::connecting());
        let status_tx = Arc::new(status_tx);
        let (batch_tx, batches) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let feed = Feed {
            transport,
            scope: scope.clone(),
            auth,
            reconnect,
            status: Arc::clone(&status_tx),
            batch_tx,
            attempts: Arc::clone(&attempts),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(feed.run());

        Self {
            scope,
            status_tx,
            status_rx,
            batches,
            attempts,
            cancel,
            task: Some(task),
        }
    }

    /// The workspace this subscription is filtered by.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Current status snapshot.
    pub fn status(&self) -> SubscriptionStatus {
        *self.status_rx.borrow()
    }

    /// A receiver for status changes (for UIs that show "stream unavailable").
    pub fn status_receiver(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status_rx.clone()
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the next batch, in arrival order.
    ///
    /// Returns `None` once the subscription is closed (cancelled, or stopped
    /// by an authentication failure) and every batch received before that
    /// point has been consumed. Nothing is returned after [`cancel`](Self::cancel).
    pub async fn next_batch(&mut self) -> Option<AvailabilityBatch> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.batches.recv().await
    }

    /// `true` once the subscription will never deliver again.
    pub fn is_closed(&self) -> bool {
        self.status().state == SubscriptionState::Closed
    }

    /// Stop the subscription now.
    ///
    /// Aborts any in-flight read, drops undelivered batches and moves the
    /// status to `Closed` before returning. Calling it again is a no-op.
    pub fn cancel(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.batches.close();
        while self.batches.try_recv().is_ok() {}
        self.status_tx.send_modify(|s| s.state = SubscriptionState::Closed);
        tracing::debug!(scope = %self.scope, "availability subscription cancelled");
    }
}

impl Drop for AvailabilitySubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ── Background loop ──────────────────────────────────────────────────

struct Feed<T> {
    transport: Arc<T>,
    scope: String,
    auth: AuthContext,
    reconnect: ReconnectConfig,
    status: Arc<watch::Sender<SubscriptionStatus>>,
    batch_tx: mpsc::UnboundedSender<AvailabilityBatch>,
    attempts: Arc<AtomicU32>,
    cancel: CancellationToken,
}

impl<T: AvailabilityTransport> Feed<T> {
    /// Connect → read → on failure, wait → reconnect. Exits on cancel or auth failure.
    async fn run(self) {
        loop {
            self.attempts.fetch_add(1, Ordering::SeqCst);

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.connect_and_read() => result,
            };

            match outcome {
                Ok(()) => {
                    tracing::info!(scope = %self.scope, "availability stream ended, reconnecting");
                    self.publish(SubscriptionState::Reconnecting, Some(ErrorKind::Transport));
                }
                Err(e) if e.kind() == ErrorKind::Auth => {
                    tracing::error!(scope = %self.scope, error = %e, "availability feed unauthorized, giving up");
                    self.publish(SubscriptionState::Closed, Some(ErrorKind::Auth));
                    break;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(scope = %self.scope, error = %e, "availability stream failed");
                    } else {
                        tracing::error!(scope = %self.scope, error = %e, "availability feed refused, retrying");
                    }
                    self.publish(SubscriptionState::Reconnecting, Some(e.kind()));
                }
            }

            tracing::debug!(
                delay_ms = u64::try_from(self.reconnect.delay.as_millis()).unwrap_or(u64::MAX),
                "waiting before reconnect"
            );
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.reconnect.delay) => {}
            }
        }

        tracing::debug!(scope = %self.scope, "availability loop exiting");
    }

    /// One connection: open, then deliver batches until the body ends or fails.
    async fn connect_and_read(&self) -> Result<(), Error> {
        let body = self.transport.open(&self.scope, &self.auth).await?;
        tracing::info!(scope = %self.scope, "availability stream open");
        let last_error = self.status.borrow().last_error;
        self.publish(SubscriptionState::Open, last_error);

        let mut frames = std::pin::pin!(sse::frames(body));
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(serde_json::Value::Array(batch)) => {
                    if self.batch_tx.send(batch).is_err() {
                        // Receiver gone: the handle was cancelled or dropped.
                        return Ok(());
                    }
                    self.publish(SubscriptionState::Open, None);
                }
                Ok(other) => {
                    tracing::debug!(
                        kind = json_kind(&other),
                        "skipping availability payload that is not an array"
                    );
                }
                Err(e) if e.kind() == ErrorKind::Protocol => {
                    tracing::warn!(error = %e, "skipping malformed availability record");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Update the status unless the handle has already closed it.
    fn publish(&self, state: SubscriptionState, last_error: Option<ErrorKind>) {
        self.status.send_if_modified(|s| {
            if s.state == SubscriptionState::Closed {
                return false;
            }
            let next = SubscriptionStatus { state, last_error };
            let changed = *s != next;
            *s = next;
            changed
        });
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;

    enum Script {
        Fail(Error),
        /// Body chunks; `hold` keeps the connection open after the last chunk.
        Body { chunks: Vec<&'static str>, hold: bool },
    }

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Script>>,
        opens: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                opens: AtomicU32::new(0),
            })
        }

        fn opens(&self) -> u32 {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl AvailabilityTransport for ScriptedTransport {
        async fn open(&self, _scope: &str, _auth: &AuthContext) -> Result<BodyStream, Error> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Script::Fail(e)) => Err(e),
                Some(Script::Body { chunks, hold }) => {
                    let body = futures_util::stream::iter(
                        chunks
                            .into_iter()
                            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                            .collect::<Vec<_>>(),
                    );
                    if hold {
                        Ok(body.chain(futures_util::stream::pending()).boxed())
                    } else {
                        Ok(body.boxed())
                    }
                }
                None => Err(Error::StreamInterrupted("script exhausted".into())),
            }
        }
    }

    fn auth() -> AuthContext {
        AuthContext::new(SecretString::from("token".to_string()), "operator")
    }

    fn unavailable() -> Error {
        Error::Api {
            status: 503,
            message: "hub restarting".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fails_twice_then_opens_on_third_attempt() {
        let transport = ScriptedTransport::new(vec![
            Script::Fail(unavailable()),
            Script::Fail(Error::StreamInterrupted("connection reset".into())),
            Script::Body {
                chunks: vec!["data: [{\"udid\":\"dev-1\",\"available\":true}]\n\n"],
                hold: true,
            },
        ]);

        let mut sub = AvailabilitySubscription::spawn(
            Arc::clone(&transport),
            "ws-1",
            auth(),
            ReconnectConfig::default(),
        );

        let batch = sub.next_batch().await.unwrap();
        assert_eq!(batch, vec![json!({"udid": "dev-1", "available": true})]);

        let quiet = tokio::time::timeout(Duration::from_secs(5), sub.next_batch()).await;
        assert!(quiet.is_err(), "no further batches expected");

        assert_eq!(transport.opens(), 3);
        assert_eq!(sub.attempts(), 3);
        assert_eq!(
            sub.status(),
            SubscriptionStatus {
                state: SubscriptionState::Open,
                last_error: None,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_closes_without_retry() {
        let transport = ScriptedTransport::new(vec![Script::Fail(Error::Authentication {
            message: "expired".into(),
        })]);

        let mut sub =
            AvailabilitySubscription::spawn(Arc::clone(&transport), "ws-1", auth(), ReconnectConfig::default());

        let mut status = sub.status_receiver();
        status
            .wait_for(|s| s.state == SubscriptionState::Closed)
            .await
            .unwrap();

        assert_eq!(sub.status().last_error, Some(ErrorKind::Auth));
        assert!(sub.next_batch().await.is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_reconnect_delay_stops_retries() {
        let transport = ScriptedTransport::new(vec![Script::Fail(unavailable())]);

        let mut sub =
            AvailabilitySubscription::spawn(Arc::clone(&transport), "ws-1", auth(), ReconnectConfig::default());

        let mut status = sub.status_receiver();
        status
            .wait_for(|s| s.state == SubscriptionState::Reconnecting)
            .await
            .unwrap();
        assert!(sub.status().is_unavailable());
        assert_eq!(sub.status().last_error, Some(ErrorKind::Transport));

        sub.cancel();
        assert!(sub.is_closed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.opens(), 1);
        assert!(sub.next_batch().await.is_none());

        // Second cancel is a no-op.
        sub.cancel();
        assert!(sub.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_discards_partial_record() {
        let transport = ScriptedTransport::new(vec![
            Script::Body {
                chunks: vec!["data: [{\"udid\":\"a\"}]\n\ndata: [{\"ud"],
                hold: false,
            },
            Script::Body {
                chunks: vec!["id\":\"b\"}]\n\n", "data: [{\"udid\":\"c\"}]\n\n"],
                hold: true,
            },
        ]);

        let mut sub =
            AvailabilitySubscription::spawn(Arc::clone(&transport), "ws-1", auth(), ReconnectConfig::default());

        assert_eq!(sub.next_batch().await.unwrap(), vec![json!({"udid": "a"})]);
        assert_eq!(sub.next_batch().await.unwrap(), vec![json!({"udid": "c"})]);
        assert_eq!(transport.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payloads_are_skipped_not_fatal() {
        let transport = ScriptedTransport::new(vec![Script::Body {
            chunks: vec![
                "data: {broken\n\n",
                "data: {\"not\":\"an array\"}\n\n",
                "data: [{\"udid\":\"x\"}]\n\n",
            ],
            hold: true,
        }]);

        let mut sub =
            AvailabilitySubscription::spawn(Arc::clone(&transport), "ws-1", auth(), ReconnectConfig::default());

        assert_eq!(sub.next_batch().await.unwrap(), vec![json!({"udid": "x"})]);
        assert_eq!(sub.status().state, SubscriptionState::Open);
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_arrive_in_order_without_coalescing() {
        let transport = ScriptedTransport::new(vec![Script::Body {
            chunks: vec!["data: [1]\n\ndata: [2]\n\n", "data: [3]\n\n"],
            hold: true,
        }]);

        let mut sub =
            AvailabilitySubscription::spawn(Arc::clone(&transport), "ws-1", auth(), ReconnectConfig::default());

        for n in 1..=3 {
            assert_eq!(sub.next_batch().await.unwrap(), vec![json!(n)]);
        }
    }

    #[test]
    fn feed_url_carries_scope() {
        let transport = HttpAvailabilityTransport::new(
            reqwest::Client::new(),
            Url::parse("https://hub.example.com").unwrap(),
        );
        assert_eq!(
            transport.feed_url("ws 1").unwrap().as_str(),
            "https://hub.example.com/available-devices?workspaceId=ws+1"
        );
    }
}
