//! Control-session channel: one websocket per device-control view.
//!
//! The hub keeps a device reserved for an operator for as long as the
//! operator's control socket stays open and keeps saying hello. The session
//! sends the operator's username right after the handshake and then every
//! liveness interval. The server may end the session at any time by pushing
//! `{"type":"releaseDevice"}` (an administrator took the device back) or
//! `{"type":"sessionExpired"}`.
//!
//! State machine: `Connecting -> Active -> Terminated(reason)`. The first
//! terminal reason wins; nothing is sent once the session has terminated.

use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::AuthContext;
use crate::error::Error;
use crate::transport::{TransportConfig, device_endpoint, websocket_base};

// ── Configuration ────────────────────────────────────────────────────

/// How to answer a server `ping` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PingReply {
    /// Reply with the operator username, same as a liveness message.
    #[default]
    Username,
    /// Treat pings as informational only.
    Ignore,
}

#[derive(Debug, Clone, Copy)]
pub struct ControlSessionConfig {
    /// Period of the username liveness message. Default: 1.5s.
    pub liveness_interval: Duration,
    pub ping_reply: PingReply,
}

impl Default for ControlSessionConfig {
    fn default() -> Self {
        Self {
            liveness_interval: Duration::from_millis(1500),
            ping_reply: PingReply::Username,
        }
    }
}

// ── Session state ────────────────────────────────────────────────────

/// Why a control session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// An administrator released the device (`releaseDevice`).
    Released,
    /// The hub expired the reservation (`sessionExpired`).
    Expired,
    /// The socket failed, or could not be opened.
    TransportError,
    /// The socket was closed without a control event.
    Closed,
    /// The handshake was rejected with 401/403.
    Unauthorized,
    /// The operator closed the session.
    Cancelled,
}

impl TerminationReason {
    /// Message suitable for showing the operator.
    pub fn operator_message(self) -> &'static str {
        match self {
            Self::Released => "The device was released by an administrator.",
            Self::Expired => "Your control session has expired.",
            Self::TransportError => "Connection to the device was lost.",
            Self::Closed => "The hub closed the control session.",
            Self::Unauthorized => "Your credentials were rejected. Log in again.",
            Self::Cancelled => "Control session closed.",
        }
    }

    /// `true` when the hub (not the network, not the operator) ended it.
    pub fn is_server_initiated(self) -> bool {
        matches!(self, Self::Released | Self::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Terminated(TerminationReason),
}

impl SessionState {
    pub fn termination(self) -> Option<TerminationReason> {
        match self {
            Self::Terminated(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Events the hub pushes over the control socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerEvent {
    ReleaseDevice,
    SessionExpired,
    Ping,
    #[serde(other)]
    Unknown,
}

// ── ControlSession ───────────────────────────────────────────────────

/// Handle to one control session. Dropping it closes the session.
pub struct ControlSession {
    device_id: String,
    link: SessionLink,
    state_rx: watch::Receiver<SessionState>,
}

/// The half of a session shared with its background driver.
#[derive(Clone)]
struct SessionLink {
    state: Arc<watch::Sender<SessionState>>,
    cancel: CancellationToken,
}

impl SessionLink {
    fn activate(&self) -> bool {
        self.state.send_if_modified(|s| {
            if *s == SessionState::Connecting {
                *s = SessionState::Active;
                true
            } else {
                false
            }
        })
    }

    /// Record the terminal reason unless one was already recorded.
    fn terminate(&self, reason: TerminationReason) -> bool {
        self.state.send_if_modified(|s| {
            if matches!(s, SessionState::Terminated(_)) {
                false
            } else {
                *s = SessionState::Terminated(reason);
                true
            }
        })
    }
}

impl ControlSession {
    fn detached(device_id: impl Into<String>) -> (Self, SessionLink) {
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let link = SessionLink {
            state: Arc::new(state_tx),
            cancel: CancellationToken::new(),
        };
        let session = Self {
            device_id: device_id.into(),
            link: link.clone(),
            state_rx,
        };
        (session, link)
    }

    /// Open a control session for `device_id` against the hub at `base_url`.
    ///
    /// Returns at once in `Connecting`; the handshake runs on the runtime
    /// with the TLS mode of `transport`. Fails only if the control URL or
    /// the TLS connector cannot be built.
    pub fn open(
        base_url: &Url,
        device_id: &str,
        auth: &AuthContext,
        config: ControlSessionConfig,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let url = control_url(base_url, device_id, auth)?;
        let connector = transport.websocket_connector()?;
        let (session, link) = Self::detached(device_id);
        let username = auth.username().to_owned();
        let device = device_id.to_owned();

        tokio::spawn(async move {
            connect_and_drive(url, connector, device, username, config, link).await;
        });

        Ok(session)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Wait until the session terminates and return why.
    pub async fn terminated(&self) -> TerminationReason {
        let mut rx = self.state_rx.clone();
        match rx.wait_for(|s| matches!(s, SessionState::Terminated(_))).await {
            Ok(state) => state.termination().unwrap_or(TerminationReason::Closed),
            // Sender lives in this handle, so this arm is unreachable in practice.
            Err(_) => TerminationReason::Closed,
        }
    }

    /// Close the session: stop the liveness timer and close the socket once.
    ///
    /// The state reads `Terminated(Cancelled)` on return unless the session
    /// had already terminated. Repeated calls do nothing.
    pub fn close(&self) {
        if self.link.cancel.is_cancelled() {
            return;
        }
        if self.link.terminate(TerminationReason::Cancelled) {
            tracing::info!(device_id = %self.device_id, "closing control session");
        }
        self.link.cancel.cancel();
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// `ws(s)://{host}/devices/control/{device_id}/in-use?token=Bearer%20{token}`
pub fn control_url(base_url: &Url, device_id: &str, auth: &AuthContext) -> Result<Url, Error> {
    let ws = websocket_base(base_url)?;
    let mut url = device_endpoint(&ws, "devices/control", device_id, "in-use")?;
    url.set_query(Some(&auth.token_query()));
    Ok(url)
}

// ── Background driver ────────────────────────────────────────────────

async fn connect_and_drive(
    url: Url,
    connector: Option<Connector>,
    device_id: String,
    username: String,
    config: ControlSessionConfig,
    link: SessionLink,
) {
    // The URL carries the token; log the device only.
    tracing::info!(%device_id, "opening control session");

    let uri: tungstenite::http::Uri = match url.as_str().parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(%device_id, error = %e, "invalid control URL");
            link.terminate(TerminationReason::TransportError);
            return;
        }
    };

    let handshake = tokio_tungstenite::connect_async_tls_with_config(
        ClientRequestBuilder::new(uri),
        None,
        false,
        connector,
    );
    let result = tokio::select! {
        biased;
        () = link.cancel.cancelled() => return,
        result = handshake => result,
    };

    match result {
        Ok((ws, _response)) => {
            tracing::info!(%device_id, "control session connected");
            let (write, read) = ws.split();
            drive(write, read, &username, config, &link).await;
        }
        Err(tungstenite::Error::Http(response))
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            tracing::warn!(%device_id, status = %response.status(), "control session rejected");
            link.terminate(TerminationReason::Unauthorized);
        }
        Err(e) => {
            tracing::warn!(%device_id, error = %e, "control session connect failed");
            link.terminate(TerminationReason::TransportError);
        }
    }
}

/// Run an open session until it terminates.
///
/// Generic over the socket halves so the protocol can run over any
/// message transport.
async fn drive<W, R>(
    write: W,
    read: R,
    username: &str,
    config: ControlSessionConfig,
    link: &SessionLink,
) where
    W: Sink<Message, Error = tungstenite::Error> + Send,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Send,
{
    let mut write = std::pin::pin!(write);
    let mut read = std::pin::pin!(read);

    if !link.activate() {
        // Closed while the handshake was completing.
        let _ = write.close().await;
        return;
    }

    if let Err(e) = write.send(Message::text(username)).await {
        tracing::warn!(error = %e, "failed to send initial liveness message");
        link.terminate(TerminationReason::TransportError);
        return;
    }

    let period = config.liveness_interval;
    let mut liveness = tokio::time::interval_at(Instant::now() + period, period);
    liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            biased;
            () = link.cancel.cancelled() => break TerminationReason::Cancelled,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(ServerEvent::ReleaseDevice) => break TerminationReason::Released,
                        Ok(ServerEvent::SessionExpired) => break TerminationReason::Expired,
                        Ok(ServerEvent::Ping) => {
                            tracing::trace!("control ping");
                            if config.ping_reply == PingReply::Username {
                                if let Err(e) = write.send(Message::text(username)).await {
                                    tracing::warn!(error = %e, "failed to answer ping");
                                    break TerminationReason::TransportError;
                                }
                            }
                        }
                        Ok(ServerEvent::Unknown) | Err(_) => {
                            tracing::trace!(message = %text.as_str(), "ignoring control message");
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(cf) = frame {
                        tracing::info!(code = %cf.code, reason = %cf.reason, "control socket closed by hub");
                    }
                    break TerminationReason::Closed;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "control socket error");
                    break TerminationReason::TransportError;
                }
                None => break TerminationReason::Closed,
            },
            _ = liveness.tick() => {
                if let Err(e) = write.send(Message::text(username)).await {
                    tracing::warn!(error = %e, "failed to send liveness message");
                    break TerminationReason::TransportError;
                }
            }
        }
    };

    let first = link.terminate(reason);
    if first {
        tracing::info!(?reason, "control session terminated");
    }
    if reason != TerminationReason::TransportError {
        let _ = write.close().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use tokio::sync::mpsc;

    use super::*;

    struct Harness {
        session: ControlSession,
        /// Messages the session sent.
        sent: mpsc::UnboundedReceiver<Message>,
        /// Feed for messages the "hub" sends.
        hub: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
    }

    fn start(config: ControlSessionConfig) -> Harness {
        let (session, link) = ControlSession::detached("dev-1");
        let (sent_tx, sent) = mpsc::unbounded_channel::<Message>();
        let (hub, hub_rx) = mpsc::unbounded_channel();

        let write = futures_util::sink::unfold(sent_tx, |tx, msg: Message| async move {
            tx.send(msg)
                .map_err(|_| tungstenite::Error::ConnectionClosed)?;
            Ok::<_, tungstenite::Error>(tx)
        });
        let read = futures_util::stream::unfold(hub_rx, |mut rx| async move {
            rx.recv().await.map(|m| (m, rx))
        });

        tokio::spawn(async move {
            drive(write, read, "alice", config, &link).await;
        });

        Harness { session, sent, hub }
    }

    fn text(msg: &Message) -> &str {
        match msg {
            Message::Text(t) => t.as_str(),
            other => panic!("expected text, got {other:?}"),
        }
    }

    fn hub_says(kind: &str) -> Result<Message, tungstenite::Error> {
        Ok(Message::text(format!("{{\"type\":\"{kind}\"}}")))
    }

    #[tokio::test(start_paused = true)]
    async fn sends_username_on_open_and_every_interval() {
        let mut h = start(ControlSessionConfig::default());

        assert_eq!(text(&h.sent.recv().await.unwrap()), "alice");
        assert_eq!(h.session.state(), SessionState::Active);

        let before = Instant::now();
        assert_eq!(text(&h.sent.recv().await.unwrap()), "alice");
        assert_eq!(before.elapsed(), Duration::from_millis(1500));

        assert_eq!(text(&h.sent.recv().await.unwrap()), "alice");
        assert_eq!(before.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn release_terminates_and_stops_liveness() {
        let mut h = start(ControlSessionConfig::default());
        assert_eq!(text(&h.sent.recv().await.unwrap()), "alice");

        h.hub.send(hub_says("releaseDevice")).unwrap();
        assert_eq!(h.session.terminated().await, TerminationReason::Released);

        tokio::time::sleep(Duration::from_secs(10)).await;
        // Driver finished and dropped the sink; nothing else was queued.
        assert!(h.sent.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_terminates_with_expired() {
        let mut h = start(ControlSessionConfig::default());
        h.sent.recv().await.unwrap();

        h.hub.send(hub_says("sessionExpired")).unwrap();
        let reason = h.session.terminated().await;
        assert_eq!(reason, TerminationReason::Expired);
        assert!(reason.is_server_initiated());
        assert_ne!(
            reason.operator_message(),
            TerminationReason::Released.operator_message()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ping_is_answered_with_username_by_default() {
        let mut h = start(ControlSessionConfig {
            liveness_interval: Duration::from_secs(60),
            ..ControlSessionConfig::default()
        });
        h.sent.recv().await.unwrap();

        h.hub.send(hub_says("ping")).unwrap();
        assert_eq!(text(&h.sent.recv().await.unwrap()), "alice");
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_can_be_ignored() {
        let mut h = start(ControlSessionConfig {
            liveness_interval: Duration::from_secs(60),
            ping_reply: PingReply::Ignore,
        });
        h.sent.recv().await.unwrap();

        h.hub.send(hub_says("ping")).unwrap();
        let quiet = tokio::time::timeout(Duration::from_secs(1), h.sent.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_and_non_json_messages_are_ignored() {
        let mut h = start(ControlSessionConfig::default());
        h.sent.recv().await.unwrap();

        h.hub.send(hub_says("somethingNew")).unwrap();
        h.hub.send(Ok(Message::text("not json"))).unwrap();
        h.hub.send(Ok(Message::Binary(vec![1, 2, 3].into()))).unwrap();

        assert_eq!(text(&h.sent.recv().await.unwrap()), "alice");
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn server_close_and_stream_end_are_closed() {
        let mut h = start(ControlSessionConfig::default());
        h.sent.recv().await.unwrap();
        h.hub.send(Ok(Message::Close(None))).unwrap();
        assert_eq!(h.session.terminated().await, TerminationReason::Closed);

        let mut h = start(ControlSessionConfig::default());
        h.sent.recv().await.unwrap();
        drop(h.hub);
        assert_eq!(h.session.terminated().await, TerminationReason::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn socket_error_is_transport_error() {
        let mut h = start(ControlSessionConfig::default());
        h.sent.recv().await.unwrap();
        h.hub.send(Err(tungstenite::Error::ConnectionClosed)).unwrap();
        assert_eq!(
            h.session.terminated().await,
            TerminationReason::TransportError
        );
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_immediate_idempotent_and_first_reason_wins() {
        let mut h = start(ControlSessionConfig::default());
        h.sent.recv().await.unwrap();

        h.session.close();
        assert_eq!(
            h.session.state(),
            SessionState::Terminated(TerminationReason::Cancelled)
        );
        h.session.close();

        // A late release does not overwrite the recorded reason.
        let _ = h.hub.send(hub_says("releaseDevice"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(
            h.session.state(),
            SessionState::Terminated(TerminationReason::Cancelled)
        );
        assert!(h.sent.recv().await.is_none());
    }

    #[test]
    fn control_url_uses_ws_scheme_and_bearer_token() {
        let auth = AuthContext::new(SecretString::from("t0k".to_string()), "alice");
        let base = Url::parse("https://hub.example.com").unwrap();
        let url = control_url(&base, "00008110-ABC", &auth).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://hub.example.com/devices/control/00008110-ABC/in-use?token=Bearer%20t0k"
        );
    }

    #[test]
    fn control_url_escapes_identifier_before_token_query() {
        let auth = AuthContext::new(SecretString::from("t".to_string()), "alice");
        let base = Url::parse("https://hub.example.com").unwrap();
        let url = control_url(&base, "dev?x#y", &auth).unwrap();
        assert_eq!(
            url.as_str(),
            "wss://hub.example.com/devices/control/dev%3Fx%23y/in-use?token=Bearer%20t"
        );
        assert!(control_url(&base, "..", &auth).is_err());
    }

    #[test]
    fn ping_reply_parses_from_config_strings() {
        let reply: PingReply = serde_json::from_str("\"ignore\"").unwrap();
        assert_eq!(reply, PingReply::Ignore);
        assert_eq!(PingReply::default(), PingReply::Username);
    }
}
