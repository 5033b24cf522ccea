use thiserror::Error;

/// Coarse error classification shared by the subscription and session layers.
///
/// Drives retry policy: `Transport` is retried forever on the availability
/// feed, `Protocol` is swallowed per record, `Auth` is surfaced and never
/// retried. `ServerTerminated` and `UserCancelled` classify control-session
/// endings at the core layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Protocol,
    Auth,
    ServerTerminated,
    UserCancelled,
}

/// Top-level error type for the `devhub-api` crate.
///
/// Covers every failure mode across the hub's surfaces: the REST command
/// endpoint, the availability push feed, and the control-session socket.
/// `devhub-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The hub rejected the bearer credential (401/403).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The push stream ended or failed mid-read.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    // ── Hub API ─────────────────────────────────────────────────────
    /// Non-success response from a hub endpoint.
    #[error("Hub API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Frame was well-formed JSON but not the shape the protocol expects.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Device identifier that cannot be placed in an endpoint path.
    #[error("Invalid device identifier '{0}'")]
    InvalidDeviceId(String),
}

impl Error {
    /// Classify this error for retry and presentation policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Auth,
            Self::Api { status, .. } if matches!(status, 401 | 403) => ErrorKind::Auth,
            Self::Deserialization { .. } | Self::Protocol(_) => ErrorKind::Protocol,
            Self::Transport(e) if e.status().is_some_and(|s| matches!(s.as_u16(), 401 | 403)) => {
                ErrorKind::Auth
            }
            Self::Transport(_)
            | Self::InvalidUrl(_)
            | Self::InvalidDeviceId(_)
            | Self::Tls(_)
            | Self::StreamInterrupted(_)
            | Self::Api { .. }
            | Self::WebSocketConnect(_) => ErrorKind::Transport,
        }
    }

    /// Returns `true` if the credential was rejected and a fresh one is needed.
    pub fn is_auth_expired(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            Self::StreamInterrupted(_) | Self::WebSocketConnect(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_api_status_is_auth_kind() {
        let err = Error::Api {
            status: 401,
            message: "token expired".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.is_auth_expired());
        assert!(!err.is_transient());
    }

    #[test]
    fn server_errors_are_transient_transport() {
        let err = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.is_transient());
    }

    #[test]
    fn bad_payload_is_protocol_kind() {
        let err = Error::Deserialization {
            message: "expected value".into(),
            body: "{oops".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn not_found_detection() {
        let err = Error::Api {
            status: 404,
            message: "no such device".into(),
        };
        assert!(err.is_not_found());
    }
}
