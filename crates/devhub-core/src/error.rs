// ── Core error types ──
//
// User-facing errors from devhub-core. Consumers see domain failures
// ("device not found", "session ended"), not HTTP status codes; the
// `From<devhub_api::Error>` impl does the translation.

use devhub_api::{ErrorKind, TerminationReason};
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Hub request timed out")]
    Timeout,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("No workspace available to scope the availability feed")]
    NoWorkspace,

    #[error("Screen resolution of {device} is unknown")]
    ResolutionUnknown { device: String },

    // ── Session errors ───────────────────────────────────────────────
    #[error("Control session ended: {}", .reason.operator_message())]
    SessionTerminated { reason: TerminationReason },

    #[error("Control session is not active")]
    SessionNotActive,

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Hub error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Unexpected hub response: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Coarse classification, shared with the transport layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed { .. } => ErrorKind::Auth,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::SessionTerminated {
                reason: TerminationReason::Cancelled,
            } => ErrorKind::UserCancelled,
            Self::SessionTerminated {
                reason: TerminationReason::Unauthorized,
            } => ErrorKind::Auth,
            Self::SessionTerminated { .. } | Self::SessionNotActive => ErrorKind::ServerTerminated,
            _ => ErrorKind::Transport,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<devhub_api::Error> for CoreError {
    fn from(err: devhub_api::Error) -> Self {
        match err {
            devhub_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            devhub_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), |u| u.origin().ascii_serialization()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            devhub_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            devhub_api::Error::InvalidDeviceId(identifier) => {
                CoreError::DeviceNotFound { identifier }
            }
            devhub_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            devhub_api::Error::StreamInterrupted(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            devhub_api::Error::Api { status, message } => match status {
                401 | 403 => CoreError::AuthenticationFailed { message },
                _ => CoreError::Api {
                    message,
                    status: Some(status),
                },
            },
            devhub_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            devhub_api::Error::Deserialization { message, body: _ } => {
                CoreError::Protocol { message }
            }
            devhub_api::Error::Protocol(message) => CoreError::Protocol { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_maps_to_authentication() {
        let err: CoreError = devhub_api::Error::Api {
            status: 403,
            message: "workspace not permitted".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn session_end_message_is_operator_facing() {
        let err = CoreError::SessionTerminated {
            reason: TerminationReason::Released,
        };
        assert_eq!(
            err.to_string(),
            "Control session ended: The device was released by an administrator."
        );
        assert_eq!(err.kind(), ErrorKind::ServerTerminated);
    }
}
