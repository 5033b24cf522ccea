// ── Runtime console configuration ──
//
// Describes *how* to reach a hub and who the operator is. Never touches
// disk; the CLI builds a `ConsoleConfig` from its profile and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use devhub_api::{ControlSessionConfig, PingReply, ReconnectConfig, TlsMode, TransportConfig};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed hubs).
    DangerAcceptInvalid,
}

/// Configuration for one hub and one operator.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Hub base URL, e.g. `https://hub.example.com`.
    pub url: Url,
    /// Operator username; also the control-session liveness message.
    pub username: String,
    /// Bearer token issued at login.
    pub token: SecretString,
    /// Workspace to scope the availability feed to. `None` picks the
    /// hub's default workspace.
    pub workspace: Option<String>,
    pub tls: TlsVerification,
    /// Request timeout for command and listing calls.
    pub timeout: Duration,
    /// Wait between availability feed reconnects.
    pub reconnect_delay: Duration,
    /// Control-session liveness period.
    pub liveness_interval: Duration,
    pub ping_reply: PingReply,
}

impl ConsoleConfig {
    /// A config with default tuning.
    pub fn new(url: Url, username: impl Into<String>, token: SecretString) -> Self {
        Self {
            url,
            username: username.into(),
            token,
            workspace: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            reconnect_delay: ReconnectConfig::default().delay,
            liveness_interval: ControlSessionConfig::default().liveness_interval,
            ping_reply: PingReply::default(),
        }
    }

    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }

    pub(crate) fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            delay: self.reconnect_delay,
        }
    }

    pub(crate) fn control_session(&self) -> ControlSessionConfig {
        ControlSessionConfig {
            liveness_interval: self.liveness_interval,
            ping_reply: self.ping_reply,
        }
    }
}
