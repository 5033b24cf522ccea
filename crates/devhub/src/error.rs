//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use devhub_config::ConfigError;
use devhub_core::{CoreError, TerminationReason};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const SESSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to hub at {url}")]
    #[diagnostic(
        code(devhub::connection_failed),
        help(
            "Check that the hub is running and reachable.\n\
             Reason: {reason}\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(devhub::timeout),
        help("Increase the timeout with --timeout or check hub responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(devhub::auth_failed),
        help(
            "The hub rejected the token. Log in again and store the new token:\n\
             devhub config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(devhub::no_credentials),
        help(
            "Configure one with: devhub config init\n\
             Or set the DEVHUB_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(devhub::not_found),
        help("Run: devhub {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("No workspace to follow")]
    #[diagnostic(
        code(devhub::no_workspace),
        help("Pass --workspace or set one in your profile: devhub config set workspace <id>")
    )]
    NoWorkspace,

    #[error("Screen resolution of '{device}' is unknown")]
    #[diagnostic(
        code(devhub::resolution_unknown),
        help("The hub did not report a screen size; pass device coordinates instead.")
    )]
    ResolutionUnknown { device: String },

    // ── Session ──────────────────────────────────────────────────────
    #[error("Control session ended: {message}")]
    #[diagnostic(code(devhub::session_ended))]
    SessionEnded { message: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Hub error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    #[diagnostic(code(devhub::api_error))]
    ApiError { status: Option<u16>, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(devhub::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(devhub::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: devhub config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(devhub::no_config),
        help(
            "Create one with: devhub config init\n\
             Expected at: {path}\n\
             Or pass --url, --username and --token."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(devhub::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(devhub::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid base64 image data: {0}")]
    #[diagnostic(code(devhub::image))]
    Image(#[from] base64::DecodeError),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::NoWorkspace => exit_code::NOT_FOUND,
            Self::SessionEnded { .. } => exit_code::SESSION,
            Self::Validation { .. }
            | Self::NonInteractiveRequiresYes { .. }
            | Self::ResolutionUnknown { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::Timeout => CliError::Timeout,

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
                list_command: "devices list".into(),
            },

            CoreError::NoWorkspace => CliError::NoWorkspace,

            CoreError::ResolutionUnknown { device } => CliError::ResolutionUnknown { device },

            CoreError::SessionTerminated {
                reason: TerminationReason::Unauthorized,
            } => CliError::AuthFailed {
                message: TerminationReason::Unauthorized.operator_message().into(),
            },

            CoreError::SessionTerminated { reason } => CliError::SessionEnded {
                message: reason.operator_message().into(),
            },

            CoreError::SessionNotActive => CliError::SessionEnded {
                message: "the session is not active yet".into(),
            },

            CoreError::Api { message, status } => CliError::ApiError { status, message },

            CoreError::Protocol { message } | CoreError::Internal(message) => CliError::ApiError {
                status: None,
                message,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let not_found: CliError = CoreError::DeviceNotFound {
            identifier: "ghost".into(),
        }
        .into();
        assert_eq!(not_found.exit_code(), exit_code::NOT_FOUND);
        assert_eq!(not_found.to_string(), "device 'ghost' not found");

        let released: CliError = CoreError::SessionTerminated {
            reason: TerminationReason::Released,
        }
        .into();
        assert_eq!(released.exit_code(), exit_code::SESSION);

        let rejected: CliError = CoreError::SessionTerminated {
            reason: TerminationReason::Unauthorized,
        }
        .into();
        assert_eq!(rejected.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn api_error_shows_status_when_known() {
        let err = CliError::ApiError {
            status: Some(409),
            message: "device busy".into(),
        };
        assert_eq!(err.to_string(), "Hub error (HTTP 409): device busy");
    }
}
