use secrecy::{ExposeSecret, SecretString};

/// Operator credential handed to every subscription and session.
///
/// Populated at login by an external collaborator and read-only here: the
/// token is reread each time a connection opens, never refreshed by this crate.
#[derive(Debug, Clone)]
pub struct AuthContext {
    token: SecretString,
    username: String,
}

impl AuthContext {
    pub fn new(token: SecretString, username: impl Into<String>) -> Self {
        Self {
            token,
            username: username.into(),
        }
    }

    /// The operator's username, sent as the liveness message on control sessions.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// `Authorization` header value: `Bearer {token}`.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret())
    }

    /// Raw token, for transports that need to place it themselves.
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// Query string carrying the bearer credential: `token=Bearer%20{token}`.
    ///
    /// Used on websocket and video-stream URLs, which carry no headers.
    pub(crate) fn token_query(&self) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(self.bearer().as_bytes()).collect();
        // A literal `+` was already escaped to `%2B`, so every `+` left is a space.
        format!("token={}", encoded.replace('+', "%20"))
    }
}
