// Device service HTTP client
//
// Wraps `reqwest::Client` with hub URL construction, bearer auth, and
// `{ message, result, error }` envelope handling. Endpoint methods live in
// `commands.rs` as inherent methods to keep this module about transport.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::AuthContext;
use crate::error::Error;
use crate::transport::{TransportConfig, device_endpoint, endpoint};

/// HTTP client for the hub's device-command and inventory endpoints.
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: Url,
    auth: AuthContext,
}

impl DeviceClient {
    /// Create a client from a `TransportConfig`. `base_url` is the hub root,
    /// e.g. `https://hub.example.com`.
    pub fn new(base_url: Url, auth: AuthContext, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, auth: AuthContext) -> Self {
        Self {
            http,
            base_url,
            auth,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        endpoint(&self.base_url, path)
    }

    pub(crate) fn device_url(&self, route: &str, device_id: &str, action: &str) -> Result<Url, Error> {
        device_endpoint(&self.base_url, route, device_id, action)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// GET and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url.path());
        let resp = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .send()
            .await?;
        Self::parse(resp).await
    }

    /// POST with an optional JSON body.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<T, Error> {
        debug!("POST {}", url.path());
        let mut req = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer());
        if let Some(body) = body {
            req = req.json(body);
        }
        Self::parse(req.send().await?).await
    }

    /// POST a multipart form.
    pub(crate) async fn post_multipart<T: DeserializeOwned>(
        &self,
        url: Url,
        form: reqwest::multipart::Form,
    ) -> Result<T, Error> {
        debug!("POST (multipart) {}", url.path());
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .multipart(form)
            .send()
            .await?;
        Self::parse(resp).await
    }

    /// Map the status and decode the body.
    ///
    /// Non-success bodies carry `{ "error": "..." }` (or `message`); that text
    /// becomes the error message. An empty success body decodes as `null`.
    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "token expired or invalid".into(),
            });
        }

        let body = resp.text().await?;

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").into()),
            });
        }

        let text = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

fn error_message(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let from_json = value["error"]
            .as_str()
            .or_else(|| value["message"].as_str())
            .map(String::from);
        if from_json.is_some() {
            return from_json;
        }
    }
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Unwrap `{ "result": X }` to `X`; anything else passes through.
pub(crate) fn unwrap_result(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(mut map) if map.get("result").is_some_and(|r| !r.is_null()) => {
            map.remove("result").unwrap_or_default()
        }
        other => other,
    }
}
