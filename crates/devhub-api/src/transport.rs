// Shared transport configuration for building reqwest::Client instances
// and the control socket's TLS connector.
//
// The command client, the availability feed and the control socket share TLS
// settings through this module; the HTTP clients also share timeouts. The feed client never sets a total request
// timeout because its body is written for as long as the subscription lives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_tungstenite::Connector;
use url::Url;

use crate::error::Error;

const USER_AGENT: &str = concat!("devhub/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode (api-level mirror of core's TlsVerification).
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed hubs).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Build a client for request/response endpoints (total timeout applies).
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        self.builder().timeout(self.timeout).build().map_err(|e| {
            Error::Tls(format!("failed to build HTTP client: {e}"))
        })
    }

    /// Build a client for long-lived streaming bodies (connect timeout only).
    pub fn build_streaming_client(&self) -> Result<reqwest::Client, Error> {
        self.builder()
            .build()
            .map_err(|e| Error::Tls(format!("failed to build streaming client: {e}")))
    }

    fn builder(&self) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => match load_ca(path) {
                Ok(cert) => builder = builder.add_root_certificate(cert),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring CA cert"),
            },
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
    }
}

impl TransportConfig {
    /// TLS connector for `wss://` control sockets.
    ///
    /// `None` keeps tungstenite's default (webpki roots). A custom CA is added
    /// on top of those roots, matching the HTTP clients.
    pub fn websocket_connector(&self) -> Result<Option<Connector>, Error> {
        let config = match &self.tls {
            TlsMode::System => return Ok(None),
            TlsMode::CustomCa(path) => {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                for cert in load_ca_chain(path)? {
                    roots
                        .add(cert)
                        .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                }
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth()
            }
            TlsMode::DangerAcceptInvalid => {
                let mut config = ClientConfig::builder()
                    .with_root_certificates(RootCertStore::empty())
                    .with_no_client_auth();
                let provider = Arc::clone(config.crypto_provider());
                config
                    .dangerous()
                    .set_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }));
                config
            }
        };
        Ok(Some(Connector::Rustls(Arc::new(config))))
    }
}

fn load_ca_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let pem =
        std::fs::read(path).map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Certificate verifier for `--insecure`: any chain, any name. Handshake
/// signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn load_ca(path: &PathBuf) -> Result<reqwest::Certificate, Error> {
    let cert_pem =
        std::fs::read(path).map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
    reqwest::Certificate::from_pem(&cert_pem)
        .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))
}

/// Resolve `path` against the hub base URL, keeping any base path prefix.
///
/// `https://hub/farm` + `device/x/tap` becomes `https://hub/farm/device/x/tap`.
pub fn endpoint(base_url: &Url, path: &str) -> Result<Url, Error> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// `{base}/{route}/{device_id}/{action}` with the identifier as one segment.
///
/// The identifier is percent-encoded, so `/`, `?` and `#` stay inside it.
/// Empty, `.` and `..` identifiers are rejected.
pub fn device_endpoint(
    base_url: &Url,
    route: &str,
    device_id: &str,
    action: &str,
) -> Result<Url, Error> {
    if matches!(device_id, "" | "." | "..") {
        return Err(Error::InvalidDeviceId(device_id.to_owned()));
    }
    let mut url = base_url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(route.split('/').filter(|s| !s.is_empty()))
        .push(device_id)
        .push(action);
    Ok(url)
}

/// Convert an `http(s)` hub URL into the matching `ws(s)` URL.
pub fn websocket_base(base_url: &Url) -> Result<Url, Error> {
    let mut ws = base_url.clone();
    let scheme = match base_url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::WebSocketConnect(format!(
                "unsupported URL scheme '{other}'"
            )));
        }
    };
    ws.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot use scheme {scheme}")))?;
    Ok(ws)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn https_maps_to_wss() {
        let url = Url::parse("https://hub.example.com:8443/").unwrap();
        assert_eq!(websocket_base(&url).unwrap().as_str(), "wss://hub.example.com:8443/");
    }

    #[test]
    fn http_maps_to_ws() {
        let url = Url::parse("http://127.0.0.1:10000").unwrap();
        assert_eq!(websocket_base(&url).unwrap().scheme(), "ws");
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let base = Url::parse("https://hub.example.com/farm").unwrap();
        let url = endpoint(&base, "/device/abc/tap").unwrap();
        assert_eq!(url.as_str(), "https://hub.example.com/farm/device/abc/tap");

        let root = Url::parse("http://127.0.0.1:10000").unwrap();
        let url = endpoint(&root, "available-devices").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:10000/available-devices");
    }

    #[test]
    fn device_endpoint_keeps_identifier_in_one_segment() {
        let base = Url::parse("https://hub.example.com/farm/").unwrap();
        let url = device_endpoint(&base, "device", "00008110-ABC", "tap").unwrap();
        assert_eq!(url.as_str(), "https://hub.example.com/farm/device/00008110-ABC/tap");

        let url = device_endpoint(&base, "admin/device", "../admin/device/z", "tap").unwrap();
        assert_eq!(
            url.as_str(),
            "https://hub.example.com/farm/admin/device/..%2Fadmin%2Fdevice%2Fz/tap"
        );

        let url = device_endpoint(&base, "device", "dev?x#y%", "info").unwrap();
        assert_eq!(url.path(), "/farm/device/dev%3Fx%23y%25/info");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }

    #[test]
    fn device_endpoint_rejects_dot_segments() {
        let base = Url::parse("https://hub.example.com").unwrap();
        for id in ["", ".", ".."] {
            assert!(matches!(
                device_endpoint(&base, "device", id, "tap"),
                Err(Error::InvalidDeviceId(_))
            ));
        }
    }

    #[test]
    fn rejects_unknown_scheme() {
        let url = Url::parse("ftp://hub").unwrap();
        assert!(websocket_base(&url).is_err());
    }

    #[test]
    fn websocket_connector_follows_tls_mode() {
        let system = TransportConfig::default();
        assert!(system.websocket_connector().unwrap().is_none());

        let insecure = TransportConfig {
            tls: TlsMode::DangerAcceptInvalid,
            ..TransportConfig::default()
        };
        assert!(matches!(
            insecure.websocket_connector().unwrap(),
            Some(Connector::Rustls(_))
        ));

        let missing_ca = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/nonexistent/devhub-ca.pem")),
            ..TransportConfig::default()
        };
        assert!(matches!(missing_ca.websocket_connector(), Err(Error::Tls(_))));
    }

    #[test]
    fn default_transport_builds() {
        let cfg = TransportConfig::default();
        assert!(cfg.build_client().is_ok());
        assert!(cfg.build_streaming_client().is_ok());
    }
}
