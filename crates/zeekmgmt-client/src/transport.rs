//! The transport seam: a small async trait over a text-frame session,
//! the bounded-retry dialer, and the tokio-tungstenite implementation.
//!
//! The connection state machine is generic over [`Connector`], so the
//! engine tests drive it with a scripted in-memory transport while
//! production dials a real WebSocket with the configured TLS posture.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::TlsOptions;
use crate::error::ClientError;

// ── Traits ───────────────────────────────────────────────────────────

/// One failed dial attempt.
#[derive(Debug)]
pub struct DialError {
    pub reason: String,
}

impl DialError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A live text-frame session.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Sends one text frame.
    async fn send(&mut self, text: String) -> Result<(), ClientError>;

    /// Receives the next text frame; `None` once the peer has closed.
    async fn recv(&mut self) -> Result<Option<String>, ClientError>;

    /// Releases the session. Idempotent.
    async fn close(&mut self);
}

/// Dials new sessions.
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Transport: Transport;

    async fn dial(&self, url: &Url) -> Result<Self::Transport, DialError>;
}

// ── Bounded-retry dialer ─────────────────────────────────────────────

/// Dials `url` up to `attempts` times, pausing `delay` between tries.
///
/// Exhausting the bound yields [`ClientError::Connection`] carrying the
/// endpoint, the attempt count, and the last failure reason. The retry
/// budget covers dialing only; mid-session failures never re-dial.
pub async fn connect_with_retry<C: Connector>(
    connector: &C,
    url: &Url,
    attempts: u32,
    delay: Duration,
) -> Result<C::Transport, ClientError> {
    let bound = attempts.max(1);
    let mut last_reason = String::new();
    for attempt in 1..=bound {
        match connector.dial(url).await {
            Ok(transport) => {
                debug!(endpoint = %url, attempt, "connected");
                return Ok(transport);
            }
            Err(err) => {
                warn!(endpoint = %url, attempt, bound, reason = %err.reason,
                      "connection attempt failed");
                last_reason = err.reason;
                if attempt < bound {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(ClientError::Connection {
        endpoint: url.to_string(),
        attempts: bound,
        reason: last_reason,
    })
}

// ── WebSocket implementation ─────────────────────────────────────────

/// Dials WebSocket sessions with a prebuilt TLS client configuration.
#[derive(Clone)]
pub struct WsConnector {
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl WsConnector {
    /// Builds the rustls client config once, up front, so TLS material
    /// problems surface before any dial.
    pub fn new(options: &TlsOptions) -> Result<Self, ClientError> {
        let tls = if options.enabled {
            Some(Arc::new(tls_client_config(options)?))
        } else {
            None
        };
        Ok(Self { tls })
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn dial(&self, url: &Url) -> Result<WsTransport, DialError> {
        let connector = self
            .tls
            .clone()
            .map(tokio_tungstenite::Connector::Rustls);
        let (ws, response) = tokio_tungstenite::connect_async_tls_with_config(
            url.as_str(),
            None,
            false,
            connector,
        )
        .await
        .map_err(|err| DialError::new(err.to_string()))?;
        trace!(status = %response.status(), "websocket upgrade complete");
        Ok(WsTransport { ws })
    }
}

/// A live WebSocket session.
pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), ClientError> {
        self.ws
            .send(Message::text(text))
            .await
            .map_err(|err| ClientError::transport(err.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, ClientError> {
        while let Some(frame) = self.ws.next().await {
            let frame = frame.map_err(|err| ClientError::transport(err.to_string()))?;
            match frame {
                Message::Text(text) => return Ok(Some(text.to_string())),
                Message::Close(_) => return Ok(None),
                // Pings are answered by the stream itself; binary
                // frames never occur on the JSON endpoint.
                other => trace!(frame = ?other, "skipping non-text frame"),
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

// ── TLS setup ────────────────────────────────────────────────────────

fn tls_client_config(options: &TlsOptions) -> Result<rustls::ClientConfig, ClientError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|err| ClientError::tls(format!("protocol versions: {err}")))?;

    let builder = if options.verify_peer {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots)
    } else {
        // Controllers ship with self-signed material out of the box;
        // the unverified posture is the protocol's documented default.
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
    };

    match (&options.cert_path, &options.key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|err| ClientError::tls(format!("client auth: {err}")))
        }
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(ClientError::tls(
            "client certificate and key paths must be set together",
        )),
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ClientError> {
    let pem = std::fs::read(path)
        .map_err(|err| ClientError::tls(format!("reading {}: {err}", path.display())))?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .map_err(|err| ClientError::tls(format!("parsing {}: {err}", path.display())))?;
    if certs.is_empty() {
        return Err(ClientError::tls(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ClientError> {
    let pem = std::fs::read(path)
        .map_err(|err| ClientError::tls(format!("reading {}: {err}", path.display())))?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|err| ClientError::tls(format!("parsing {}: {err}", path.display())))?
        .ok_or_else(|| ClientError::tls(format!("no private key in {}", path.display())))
}

/// Accepts any server certificate while still checking handshake
/// signatures with the provider's algorithms.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
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
