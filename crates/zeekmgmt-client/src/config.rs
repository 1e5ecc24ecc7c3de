//! Client configuration.
//!
//! A plain struct the caller fills in; this crate never reads config
//! files or the environment. File/env layering, precedence rules, and
//! CLI flags belong to the program embedding the client.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ClientError;

/// Default controller endpoint, matching the controller's listen
/// defaults.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 2149;

/// WebSocket path of the Broker JSON endpoint.
const WS_PATH: &str = "/v1/messages/json";

/// TLS posture for the WebSocket session.
///
/// The controller defaults to TLS with self-signed material, so the
/// client's default is TLS without peer verification. Each knob is
/// independently settable: verification can be switched on against a
/// deployment's CA, and client cert/key PEMs enable mutual TLS.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// Speak TLS at all (`wss://` vs `ws://`).
    pub enabled: bool,
    /// Verify the peer certificate against the webpki root store.
    pub verify_peer: bool,
    /// Client certificate chain, PEM.
    pub cert_path: Option<PathBuf>,
    /// Client private key, PEM.
    pub key_path: Option<PathBuf>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            verify_peer: false,
            cert_path: None,
            key_path: None,
        }
    }
}

/// Everything the client needs to reach and talk to a controller.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Controller host name or address.
    pub host: String,
    /// Controller WebSocket port.
    pub port: u16,
    pub tls: TlsOptions,
    /// Overall budget for one request/response transaction.
    pub request_timeout: Duration,
    /// Dial attempts before giving up on a connection.
    pub connect_attempts: u32,
    /// Pause between dial attempts.
    pub connect_retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            tls: TlsOptions::default(),
            request_timeout: Duration::from_secs(20),
            connect_attempts: 10,
            connect_retry_delay: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// The full `ws://`/`wss://` URL of the Broker JSON endpoint.
    pub fn endpoint_url(&self) -> Result<Url, ClientError> {
        let scheme = if self.tls.enabled { "wss" } else { "ws" };
        let text = format!("{scheme}://{}:{}{WS_PATH}", self.host, self.port);
        Url::parse(&text).map_err(|err| ClientError::InvalidUrl {
            reason: format!("{text}: {err}"),
        })
    }
}
