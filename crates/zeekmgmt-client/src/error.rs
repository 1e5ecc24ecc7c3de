use thiserror::Error;
use zeekmgmt_wire::WireError;

/// Errors from the client layer.
///
/// Transaction timeouts, partial results, and cancellation are not
/// errors; they are [`TransactionOutcome`](crate::TransactionOutcome)
/// variants. Per-responder remote failures travel inside the typed
/// action results, except where a single-responder operation has
/// nothing else to return -- those surface as [`ClientError::Remote`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Dialing the endpoint failed past the attempt bound.
    #[error("could not connect to {endpoint} after {attempts} attempt(s): {reason}")]
    Connection {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    /// An operation that needs a live session was called without one.
    #[error("connection is not ready")]
    NotReady,

    /// The transport failed mid-session.
    #[error("transport failure: {reason}")]
    Transport { reason: String },

    /// The peer reported a broker-level error.
    #[error("broker error {code}: {context}")]
    Broker { code: String, context: String },

    /// A frame or value violated the wire contract.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The endpoint configuration does not form a valid URL.
    #[error("invalid endpoint URL: {reason}")]
    InvalidUrl { reason: String },

    /// TLS material could not be loaded or the TLS client could not be
    /// built.
    #[error("TLS setup failed: {reason}")]
    Tls { reason: String },

    /// A responder reported failure on an operation with no richer
    /// result to carry it in.
    #[error("remote failure from {responder}: {error}")]
    Remote { responder: String, error: String },

    /// A management action ran out of its request budget with nothing
    /// to show.
    #[error("request timed out after {timeout:?}")]
    RequestTimeout { timeout: std::time::Duration },

    /// A management action was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    pub(crate) fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub(crate) fn tls(reason: impl Into<String>) -> Self {
        Self::Tls {
            reason: reason.into(),
        }
    }
}
