//! Async client for the Zeek cluster management protocol.
//!
//! The controller and per-instance agents of a managed cluster are
//! reachable over a Broker-compatible WebSocket pub/sub transport
//! carrying tagged JSON values (see the `zeekmgmt-wire` crate). This
//! crate layers on top of that:
//!
//! - [`config`]: the caller-supplied client configuration.
//! - [`transport`]: the transport seam (a trait plus the WebSocket
//!   implementation) and the bounded-retry dialer.
//! - [`connection`]: the connection state machine -- handshake,
//!   subscription ack, publish, deadline-bounded receive.
//! - [`transact`]: the request/response transaction engine with
//!   single-response and all-responders completion policies.
//! - [`types`]: typed mirrors of the management records.
//! - [`events`]: the request/response event vocabulary.
//! - [`ops`]: one async function per management action.
//!
//! The crate never installs a tracing subscriber, reads files other
//! than configured TLS material, or touches the environment; it is a
//! library for CLIs and services to build on.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod ops;
pub mod transact;
pub mod transport;
pub mod types;

pub use config::{ClientConfig, TlsOptions};
pub use connection::{Connection, ConnectionState, Received};
pub use error::ClientError;
pub use ops::{Client, DeployOutcome, IdValueOutcome, NodesOutcome, StageOutcome};
pub use transact::{
    transact, CompletionPolicy, TransactionOutcome, TransactionResponse, TransactionSpec,
};
pub use transport::{Connector, DialError, Transport, WsConnector};
