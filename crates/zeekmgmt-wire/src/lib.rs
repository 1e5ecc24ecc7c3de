// zeekmgmt-wire: Broker-compatible wire layer for the Zeek management protocol.
//
// Everything in this crate is pure data: the tagged value model and its
// JSON wire codec, the event abstraction on top of it, pub/sub topic
// naming, and the WebSocket message envelopes. No I/O happens here --
// the client crate owns the transport.

pub mod error;
pub mod event;
pub mod message;
pub mod topic;
pub mod value;

pub use error::WireError;
pub use event::Event;
pub use message::InboundMessage;
pub use topic::Topic;
pub use value::{Port, Proto, Subnet, Value};
