//! Duenet - client for a length-prefixed route/seq game server protocol
//!
//! Frames carry a 4 byte length prefix, a header byte, a route and a seq
//! field of configurable width, and an opaque payload. [`network::Client`]
//! keeps one connection to the server alive with heartbeats and reports
//! everything it receives through callbacks.

pub mod config;
pub mod encoding;
pub mod network;
pub mod protocol;

pub use encoding::{Encoding, Json, JsonData, PayloadData};
pub use network::{Client, ClientError, ClientState, NetworkConfig};
pub use protocol::{ByteOrder, CodecConfig, CodecError, Message, Packer, Packet};
