//! Protocol module - Defines the wire protocol spoken with the server
//!
//! Every frame starts with a 4 byte length prefix counting the bytes after it:
//! - 1 byte header; bit 7 set marks a heartbeat
//! - Heartbeat: optional 8 byte server time in milliseconds
//! - Data: route (1/2/4 bytes), seq (0/1/2/4 bytes), then the payload
//!
//! Multi-byte integers use the configured byte order (big-endian by default).

mod buffer;
mod codec;
mod packet;

pub use buffer::*;
pub use codec::*;
pub use packet::*;

/// Width of the length prefix
pub const SIZE_BYTES: usize = 4;

/// Width of the header byte
pub const HEADER_BYTES: usize = 1;

/// Width of the timestamp a server may attach to a heartbeat
pub const TIMESTAMP_BYTES: usize = 8;

/// Header bit flagging a heartbeat frame
pub const HEARTBEAT_FLAG: u8 = 1 << 7;

/// Default route field width
pub const DEFAULT_ROUTE_BYTES: u8 = 2;

/// Default seq field width
pub const DEFAULT_SEQ_BYTES: u8 = 2;

/// Default upper bound for a frame body (10 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Default server port
pub const DEFAULT_PORT: u16 = 3553;
