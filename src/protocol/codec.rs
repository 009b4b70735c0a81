//! Protocol codec for packing/unpacking frames
//!
//! Handles the field layout of heartbeat and data frames on top of
//! [`ByteCursor`]. Payload serialization is left to an [`Encoding`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::buffer::{BufferError, BufferResult, ByteCursor, ByteOrder};
use super::packet::{Message, Packet};
use super::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_ROUTE_BYTES, DEFAULT_SEQ_BYTES, HEADER_BYTES,
    HEARTBEAT_FLAG, SIZE_BYTES, TIMESTAMP_BYTES,
};
use crate::encoding::{Encoding, EncodingError, Json};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Truncated frame: {0}")]
    EndOfBuffer(#[from] BufferError),

    #[error("Invalid frame: declared length {declared}, actual {actual}")]
    InvalidFrame { declared: usize, actual: usize },

    #[error("Frame too large: {0} bytes (max: {1})")]
    FrameTooLarge(usize, usize),

    #[error("Unsupported {field} width: {width} bytes")]
    UnsupportedWidth { field: &'static str, width: u8 },

    #[error("Payload encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Wire layout settings shared by both ends of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Byte order of every multi-byte integer
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Route field width in bytes (1, 2 or 4)
    #[serde(default = "default_route_bytes")]
    pub route_bytes: u8,
    /// Seq field width in bytes (0, 1, 2 or 4); 0 leaves seq off the wire
    #[serde(default = "default_seq_bytes")]
    pub seq_bytes: u8,
    /// Largest accepted frame body in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_route_bytes() -> u8 {
    DEFAULT_ROUTE_BYTES
}

fn default_seq_bytes() -> u8 {
    DEFAULT_SEQ_BYTES
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::default(),
            route_bytes: default_route_bytes(),
            seq_bytes: default_seq_bytes(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl CodecConfig {
    pub fn new(byte_order: ByteOrder, route_bytes: u8, seq_bytes: u8) -> Self {
        Self {
            byte_order,
            route_bytes,
            seq_bytes,
            ..Default::default()
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Check the field widths without building a packer
    pub fn validate(&self) -> CodecResult<()> {
        FieldWidth::route(self.route_bytes)?;
        FieldWidth::seq(self.seq_bytes)?;
        Ok(())
    }
}

/// Width of a route or seq field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldWidth {
    Absent,
    One,
    Two,
    Four,
}

impl FieldWidth {
    fn route(width: u8) -> CodecResult<Self> {
        match width {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            _ => Err(CodecError::UnsupportedWidth { field: "route", width }),
        }
    }

    fn seq(width: u8) -> CodecResult<Self> {
        match width {
            0 => Ok(Self::Absent),
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            _ => Err(CodecError::UnsupportedWidth { field: "seq", width }),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::Absent => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Four => 4,
        }
    }

    // Values wider than the field are truncated
    fn write(self, cursor: &mut ByteCursor, v: u32) {
        match self {
            Self::Absent => {}
            Self::One => cursor.write_u8(v as u8),
            Self::Two => cursor.write_u16(v as u16),
            Self::Four => cursor.write_u32(v),
        }
    }

    fn read(self, cursor: &mut ByteCursor) -> BufferResult<u32> {
        Ok(match self {
            Self::Absent => 0,
            Self::One => u32::from(cursor.read_u8()?),
            Self::Two => u32::from(cursor.read_u16()?),
            Self::Four => cursor.read_u32()?,
        })
    }
}

/// Packs and unpacks frames for one connection
///
/// Holds no per-call state; a single instance is shared by the send path,
/// the heartbeat timer and the receive loop.
#[derive(Debug, Clone)]
pub struct Packer<E = Json> {
    config: CodecConfig,
    route: FieldWidth,
    seq: FieldWidth,
    encoding: E,
}

impl Packer<Json> {
    /// Packer with the default layout and JSON payloads
    pub fn json() -> Self {
        // The default layout always validates.
        Self {
            config: CodecConfig::default(),
            route: FieldWidth::Two,
            seq: FieldWidth::Two,
            encoding: Json,
        }
    }
}

impl Default for Packer<Json> {
    fn default() -> Self {
        Self::json()
    }
}

impl<E: Encoding> Packer<E> {
    /// Create a packer, rejecting field widths the protocol cannot carry
    pub fn new(config: CodecConfig, encoding: E) -> CodecResult<Self> {
        let route = FieldWidth::route(config.route_bytes)?;
        let seq = FieldWidth::seq(config.seq_bytes)?;

        Ok(Self {
            config,
            route,
            seq,
            encoding,
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn encoding(&self) -> &E {
        &self.encoding
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.config.byte_order
    }

    /// Build a heartbeat frame. The client never attaches a timestamp.
    pub fn pack_heartbeat(&self) -> Bytes {
        let mut cursor = ByteCursor::with_capacity(self.byte_order(), SIZE_BYTES + HEADER_BYTES);
        cursor.write_i32(HEADER_BYTES as i32);
        cursor.write_u8(HEARTBEAT_FLAG);
        cursor.into_bytes()
    }

    /// Build a data frame around an already-encoded payload
    pub fn pack_message(&self, route: u32, seq: Option<u32>, payload: &[u8]) -> CodecResult<Bytes> {
        let body = HEADER_BYTES + self.route.size() + self.seq.size() + payload.len();
        if body > self.config.max_frame_size || body > i32::MAX as usize {
            return Err(CodecError::FrameTooLarge(body, self.config.max_frame_size));
        }

        let mut cursor = ByteCursor::with_capacity(self.byte_order(), SIZE_BYTES + body);
        cursor.seek(SIZE_BYTES);
        cursor.write_u8(0);
        self.route.write(&mut cursor, route);
        self.seq.write(&mut cursor, seq.unwrap_or(0));
        cursor.write_bytes(payload);

        let len = cursor.len() - SIZE_BYTES;
        cursor.seek(0);
        cursor.write_i32(len as i32);

        Ok(cursor.into_bytes())
    }

    /// Build a data frame, running `value` through the encoding first
    pub fn pack_value<T: Serialize + ?Sized>(
        &self,
        route: u32,
        seq: Option<u32>,
        value: &T,
    ) -> CodecResult<Bytes> {
        let payload = self.encoding.encode(value)?;
        self.pack_message(route, seq, &payload)
    }

    /// Decode one complete frame, length prefix included
    pub fn unpack(&self, frame: &[u8]) -> CodecResult<Packet<E::Data>> {
        let mut cursor = ByteCursor::from_bytes(self.byte_order(), frame);

        let declared = cursor.read_u32()? as usize;
        if declared + SIZE_BYTES != cursor.len() {
            return Err(CodecError::InvalidFrame {
                declared,
                actual: cursor.len().saturating_sub(SIZE_BYTES),
            });
        }
        if declared > self.config.max_frame_size {
            return Err(CodecError::FrameTooLarge(declared, self.config.max_frame_size));
        }

        let header = cursor.read_u8()?;

        if header & HEARTBEAT_FLAG != 0 {
            let millisecond = if cursor.remaining() > 0 {
                Some(cursor.read_i64()?)
            } else {
                None
            };
            return Ok(Packet::Heartbeat(millisecond));
        }

        let route = self.route.read(&mut cursor)?;
        let seq = self.seq.read(&mut cursor)?;
        let payload = cursor.read_bytes(cursor.remaining());

        Ok(Packet::Data(Message::new(
            seq,
            route,
            self.encoding.decode(Bytes::from(payload)),
        )))
    }

    /// Read the body length from a frame's 4 byte prefix
    pub fn unpack_size(&self, prefix: &[u8]) -> CodecResult<u32> {
        let mut cursor = ByteCursor::from_bytes(self.byte_order(), prefix);
        Ok(cursor.read_u32()?)
    }
}

/// Hand-build a heartbeat frame carrying a server timestamp
pub fn pack_heartbeat_with_time(order: ByteOrder, millisecond: i64) -> Bytes {
    let mut cursor = ByteCursor::with_capacity(order, SIZE_BYTES + HEADER_BYTES + TIMESTAMP_BYTES);
    cursor.write_i32((HEADER_BYTES + TIMESTAMP_BYTES) as i32);
    cursor.write_u8(HEARTBEAT_FLAG);
    cursor.write_i64(millisecond);
    cursor.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::PayloadData;

    fn packer(order: ByteOrder, route_bytes: u8, seq_bytes: u8) -> Packer {
        Packer::new(CodecConfig::new(order, route_bytes, seq_bytes), Json).unwrap()
    }

    #[test]
    fn test_pack_message_wire_bytes() {
        let packer = packer(ByteOrder::BigEndian, 2, 2);

        let frame = packer.pack_message(1, Some(1), &[0x41]).unwrap();
        assert_eq!(
            &frame[..],
            &[0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x01, 0x00, 0x01, 0x41]
        );

        match packer.unpack(&frame).unwrap() {
            Packet::Data(message) => {
                assert_eq!(message.seq, 1);
                assert_eq!(message.route, 1);
                assert_eq!(message.data.as_bytes(), &[0x41]);
            }
            other => panic!("Expected data frame, got {:?}", other),
        }
    }

    #[test]
    fn test_little_endian_wide_fields() {
        let packer = packer(ByteOrder::LittleEndian, 4, 4);
        let frame = packer.pack_message(0x0102_0304, Some(70_000), b"hi").unwrap();

        assert_eq!(&frame[..4], &[11, 0, 0, 0]);
        assert_eq!(&frame[5..9], &[0x04, 0x03, 0x02, 0x01]);

        let message = packer.unpack(&frame).unwrap().into_message().unwrap();
        assert_eq!(message.route, 0x0102_0304);
        assert_eq!(message.seq, 70_000);
        assert_eq!(message.data.as_bytes(), b"hi");
    }

    #[test]
    fn test_one_byte_fields() {
        let packer = packer(ByteOrder::BigEndian, 1, 1);
        let frame = packer.pack_message(200, Some(7), b"").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 3, 0, 200, 7]);

        let message = packer.unpack(&frame).unwrap().into_message().unwrap();
        assert_eq!((message.route, message.seq), (200, 7));
    }

    #[test]
    fn test_length_prefix_matches_frame() {
        let packer = packer(ByteOrder::LittleEndian, 4, 4);
        let frame = packer.pack_message(9, None, &[1, 2, 3, 4, 5]).unwrap();

        let size = packer.unpack_size(&frame[..SIZE_BYTES]).unwrap() as usize;
        assert_eq!(size, frame.len() - SIZE_BYTES);
        assert_eq!(size, 1 + 4 + 4 + 5);
    }

    #[test]
    fn test_missing_seq_defaults_to_zero() {
        let packer = packer(ByteOrder::BigEndian, 2, 2);
        let frame = packer.pack_message(3, None, &[]).unwrap();
        let message = packer.unpack(&frame).unwrap().into_message().unwrap();
        assert_eq!(message.seq, 0);
        assert!(message.data.as_bytes().is_empty());
    }

    #[test]
    fn test_seq_width_zero_omits_field() {
        let packer = packer(ByteOrder::BigEndian, 1, 0);
        let frame = packer.pack_message(5, Some(99), b"x").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 3, 0, 5, b'x']);

        let message = packer.unpack(&frame).unwrap().into_message().unwrap();
        assert_eq!(message.seq, 0);
        assert_eq!(message.route, 5);
    }

    #[test]
    fn test_wide_values_truncated() {
        let packer = packer(ByteOrder::BigEndian, 1, 2);
        let frame = packer.pack_message(0x1FF, Some(0x12345), &[]).unwrap();
        let message = packer.unpack(&frame).unwrap().into_message().unwrap();
        assert_eq!(message.route, 0xFF);
        assert_eq!(message.seq, 0x2345);
    }

    #[test]
    fn test_pack_value_uses_encoding() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Language {
            name: String,
            company: String,
        }

        let packer = Packer::json();
        let lang = Language {
            name: "C#".to_string(),
            company: "Microsoft".to_string(),
        };

        let frame = packer.pack_value(1, Some(2), &lang).unwrap();
        let message = packer.unpack(&frame).unwrap().into_message().unwrap();
        assert_eq!(message.data.as_typed::<Language>().unwrap(), lang);
    }

    #[test]
    fn test_heartbeat() {
        let packer = Packer::json();
        let frame = packer.pack_heartbeat();
        assert_eq!(&frame[..], &[0, 0, 0, 1, 0x80]);
        assert_eq!(packer.unpack(&frame).unwrap(), Packet::Heartbeat(None));

        let stamped = pack_heartbeat_with_time(ByteOrder::BigEndian, 1_700_000_000_000);
        assert_eq!(stamped.len(), 13);
        assert_eq!(
            packer.unpack(&stamped).unwrap(),
            Packet::Heartbeat(Some(1_700_000_000_000))
        );
    }

    #[test]
    fn test_heartbeat_little_endian() {
        let packer = packer(ByteOrder::LittleEndian, 2, 2);
        assert_eq!(&packer.pack_heartbeat()[..], &[1, 0, 0, 0, 0x80]);

        let stamped = pack_heartbeat_with_time(ByteOrder::LittleEndian, 42);
        assert_eq!(packer.unpack(&stamped).unwrap(), Packet::Heartbeat(Some(42)));
    }

    #[test]
    fn test_heartbeat_short_timestamp() {
        let packer = Packer::json();
        let frame = [0, 0, 0, 3, 0x80, 0x01, 0x02];
        assert!(matches!(
            packer.unpack(&frame),
            Err(CodecError::EndOfBuffer(_))
        ));
    }

    #[test]
    fn test_corrupted_length_rejected() {
        let packer = Packer::json();
        let mut frame = packer.pack_message(1, Some(1), b"abc").unwrap().to_vec();
        frame[3] += 1;

        match packer.unpack(&frame) {
            Err(CodecError::InvalidFrame { declared, actual }) => {
                assert_eq!(declared, 9);
                assert_eq!(actual, 8);
            }
            other => panic!("Expected InvalidFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_data_frame() {
        let packer = Packer::json();
        // Header plus a single route byte where two are expected.
        let frame = [0, 0, 0, 2, 0x00, 0x01];
        assert!(matches!(
            packer.unpack(&frame),
            Err(CodecError::EndOfBuffer(_))
        ));

        assert!(matches!(
            packer.unpack_size(&[0, 0]),
            Err(CodecError::EndOfBuffer(_))
        ));
    }

    #[test]
    fn test_unsupported_widths() {
        assert!(matches!(
            Packer::new(CodecConfig::new(ByteOrder::BigEndian, 3, 2), Json),
            Err(CodecError::UnsupportedWidth { field: "route", width: 3 })
        ));
        assert!(matches!(
            Packer::new(CodecConfig::new(ByteOrder::BigEndian, 0, 2), Json),
            Err(CodecError::UnsupportedWidth { field: "route", width: 0 })
        ));
        assert!(matches!(
            Packer::new(CodecConfig::new(ByteOrder::BigEndian, 2, 8), Json),
            Err(CodecError::UnsupportedWidth { field: "seq", width: 8 })
        ));
    }

    #[test]
    fn test_max_frame_size() {
        let config = CodecConfig::default().with_max_frame_size(8);
        let packer = Packer::new(config, Json).unwrap();

        assert!(packer.pack_message(1, Some(1), &[0; 3]).is_ok());
        assert!(matches!(
            packer.pack_message(1, Some(1), &[0; 4]),
            Err(CodecError::FrameTooLarge(9, 8))
        ));

        let mut frame = vec![0, 0, 0, 9, 0, 0, 1, 0, 1];
        frame.extend_from_slice(&[0; 4]);
        assert!(matches!(
            packer.unpack(&frame),
            Err(CodecError::FrameTooLarge(9, 8))
        ));
    }
}
