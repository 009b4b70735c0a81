//! Byte cursor for building and parsing frames
//!
//! A growable byte buffer with a single read/write position and a fixed
//! byte order. Writing past the end of the buffer zero-fills the gap, which
//! lets the packer reserve the length prefix, write the body and then seek
//! back to fill the prefix in.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte order used for every multi-byte integer on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    /// Most significant byte first
    #[default]
    BigEndian,
    /// Least significant byte first
    LittleEndian,
}

/// Buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("End of buffer at position {position}")]
    EndOfBuffer { position: usize },
}

pub type BufferResult<T> = Result<T, BufferError>;

macro_rules! int_io {
    ($($write:ident, $put:ident, $put_le:ident, $read:ident, $ty:ty);* $(;)?) => {
        $(
            #[doc = concat!("Write a `", stringify!($ty), "` in the configured byte order")]
            pub fn $write(&mut self, v: $ty) {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                let mut dst = &mut raw[..];
                match self.order {
                    ByteOrder::BigEndian => dst.$put(v),
                    ByteOrder::LittleEndian => dst.$put_le(v),
                }
                self.write_bytes(&raw);
            }

            #[doc = concat!("Read a `", stringify!($ty), "` in the configured byte order")]
            pub fn $read(&mut self) -> BufferResult<$ty> {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                for b in raw.iter_mut() {
                    *b = self.read_u8()?;
                }
                Ok(match self.order {
                    ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
                    ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
                })
            }
        )*
    };
}

/// Positional reader/writer over an owned byte buffer
#[derive(Debug, Clone, Default)]
pub struct ByteCursor {
    buf: BytesMut,
    pos: usize,
    order: ByteOrder,
}

impl ByteCursor {
    /// Create an empty cursor for writing
    pub fn new(order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            pos: 0,
            order,
        }
    }

    /// Create an empty cursor with room for `capacity` bytes
    pub fn with_capacity(order: ByteOrder, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            pos: 0,
            order,
        }
    }

    /// Wrap existing bytes for reading, positioned at the start
    pub fn from_bytes(order: ByteOrder, bytes: impl AsRef<[u8]>) -> Self {
        Self {
            buf: BytesMut::from(bytes.as_ref()),
            pos: 0,
            order,
        }
    }

    /// Total bytes held
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current read/write position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes between the position and the end of the buffer
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Move the position for both reads and writes
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    /// Write raw bytes at the position, overwriting and then growing
    pub fn write_bytes(&mut self, src: &[u8]) {
        if self.pos == self.buf.len() {
            self.buf.put_slice(src);
            self.pos += src.len();
            return;
        }

        if self.pos > self.buf.len() {
            self.buf.resize(self.pos, 0);
        }

        let end = self.pos + src.len();
        let overlap = end.min(self.buf.len()) - self.pos;
        self.buf[self.pos..self.pos + overlap].copy_from_slice(&src[..overlap]);
        self.buf.extend_from_slice(&src[overlap..]);
        self.pos = end;
    }

    int_io! {
        write_u16, put_u16, put_u16_le, read_u16, u16;
        write_u32, put_u32, put_u32_le, read_u32, u32;
        write_i16, put_i16, put_i16_le, read_i16, i16;
        write_i32, put_i32, put_i32_le, read_i32, i32;
        write_i64, put_i64, put_i64_le, read_i64, i64;
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> BufferResult<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or(BufferError::EndOfBuffer { position: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    /// Read up to `n` bytes; returns fewer when the buffer runs out
    pub fn read_bytes(&mut self, n: usize) -> Vec<u8> {
        let start = self.pos.min(self.buf.len());
        let end = start + n.min(self.buf.len() - start);
        let out = self.buf[start..end].to_vec();
        self.pos = self.pos.max(end);
        out
    }

    /// Snapshot of the whole buffer, independent of the position
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }

    /// Consume the cursor and return the whole buffer
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i32_byte_order() {
        let mut be = ByteCursor::new(ByteOrder::BigEndian);
        be.write_i32(0x01020304);
        assert_eq!(&be.to_bytes()[..], &[0x01, 0x02, 0x03, 0x04]);

        let mut le = ByteCursor::new(ByteOrder::LittleEndian);
        le.write_i32(0x01020304);
        assert_eq!(&le.to_bytes()[..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_read_back_in_both_orders() {
        for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let mut cursor = ByteCursor::new(order);
            cursor.write_u8(0xAB);
            cursor.write_i16(-2);
            cursor.write_u32(0xDEADBEEF);
            cursor.write_i64(1_700_000_000_123);

            cursor.seek(0);
            assert_eq!(cursor.read_u8().unwrap(), 0xAB);
            assert_eq!(cursor.read_i16().unwrap(), -2);
            assert_eq!(cursor.read_u32().unwrap(), 0xDEADBEEF);
            assert_eq!(cursor.read_i64().unwrap(), 1_700_000_000_123);
            assert_eq!(cursor.remaining(), 0);
        }
    }

    #[test]
    fn test_read_past_end() {
        let mut cursor = ByteCursor::from_bytes(ByteOrder::BigEndian, vec![0x01]);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(
            cursor.read_u8(),
            Err(BufferError::EndOfBuffer { position: 1 })
        );

        let mut short = ByteCursor::from_bytes(ByteOrder::BigEndian, vec![0x00, 0x01, 0x02]);
        assert_eq!(
            short.read_i32(),
            Err(BufferError::EndOfBuffer { position: 3 })
        );
    }

    #[test]
    fn test_read_bytes_clamps() {
        let mut cursor = ByteCursor::from_bytes(ByteOrder::BigEndian, vec![1, 2, 3, 4, 5]);
        cursor.seek(2);
        assert_eq!(cursor.read_bytes(10), vec![3, 4, 5]);
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.read_bytes(1).is_empty());

        // Past the end after a seek: nothing to read, no panic.
        let mut cursor = ByteCursor::from_bytes(ByteOrder::BigEndian, vec![1, 2]);
        cursor.seek(4);
        assert!(cursor.read_bytes(3).is_empty());
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_reserve_and_backfill() {
        let mut cursor = ByteCursor::new(ByteOrder::BigEndian);
        cursor.seek(4);
        cursor.write_u8(0x00);
        cursor.write_bytes(b"hi");
        assert_eq!(cursor.len(), 7);

        cursor.seek(0);
        cursor.write_i32(3);
        assert_eq!(cursor.len(), 7);
        assert_eq!(&cursor.to_bytes()[..], &[0, 0, 0, 3, 0, b'h', b'i']);
    }

    #[test]
    fn test_overwrite_spanning_end() {
        let mut cursor = ByteCursor::from_bytes(ByteOrder::BigEndian, vec![1, 2, 3]);
        cursor.seek(2);
        cursor.write_bytes(&[9, 9, 9]);
        assert_eq!(&cursor.into_bytes()[..], &[1, 2, 9, 9, 9]);
    }
}
