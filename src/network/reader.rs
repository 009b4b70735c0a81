//! Streaming frame reader
//!
//! Splits the byte stream coming from the server into frames: first the
//! 4 byte length prefix, then the rest of the frame, reassembled into one
//! buffer and handed to the packer.
//!
//! Progress lives in the reader itself, so a `next_packet` future dropped
//! inside `tokio::select!` loses no bytes; the next call picks up where the
//! previous one stopped.

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::encoding::{Encoding, Json};
use crate::protocol::{CodecError, Packer, Packet, SIZE_BYTES};

/// Read errors
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("Stream ended mid-frame: got {received} of {expected} bytes")]
    Truncated { received: usize, expected: usize },

    #[error("Reader closed")]
    Closed,
}

pub type ReadResult<T> = Result<T, ReadError>;

#[derive(Debug)]
enum ReadState {
    AwaitingLength {
        prefix: [u8; SIZE_BYTES],
        filled: usize,
    },
    AwaitingBody {
        frame: Vec<u8>,
        filled: usize,
    },
    Closed,
}

impl ReadState {
    fn awaiting_length() -> Self {
        ReadState::AwaitingLength {
            prefix: [0; SIZE_BYTES],
            filled: 0,
        }
    }
}

/// Turns an async byte stream into decoded packets
pub struct FrameReader<R, E: Encoding = Json> {
    reader: R,
    packer: Arc<Packer<E>>,
    state: ReadState,
}

impl<R, E> FrameReader<R, E>
where
    R: AsyncRead + Unpin,
    E: Encoding,
{
    pub fn new(reader: R, packer: Arc<Packer<E>>) -> Self {
        Self {
            reader,
            packer,
            state: ReadState::awaiting_length(),
        }
    }

    /// True once the stream ended or a frame failed to decode
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ReadState::Closed)
    }

    /// Wait for the next complete packet
    ///
    /// Returns `Ok(None)` when the peer closes the stream between frames.
    /// Any error leaves the reader closed: once a frame cannot be decoded the
    /// stream position is unknown, so nothing after it can be trusted.
    pub async fn next_packet(&mut self) -> ReadResult<Option<Packet<E::Data>>> {
        let result = match self.read_frame().await {
            Ok(Some(frame)) => self.packer.unpack(&frame).map(Some).map_err(ReadError::from),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        if !matches!(result, Ok(Some(_))) {
            self.state = ReadState::Closed;
        }
        result
    }

    async fn read_frame(&mut self) -> ReadResult<Option<Vec<u8>>> {
        loop {
            match &mut self.state {
                ReadState::Closed => return Err(ReadError::Closed),

                ReadState::AwaitingLength { prefix, filled } => {
                    let n = self.reader.read(&mut prefix[*filled..]).await?;
                    if n == 0 {
                        if *filled == 0 {
                            return Ok(None);
                        }
                        return Err(ReadError::Truncated {
                            received: *filled,
                            expected: SIZE_BYTES,
                        });
                    }

                    *filled += n;
                    if *filled < SIZE_BYTES {
                        continue;
                    }

                    let size = self.packer.unpack_size(&prefix[..])? as usize;
                    let max = self.packer.config().max_frame_size;
                    if size > max {
                        return Err(CodecError::FrameTooLarge(size, max).into());
                    }

                    tracing::trace!("Frame prefix read, awaiting {} body bytes", size);

                    let mut frame = vec![0u8; SIZE_BYTES + size];
                    frame[..SIZE_BYTES].copy_from_slice(&prefix[..]);
                    self.state = ReadState::AwaitingBody {
                        frame,
                        filled: SIZE_BYTES,
                    };
                }

                ReadState::AwaitingBody { frame, filled } => {
                    if *filled < frame.len() {
                        let n = self.reader.read(&mut frame[*filled..]).await?;
                        if n == 0 {
                            return Err(ReadError::Truncated {
                                received: *filled - SIZE_BYTES,
                                expected: frame.len() - SIZE_BYTES,
                            });
                        }
                        *filled += n;
                        continue;
                    }

                    let frame = std::mem::take(frame);
                    self.state = ReadState::awaiting_length();
                    return Ok(Some(frame));
                }
            }
        }
    }
}
