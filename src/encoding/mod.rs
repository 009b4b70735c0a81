//! Payload encodings
//!
//! The packer never looks inside a data frame's payload. Turning application
//! values into payload bytes, and payload bytes back into something the
//! application can read, is delegated to an [`Encoding`].

mod json;

pub use json::*;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Encoding errors
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type EncodingResult<T> = Result<T, EncodingError>;

/// Decoded payload handle handed to receive callbacks
pub trait PayloadData: Clone + Send + Sync + 'static {
    /// Raw payload bytes as received
    fn as_bytes(&self) -> &[u8];

    /// Payload interpreted as UTF-8 text
    fn as_str(&self) -> EncodingResult<&str> {
        Ok(std::str::from_utf8(self.as_bytes())?)
    }

    /// Payload deserialized into an application type
    fn as_typed<T: DeserializeOwned>(&self) -> EncodingResult<T>;
}

/// Serialization used for data frame payloads
pub trait Encoding: Send + Sync + 'static {
    /// Handle type produced by [`Encoding::decode`]
    type Data: PayloadData;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Serialize an application value into payload bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> EncodingResult<Vec<u8>>;

    /// Wrap received payload bytes
    fn decode(&self, payload: Bytes) -> Self::Data;
}
