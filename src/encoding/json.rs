//! JSON payload encoding

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Encoding, EncodingResult, PayloadData};

/// UTF-8 JSON payloads, the default encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Json {
    pub fn new() -> Self {
        Self
    }
}

impl Encoding for Json {
    type Data = JsonData;

    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> EncodingResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, payload: Bytes) -> JsonData {
        JsonData::new(payload)
    }
}

/// Payload received under the JSON encoding
///
/// Decoding is lazy: the bytes are kept as received and only parsed when
/// [`PayloadData::as_typed`] is called, so a receive callback that only
/// needs the raw bytes pays nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsonData {
    buf: Bytes,
}

impl JsonData {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }
}

impl PayloadData for JsonData {
    fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn as_typed<T: DeserializeOwned>(&self) -> EncodingResult<T> {
        Ok(serde_json::from_slice(&self.buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Language {
        name: String,
        company: String,
    }

    #[test]
    fn test_encode_and_read_typed() {
        let json = Json::new();
        let lang = Language {
            name: "Rust".to_string(),
            company: "Mozilla".to_string(),
        };

        let bytes = json.encode(&lang).unwrap();
        let data = json.decode(Bytes::from(bytes));

        assert_eq!(data.as_str().unwrap(), r#"{"name":"Rust","company":"Mozilla"}"#);
        assert_eq!(data.as_typed::<Language>().unwrap(), lang);
    }

    #[test]
    fn test_invalid_payloads() {
        let json = Json::new();

        let data = json.decode(Bytes::from_static(b"not json"));
        assert!(data.as_typed::<Language>().is_err());

        let data = json.decode(Bytes::from_static(&[0xff, 0xfe]));
        assert!(data.as_str().is_err());
        assert_eq!(data.as_bytes(), &[0xff, 0xfe]);
    }
}
