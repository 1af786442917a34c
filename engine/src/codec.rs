//! Value codecs and content fingerprints.
//!
//! Stores never hash values directly: a value is first encoded by a [`Codec`]
//! and the resulting bytes are handed to a [`Fingerprinter`]. Two values that
//! encode to the same bytes therefore always share a fingerprint, which is what
//! makes fingerprint equality a meaningful change signal for reconciliation.

use crate::{error::Result, Fingerprint, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Converts values to and from their stored byte representation.
pub trait Codec: Send + Sync {
    /// Encode a value into bytes.
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode bytes back into a value.
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

/// Compact JSON codec (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Pure function from encoded bytes to a fingerprint.
pub type Fingerprinter = Arc<dyn Fn(&[u8]) -> Fingerprint + Send + Sync>;

/// Upper-case hex SHA-256 of the encoded bytes.
pub fn sha256_fingerprint(bytes: &[u8]) -> Fingerprint {
    hex::encode_upper(Sha256::digest(bytes))
}

/// The default fingerprinter, wrapping [`sha256_fingerprint`].
pub fn default_fingerprinter() -> Fingerprinter {
    Arc::new(sha256_fingerprint)
}

/// Strip one pair of surrounding double quotes, as returned by object stores
/// in `ETag` headers and listings.
pub fn unquote_etag(etag: &str) -> &str {
    if etag.len() >= 2 && etag.starts_with('"') && etag.ends_with('"') {
        &etag[1..etag.len() - 1]
    } else {
        etag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec_is_compact() {
        let bytes = JsonCodec.encode(&json!({"x": 1, "y": [true, null]})).unwrap();
        assert_eq!(bytes, br#"{"x":1,"y":[true,null]}"#);
        assert_eq!(
            JsonCodec.decode(&bytes).unwrap(),
            json!({"x": 1, "y": [true, null]})
        );
    }

    #[test]
    fn decode_garbage_is_codec_error() {
        let err = JsonCodec.decode(b"\xff\xfe").unwrap_err();
        assert!(matches!(err, crate::Error::Codec(_)));
    }

    #[test]
    fn fingerprint_is_content_addressed() {
        let a = JsonCodec.encode(&json!({"x": 1})).unwrap();
        let b = JsonCodec.encode(&json!({"x": 1})).unwrap();
        let c = JsonCodec.encode(&json!({"x": 2})).unwrap();

        assert_eq!(sha256_fingerprint(&a), sha256_fingerprint(&b));
        assert_ne!(sha256_fingerprint(&a), sha256_fingerprint(&c));
    }

    #[test]
    fn fingerprint_format() {
        let fp = sha256_fingerprint(b"1");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn unquote() {
        assert_eq!(unquote_etag("\"ABC\""), "ABC");
        assert_eq!(unquote_etag("ABC"), "ABC");
        assert_eq!(unquote_etag("\""), "\"");
        assert_eq!(unquote_etag("\"\""), "");
        assert_eq!(unquote_etag("\"ABC"), "\"ABC");
    }
}
