//! The stored form of a response.

use serde::{Deserialize, Serialize};

use crate::http::{Headers, StatusCode};

use super::error::StoreError;

/// A complete upstream response as persisted in the store.
///
/// Encoded as JSON with the body in base64, so entries stay readable with
/// ordinary store tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    status: StatusCode,
    headers: Headers,
    #[serde(with = "base64_body")]
    body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: Headers, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(StoreError::Encode)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(raw).map_err(StoreError::Decode)
    }
}

mod base64_body {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CachedResponse {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "application/octet-stream");
        headers.insert("Set-Cookie", "a=1");
        headers.insert("Set-Cookie", "b=2");
        CachedResponse::new(StatusCode::OK, headers, vec![0, 159, 146, 150, 255])
    }

    #[test]
    fn encoding_is_self_describing() {
        let raw = sample().encode().unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(doc["status"], 200);
        assert_eq!(doc["body"], "AJ+Slv8=");
        assert_eq!(doc["headers"][1][0], "Set-Cookie");
    }

    #[test]
    fn decode_restores_binary_body_and_header_order() {
        let original = sample();
        let decoded = CachedResponse::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn corrupt_payloads_are_decode_errors() {
        for raw in [
            &b"not json"[..],
            &br#"{"status":200,"headers":[],"body":"%%%"}"#[..],
            &br#"{"status":7,"headers":[],"body":""}"#[..],
        ] {
            assert!(CachedResponse::decode(raw).unwrap_err().is_decode());
        }
    }
}
