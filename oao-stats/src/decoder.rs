// Payload decoding for subgraph `Bytes` fields

use serde::Serialize;

/// Text decoded from a hex-encoded payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodedPayload {
    Text(String),
    Undecodable { reason: String },
}

impl DecodedPayload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedPayload::Text(text) => Some(text),
            DecodedPayload::Undecodable { .. } => None,
        }
    }

    /// Text shown in place of a payload that could not be decoded.
    pub fn display(&self) -> &str {
        match self {
            DecodedPayload::Text(text) => text,
            DecodedPayload::Undecodable { .. } => "<undecodable payload>",
        }
    }
}

/// Decode a `0x`-prefixed (or bare) hex string into UTF-8 text.
pub fn decode_payload(raw: &str) -> DecodedPayload {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let bytes = match hex::decode(digits) {
        Ok(bytes) => bytes,
        Err(e) => {
            return DecodedPayload::Undecodable {
                reason: format!("invalid hex: {}", e),
            }
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => DecodedPayload::Text(text),
        Err(e) => DecodedPayload::Undecodable {
            reason: format!("invalid utf-8: {}", e.utf8_error()),
        },
    }
}
