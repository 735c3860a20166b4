//! `JSON`/`JSONB` — represented as `serde_json::Value`.
//!
//! `JSONB`'s binary form is a one-byte version number (always `1`) followed by
//! the same UTF-8 text `JSON` uses; `JSON`'s binary form is the text verbatim.

use serde_json::Value as JsonValue;

use crate::error::{DecodeError, DecodeErrorKind};

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidValue,
        field: None,
        message: message.into(),
    }
}

const JSONB_VERSION: u8 = 1;

/// Parse `JSON`/`JSONB` text form.
pub fn parse_text(s: &str) -> Result<JsonValue, DecodeError> {
    serde_json::from_str(s).map_err(|e| decode_err(format!("invalid json literal: {e}")))
}

/// Parse `JSON` binary form (identical to text, just UTF-8 bytes).
pub fn parse_json_binary(bytes: &[u8]) -> Result<JsonValue, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| decode_err("json payload is not valid UTF-8"))?;
    parse_text(text)
}

/// Parse `JSONB` binary form: version byte + UTF-8 text.
pub fn parse_jsonb_binary(bytes: &[u8]) -> Result<JsonValue, DecodeError> {
    let (version, rest) = bytes.split_first().ok_or_else(|| decode_err("jsonb binary payload is empty"))?;
    if *version != JSONB_VERSION {
        return Err(decode_err(format!("unsupported jsonb version byte {version}")));
    }
    parse_json_binary(rest)
}

/// Serialize to the textual form PostgreSQL expects as input.
pub fn format_text(value: &JsonValue) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_object_text() {
        let v = parse_text(r#"{"a":1}"#).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn parses_jsonb_binary_with_version_byte() {
        let mut bytes = vec![JSONB_VERSION];
        bytes.extend_from_slice(br#"{"a":1}"#);
        let v = parse_jsonb_binary(&bytes).unwrap();
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn rejects_unknown_jsonb_version() {
        let bytes = vec![9, b'{', b'}'];
        assert!(parse_jsonb_binary(&bytes).is_err());
    }
}
