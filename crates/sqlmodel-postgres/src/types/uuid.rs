//! `UUID` — thin wrapper around the `uuid` crate's own parsing.

use uuid::Uuid;

use crate::error::{DecodeError, DecodeErrorKind};

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidValue,
        field: None,
        message: message.into(),
    }
}

/// Parse the textual form (hyphenated, as PostgreSQL always emits it).
pub fn parse_text(s: &str) -> Result<Uuid, DecodeError> {
    Uuid::parse_str(s.trim()).map_err(|e| decode_err(format!("invalid uuid literal '{s}': {e}")))
}

/// Parse the binary form: the raw 16 bytes.
pub fn parse_binary(bytes: &[u8]) -> Result<Uuid, DecodeError> {
    if bytes.len() != 16 {
        return Err(decode_err("uuid binary payload must be 16 bytes"));
    }
    Ok(Uuid::from_bytes(bytes.try_into().unwrap()))
}

/// Format in PostgreSQL's canonical hyphenated lowercase form.
pub fn format_text(value: &Uuid) -> String {
    value.hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hyphenated_text() {
        let u = parse_text("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(format_text(&u), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn binary_roundtrips() {
        let u = parse_text("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let bytes = u.as_bytes();
        assert_eq!(parse_binary(bytes).unwrap(), u);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(parse_text("not-a-uuid").is_err());
    }
}
