//! Generic `(a,b,c)` composite-literal tokenizer.
//!
//! Mirrors [`super::array`]'s split between tokenizing the literal and typing
//! each field: a composite's field types come from its row type's own
//! catalogue entry, which this client does not introspect, so callers supply
//! the per-field decoder.

use crate::error::{DecodeError, DecodeErrorKind};

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidSyntax,
        field: None,
        message: message.into(),
    }
}

/// A single composite field's raw text, or `None` for an empty (null) token.
pub type CompositeToken = Option<String>;

/// Parse a full composite literal, e.g. `"(1,foo,)"` (trailing empty field is null).
pub fn parse_composite_text(s: &str) -> Result<Vec<CompositeToken>, DecodeError> {
    let trimmed = s.trim();
    if !trimmed.starts_with('(') || !trimmed.ends_with(')') {
        return Err(decode_err(format!("composite literal must be wrapped in parens: '{s}'")));
    }
    let inner = &trimmed[1..trimmed.len() - 1];

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut saw_any_char = false;
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                saw_any_char = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                    saw_any_char = true;
                }
            }
            ',' if !in_quotes => {
                tokens.push(finish_field(&current, saw_any_char));
                current.clear();
                saw_any_char = false;
            }
            c => {
                current.push(c);
                saw_any_char = true;
            }
        }
    }
    tokens.push(finish_field(&current, saw_any_char));

    Ok(tokens)
}

fn finish_field(raw: &str, saw_any_char: bool) -> CompositeToken {
    if !saw_any_char && raw.is_empty() { None } else { Some(raw.to_string()) }
}

/// One decoded field from a binary composite value: its type oid and raw
/// payload (`None` for SQL NULL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeField {
    pub type_oid: u32,
    pub data: Option<Vec<u8>>,
}

/// Parse the binary composite wire format: `ncols` (i32), then per field
/// `(oid: u32, len: i32, bytes)` with `len = -1` meaning SQL NULL.
pub fn parse_composite_binary(bytes: &[u8]) -> Result<Vec<CompositeField>, DecodeError> {
    if bytes.len() < 4 {
        return Err(decode_err("composite binary payload truncated"));
    }
    let ncols = i32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let mut offset = 4usize;
    let mut fields = Vec::with_capacity(ncols.max(0) as usize);

    for _ in 0..ncols {
        if bytes.len() < offset + 8 {
            return Err(decode_err("composite binary payload truncated in field header"));
        }
        let type_oid = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let len = i32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
        offset += 8;

        if len < 0 {
            fields.push(CompositeField { type_oid, data: None });
            continue;
        }
        let len = len as usize;
        if bytes.len() < offset + len {
            return Err(decode_err("composite binary payload truncated in field body"));
        }
        fields.push(CompositeField { type_oid, data: Some(bytes[offset..offset + len].to_vec()) });
        offset += len;
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_fields() {
        let tokens = parse_composite_text("(1,foo,3.5)").unwrap();
        assert_eq!(tokens, vec![Some("1".to_string()), Some("foo".to_string()), Some("3.5".to_string())]);
    }

    #[test]
    fn trailing_empty_field_is_null() {
        let tokens = parse_composite_text("(1,)").unwrap();
        assert_eq!(tokens, vec![Some("1".to_string()), None]);
    }

    #[test]
    fn quoted_field_with_comma_and_escape() {
        let tokens = parse_composite_text(r#"("a,b","c\"d")"#).unwrap();
        assert_eq!(tokens, vec![Some("a,b".to_string()), Some("c\"d".to_string())]);
    }

    #[test]
    fn empty_quoted_field_is_not_null() {
        let tokens = parse_composite_text(r#"("")"#).unwrap();
        assert_eq!(tokens, vec![Some(String::new())]);
    }

    #[test]
    fn rejects_literal_without_parens() {
        assert!(parse_composite_text("1,2,3").is_err());
    }

    #[test]
    fn parses_binary_composite_with_null_field() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i32.to_be_bytes()); // ncols
        bytes.extend_from_slice(&23u32.to_be_bytes());
        bytes.extend_from_slice(&4i32.to_be_bytes());
        bytes.extend_from_slice(&42i32.to_be_bytes());
        bytes.extend_from_slice(&25u32.to_be_bytes());
        bytes.extend_from_slice(&(-1i32).to_be_bytes());

        let fields = parse_composite_binary(&bytes).unwrap();
        assert_eq!(fields[0], CompositeField { type_oid: 23, data: Some(42i32.to_be_bytes().to_vec()) });
        assert_eq!(fields[1], CompositeField { type_oid: 25, data: None });
    }
}
