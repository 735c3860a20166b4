//! Generic `{a,b,{c,d}}` array-literal tokenizer.
//!
//! This module only splits the literal into nested [`ArrayToken`]s; turning a
//! leaf token into a typed value is the caller's job (via whatever
//! [`crate::row::ColumnDecoder`] applies to the element type), which is why it
//! lives here rather than duplicated per element type.

use crate::error::{DecodeError, DecodeErrorKind};

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidSyntax,
        field: None,
        message: message.into(),
    }
}

/// A single element or nested sub-array parsed out of an array literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayToken {
    /// SQL NULL (the bare, case-insensitive `NULL` token).
    Null,
    /// A leaf element's unquoted/unescaped text.
    Leaf(String),
    /// A nested array (PostgreSQL multidimensional array literal).
    Nested(Vec<ArrayToken>),
}

/// Parse a full array literal, e.g. `"{1,2,3}"` or `"{{a,b},{c,d}}"`.
pub fn parse_array_text(s: &str) -> Result<Vec<ArrayToken>, DecodeError> {
    let trimmed = s.trim();
    let bytes = trimmed.as_bytes();
    if bytes.is_empty() || bytes[0] != b'{' {
        return Err(decode_err(format!("array literal must start with '{{': '{s}'")));
    }
    let mut chars = trimmed.chars().peekable();
    let tokens = parse_array_body(&mut chars)?;
    if chars.peek().is_some() {
        return Err(decode_err("trailing data after array literal"));
    }
    Ok(tokens)
}

fn parse_array_body(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Vec<ArrayToken>, DecodeError> {
    match chars.next() {
        Some('{') => {}
        _ => return Err(decode_err("expected '{' to start array")),
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    loop {
        match chars.peek().copied() {
            None => return Err(decode_err("unterminated array literal")),
            Some('}') if !in_quotes => {
                chars.next();
                push_leaf(&mut tokens, &current);
                current.clear();
                break;
            }
            Some('{') if !in_quotes => {
                let nested = parse_array_body(chars)?;
                tokens.push(ArrayToken::Nested(nested));
            }
            Some(',') if !in_quotes => {
                chars.next();
                push_leaf(&mut tokens, &current);
                current.clear();
            }
            Some('"') => {
                chars.next();
                if in_quotes {
                    in_quotes = false;
                } else {
                    in_quotes = true;
                }
            }
            Some('\\') if in_quotes => {
                chars.next();
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            Some(c) => {
                chars.next();
                current.push(c);
            }
        }
    }

    Ok(tokens)
}

fn push_leaf(tokens: &mut Vec<ArrayToken>, raw: &str) {
    if raw.is_empty() {
        return;
    }
    if raw.eq_ignore_ascii_case("null") {
        tokens.push(ArrayToken::Null);
    } else {
        tokens.push(ArrayToken::Leaf(raw.to_string()));
    }
}

/// One dimension's bounds from a binary array header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDimension {
    pub len: i32,
    pub lower_bound: i32,
}

/// Header plus flattened per-element payloads from a binary array value.
///
/// Elements are returned in row-major order with dimensions intact; turning
/// them into nested [`ArrayToken`]-shaped data is left to the caller since it
/// depends on how many dimensions the caller wants to reconstruct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArray {
    pub dimensions: Vec<ArrayDimension>,
    pub element_type_oid: u32,
    pub elements: Vec<Option<Vec<u8>>>,
}

/// Parse the binary array wire format: `ndim` (i32), `flags` (i32, has-null
/// bit unused by this client since nulls are signaled per-element by length
/// `-1`), `elem_type_oid` (u32), then `ndim` `(len, lower_bound)` i32 pairs,
/// then `len`-prefixed element payloads (`-1` length means SQL NULL).
pub fn parse_array_binary(bytes: &[u8]) -> Result<BinaryArray, DecodeError> {
    if bytes.len() < 12 {
        return Err(decode_err("array binary payload truncated"));
    }
    let ndim = i32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let element_type_oid = u32::from_be_bytes(bytes[8..12].try_into().unwrap());

    let mut offset = 12usize;
    let mut dimensions = Vec::with_capacity(ndim.max(0) as usize);
    for _ in 0..ndim {
        if bytes.len() < offset + 8 {
            return Err(decode_err("array binary payload truncated in dimension header"));
        }
        let len = i32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let lower_bound = i32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
        dimensions.push(ArrayDimension { len, lower_bound });
        offset += 8;
    }

    let total: i64 = dimensions.iter().map(|d| d.len as i64).product();
    let mut elements = Vec::with_capacity(total.max(0) as usize);
    for _ in 0..total {
        if bytes.len() < offset + 4 {
            return Err(decode_err("array binary payload truncated in element stream"));
        }
        let elem_len = i32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;
        if elem_len < 0 {
            elements.push(None);
            continue;
        }
        let elem_len = elem_len as usize;
        if bytes.len() < offset + elem_len {
            return Err(decode_err("array binary payload truncated in element body"));
        }
        elements.push(Some(bytes[offset..offset + elem_len].to_vec()));
        offset += elem_len;
    }

    Ok(BinaryArray { dimensions, element_type_oid, elements })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_array() {
        let tokens = parse_array_text("{1,2,3}").unwrap();
        assert_eq!(tokens, vec![
            ArrayToken::Leaf("1".to_string()),
            ArrayToken::Leaf("2".to_string()),
            ArrayToken::Leaf("3".to_string()),
        ]);
    }

    #[test]
    fn parses_nested_array() {
        let tokens = parse_array_text("{{a,b},{c,d}}").unwrap();
        assert_eq!(
            tokens,
            vec![
                ArrayToken::Nested(vec![ArrayToken::Leaf("a".to_string()), ArrayToken::Leaf("b".to_string())]),
                ArrayToken::Nested(vec![ArrayToken::Leaf("c".to_string()), ArrayToken::Leaf("d".to_string())]),
            ]
        );
    }

    #[test]
    fn parses_null_token_case_insensitively() {
        let tokens = parse_array_text("{1,NULL,null}").unwrap();
        assert_eq!(tokens, vec![ArrayToken::Leaf("1".to_string()), ArrayToken::Null, ArrayToken::Null]);
    }

    #[test]
    fn parses_quoted_element_with_escape() {
        let tokens = parse_array_text(r#"{"a,b","c\"d"}"#).unwrap();
        assert_eq!(tokens, vec![ArrayToken::Leaf("a,b".to_string()), ArrayToken::Leaf("c\"d".to_string())]);
    }

    #[test]
    fn rejects_literal_without_opening_brace() {
        assert!(parse_array_text("1,2,3").is_err());
    }

    #[test]
    fn parses_binary_one_dimensional_array() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_be_bytes()); // ndim
        bytes.extend_from_slice(&0i32.to_be_bytes()); // flags
        bytes.extend_from_slice(&23u32.to_be_bytes()); // int4 oid
        bytes.extend_from_slice(&2i32.to_be_bytes()); // len
        bytes.extend_from_slice(&1i32.to_be_bytes()); // lower_bound
        bytes.extend_from_slice(&4i32.to_be_bytes());
        bytes.extend_from_slice(&7i32.to_be_bytes());
        bytes.extend_from_slice(&(-1i32).to_be_bytes()); // null element

        let arr = parse_array_binary(&bytes).unwrap();
        assert_eq!(arr.dimensions, vec![ArrayDimension { len: 2, lower_bound: 1 }]);
        assert_eq!(arr.element_type_oid, 23);
        assert_eq!(arr.elements, vec![Some(7i32.to_be_bytes().to_vec()), None]);
    }
}
