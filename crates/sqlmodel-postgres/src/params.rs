//! Parameter encoding (C5): bind values into the `Bind` message's wire form.
//!
//! Each [`Param`] carries its own format code, so a single `Bind` can mix
//! text and binary parameters freely.

/// A single bound parameter value, tagged with the wire form it should be
/// sent in.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Text(String),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Bool(bool),
    Bytea(Vec<u8>),
}

impl Param {
    /// The format code this parameter will be bound with: `0` for text, `1` for binary.
    pub fn format_code(&self) -> i16 {
        match self {
            Param::Null | Param::Text(_) => 0,
            Param::Int2(_) | Param::Int4(_) | Param::Int8(_) | Param::Float4(_) | Param::Float8(_) | Param::Bool(_) | Param::Bytea(_) => 1,
        }
    }

    /// The wire payload for this parameter, or `None` for SQL NULL (encoded
    /// on the wire as length -1 with no bytes).
    pub fn encode(&self) -> Option<Vec<u8>> {
        match self {
            Param::Null => None,
            Param::Text(s) => Some(s.as_bytes().to_vec()),
            Param::Int2(v) => Some(v.to_be_bytes().to_vec()),
            Param::Int4(v) => Some(v.to_be_bytes().to_vec()),
            Param::Int8(v) => Some(v.to_be_bytes().to_vec()),
            Param::Float4(v) => Some(v.to_be_bytes().to_vec()),
            Param::Float8(v) => Some(v.to_be_bytes().to_vec()),
            Param::Bool(v) => Some(vec![if *v { 1 } else { 0 }]),
            Param::Bytea(bytes) => Some(bytes.clone()),
        }
    }
}

impl From<i16> for Param {
    fn from(v: i16) -> Self {
        Param::Int2(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Int4(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int8(v)
    }
}

impl From<f32> for Param {
    fn from(v: f32) -> Self {
        Param::Float4(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Float8(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Param::Bytea(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Param::Null,
        }
    }
}

/// Render raw bytes as PostgreSQL's modern `BYTEA` hex text literal (`\x`
/// followed by lowercase hex), for callers that want a text-format `Bytea` bind.
pub fn bytea_hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_encodes_to_none() {
        assert_eq!(Param::Null.encode(), None);
        assert_eq!(Param::Null.format_code(), 0);
    }

    #[test]
    fn integers_encode_big_endian_binary() {
        assert_eq!(Param::Int4(1).encode(), Some(vec![0, 0, 0, 1]));
        assert_eq!(Param::Int4(1).format_code(), 1);
    }

    #[test]
    fn bool_encodes_as_single_byte() {
        assert_eq!(Param::Bool(true).encode(), Some(vec![1]));
        assert_eq!(Param::Bool(false).encode(), Some(vec![0]));
    }

    #[test]
    fn text_encodes_as_raw_utf8_bytes() {
        assert_eq!(Param::Text("hi".to_string()).encode(), Some(b"hi".to_vec()));
        assert_eq!(Param::Text("hi".to_string()).format_code(), 0);
    }

    #[test]
    fn bytea_hex_literal_is_lowercase() {
        assert_eq!(bytea_hex_literal(&[0xDE, 0xAD]), "\\xdead");
    }

    #[test]
    fn option_conversion_maps_none_to_null() {
        let p: Param = None::<i32>.into();
        assert_eq!(p, Param::Null);
        let p: Param = Some(5i32).into();
        assert_eq!(p, Param::Int4(5));
    }
}
