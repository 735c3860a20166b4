//! `SMALLSERIAL`/`SERIAL`/`BIGSERIAL` — on the wire these are plain
//! `int2`/`int4`/`int8` columns (the "serial" flavor only affects the
//! column's default-value sequence, not its wire type), but a sequence-backed
//! identity column never holds a negative or null value, so these newtypes
//! decode as unsigned and reject null outright rather than accepting
//! `Option<_>`.

use crate::error::{DecodeError, DecodeErrorKind};

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError { kind: DecodeErrorKind::InvalidValue, field: None, message: message.into() }
}

/// A `SMALLSERIAL` value (underlying `int2`, read as unsigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SmallSerial(pub u16);

/// A `SERIAL` value (underlying `int4`, read as unsigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Serial(pub u32);

/// A `BIGSERIAL` value (underlying `int8`, read as unsigned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigSerial(pub u64);

macro_rules! impl_serial {
    ($ty:ident, $inner:ty, $width:expr) => {
        impl $ty {
            pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
                s.trim().parse().map(Self).map_err(|_| decode_err(format!("invalid {} literal '{s}'", stringify!($ty))))
            }

            pub fn parse_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
                let arr: [u8; $width] = bytes
                    .try_into()
                    .map_err(|_| decode_err(format!("expected {} bytes, got {}", $width, bytes.len())))?;
                Ok(Self(<$inner>::from_be_bytes(arr)))
            }

            pub fn format_text(&self) -> String {
                self.0.to_string()
            }
        }
    };
}

impl_serial!(SmallSerial, u16, 2);
impl_serial!(Serial, u32, 4);
impl_serial!(BigSerial, u64, 8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_serial_roundtrips_binary() {
        let bytes = 42u16.to_be_bytes();
        assert_eq!(SmallSerial::parse_binary(&bytes).unwrap(), SmallSerial(42));
    }

    #[test]
    fn serial_parses_text() {
        assert_eq!(Serial::parse_text("100").unwrap(), Serial(100));
    }

    #[test]
    fn big_serial_rejects_negative_text() {
        assert!(BigSerial::parse_text("-1").is_err());
    }
}
