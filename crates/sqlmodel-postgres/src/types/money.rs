//! `MONEY` — PostgreSQL stores this as a scaled 64-bit integer in the smallest
//! currency unit (e.g. cents). Per the Open Questions resolved in this crate's
//! design, this client does not consult `lc_monetary` and does not attempt to
//! localize formatting; [`Money`] exposes only the raw integer.

use crate::error::{DecodeError, DecodeErrorKind};

/// A `MONEY` value, in the smallest unit of the server's configured currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Money(pub i64);

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidValue,
        field: None,
        message: message.into(),
    }
}

impl Money {
    /// Parse the textual form, e.g. `"$1,234.56"` or `"-$0.05"`.
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
        let value: f64 = cleaned.parse().map_err(|_| decode_err(format!("invalid money literal '{s}'")))?;
        Ok(Money((value * 100.0).round() as i64))
    }

    /// Parse the binary form: `i64` big-endian, smallest currency unit.
    pub fn parse_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != 8 {
            return Err(decode_err("money binary payload must be 8 bytes"));
        }
        Ok(Money(i64::from_be_bytes(bytes.try_into().unwrap())))
    }

    /// Format as a plain decimal string (no currency symbol or grouping).
    pub fn format_text(&self) -> String {
        format!("{}.{:02}", self.0 / 100, (self.0 % 100).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dollar_formatted_text() {
        assert_eq!(Money::parse_text("$1,234.56").unwrap(), Money(123_456));
    }

    #[test]
    fn parses_negative_money() {
        assert_eq!(Money::parse_text("-$0.05").unwrap(), Money(-5));
    }

    #[test]
    fn binary_roundtrips() {
        let bytes = 123_456i64.to_be_bytes();
        assert_eq!(Money::parse_binary(&bytes).unwrap(), Money(123_456));
    }
}
