//! `NUMERIC`/`DECIMAL` — arbitrary-precision decimal, represented as
//! [`rust_decimal::Decimal`]. Text form parses with `Decimal`'s own `FromStr`;
//! binary form follows PostgreSQL's base-10000 digit-group encoding.

use rust_decimal::Decimal;

use crate::error::{DecodeError, DecodeErrorKind};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidValue,
        field: None,
        message: message.into(),
    }
}

/// Parse the textual form of a `NUMERIC`.
pub fn parse_text(s: &str) -> Result<Decimal, DecodeError> {
    s.trim().parse().map_err(|_| decode_err(format!("invalid numeric literal '{s}'")))
}

/// Parse the binary form: header (`ndigits`, `weight`, `sign`, `dscale`) followed
/// by `ndigits` base-10000 digit groups, each a big-endian `i16`.
pub fn parse_binary(bytes: &[u8]) -> Result<Decimal, DecodeError> {
    if bytes.len() < 8 {
        return Err(decode_err("numeric binary payload truncated"));
    }
    let ndigits = i16::from_be_bytes(bytes[0..2].try_into().unwrap());
    let weight = i16::from_be_bytes(bytes[2..4].try_into().unwrap());
    let sign = u16::from_be_bytes(bytes[4..6].try_into().unwrap());
    let dscale = i16::from_be_bytes(bytes[6..8].try_into().unwrap());

    if sign == NUMERIC_NAN {
        return Err(decode_err("numeric NaN has no Decimal representation"));
    }
    if sign != NUMERIC_POS && sign != NUMERIC_NEG {
        return Err(decode_err(format!("unsupported numeric sign word 0x{sign:04x}")));
    }

    let expected_len = 8 + ndigits as usize * 2;
    if bytes.len() < expected_len {
        return Err(decode_err("numeric binary payload shorter than declared digit count"));
    }

    let mut mantissa: i128 = 0;
    for i in 0..ndigits as usize {
        let off = 8 + i * 2;
        let digit = i16::from_be_bytes(bytes[off..off + 2].try_into().unwrap());
        mantissa = mantissa
            .checked_mul(10_000)
            .and_then(|m| m.checked_add(digit as i128))
            .ok_or_else(|| decode_err("numeric value too large to represent"))?;
    }

    if mantissa == 0 {
        return Ok(Decimal::ZERO);
    }

    let exponent = 4 * (weight as i32 - (ndigits as i32 - 1));
    let shift = exponent + dscale as i32;

    let scaled = if shift >= 0 {
        mantissa
            .checked_mul(10i128.pow(shift as u32))
            .ok_or_else(|| decode_err("numeric value too large to represent"))?
    } else {
        mantissa / 10i128.pow((-shift) as u32)
    };

    let signed = if sign == NUMERIC_NEG { -scaled } else { scaled };
    let dscale = dscale.clamp(0, 28) as u32;

    Ok(Decimal::from_i128_with_scale(signed, dscale))
}

/// Format a `Decimal` the way PostgreSQL prints `NUMERIC` values.
pub fn format_text(value: &Decimal) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_simple_text_numeric() {
        assert_eq!(parse_text("123.45").unwrap(), Decimal::from_str("123.45").unwrap());
    }

    #[test]
    fn parses_negative_text_numeric() {
        assert_eq!(parse_text("-0.5").unwrap(), Decimal::from_str("-0.5").unwrap());
    }

    #[test]
    fn parses_binary_zero() {
        let bytes = [0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(parse_binary(&bytes).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn parses_binary_matching_text_value() {
        // 12345.6700 -> digit groups base 10000: "1" "2345" "6700", weight=1, dscale=4
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3i16.to_be_bytes()); // ndigits
        bytes.extend_from_slice(&1i16.to_be_bytes()); // weight
        bytes.extend_from_slice(&NUMERIC_POS.to_be_bytes());
        bytes.extend_from_slice(&4i16.to_be_bytes()); // dscale
        bytes.extend_from_slice(&1i16.to_be_bytes());
        bytes.extend_from_slice(&2345i16.to_be_bytes());
        bytes.extend_from_slice(&6700i16.to_be_bytes());

        let decoded = parse_binary(&bytes).unwrap();
        assert_eq!(decoded, Decimal::from_str("12345.6700").unwrap());
    }

    #[test]
    fn rejects_nan_sign() {
        let mut bytes = vec![0u8; 8];
        bytes[4..6].copy_from_slice(&NUMERIC_NAN.to_be_bytes());
        assert!(parse_binary(&bytes).is_err());
    }
}
