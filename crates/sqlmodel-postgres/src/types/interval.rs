//! `INTERVAL` — months/days/microseconds, matching PostgreSQL's own internal split
//! (it does not normalize months into days, or days into microseconds, since month
//! and day lengths are calendar-dependent).

use crate::error::{DecodeError, DecodeErrorKind};

/// A PostgreSQL `INTERVAL` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidValue,
        field: None,
        message: message.into(),
    }
}

impl Interval {
    /// Parse PostgreSQL's default textual interval output, e.g.
    /// `"1 year 2 mons 3 days 04:05:06.789"` or `"-00:00:01"`.
    pub fn parse_text(s: &str) -> Result<Self, DecodeError> {
        let mut months = 0i32;
        let mut days = 0i32;
        let mut micros = 0i64;

        let mut tokens = s.split_whitespace().peekable();
        let mut time_part: Option<&str> = None;

        while let Some(tok) = tokens.next() {
            if tok.contains(':') {
                time_part = Some(tok);
                continue;
            }
            let (sign, num_str) = if let Some(rest) = tok.strip_prefix('-') {
                (-1i64, rest)
            } else {
                (1i64, tok)
            };
            let n: i64 = num_str
                .parse()
                .map_err(|_| decode_err(format!("invalid interval quantity '{tok}'")))?;
            let n = n * sign;
            let unit = tokens
                .next()
                .ok_or_else(|| decode_err("interval quantity missing a unit"))?;
            let unit = unit.trim_end_matches('s');
            match unit {
                "year" => months += (n * 12) as i32,
                "mon" => months += n as i32,
                "day" => days += n as i32,
                _ => return Err(decode_err(format!("unknown interval unit '{unit}'"))),
            }
        }

        if let Some(t) = time_part {
            micros = parse_time_to_micros(t)?;
        }

        Ok(Interval { months, days, microseconds: micros })
    }

    /// Parse the binary form: `i64` microseconds, `i32` days, `i32` months.
    pub fn parse_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != 16 {
            return Err(decode_err("interval binary payload must be 16 bytes"));
        }
        let microseconds = i64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let days = i32::from_be_bytes(bytes[8..12].try_into().unwrap());
        let months = i32::from_be_bytes(bytes[12..16].try_into().unwrap());
        Ok(Interval { months, days, microseconds })
    }

    /// Format as PostgreSQL's default textual style.
    pub fn format_text(&self) -> String {
        let mut parts = Vec::new();
        let years = self.months / 12;
        let mons = self.months % 12;
        if years != 0 {
            parts.push(format!("{years} year{}", if years.abs() == 1 { "" } else { "s" }));
        }
        if mons != 0 {
            parts.push(format!("{mons} mon{}", if mons.abs() == 1 { "" } else { "s" }));
        }
        if self.days != 0 {
            parts.push(format!("{} day{}", self.days, if self.days.abs() == 1 { "" } else { "s" }));
        }
        if self.microseconds != 0 || parts.is_empty() {
            let neg = self.microseconds < 0;
            let total = self.microseconds.unsigned_abs();
            let hours = total / 3_600_000_000;
            let minutes = (total / 60_000_000) % 60;
            let seconds = (total / 1_000_000) % 60;
            let micros = total % 1_000_000;
            let sign = if neg { "-" } else { "" };
            if micros != 0 {
                parts.push(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}"));
            } else {
                parts.push(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"));
            }
        }
        parts.join(" ")
    }
}

fn parse_time_to_micros(t: &str) -> Result<i64, DecodeError> {
    let (sign, rest) = if let Some(rest) = t.strip_prefix('-') { (-1i64, rest) } else { (1i64, t) };
    let mut fields = rest.split(':');
    let hours: i64 = fields
        .next()
        .ok_or_else(|| decode_err("interval time part missing hours"))?
        .parse()
        .map_err(|_| decode_err("invalid interval hours"))?;
    let minutes: i64 = fields
        .next()
        .ok_or_else(|| decode_err("interval time part missing minutes"))?
        .parse()
        .map_err(|_| decode_err("invalid interval minutes"))?;
    let seconds_str = fields.next().ok_or_else(|| decode_err("interval time part missing seconds"))?;
    let seconds: f64 = seconds_str.parse().map_err(|_| decode_err("invalid interval seconds"))?;
    let micros = hours * 3_600_000_000 + minutes * 60_000_000 + (seconds * 1_000_000.0).round() as i64;
    Ok(sign * micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_text_interval() {
        let iv = Interval::parse_text("1 year 2 mons 3 days 04:05:06.789").unwrap();
        assert_eq!(iv.months, 14);
        assert_eq!(iv.days, 3);
        assert_eq!(iv.microseconds, 4 * 3_600_000_000 + 5 * 60_000_000 + 6_789_000);
    }

    #[test]
    fn parses_negative_time_only_interval() {
        let iv = Interval::parse_text("-00:00:01").unwrap();
        assert_eq!(iv.microseconds, -1_000_000);
    }

    #[test]
    fn binary_roundtrips_through_format() {
        let bytes = [0, 0, 0, 0, 0, 0x0F, 0x42, 0x40, 0, 0, 0, 3, 0, 0, 0, 14];
        let iv = Interval::parse_binary(&bytes).unwrap();
        assert_eq!(iv.months, 14);
        assert_eq!(iv.days, 3);
        assert_eq!(iv.microseconds, 1_000_000);
    }
}
