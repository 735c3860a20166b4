//! `DATE`, `TIME`, `TIMESTAMP`, `TIMESTAMPTZ`.
//!
//! PostgreSQL's binary epoch is 2000-01-01, not the Unix epoch; this module
//! converts to/from `chrono`'s proleptic-Gregorian types, which use their own
//! internal representation, so callers never see the 2000-01-01 offset directly.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::{DecodeError, DecodeErrorKind};

fn decode_err(message: impl Into<String>) -> DecodeError {
    DecodeError {
        kind: DecodeErrorKind::InvalidValue,
        field: None,
        message: message.into(),
    }
}

fn pg_epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
}

fn pg_epoch() -> NaiveDateTime {
    pg_epoch_date().and_hms_opt(0, 0, 0).unwrap()
}

/// Strip PostgreSQL's trailing `" BC"` era marker. Returns the remaining text
/// and whether the era was BC.
fn strip_era(s: &str) -> (&str, bool) {
    match s.strip_suffix(" BC") {
        Some(rest) => (rest, true),
        None => (s, false),
    }
}

/// Reinterpret a date parsed with a positive, era-less year as BC: PostgreSQL
/// writes year `N BC` as the calendar year `N`, which in astronomical year
/// numbering (no year zero) is `1 - N` — `"0001-01-01 BC"` is astronomical
/// year 0, `"4713-01-01 BC"` is year -4712.
fn apply_bc_era(date: NaiveDate) -> Result<NaiveDate, DecodeError> {
    let astronomical_year = 1 - date.year();
    NaiveDate::from_ymd_opt(astronomical_year, date.month(), date.day()).ok_or_else(|| decode_err("BC date literal has no equivalent astronomical year"))
}

/// Parse a `DATE` literal (`YYYY-MM-DD`, optionally suffixed `" BC"`).
pub fn parse_date_text(s: &str) -> Result<NaiveDate, DecodeError> {
    let (body, is_bc) = strip_era(s.trim());
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").map_err(|_| decode_err(format!("invalid date literal '{s}'")))?;
    if is_bc { apply_bc_era(date) } else { Ok(date) }
}

/// Parse the binary `DATE` form: `i32` days since 2000-01-01.
pub fn parse_date_binary(bytes: &[u8]) -> Result<NaiveDate, DecodeError> {
    if bytes.len() != 4 {
        return Err(decode_err("date binary payload must be 4 bytes"));
    }
    let days = i32::from_be_bytes(bytes.try_into().unwrap());
    pg_epoch_date()
        .checked_add_signed(chrono::Duration::days(days as i64))
        .ok_or_else(|| decode_err("date value out of range"))
}

/// Parse a `TIME` literal (`HH:MM:SS[.ffffff]`).
pub fn parse_time_text(s: &str) -> Result<NaiveTime, DecodeError> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f").map_err(|_| decode_err(format!("invalid time literal '{s}'")))
}

/// Parse the binary `TIME` form: `i64` microseconds since midnight.
pub fn parse_time_binary(bytes: &[u8]) -> Result<NaiveTime, DecodeError> {
    if bytes.len() != 8 {
        return Err(decode_err("time binary payload must be 8 bytes"));
    }
    let micros = i64::from_be_bytes(bytes.try_into().unwrap());
    let (time, _) = NaiveTime::from_hms_opt(0, 0, 0)
        .unwrap()
        .overflowing_add_signed(chrono::Duration::microseconds(micros));
    Ok(time)
}

/// Parse a `TIMESTAMP` literal (`YYYY-MM-DD HH:MM:SS[.ffffff]`, optionally
/// suffixed `" BC"`).
pub fn parse_timestamp_text(s: &str) -> Result<NaiveDateTime, DecodeError> {
    let (body, is_bc) = strip_era(s.trim());
    let ts = NaiveDateTime::parse_from_str(body, "%Y-%m-%d %H:%M:%S%.f").map_err(|_| decode_err(format!("invalid timestamp literal '{s}'")))?;
    if is_bc {
        let date = apply_bc_era(ts.date())?;
        Ok(date.and_time(ts.time()))
    } else {
        Ok(ts)
    }
}

/// Parse the binary `TIMESTAMP` form: `i64` microseconds since 2000-01-01 00:00:00.
pub fn parse_timestamp_binary(bytes: &[u8]) -> Result<NaiveDateTime, DecodeError> {
    if bytes.len() != 8 {
        return Err(decode_err("timestamp binary payload must be 8 bytes"));
    }
    let micros = i64::from_be_bytes(bytes.try_into().unwrap());
    pg_epoch()
        .checked_add_signed(chrono::Duration::microseconds(micros))
        .ok_or_else(|| decode_err("timestamp value out of range"))
}

/// Parse a `TIMESTAMPTZ` literal. PostgreSQL renders these with a `+00` offset
/// when `timezone = UTC`, which is what this client requests implicitly by
/// treating every timestamp as UTC on the wire.
pub fn parse_timestamptz_text(s: &str) -> Result<DateTime<Utc>, DecodeError> {
    let (body, is_bc) = strip_era(s.trim());
    if let Ok(dt) = DateTime::parse_from_str(body, "%Y-%m-%d %H:%M:%S%.f%#z") {
        let utc = dt.with_timezone(&Utc);
        return if is_bc {
            let date = apply_bc_era(utc.date_naive())?;
            Ok(Utc.from_utc_datetime(&date.and_time(utc.time())))
        } else {
            Ok(utc)
        };
    }
    // No explicit offset in the literal: assume UTC.
    let naive = parse_timestamp_text(s.trim())?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Parse the binary `TIMESTAMPTZ` form: identical wire format to `TIMESTAMP`,
/// always UTC microseconds since 2000-01-01.
pub fn parse_timestamptz_binary(bytes: &[u8]) -> Result<DateTime<Utc>, DecodeError> {
    parse_timestamp_binary(bytes).map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_text_roundtrips() {
        let d = parse_date_text("2024-03-15").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn date_binary_offsets_from_pg_epoch() {
        let d = parse_date_binary(&0i32.to_be_bytes()).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    }

    #[test]
    fn timestamp_binary_matches_known_value() {
        let ts = parse_timestamp_binary(&0i64.to_be_bytes()).unwrap();
        assert_eq!(ts, pg_epoch());
    }

    #[test]
    fn timestamptz_text_without_offset_assumes_utc() {
        let ts = parse_timestamptz_text("2024-03-15 12:00:00").unwrap();
        assert_eq!(ts.timezone(), Utc);
    }

    #[test]
    fn time_text_parses_fractional_seconds() {
        let t = parse_time_text("13:45:30.5").unwrap();
        assert_eq!(t.format("%H:%M:%S").to_string(), "13:45:30");
    }

    #[test]
    fn date_text_parses_year_one_bc_as_astronomical_year_zero() {
        let d = parse_date_text("0001-06-15 BC").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(0, 6, 15).unwrap());
    }

    #[test]
    fn date_text_parses_postgres_minimum_bc() {
        let d = parse_date_text("4713-01-01 BC").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(-4712, 1, 1).unwrap());
    }

    #[test]
    fn timestamp_text_parses_bc_era() {
        let ts = parse_timestamp_text("0001-06-15 12:00:00 BC").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(0, 6, 15).unwrap());
        assert_eq!(ts.format("%H:%M:%S").to_string(), "12:00:00");
    }

    #[test]
    fn timestamptz_text_parses_bc_era_with_offset() {
        let ts = parse_timestamptz_text("0001-06-15 12:00:00+00 BC").unwrap();
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(0, 6, 15).unwrap());
    }
}
