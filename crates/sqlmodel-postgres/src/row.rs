//! Typed decoding of `DataRow` payloads into caller record shapes.
//!
//! [`Row`] owns one decoded `DataRow`'s raw column bytes plus the
//! `RowDescription` that named them. [`ColumnDecoder`] is implemented per
//! target Rust type and dispatches on the column's format code (text vs.
//! binary); [`FromRow`] composes a fixed list of `ColumnDecoder` calls into a
//! whole-record shape, hand-implemented here for tuples since no derive macro
//! is provided.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{DecodeError, DecodeErrorKind, Error};
use crate::protocol::FieldDescription;
use crate::types::array::{self, ArrayToken};
use crate::types::{json, numeric, temporal, uuid as uuid_type};
use crate::types::{
    BigSerial, Bits, BoundingBox, Circle, Cidr, Inet, Interval, Line, LineSegment, MacAddr6, MacAddr8, Money, Path, Point, Polygon, Serial, SmallSerial,
    TsQuery, TsVector,
};

fn decode_err(kind: DecodeErrorKind, message: impl Into<String>) -> DecodeError {
    DecodeError { kind, field: None, message: message.into() }
}

fn no_binary_decoder() -> DecodeError {
    decode_err(DecodeErrorKind::InvalidValue, "this type has no binary wire form")
}

fn not_utf8() -> DecodeError {
    decode_err(DecodeErrorKind::InvalidValue, "column bytes are not valid UTF-8")
}

/// One decoded `DataRow`, paired with the `RowDescription` that named its columns.
#[derive(Debug, Clone)]
pub struct Row {
    fields: Arc<Vec<FieldDescription>>,
    columns: Vec<Option<Vec<u8>>>,
}

impl Row {
    pub(crate) fn new(fields: Arc<Vec<FieldDescription>>, columns: Vec<Option<Vec<u8>>>) -> Result<Self, Error> {
        if fields.len() != columns.len() {
            return Err(Error::Decode(decode_err(
                DecodeErrorKind::ColumnCountMismatch,
                format!("row description has {} columns but data row has {}", fields.len(), columns.len()),
            )));
        }
        Ok(Row { fields, columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&FieldDescription> {
        self.fields.get(idx)
    }

    /// Find a column's index by name, case-sensitive (PostgreSQL folds
    /// unquoted identifiers to lowercase before this ever reaches the wire).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn raw(&self, idx: usize) -> Option<&[u8]> {
        self.columns.get(idx).and_then(|c| c.as_deref())
    }

    fn attach_field(&self, idx: usize, mut err: DecodeError) -> Error {
        if err.field.is_none() {
            err.field = self.fields.get(idx).map(|f| f.name.clone());
        }
        Error::Decode(err)
    }

    /// Decode column `idx` into `T`, dispatching on that column's format code.
    pub fn get<T: ColumnDecoder>(&self, idx: usize) -> Result<T, Error> {
        let field = self
            .fields
            .get(idx)
            .ok_or_else(|| Error::Decode(decode_err(DecodeErrorKind::ColumnCountMismatch, format!("column index {idx} out of range"))))?;

        let result = match self.raw(idx) {
            None => T::decode_null(),
            Some(bytes) if field.is_binary() => T::decode_binary(bytes),
            Some(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| not_utf8())?;
                T::decode_text(text)
            }
        };

        result.map_err(|e| self.attach_field(idx, e))
    }

    /// Decode column `idx` by name into `T`.
    pub fn get_by_name<T: ColumnDecoder>(&self, name: &str) -> Result<T, Error> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| Error::Decode(decode_err(DecodeErrorKind::ColumnCountMismatch, format!("no column named '{name}'"))))?;
        self.get(idx)
    }

    /// Decode the whole row via a caller-supplied [`FromRow`] shape.
    pub fn into_record<T: FromRow>(&self) -> Result<T, Error> {
        T::from_row(self)
    }
}

/// Decodes a single column's wire bytes into an owned Rust value.
///
/// Implementors supply the text and (optionally) binary decode paths; [`Row::get`]
/// is responsible for picking which one applies and for null handling via
/// [`ColumnDecoder::decode_null`].
pub trait ColumnDecoder: Sized {
    /// Decode from the column's UTF-8 text representation.
    fn decode_text(text: &str) -> Result<Self, DecodeError>;

    /// Decode from the column's binary representation. Types PostgreSQL has
    /// no binary wire form for (or that this crate does not implement one
    /// for) leave this at its default, which always fails.
    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        let _ = bytes;
        Err(no_binary_decoder())
    }

    /// Called when the column's wire length was -1 (SQL NULL). Non-optional
    /// types fail with `UnexpectedNull`; `Option<T>` overrides this to `None`.
    fn decode_null() -> Result<Self, DecodeError> {
        Err(decode_err(DecodeErrorKind::UnexpectedNull, "unexpected null"))
    }
}

/// Marks a [`ColumnDecoder`] as eligible to be wrapped in `Option<_>` to
/// represent SQL NULL (dispatch rule 1). Serial-flavored types
/// (`SmallSerial`, `Serial`, `BigSerial`) deliberately do not implement this:
/// per dispatch rule 2, a serial-flavored field is decoded as its underlying
/// unsigned integer and never accepts optional.
pub trait Nullable: ColumnDecoder {}

impl<T: Nullable> ColumnDecoder for Option<T> {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        T::decode_text(text).map(Some)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        T::decode_binary(bytes).map(Some)
    }

    fn decode_null() -> Result<Self, DecodeError> {
        Ok(None)
    }
}

/// Generic array decode (rule 7): PostgreSQL's `{a,b,{c,d}}` grammar, one
/// level of elements. Encountering a nested sub-array where a flat element
/// was expected is `InvalidSyntax` — decode as `Vec<Vec<T>>`-shaped rows by
/// hand via [`crate::types::array::parse_array_text`] for genuinely
/// multidimensional columns.
impl<T: ColumnDecoder> ColumnDecoder for Vec<T> {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        let tokens = array::parse_array_text(text)?;
        tokens
            .into_iter()
            .map(|tok| match tok {
                ArrayToken::Null => T::decode_null(),
                ArrayToken::Leaf(s) => T::decode_text(&s),
                ArrayToken::Nested(_) => Err(decode_err(
                    DecodeErrorKind::InvalidSyntax,
                    "nested array literal where a flat element was expected",
                )),
            })
            .collect()
    }
}

impl<T: ColumnDecoder> Nullable for Vec<T> {}

macro_rules! impl_int_decoder {
    ($ty:ty, $width:expr) => {
        impl ColumnDecoder for $ty {
            fn decode_text(text: &str) -> Result<Self, DecodeError> {
                text.trim()
                    .parse()
                    .map_err(|_| decode_err(DecodeErrorKind::InvalidValue, format!("invalid integer literal '{text}'")))
            }

            fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
                let arr: [u8; $width] = bytes
                    .try_into()
                    .map_err(|_| decode_err(DecodeErrorKind::Incomplete, format!("expected {} bytes, got {}", $width, bytes.len())))?;
                Ok(<$ty>::from_be_bytes(arr))
            }
        }

        impl Nullable for $ty {}
    };
}

impl_int_decoder!(i16, 2);
impl_int_decoder!(i32, 4);
impl_int_decoder!(i64, 8);

macro_rules! impl_float_decoder {
    ($ty:ty, $width:expr) => {
        impl ColumnDecoder for $ty {
            fn decode_text(text: &str) -> Result<Self, DecodeError> {
                text.trim()
                    .parse()
                    .map_err(|_| decode_err(DecodeErrorKind::InvalidValue, format!("invalid float literal '{text}'")))
            }

            fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
                let arr: [u8; $width] = bytes
                    .try_into()
                    .map_err(|_| decode_err(DecodeErrorKind::Incomplete, format!("expected {} bytes, got {}", $width, bytes.len())))?;
                Ok(<$ty>::from_be_bytes(arr))
            }
        }

        impl Nullable for $ty {}
    };
}

impl_float_decoder!(f32, 4);
impl_float_decoder!(f64, 8);

impl ColumnDecoder for bool {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        match text {
            "t" | "true" | "TRUE" | "1" => Ok(true),
            "f" | "false" | "FALSE" | "0" => Ok(false),
            other => Err(decode_err(DecodeErrorKind::InvalidValue, format!("invalid boolean literal '{other}'"))),
        }
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        match bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            other => Err(decode_err(DecodeErrorKind::InvalidValue, format!("invalid boolean binary payload {other:?}"))),
        }
    }
}

impl Nullable for bool {}

impl ColumnDecoder for String {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        Ok(text.to_string())
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        std::str::from_utf8(bytes).map(str::to_string).map_err(|_| not_utf8())
    }
}

impl Nullable for String {}

/// `BYTEA`. Text form is `\x` followed by lowercase hex (the modern
/// PostgreSQL hex format; the legacy escape format is not produced by any
/// server version this client targets).
impl ColumnDecoder for Vec<u8> {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        let hex = text
            .strip_prefix("\\x")
            .ok_or_else(|| decode_err(DecodeErrorKind::InvalidValue, "bytea text literal must start with \\x"))?;
        if hex.len() % 2 != 0 {
            return Err(decode_err(DecodeErrorKind::InvalidValue, "bytea hex literal has odd length"));
        }
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| decode_err(DecodeErrorKind::InvalidValue, "invalid bytea hex digit")))
            .collect()
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(bytes.to_vec())
    }
}

impl Nullable for Vec<u8> {}

/// Decodes the underlying unsigned integer for a serial-flavored column
/// (dispatch rule 2). Deliberately does not implement [`Nullable`]: a
/// sequence-backed identity column is never optional.
macro_rules! impl_serial_decoder {
    ($ty:ty) => {
        impl ColumnDecoder for $ty {
            fn decode_text(text: &str) -> Result<Self, DecodeError> {
                <$ty>::parse_text(text)
            }

            fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
                <$ty>::parse_binary(bytes)
            }
        }
    };
}

impl_serial_decoder!(SmallSerial);
impl_serial_decoder!(Serial);
impl_serial_decoder!(BigSerial);

macro_rules! impl_domain_decoder {
    ($ty:ty) => {
        impl ColumnDecoder for $ty {
            fn decode_text(text: &str) -> Result<Self, DecodeError> {
                <$ty>::parse_text(text)
            }

            fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
                <$ty>::parse_binary(bytes)
            }
        }

        impl Nullable for $ty {}
    };
}

impl_domain_decoder!(Interval);
impl_domain_decoder!(Money);
impl_domain_decoder!(Point);
impl_domain_decoder!(Line);
impl_domain_decoder!(LineSegment);
impl_domain_decoder!(BoundingBox);
impl_domain_decoder!(Path);
impl_domain_decoder!(Polygon);
impl_domain_decoder!(Circle);
impl_domain_decoder!(Inet);
impl_domain_decoder!(Cidr);
impl_domain_decoder!(MacAddr6);
impl_domain_decoder!(MacAddr8);
impl_domain_decoder!(Bits);

impl ColumnDecoder for TsVector {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        TsVector::parse_text(text)
    }
}

impl Nullable for TsVector {}

impl ColumnDecoder for TsQuery {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        TsQuery::parse_text(text)
    }
}

impl Nullable for TsQuery {}

impl ColumnDecoder for Uuid {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        uuid_type::parse_text(text)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        uuid_type::parse_binary(bytes)
    }
}

impl Nullable for Uuid {}

impl ColumnDecoder for Decimal {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        numeric::parse_text(text)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        numeric::parse_binary(bytes)
    }
}

impl Nullable for Decimal {}

impl ColumnDecoder for NaiveDate {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        temporal::parse_date_text(text)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        temporal::parse_date_binary(bytes)
    }
}

impl Nullable for NaiveDate {}

impl ColumnDecoder for NaiveTime {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        temporal::parse_time_text(text)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        temporal::parse_time_binary(bytes)
    }
}

impl Nullable for NaiveTime {}

impl ColumnDecoder for NaiveDateTime {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        temporal::parse_timestamp_text(text)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        temporal::parse_timestamp_binary(bytes)
    }
}

impl Nullable for NaiveDateTime {}

impl ColumnDecoder for DateTime<Utc> {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        temporal::parse_timestamptz_text(text)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        temporal::parse_timestamptz_binary(bytes)
    }
}

impl Nullable for DateTime<Utc> {}

impl ColumnDecoder for JsonValue {
    fn decode_text(text: &str) -> Result<Self, DecodeError> {
        json::parse_text(text)
    }

    fn decode_binary(bytes: &[u8]) -> Result<Self, DecodeError> {
        // JSON and JSONB share this decoder; JSONB's version byte is stripped
        // by the caller if needed. Since both row-description oids map here,
        // try the JSONB framing first and fall back to raw JSON bytes.
        json::parse_jsonb_binary(bytes).or_else(|_| json::parse_json_binary(bytes))
    }
}

impl Nullable for JsonValue {}

/// Match a text-format enum payload against a declared variant set.
/// Hand-written `ColumnDecoder`/`FromRow` impls use this to implement
/// PostgreSQL enum types without a derive macro.
pub fn decode_enum_variant(text: &str, variants: &[&str]) -> Result<usize, DecodeError> {
    variants
        .iter()
        .position(|v| *v == text)
        .ok_or_else(|| decode_err(DecodeErrorKind::InvalidEnum, format!("'{text}' is not a declared variant")))
}

/// Reflects a `Row`'s columns into a caller record shape. Implemented by hand
/// for tuples; callers with more complex shapes implement this themselves,
/// calling [`Row::get`]/[`Row::get_by_name`] per field.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self, Error>;
}

macro_rules! impl_from_row_tuple {
    ($($idx:tt => $ty:ident),+) => {
        impl<$($ty: ColumnDecoder),+> FromRow for ($($ty,)+) {
            fn from_row(row: &Row) -> Result<Self, Error> {
                Ok(($(row.get::<$ty>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(0 => A);
impl_from_row_tuple!(0 => A, 1 => B);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G);
impl_from_row_tuple!(0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G, 7 => H);

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, format: i16) -> FieldDescription {
        FieldDescription {
            name: name.to_string(),
            table_oid: 0,
            column_id: 0,
            type_oid: 0,
            type_size: -1,
            type_modifier: -1,
            format,
        }
    }

    fn row(fields: Vec<FieldDescription>, columns: Vec<Option<Vec<u8>>>) -> Row {
        Row::new(Arc::new(fields), columns).unwrap()
    }

    #[test]
    fn decodes_text_integer() {
        let r = row(vec![field("n", 0)], vec![Some(b"42".to_vec())]);
        assert_eq!(r.get::<i32>(0).unwrap(), 42);
    }

    #[test]
    fn decodes_binary_integer() {
        let r = row(vec![field("n", 1)], vec![Some(42i32.to_be_bytes().to_vec())]);
        assert_eq!(r.get::<i32>(0).unwrap(), 42);
    }

    #[test]
    fn null_into_option_is_none() {
        let r = row(vec![field("n", 0)], vec![None]);
        assert_eq!(r.get::<Option<i32>>(0).unwrap(), None);
    }

    #[test]
    fn null_into_non_optional_fails() {
        let r = row(vec![field("n", 0)], vec![None]);
        assert!(r.get::<i32>(0).is_err());
    }

    #[test]
    fn column_count_mismatch_is_rejected() {
        let err = Row::new(Arc::new(vec![field("a", 0), field("b", 0)]), vec![Some(b"1".to_vec())]);
        assert!(err.is_err());
    }

    #[test]
    fn decodes_text_array_of_ints() {
        let r = row(vec![field("xs", 0)], vec![Some(b"{1,2,3}".to_vec())]);
        assert_eq!(r.get::<Vec<i32>>(0).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn decodes_nullable_array_elements() {
        let r = row(vec![field("xs", 0)], vec![Some(b"{1,NULL,3}".to_vec())]);
        assert_eq!(r.get::<Vec<Option<i32>>>(0).unwrap(), vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn from_row_tuple_decodes_in_order() {
        let r = row(vec![field("a", 0), field("b", 0)], vec![Some(b"1".to_vec()), Some(b"hello".to_vec())]);
        let (a, b): (i32, String) = r.into_record().unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, "hello");
    }

    #[test]
    fn get_by_name_resolves_column_index() {
        let r = row(vec![field("id", 0)], vec![Some(b"7".to_vec())]);
        assert_eq!(r.get_by_name::<i32>("id").unwrap(), 7);
    }

    #[test]
    fn bytea_text_decodes_hex() {
        let r = row(vec![field("b", 0)], vec![Some(b"\\x010203".to_vec())]);
        assert_eq!(r.get::<Vec<u8>>(0).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn decodes_serial_from_text() {
        let r = row(vec![field("id", 0)], vec![Some(b"7".to_vec())]);
        assert_eq!(r.get::<Serial>(0).unwrap(), Serial(7));
    }

    #[test]
    fn decodes_big_serial_from_binary() {
        let r = row(vec![field("id", 1)], vec![Some(9u64.to_be_bytes().to_vec())]);
        assert_eq!(r.get::<BigSerial>(0).unwrap(), BigSerial(9));
    }

    #[test]
    fn null_serial_column_fails_rather_than_decoding_as_option() {
        let r = row(vec![field("id", 0)], vec![None]);
        assert!(r.get::<SmallSerial>(0).is_err());
    }
}
