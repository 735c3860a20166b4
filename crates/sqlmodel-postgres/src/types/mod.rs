//! The field type registry: one submodule per PostgreSQL domain-type family,
//! each exposing `parse_text`, `parse_binary` (where PostgreSQL defines a
//! binary form), and `format_text`.
//!
//! Types that map directly onto Rust primitives (`bool`, `i16`/`i32`/`i64`,
//! `f32`/`f64`, `String`, `Vec<u8>`) are decoded inline by
//! [`crate::row::ColumnDecoder`] and have no submodule here.

pub mod array;
pub mod bit;
pub mod composite;
pub mod geometric;
pub mod interval;
pub mod json;
pub mod money;
pub mod network;
pub mod numeric;
pub mod serial;
pub mod temporal;
pub mod textsearch;
pub mod uuid;

pub use array::{ArrayDimension, ArrayToken, BinaryArray};
pub use bit::Bits;
pub use composite::{CompositeField, CompositeToken};
pub use geometric::{BoundingBox, Circle, Line, LineSegment, Path, Point, Polygon};
pub use interval::Interval;
pub use money::Money;
pub use network::{Cidr, Inet, MacAddr6, MacAddr8};
pub use serial::{BigSerial, Serial, SmallSerial};
pub use textsearch::{TsQuery, TsVector};
