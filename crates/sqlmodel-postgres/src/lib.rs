//! PostgreSQL driver for SQLModel Rust.
//!
//! This crate implements the PostgreSQL wire protocol from scratch over
//! blocking `std::net` sockets. It provides:
//!
//! - Message framing and parsing
//! - Authentication (SCRAM-SHA-256; other methods are recognized and rejected)
//! - Simple and extended query protocols
//! - Connection management with state machine
//! - Typed decoding and parameter encoding between Rust and PostgreSQL types

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod params;
pub mod protocol;
pub mod rls;
pub mod row;
pub mod statement_cache;
#[cfg(feature = "tls")]
pub mod tls;
pub mod transaction;
pub mod types;

pub use config::{PgConfig, SslMode};
pub use connection::{Connection, ConnectionState, QueryResult};
pub use error::Error;
pub use params::Param;
pub use rls::RlsContext;
pub use row::{ColumnDecoder, FromRow, Row};
pub use statement_cache::Intent;
pub use transaction::Transaction;
