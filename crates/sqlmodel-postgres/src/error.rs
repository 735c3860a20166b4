//! Error taxonomy for the PostgreSQL client.
//!
//! A single [`Error`] enum groups every failure mode the crate can produce, mirroring
//! the component responsibilities: connection/network/TLS failures, protocol framing
//! failures, server-reported query errors (SQLSTATE preserved), decode failures,
//! statement-cache misuse, pool exhaustion, and transaction misuse.

use std::fmt;

use crate::protocol::ErrorFields;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Debug)]
pub enum Error {
    /// Invalid configuration (bad host/port/username combination).
    Config(String),
    /// Network/connection-lifecycle failure.
    Connection(ConnectionError),
    /// TLS handshake or negotiation failure.
    Tls(TlsError),
    /// Wire-protocol framing or unexpected-message failure.
    Protocol(ProtocolError),
    /// Server-reported `ErrorResponse`, SQLSTATE preserved.
    Query(QueryError),
    /// Failure decoding a column value into its target type.
    Decode(DecodeError),
    /// Misuse of the prepared-statement cache.
    Statement(StatementError),
    /// Pool exhaustion/closure.
    Pool(PoolError),
    /// Transaction misuse (commit/rollback on an inactive handle, unexpected abort).
    Transaction(TransactionError),
    /// Raw I/O failure not otherwise classified.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::Connection(e) => write!(f, "{e}"),
            Error::Tls(e) => write!(f, "{e}"),
            Error::Protocol(e) => write!(f, "{e}"),
            Error::Query(e) => write!(f, "{e}"),
            Error::Decode(e) => write!(f, "{e}"),
            Error::Statement(e) => write!(f, "{e}"),
            Error::Pool(e) => write!(f, "{e}"),
            Error::Transaction(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e.source.as_deref().map(|b| b as _),
            Error::Protocol(e) => e.source.as_deref().map(|b| b as _),
            Error::Query(e) => e.source.as_deref().map(|b| b as _),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Kinds of connection-lifecycle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Could not resolve or establish the TCP connection.
    Connect,
    /// The server actively refused the connection.
    Refused,
    /// The server closed the connection or a read/write failed mid-session.
    Disconnected,
    /// TLS was required but the server does not support it, or the handshake failed.
    Ssl,
    /// Authentication was rejected, or an unsupported method was offered.
    Authentication,
}

/// A connection-lifecycle failure.
#[derive(Debug)]
pub struct ConnectionError {
    /// Which kind of connection failure this is.
    pub kind: ConnectionErrorKind,
    /// Human-readable message. Never includes the password.
    pub message: String,
    /// Underlying cause, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection error ({:?}): {}", self.kind, self.message)
    }
}

/// TLS-specific failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsErrorKind {
    /// The handshake itself failed.
    HandshakeFailed,
    /// `tls_mode = require` but the server responded `N` to `SSLRequest`.
    RequiredButNotSupported,
    /// The crate was built without the `tls` feature but TLS was requested.
    FeatureDisabled,
}

/// A TLS negotiation failure.
#[derive(Debug)]
pub struct TlsError {
    /// Which kind of TLS failure this is.
    pub kind: TlsErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tls error ({:?}): {}", self.kind, self.message)
    }
}

/// Wire-protocol framing/unexpected-message failure.
#[derive(Debug)]
pub struct ProtocolError {
    /// Human-readable message.
    pub message: String,
    /// Raw bytes involved, when available (e.g. an unparseable frame).
    pub raw_data: Option<Vec<u8>>,
    /// Underlying cause, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol error: {}", self.message)
    }
}

/// Server-reported error kind, derived from the SQLSTATE class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// SQLSTATE class 42: syntax error or access rule violation.
    Syntax,
    /// SQLSTATE class 23: integrity constraint violation.
    Constraint,
    /// SQLSTATE 40001: serialization failure.
    Serialization,
    /// SQLSTATE class 40 (other than 40001): deadlock detected.
    Deadlock,
    /// SQLSTATE 57014: query cancelled.
    Cancelled,
    /// SQLSTATE class 57 (other than 57014): operator intervention / timeout.
    Timeout,
    /// Any other server-reported error.
    Database,
}

/// A server-reported `ErrorResponse`.
#[derive(Debug)]
pub struct QueryError {
    /// Derived error kind.
    pub kind: QueryErrorKind,
    /// SQLSTATE code, when the server supplied one.
    pub sqlstate: Option<String>,
    /// Primary error message from the server.
    pub message: String,
    /// SQL text that produced the error, when known.
    pub sql: Option<String>,
    /// `DETAIL` field, if present.
    pub detail: Option<String>,
    /// `HINT` field, if present.
    pub hint: Option<String>,
    /// 1-based error position within `sql`, if present.
    pub position: Option<usize>,
    /// Underlying cause, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query error ({:?}): {}", self.kind, self.message)?;
        if let Some(code) = &self.sqlstate {
            write!(f, " [{code}]")?;
        }
        Ok(())
    }
}

/// Kinds of decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// A NULL was found for a non-optional field.
    UnexpectedNull,
    /// The row's column count did not match the caller's record shape.
    ColumnCountMismatch,
    /// An integer/float/uuid/timestamp/interval/etc. failed to parse.
    InvalidValue,
    /// An enum payload didn't match any declared variant.
    InvalidEnum,
    /// Truncated payload (fewer bytes than the declared width).
    Incomplete,
    /// Malformed array or composite literal.
    InvalidSyntax,
}

/// A failure decoding one column's value.
#[derive(Debug)]
pub struct DecodeError {
    /// Which kind of decode failure this is.
    pub kind: DecodeErrorKind,
    /// Column name, when known.
    pub field: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "decode error in column '{field}' ({:?}): {}", self.kind, self.message),
            None => write!(f, "decode error ({:?}): {}", self.kind, self.message),
        }
    }
}

/// Kinds of statement-cache misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementErrorKind {
    /// `prepare` was called with a command whose intent isn't SELECT/INSERT/UPDATE/DELETE.
    UnsupportedPrepareCommand,
    /// `prepare` was called with a name already bound to a different intent.
    PreparedStatementConflict,
    /// `execute` referenced a statement name not present in the cache.
    CacheMiss,
}

/// A statement-cache misuse error.
#[derive(Debug)]
pub struct StatementError {
    /// Which kind of statement error this is.
    pub kind: StatementErrorKind,
    /// Statement name involved.
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "statement error ({:?}) for '{}': {}", self.kind, self.name, self.message)
    }
}

/// Kinds of pool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolErrorKind {
    /// `acquire` timed out waiting for an idle slot.
    AcquireTimeout,
    /// The pool has been closed.
    Closed,
    /// Every slot is broken and reconnection failed.
    AllSlotsBroken,
}

/// A pool-level failure.
#[derive(Debug)]
pub struct PoolError {
    /// Which kind of pool error this is.
    pub kind: PoolErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool error ({:?}): {}", self.kind, self.message)
    }
}

/// Kinds of transaction misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// `commit`/`rollback` was called on a handle already finalized.
    NotActive,
    /// The transaction ended in a state other than the one the caller expected.
    Aborted,
}

/// A transaction misuse error.
#[derive(Debug)]
pub struct TransactionError {
    /// Which kind of transaction error this is.
    pub kind: TransactionErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction error ({:?}): {}", self.kind, self.message)
    }
}

/// Classify a server `ErrorResponse`/`NoticeResponse` payload into a typed [`Error`].
///
/// SQLSTATE class 08 (connection exception) and 28 (invalid authorization
/// specification) are reported as [`Error::Connection`] rather than [`Error::Query`]
/// since they indicate the session itself is no longer usable.
pub fn error_from_fields(fields: &ErrorFields, sql: Option<&str>) -> Error {
    match fields.code.get(..2) {
        Some("08") => {
            return Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Disconnected,
                message: fields.message.clone(),
                source: None,
            });
        }
        Some("28") => {
            return Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Authentication,
                message: fields.message.clone(),
                source: None,
            });
        }
        _ => {}
    }

    let kind = match fields.code.get(..2) {
        Some("42") => QueryErrorKind::Syntax,
        Some("23") => QueryErrorKind::Constraint,
        Some("40") => {
            if fields.code == "40001" {
                QueryErrorKind::Serialization
            } else {
                QueryErrorKind::Deadlock
            }
        }
        Some("57") => {
            if fields.code == "57014" {
                QueryErrorKind::Cancelled
            } else {
                QueryErrorKind::Timeout
            }
        }
        _ => QueryErrorKind::Database,
    };

    Error::Query(QueryError {
        kind,
        sqlstate: Some(fields.code.clone()),
        message: fields.message.clone(),
        sql: sql.map(str::to_string),
        detail: fields.detail.clone(),
        hint: fields.hint.clone(),
        position: fields.position.map(|p| p as usize),
        source: None,
    })
}

pub(crate) fn auth_error(msg: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Authentication,
        message: msg.into(),
        source: None,
    })
}

pub(crate) fn protocol_error(msg: impl Into<String>) -> Error {
    Error::Protocol(ProtocolError {
        message: msg.into(),
        raw_data: None,
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unique_violation_as_constraint() {
        let fields = ErrorFields {
            severity: "ERROR".to_string(),
            code: "23505".to_string(),
            message: "unique violation".to_string(),
            ..Default::default()
        };
        let err = error_from_fields(&fields, None);
        assert!(matches!(err, Error::Query(q) if q.kind == QueryErrorKind::Constraint));
    }

    #[test]
    fn classifies_invalid_password_as_connection_authentication() {
        let fields = ErrorFields {
            severity: "FATAL".to_string(),
            code: "28P01".to_string(),
            message: "password authentication failed".to_string(),
            ..Default::default()
        };
        let err = error_from_fields(&fields, None);
        assert!(matches!(
            err,
            Error::Connection(c) if c.kind == ConnectionErrorKind::Authentication
        ));
    }

    #[test]
    fn classifies_serialization_failure() {
        let fields = ErrorFields {
            code: "40001".to_string(),
            message: "could not serialize access".to_string(),
            ..Default::default()
        };
        let err = error_from_fields(&fields, None);
        assert!(matches!(err, Error::Query(q) if q.kind == QueryErrorKind::Serialization));
    }

    #[test]
    fn classifies_other_class_40_as_deadlock() {
        let fields = ErrorFields {
            code: "40P01".to_string(),
            message: "deadlock detected".to_string(),
            ..Default::default()
        };
        let err = error_from_fields(&fields, None);
        assert!(matches!(err, Error::Query(q) if q.kind == QueryErrorKind::Deadlock));
    }

    #[test]
    fn classifies_statement_timeout() {
        let fields = ErrorFields {
            code: "57P03".to_string(),
            message: "the database system is starting up".to_string(),
            ..Default::default()
        };
        let err = error_from_fields(&fields, None);
        assert!(matches!(err, Error::Query(q) if q.kind == QueryErrorKind::Timeout));
    }

    #[test]
    fn classifies_query_cancelled() {
        let fields = ErrorFields {
            code: "57014".to_string(),
            message: "canceling statement due to user request".to_string(),
            ..Default::default()
        };
        let err = error_from_fields(&fields, None);
        assert!(matches!(err, Error::Query(q) if q.kind == QueryErrorKind::Cancelled));
    }
}
