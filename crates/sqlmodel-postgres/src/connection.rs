//! Connection state machine (C3), simple query driver (C6), and extended
//! query driver (C7).
//!
//! A single [`Connection`] is not safe for concurrent use: every method
//! assumes single-writer, single-reader ownership by whichever thread holds
//! it. `Connection` is `Send` but intentionally not `Sync` — the [`Pool`
//! crate][sqlmodel_pool]'s mutex is the synchronization boundary, not this type.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use crate::auth::ScramClient;
use crate::config::PgConfig;
use crate::error::{ConnectionError, ConnectionErrorKind, Error, auth_error, error_from_fields, protocol_error};
use crate::params::Param;
use crate::protocol::{BackendMessage, DescribeKind, FieldDescription, FrontendMessage, MessageReader, MessageWriter, PROTOCOL_VERSION, TransactionStatus};
use crate::row::Row;
use crate::rls::RlsContext;
use crate::statement_cache::{Intent, StatementCache};
#[cfg(feature = "tls")]
use crate::tls;

enum PgStream {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

impl Read for PgStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            PgStream::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            PgStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for PgStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            PgStream::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            PgStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            PgStream::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            PgStream::Tls(s) => s.flush(),
        }
    }
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Busy,
    Broken,
    Closed,
}

/// The outcome of a query, classified per C6/C7's rules.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// `RowDescription` + zero or more `DataRow` + a `SELECT n` tag.
    Select(Vec<Row>),
    /// `INSERT`/`UPDATE`/`DELETE`/`MERGE`, carrying the affected row count.
    Command(u64),
    /// Any other successful `CommandComplete`, or an `EmptyQueryResponse`.
    Success(bool),
    /// `EXPLAIN`'s single-text-column rows, one string per row.
    Explain(Vec<String>),
}

fn classify_command_tag(tag: &str) -> QueryResult {
    let mut parts = tag.split_whitespace();
    match parts.next() {
        Some("INSERT") => {
            let _oid = parts.next();
            let n = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            QueryResult::Command(n)
        }
        Some("UPDATE") | Some("DELETE") | Some("MERGE") => {
            let n = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            QueryResult::Command(n)
        }
        _ => QueryResult::Success(true),
    }
}

/// A live connection to a PostgreSQL server.
pub struct Connection {
    stream: PgStream,
    state: ConnectionState,
    tx_status: TransactionStatus,
    process_id: i32,
    secret_key: i32,
    parameters: HashMap<String, String>,
    config: PgConfig,
    reader: MessageReader,
    writer: MessageWriter,
    read_buf: Vec<u8>,
    statements: StatementCache,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("tx_status", &self.tx_status)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Establish a new connection: TCP connect, optional TLS upgrade, startup,
    /// authentication, then drain startup messages up to `ReadyForQuery`.
    pub fn connect(config: PgConfig) -> Result<Self, Error> {
        let addr = config.socket_addr();
        let socket_addr = addr.parse().map_err(|e| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("invalid socket address '{addr}': {e}"),
                source: None,
            })
        })?;

        let stream = TcpStream::connect_timeout(&socket_addr, config.connect_timeout).map_err(|e| {
            let kind = if e.kind() == std::io::ErrorKind::ConnectionRefused {
                ConnectionErrorKind::Refused
            } else {
                ConnectionErrorKind::Connect
            };
            Error::Connection(ConnectionError {
                kind,
                message: format!("failed to connect to {addr}: {e}"),
                source: Some(Box::new(e)),
            })
        })?;

        stream.set_nodelay(true).ok();
        stream.set_read_timeout(Some(config.connect_timeout)).ok();
        stream.set_write_timeout(Some(config.connect_timeout)).ok();

        let stream = if config.ssl_mode.should_try_ssl() {
            Self::negotiate_ssl(stream, &config)?
        } else {
            PgStream::Plain(stream)
        };

        let mut conn = Connection {
            stream,
            state: ConnectionState::Connecting,
            tx_status: TransactionStatus::Idle,
            process_id: 0,
            secret_key: 0,
            parameters: HashMap::new(),
            config,
            reader: MessageReader::new(),
            writer: MessageWriter::new(),
            read_buf: vec![0u8; 8192],
            statements: StatementCache::new(),
        };

        conn.send_startup()?;
        conn.state = ConnectionState::Authenticating;
        conn.handle_auth()?;
        conn.read_startup_messages()?;

        tracing::info!(host = %conn.config.host, port = conn.config.port, database = %conn.config.database, "connection established");
        Ok(conn)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        self.tx_status
    }

    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Best-effort `Terminate` followed by marking the connection closed.
    /// Idempotent.
    pub fn close(&mut self) -> Result<(), Error> {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Disconnected) {
            return Ok(());
        }
        let result = self.send_message(&FrontendMessage::Terminate);
        self.state = ConnectionState::Closed;
        tracing::debug!(host = %self.config.host, port = self.config.port, "connection closed");
        result
    }

    // ==================== TLS ====================

    /// Send `SSLRequest` on the raw TCP stream and read the server's single
    /// `'S'`/`'N'` response byte, upgrading to TLS if the server agrees.
    #[cfg(feature = "tls")]
    fn negotiate_ssl(mut stream: TcpStream, config: &PgConfig) -> Result<PgStream, Error> {
        let mut writer = MessageWriter::new();
        let data = writer.write(&FrontendMessage::SSLRequest);
        stream.write_all(data).map_err(Error::Io)?;
        stream.flush().map_err(Error::Io)?;

        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf).map_err(|e| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Ssl,
                message: format!("failed to read SSL negotiation response: {e}"),
                source: Some(Box::new(e)),
            })
        })?;

        match buf[0] {
            b'S' => {
                let tls_stream = tls::handshake(config, stream)?;
                tracing::debug!(host = %config.host, "TLS negotiation succeeded");
                Ok(PgStream::Tls(Box::new(tls_stream)))
            }
            b'N' => {
                if config.ssl_mode.is_required() {
                    Err(Error::Connection(ConnectionError {
                        kind: ConnectionErrorKind::Ssl,
                        message: "server does not support SSL".to_string(),
                        source: None,
                    }))
                } else {
                    tracing::debug!(host = %config.host, "server declined TLS, falling back to plaintext");
                    Ok(PgStream::Plain(stream))
                }
            }
            other => Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Ssl,
                message: format!("unexpected SSL negotiation response byte 0x{other:02x}"),
                source: None,
            })),
        }
    }

    #[cfg(not(feature = "tls"))]
    fn negotiate_ssl(stream: TcpStream, config: &PgConfig) -> Result<PgStream, Error> {
        if config.ssl_mode.is_required() {
            Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Ssl,
                message: "TLS requested but sqlmodel-postgres was built without the 'tls' feature".to_string(),
                source: None,
            }))
        } else {
            Ok(PgStream::Plain(stream))
        }
    }

    // ==================== Startup ====================

    fn send_startup(&mut self) -> Result<(), Error> {
        let mut params = vec![("user".to_string(), self.config.user.clone())];
        if !self.config.database.is_empty() {
            params.push(("database".to_string(), self.config.database.clone()));
        }
        if let Some(name) = &self.config.application_name {
            params.push(("application_name".to_string(), name.clone()));
        }
        self.send_message(&FrontendMessage::Startup { version: PROTOCOL_VERSION, params })
    }

    // ==================== Authentication ====================

    fn require_password(&self, message: &'static str) -> Result<&str, Error> {
        self.config.password.as_deref().ok_or_else(|| auth_error(message))
    }

    /// Drives the authentication sub-protocol. Per this crate's scope, only
    /// `SCRAM-SHA-256` is accepted as the negotiated SASL mechanism; every
    /// other method the server might request (Kerberos, cleartext, MD5, SCM,
    /// GSSAPI, SSPI) is recognized only to produce a clear unsupported-method
    /// error rather than being driven.
    fn handle_auth(&mut self) -> Result<(), Error> {
        loop {
            match self.receive_message()? {
                BackendMessage::AuthenticationOk => {
                    tracing::debug!(mechanism = "trust", "authentication mechanism chosen");
                    return Ok(());
                }
                BackendMessage::AuthenticationCleartextPassword => {
                    return Err(auth_error("server requested cleartext password authentication, which this client does not support"));
                }
                BackendMessage::AuthenticationMD5Password(_) => {
                    return Err(auth_error("server requested MD5 password authentication, which this client does not support"));
                }
                BackendMessage::AuthenticationSASL(mechanisms) => {
                    if mechanisms.iter().any(|m| m == "SCRAM-SHA-256") {
                        tracing::debug!(mechanism = "SCRAM-SHA-256", "authentication mechanism chosen");
                        self.scram_auth()?;
                    } else {
                        return Err(auth_error(format!("server offered no supported SASL mechanism (got {mechanisms:?})")));
                    }
                }
                BackendMessage::ErrorResponse(fields) => {
                    self.state = ConnectionState::Broken;
                    return Err(error_from_fields(&fields, None));
                }
                other => {
                    return Err(protocol_error(format!("unexpected message during authentication: {other:?}")));
                }
            }
        }
    }

    fn scram_auth(&mut self) -> Result<(), Error> {
        let password = self.require_password("SCRAM-SHA-256 requires a password but none was configured")?;
        let mut client = ScramClient::new(&self.config.user, password);

        let client_first = client.client_first();
        self.send_message(&FrontendMessage::SASLInitialResponse { mechanism: "SCRAM-SHA-256".to_string(), data: client_first })?;

        let server_first = match self.receive_message()? {
            BackendMessage::AuthenticationSASLContinue(data) => data,
            BackendMessage::ErrorResponse(fields) => return Err(error_from_fields(&fields, None)),
            other => return Err(protocol_error(format!("expected AuthenticationSASLContinue, got {other:?}"))),
        };

        let client_final = client.process_server_first(&server_first)?;
        self.send_message(&FrontendMessage::SASLResponse(client_final))?;

        let server_final = match self.receive_message()? {
            BackendMessage::AuthenticationSASLFinal(data) => data,
            BackendMessage::ErrorResponse(fields) => return Err(error_from_fields(&fields, None)),
            other => return Err(protocol_error(format!("expected AuthenticationSASLFinal, got {other:?}"))),
        };

        client.verify_server_final(&server_final)?;

        match self.receive_message()? {
            BackendMessage::AuthenticationOk => Ok(()),
            BackendMessage::ErrorResponse(fields) => Err(error_from_fields(&fields, None)),
            other => Err(protocol_error(format!("expected AuthenticationOk, got {other:?}"))),
        }
    }

    fn read_startup_messages(&mut self) -> Result<(), Error> {
        loop {
            match self.receive_message()? {
                BackendMessage::BackendKeyData { process_id, secret_key } => {
                    self.process_id = process_id;
                    self.secret_key = secret_key;
                }
                BackendMessage::ParameterStatus { name, value } => {
                    self.parameters.insert(name, value);
                }
                BackendMessage::ReadyForQuery(status) => {
                    self.tx_status = status;
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                BackendMessage::ErrorResponse(fields) => {
                    self.state = ConnectionState::Broken;
                    return Err(error_from_fields(&fields, None));
                }
                BackendMessage::NoticeResponse(fields) => {
                    tracing::debug!(message = %fields.message, "notice during startup");
                }
                other => return Err(protocol_error(format!("unexpected message before ReadyForQuery: {other:?}"))),
            }
        }
    }

    // ==================== Low-level I/O ====================

    fn send_message(&mut self, msg: &FrontendMessage) -> Result<(), Error> {
        let data = self.writer.write(msg);
        self.stream.write_all(data).map_err(|e| {
            self.state = ConnectionState::Broken;
            Error::Io(e)
        })?;
        self.stream.flush().map_err(|e| {
            self.state = ConnectionState::Broken;
            Error::Io(e)
        })
    }

    fn receive_message(&mut self) -> Result<BackendMessage, Error> {
        loop {
            match self.reader.next_message() {
                Ok(Some(msg)) => return Ok(msg),
                Ok(None) => {
                    let n = self.stream.read(&mut self.read_buf).map_err(|e| {
                        self.state = ConnectionState::Broken;
                        Error::Io(e)
                    })?;
                    if n == 0 {
                        self.state = ConnectionState::Disconnected;
                        return Err(Error::Connection(ConnectionError {
                            kind: ConnectionErrorKind::Disconnected,
                            message: "connection closed by server".to_string(),
                            source: None,
                        }));
                    }
                    self.reader.feed(&self.read_buf[..n]).map_err(|_| {
                        self.state = ConnectionState::Broken;
                        protocol_error("malformed message frame from server")
                    })?;
                }
                Err(_) => {
                    self.state = ConnectionState::Broken;
                    return Err(protocol_error("malformed message frame from server"));
                }
            }
        }
    }

    /// Issue `RESET ALL` followed by one `SET SESSION` per `rls` entry. Used
    /// by the pool when handing out a slot; returns the RLS statements'
    /// failure, if any, to the caller.
    pub fn apply_session_rls(&mut self, rls: &RlsContext) -> Result<(), Error> {
        self.query("RESET ALL")?;
        for stmt in rls.to_session_statements() {
            self.query(&stmt)?;
        }
        Ok(())
    }

    // ==================== C6: simple query driver ====================

    /// Emit a single `Query` message and classify the result.
    pub fn query(&mut self, sql: &str) -> Result<QueryResult, Error> {
        self.state = ConnectionState::Busy;
        self.send_message(&FrontendMessage::Query(sql.to_string()))?;

        let is_explain = crate::statement_cache::extract_intent(sql) == Some(Intent::Explain);
        let mut fields: Option<Vec<FieldDescription>> = None;
        let mut rows: Vec<Vec<Option<Vec<u8>>>> = Vec::new();
        let mut command_tag: Option<String> = None;
        let mut empty = false;
        let mut pending_error: Option<Error> = None;

        loop {
            match self.receive_message()? {
                BackendMessage::RowDescription(f) => fields = Some(f),
                BackendMessage::DataRow(values) => rows.push(values),
                BackendMessage::CommandComplete(tag) => command_tag = Some(tag),
                BackendMessage::EmptyQueryResponse => empty = true,
                BackendMessage::ErrorResponse(f) => pending_error = Some(error_from_fields(&f, Some(sql))),
                BackendMessage::NoticeResponse(f) => tracing::debug!(message = %f.message, "server notice"),
                BackendMessage::ReadyForQuery(status) => {
                    self.tx_status = status;
                    self.state = ConnectionState::Connected;
                    break;
                }
                _ => {}
            }
        }

        if let Some(err) = pending_error {
            return Err(err);
        }
        if empty {
            return Ok(QueryResult::Success(true));
        }
        if let Some(fields) = fields {
            let fields = Arc::new(fields);
            let decoded: Vec<Row> = rows.into_iter().map(|cols| Row::new(fields.clone(), cols)).collect::<Result<_, _>>()?;
            if is_explain {
                let lines = decoded.iter().map(|r| r.get::<String>(0)).collect::<Result<Vec<_>, _>>()?;
                return Ok(QueryResult::Explain(lines));
            }
            return Ok(QueryResult::Select(decoded));
        }
        match command_tag {
            Some(tag) => Ok(classify_command_tag(&tag)),
            None => Ok(QueryResult::Success(true)),
        }
    }

    /// Prepare `name` via the simple-query path (`PREPARE name AS <sql>`),
    /// validating and caching its intent first so an unsupported command is
    /// rejected before anything is sent to the server.
    pub fn prepare_simple(&mut self, name: &str, sql: &str) -> Result<Intent, Error> {
        let intent = self.statements.register(name, sql)?;
        self.query(&format!("PREPARE \"{name}\" AS {sql}"))?;
        Ok(intent)
    }

    // ==================== C7: extended query driver ====================

    /// `Parse(name, sql)` + `Sync`, expecting `ParseComplete` then `ReadyForQuery`.
    pub fn prepare(&mut self, name: &str, sql: &str) -> Result<Intent, Error> {
        let intent = self.statements.register(name, sql)?;

        self.state = ConnectionState::Busy;
        self.send_message(&FrontendMessage::Parse { name: name.to_string(), query: sql.to_string(), param_types: Vec::new() })?;
        self.send_message(&FrontendMessage::Sync)?;

        let mut pending_error: Option<Error> = None;
        loop {
            match self.receive_message()? {
                BackendMessage::ParseComplete => {}
                BackendMessage::ErrorResponse(f) => pending_error = Some(error_from_fields(&f, Some(sql))),
                BackendMessage::ReadyForQuery(status) => {
                    self.tx_status = status;
                    self.state = ConnectionState::Connected;
                    break;
                }
                _ => {}
            }
        }

        if let Some(err) = pending_error {
            return Err(err);
        }
        Ok(intent)
    }

    /// `Bind` (all result columns requested in binary) + `Describe(portal)` +
    /// `Execute(portal, 0)` + `Sync` against a name previously prepared with
    /// [`Connection::prepare`].
    pub fn execute(&mut self, name: &str, params: &[Param]) -> Result<QueryResult, Error> {
        let intent = self.statements.intent_of(name)?;

        let param_formats: Vec<i16> = params.iter().map(Param::format_code).collect();
        let param_values: Vec<Option<Vec<u8>>> = params.iter().map(Param::encode).collect();

        self.state = ConnectionState::Busy;
        self.send_message(&FrontendMessage::Bind {
            portal: String::new(),
            statement: name.to_string(),
            param_formats,
            params: param_values,
            result_formats: vec![1],
        })?;
        self.send_message(&FrontendMessage::Describe { kind: DescribeKind::Portal, name: String::new() })?;
        self.send_message(&FrontendMessage::Execute { portal: String::new(), max_rows: 0 })?;
        self.send_message(&FrontendMessage::Sync)?;

        let mut fields: Option<Vec<FieldDescription>> = None;
        let mut rows: Vec<Vec<Option<Vec<u8>>>> = Vec::new();
        let mut command_tag: Option<String> = None;
        let mut pending_error: Option<Error> = None;

        loop {
            match self.receive_message()? {
                BackendMessage::BindComplete => {}
                BackendMessage::RowDescription(f) => fields = Some(f),
                BackendMessage::NoData => {}
                BackendMessage::DataRow(values) => rows.push(values),
                BackendMessage::CommandComplete(tag) => command_tag = Some(tag),
                BackendMessage::ErrorResponse(f) => pending_error = Some(error_from_fields(&f, self.statements.sql_of(name).map(str::to_string).as_deref())),
                BackendMessage::NoticeResponse(f) => tracing::debug!(message = %f.message, "server notice"),
                BackendMessage::ReadyForQuery(status) => {
                    self.tx_status = status;
                    self.state = ConnectionState::Connected;
                    break;
                }
                _ => {}
            }
        }

        if let Some(err) = pending_error {
            return Err(err);
        }
        if let Some(fields) = fields {
            let fields = Arc::new(fields);
            let decoded: Vec<Row> = rows.into_iter().map(|cols| Row::new(fields.clone(), cols)).collect::<Result<_, _>>()?;
            if intent == Intent::Explain {
                let lines = decoded.iter().map(|r| r.get::<String>(0)).collect::<Result<Vec<_>, _>>()?;
                return Ok(QueryResult::Explain(lines));
            }
            return Ok(QueryResult::Select(decoded));
        }
        match command_tag {
            Some(tag) => Ok(classify_command_tag(&tag)),
            None => Ok(QueryResult::Success(true)),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_insert_tag() {
        assert_eq!(classify_command_tag("INSERT 0 3"), QueryResult::Command(3));
    }

    #[test]
    fn classifies_update_tag() {
        assert_eq!(classify_command_tag("UPDATE 7"), QueryResult::Command(7));
    }

    #[test]
    fn classifies_ddl_tag_as_success() {
        assert_eq!(classify_command_tag("CREATE TABLE"), QueryResult::Success(true));
    }

    #[test]
    fn classifies_set_tag_as_success() {
        assert_eq!(classify_command_tag("SET"), QueryResult::Success(true));
    }

    #[test]
    fn prepare_rejects_unsupported_intent_before_any_io() {
        // DDL has no recognized intent at all, so `register` rejects it
        // without needing a live connection.
        let mut cache = StatementCache::new();
        assert!(cache.register("s1", "CREATE TABLE t (id int)").is_err());
    }
}
