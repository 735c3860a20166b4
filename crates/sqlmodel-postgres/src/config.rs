//! PostgreSQL connection configuration.
//!
//! Provides connection parameters for establishing PostgreSQL connections,
//! including authentication, TLS, and timeouts.

use std::path::PathBuf;
use std::time::Duration;

/// TLS negotiation mode for a connection.
///
/// Mirrors libpq's `sslmode` but collapses the six libpq variants down to the
/// three this client actually implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Never attempt TLS.
    #[default]
    Disable,
    /// Attempt TLS; fall back to a plaintext connection if the server declines.
    Prefer,
    /// Require TLS; fail the connection if the server declines.
    Require,
}

impl SslMode {
    /// Whether an `SSLRequest` should be sent at all.
    pub const fn should_try_ssl(self) -> bool {
        !matches!(self, SslMode::Disable)
    }

    /// Whether declining TLS should fail the connection.
    pub const fn is_required(self) -> bool {
        matches!(self, SslMode::Require)
    }
}

/// PostgreSQL connection configuration.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// Hostname or IP address.
    pub host: String,
    /// Port number (default: 5432).
    pub port: u16,
    /// Username for authentication.
    pub user: String,
    /// Password for authentication.
    pub password: Option<String>,
    /// Database name to connect to.
    pub database: String,
    /// TLS negotiation mode.
    pub ssl_mode: SslMode,
    /// CA certificate file (PEM) used to verify the server's certificate.
    ///
    /// When unset, the platform/webpki-roots trust store is used instead.
    pub ca_file: Option<PathBuf>,
    /// Client certificate file (PEM), for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// Client private key file (PEM), for mutual TLS.
    pub client_key: Option<PathBuf>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// How long [`sqlmodel_pool::Pool::acquire`] waits for an idle connection
    /// before failing. Carried on `PgConfig` so a single value configures
    /// both the driver and the pool built on top of it.
    pub acquisition_timeout: Duration,
    /// Application name reported to the server via the startup message.
    pub application_name: Option<String>,
    /// Skip server certificate verification entirely.
    ///
    /// Off by default. Intended for development against servers with
    /// self-signed or expired certificates; never enable this for a
    /// connection that crosses an untrusted network.
    pub danger_accept_invalid_certs: bool,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: String::new(),
            password: None,
            database: String::new(),
            ssl_mode: SslMode::default(),
            ca_file: None,
            client_cert: None,
            client_key: None,
            connect_timeout: Duration::from_secs(30),
            acquisition_timeout: Duration::from_secs(30),
            application_name: None,
            danger_accept_invalid_certs: false,
        }
    }
}

impl PgConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hostname.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the TLS negotiation mode.
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// Set the CA certificate file used to verify the server.
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Set a client certificate and key for mutual TLS. Both must be provided together.
    pub fn client_cert(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert_path.into());
        self.client_key = Some(key_path.into());
        self
    }

    /// Set the TCP connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the pool acquisition timeout.
    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout = timeout;
        self
    }

    /// Set the `application_name` startup parameter.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Disable server certificate verification for this connection.
    ///
    /// This is a development escape hatch, not a production setting: it
    /// removes TLS's protection against an on-path attacker entirely.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    /// Whether mutual TLS is fully configured (both cert and key present).
    pub fn has_client_cert(&self) -> bool {
        self.client_cert.is_some() && self.client_key.is_some()
    }

    /// Get the socket address string for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_every_field() {
        let config = PgConfig::new()
            .host("db.example.com")
            .port(6432)
            .user("alice")
            .password("hunter2")
            .database("app")
            .ssl_mode(SslMode::Require)
            .connect_timeout(Duration::from_secs(5))
            .acquisition_timeout(Duration::from_secs(2))
            .application_name("my-service");

        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, 6432);
        assert_eq!(config.user, "alice");
        assert_eq!(config.password, Some("hunter2".to_string()));
        assert_eq!(config.database, "app");
        assert_eq!(config.ssl_mode, SslMode::Require);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.acquisition_timeout, Duration::from_secs(2));
        assert_eq!(config.application_name, Some("my-service".to_string()));
    }

    #[test]
    fn socket_addr_formats_host_and_port() {
        let config = PgConfig::new().host("10.0.0.1").port(5433);
        assert_eq!(config.socket_addr(), "10.0.0.1:5433");
    }

    #[test]
    fn ssl_mode_properties() {
        assert!(!SslMode::Disable.should_try_ssl());
        assert!(SslMode::Prefer.should_try_ssl());
        assert!(!SslMode::Prefer.is_required());
        assert!(SslMode::Require.should_try_ssl());
        assert!(SslMode::Require.is_required());
    }

    #[test]
    fn has_client_cert_requires_both_paths() {
        let config = PgConfig::new().host("localhost");
        assert!(!config.has_client_cert());
        let config = config.client_cert("cert.pem", "key.pem");
        assert!(config.has_client_cert());
    }

    #[test]
    fn danger_accept_invalid_certs_is_off_by_default() {
        let config = PgConfig::new().host("localhost");
        assert!(!config.danger_accept_invalid_certs);
        let config = config.danger_accept_invalid_certs(true);
        assert!(config.danger_accept_invalid_certs);
    }
}
