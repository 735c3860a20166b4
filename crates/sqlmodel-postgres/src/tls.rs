//! TLS support for PostgreSQL connections (rustls-backed, `tls` feature only).
//!
//! PostgreSQL negotiates TLS out-of-band: the client sends an `SSLRequest`
//! before the startup message and the server replies with a single `'S'` or
//! `'N'` byte, then (if `'S'`) the rest of the session runs inside a standard
//! TLS record stream. This module builds the [`rustls::ClientConfig`] used for
//! that stream.
//!
//! Unlike the historical libpq default, server certificate verification is
//! enabled by default here: the trust store is either the platform/Mozilla
//! roots (`webpki-roots`) or an explicit CA file, never "accept anything".
//! [`PgConfig::danger_accept_invalid_certs`] is the explicit, off-by-default
//! escape hatch for development against servers with self-signed or expired
//! certificates. `SslMode::Disable`/`Prefer` still allow a connection to
//! proceed without TLS at all when the server declines; this module only
//! governs the handshake once TLS has been chosen.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};

use crate::config::PgConfig;
use crate::error::{ConnectionError, ConnectionErrorKind, Error};

fn tls_error(message: impl Into<String>) -> Error {
    Error::Connection(ConnectionError {
        kind: ConnectionErrorKind::Ssl,
        message: message.into(),
        source: None,
    })
}

/// A [`ServerCertVerifier`] that accepts any certificate chain and any
/// signature, backing [`PgConfig::danger_accept_invalid_certs`]. This removes
/// TLS's protection against an on-path attacker; it exists for development
/// against servers with self-signed or expired certificates.
struct NoCertificateVerification(Arc<CryptoProvider>);

impl std::fmt::Debug for NoCertificateVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoCertificateVerification").finish()
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the [`rustls::ClientConfig`] to use for this connection's TLS upgrade.
pub fn build_client_config(config: &PgConfig) -> Result<rustls::ClientConfig, Error> {
    let builder = if config.danger_accept_invalid_certs {
        tracing::warn!(host = %config.host, "TLS certificate verification disabled (danger_accept_invalid_certs)");
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
    } else {
        let mut roots = RootCertStore::empty();
        if let Some(ca_path) = &config.ca_file {
            let file = File::open(ca_path)
                .map_err(|e| tls_error(format!("failed to open CA file {}: {e}", ca_path.display())))?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| tls_error(format!("failed to parse CA file: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| tls_error(format!("failed to trust CA certificate: {e}")))?;
            }
        } else {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        rustls::ClientConfig::builder().with_root_certificates(roots)
    };

    let client_config = if config.has_client_cert() {
        let cert_chain = load_cert_chain(config.client_cert.as_deref().expect("checked by has_client_cert"))?;
        let key = load_private_key(config.client_key.as_deref().expect("checked by has_client_cert"))?;
        builder
            .with_client_auth_cert(cert_chain, key)
            .map_err(|e| tls_error(format!("invalid client certificate/key: {e}")))?
    } else {
        builder.with_no_client_auth()
    };

    Ok(client_config)
}

fn load_cert_chain(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let file = File::open(path).map_err(|e| tls_error(format!("failed to open client cert {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("failed to parse client cert: {e}")))
}

fn load_private_key(path: &std::path::Path) -> Result<PrivateKeyDer<'static>, Error> {
    let file = File::open(path).map_err(|e| tls_error(format!("failed to open client key {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| tls_error(format!("failed to parse client key: {e}")))?
        .ok_or_else(|| tls_error(format!("no private key found in {}", path.display())))
}

/// Build the SNI [`ServerName`] used for certificate verification.
pub fn server_name(host: &str) -> Result<ServerName<'static>, Error> {
    ServerName::try_from(host.to_string()).map_err(|e| tls_error(format!("invalid server name '{host}': {e}")))
}

/// Wrap a plain TCP stream in a rustls client connection, driving the
/// handshake to completion before returning.
pub fn handshake<S: std::io::Read + std::io::Write>(
    config: &PgConfig,
    stream: S,
) -> Result<rustls::StreamOwned<rustls::ClientConnection, S>, Error> {
    let client_config = build_client_config(config)?;
    let server_name = server_name(&config.host)?;
    let conn = rustls::ClientConnection::new(Arc::new(client_config), server_name)
        .map_err(|e| tls_error(format!("failed to create TLS connection: {e}")))?;

    let mut tls_stream = rustls::StreamOwned::new(conn, stream);
    while tls_stream.conn.is_handshaking() {
        tls_stream
            .conn
            .complete_io(&mut tls_stream.sock)
            .map_err(|e| tls_error(format!("TLS handshake failed: {e}")))?;
    }
    Ok(tls_stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_config_with_webpki_roots_succeeds() {
        let config = PgConfig::new().host("example.com");
        assert!(build_client_config(&config).is_ok());
    }

    #[test]
    fn build_client_config_rejects_missing_ca_file() {
        let config = PgConfig::new().host("example.com").ca_file("/nonexistent/ca.pem");
        assert!(build_client_config(&config).is_err());
    }

    #[test]
    fn server_name_rejects_empty_host() {
        assert!(server_name("").is_err());
    }

    #[test]
    fn server_name_accepts_hostname() {
        assert!(server_name("db.example.com").is_ok());
    }

    #[test]
    fn danger_accept_invalid_certs_bypasses_missing_ca_file_error() {
        let config = PgConfig::new()
            .host("example.com")
            .ca_file("/nonexistent/ca.pem")
            .danger_accept_invalid_certs(true);
        // The custom verifier path never touches `ca_file`/the root store, so a
        // bogus CA path that would otherwise fail to load no longer matters.
        assert!(build_client_config(&config).is_ok());
    }
}
