//! PostgreSQL message encoder.
//!
//! This module handles encoding frontend messages into the wire protocol format.

use super::messages::{CANCEL_REQUEST_CODE, FrontendMessage, SSL_REQUEST_CODE, frontend_type};

/// Incremental encoder for PostgreSQL frontend messages.
///
/// Each call to [`MessageWriter::write`] appends a fully framed message to an
/// internal scratch buffer and returns the slice just written, so callers can
/// hand it straight to a socket without an extra copy.
#[derive(Debug, Clone, Default)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    /// Create a new, empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Encode `msg` into the internal buffer and return the bytes for this message.
    pub fn write(&mut self, msg: &FrontendMessage) -> &[u8] {
        self.buf.clear();
        match msg {
            FrontendMessage::Startup { version, params } => self.write_startup(*version, params),
            FrontendMessage::PasswordMessage(password) => {
                self.write_tagged(frontend_type::PASSWORD, |buf| write_cstring(buf, password));
            }
            FrontendMessage::SASLInitialResponse { mechanism, data } => {
                self.write_tagged(frontend_type::PASSWORD, |buf| {
                    write_cstring(buf, mechanism);
                    if data.is_empty() {
                        buf.extend_from_slice(&(-1_i32).to_be_bytes());
                    } else {
                        buf.extend_from_slice(&(data.len() as i32).to_be_bytes());
                        buf.extend_from_slice(data);
                    }
                });
            }
            FrontendMessage::SASLResponse(data) => {
                self.write_tagged(frontend_type::PASSWORD, |buf| buf.extend_from_slice(data));
            }
            FrontendMessage::Query(sql) => {
                self.write_tagged(frontend_type::QUERY, |buf| write_cstring(buf, sql));
            }
            FrontendMessage::Parse {
                name,
                query,
                param_types,
            } => {
                self.write_tagged(frontend_type::PARSE, |buf| {
                    write_cstring(buf, name);
                    write_cstring(buf, query);
                    buf.extend_from_slice(&(param_types.len() as i16).to_be_bytes());
                    for oid in param_types {
                        buf.extend_from_slice(&oid.to_be_bytes());
                    }
                });
            }
            FrontendMessage::Bind {
                portal,
                statement,
                param_formats,
                params,
                result_formats,
            } => {
                self.write_tagged(frontend_type::BIND, |buf| {
                    write_cstring(buf, portal);
                    write_cstring(buf, statement);
                    buf.extend_from_slice(&(param_formats.len() as i16).to_be_bytes());
                    for fmt in param_formats {
                        buf.extend_from_slice(&fmt.to_be_bytes());
                    }
                    buf.extend_from_slice(&(params.len() as i16).to_be_bytes());
                    for param in params {
                        match param {
                            None => buf.extend_from_slice(&(-1_i32).to_be_bytes()),
                            Some(bytes) => {
                                buf.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                                buf.extend_from_slice(bytes);
                            }
                        }
                    }
                    buf.extend_from_slice(&(result_formats.len() as i16).to_be_bytes());
                    for fmt in result_formats {
                        buf.extend_from_slice(&fmt.to_be_bytes());
                    }
                });
            }
            FrontendMessage::Describe { kind, name } => {
                self.write_tagged(frontend_type::DESCRIBE, |buf| {
                    buf.push(kind.as_byte());
                    write_cstring(buf, name);
                });
            }
            FrontendMessage::Execute { portal, max_rows } => {
                self.write_tagged(frontend_type::EXECUTE, |buf| {
                    write_cstring(buf, portal);
                    buf.extend_from_slice(&max_rows.to_be_bytes());
                });
            }
            FrontendMessage::Close { kind, name } => {
                self.write_tagged(frontend_type::CLOSE, |buf| {
                    buf.push(kind.as_byte());
                    write_cstring(buf, name);
                });
            }
            FrontendMessage::Sync => self.write_tagged(frontend_type::SYNC, |_| {}),
            FrontendMessage::Flush => self.write_tagged(frontend_type::FLUSH, |_| {}),
            FrontendMessage::CopyData(data) => {
                self.write_tagged(frontend_type::COPY_DATA, |buf| buf.extend_from_slice(data));
            }
            FrontendMessage::CopyDone => self.write_tagged(frontend_type::COPY_DONE, |_| {}),
            FrontendMessage::CopyFail(reason) => {
                self.write_tagged(frontend_type::COPY_FAIL, |buf| write_cstring(buf, reason));
            }
            FrontendMessage::Terminate => self.write_tagged(frontend_type::TERMINATE, |_| {}),
            FrontendMessage::CancelRequest {
                process_id,
                secret_key,
            } => {
                self.buf.extend_from_slice(&0_i32.to_be_bytes()); // length placeholder
                self.buf.extend_from_slice(&CANCEL_REQUEST_CODE.to_be_bytes());
                self.buf.extend_from_slice(&process_id.to_be_bytes());
                self.buf.extend_from_slice(&secret_key.to_be_bytes());
                patch_untagged_length(&mut self.buf);
            }
            FrontendMessage::SSLRequest => {
                self.buf.extend_from_slice(&0_i32.to_be_bytes());
                self.buf.extend_from_slice(&SSL_REQUEST_CODE.to_be_bytes());
                patch_untagged_length(&mut self.buf);
            }
        }
        &self.buf
    }

    fn write_startup(&mut self, version: i32, params: &[(String, String)]) {
        self.buf.extend_from_slice(&0_i32.to_be_bytes());
        self.buf.extend_from_slice(&version.to_be_bytes());
        for (key, value) in params {
            write_cstring(&mut self.buf, key);
            write_cstring(&mut self.buf, value);
        }
        self.buf.push(0);
        patch_untagged_length(&mut self.buf);
    }

    fn write_tagged(&mut self, tag: u8, body: impl FnOnce(&mut Vec<u8>)) {
        self.buf.push(tag);
        self.buf.extend_from_slice(&0_i32.to_be_bytes());
        body(&mut self.buf);
        let len = (self.buf.len() - 1) as i32;
        self.buf[1..5].copy_from_slice(&len.to_be_bytes());
    }
}

fn write_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Patch the length prefix of a message with no leading type byte
/// (StartupMessage, SSLRequest, CancelRequest).
fn patch_untagged_length(buf: &mut Vec<u8>) {
    let len = buf.len() as i32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{backend_type, messages::PROTOCOL_VERSION};
    use crate::protocol::reader::MessageReader;

    #[test]
    fn write_query_roundtrips_through_reader() {
        let mut writer = MessageWriter::new();
        let bytes = writer.write(&FrontendMessage::Query("SELECT 1".to_string())).to_vec();
        assert_eq!(bytes[0], frontend_type::QUERY);
        let len = i32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        assert_eq!(len as usize, bytes.len() - 1);
    }

    #[test]
    fn write_startup_has_no_type_byte() {
        let mut writer = MessageWriter::new();
        let params = vec![
            ("user".to_string(), "alice".to_string()),
            ("database".to_string(), "alice".to_string()),
        ];
        let bytes = writer
            .write(&FrontendMessage::Startup {
                version: PROTOCOL_VERSION,
                params,
            })
            .to_vec();
        let len = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(len as usize, bytes.len());
        let version = i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(version, PROTOCOL_VERSION);
        assert!(bytes.ends_with(&[0]));
    }

    #[test]
    fn write_ssl_request() {
        let mut writer = MessageWriter::new();
        let bytes = writer.write(&FrontendMessage::SSLRequest).to_vec();
        assert_eq!(bytes.len(), 8);
        let code = i32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(code, SSL_REQUEST_CODE);
    }

    #[test]
    fn write_bind_with_null_and_binary_params() {
        let mut writer = MessageWriter::new();
        let msg = FrontendMessage::Bind {
            portal: String::new(),
            statement: "stmt1".to_string(),
            param_formats: vec![1, 0],
            params: vec![Some(vec![0, 0, 0, 1]), None],
            result_formats: vec![1],
        };
        let bytes = writer.write(&msg).to_vec();
        assert_eq!(bytes[0], frontend_type::BIND);
        assert!(bytes.len() > 5);
    }

    #[test]
    fn sync_message_is_a_bare_tag_and_length() {
        let mut writer = MessageWriter::new();
        let bytes = writer.write(&FrontendMessage::Sync).to_vec();
        assert_eq!(bytes, vec![frontend_type::SYNC, 0, 0, 0, 4]);
    }

    #[test]
    fn parse_complete_from_reader_is_unaffected_by_writer_state() {
        // Sanity check that the reader and writer modules agree on framing by
        // round-tripping a backend-shaped frame through `MessageReader`.
        let frame = [backend_type::PARSE_COMPLETE, 0, 0, 0, 4];
        let decoded = MessageReader::parse_message(&frame).unwrap();
        assert!(matches!(decoded, crate::protocol::BackendMessage::ParseComplete));
    }
}
