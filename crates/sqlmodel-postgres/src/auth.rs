//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677).
//!
//! Drives the three SCRAM messages a client must send — `client-first`,
//! `client-final` — and verifies the server's final signature. Channel binding
//! is not supported (`gs2-cbind-flag = n`), matching `SCRAM-SHA-256` rather
//! than `SCRAM-SHA-256-PLUS`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as base64_engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Error, auth_error};

type HmacSha256 = Hmac<Sha256>;

const CLIENT_NONCE_LEN: usize = 24;
const GS2_HEADER: &str = "n,,";

/// Driver for the client side of a SCRAM-SHA-256 exchange.
///
/// Call sequence: [`ScramClient::client_first`], then
/// [`ScramClient::process_server_first`] with the server's response, then
/// [`ScramClient::verify_server_final`] with the server's last message.
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    client_first_bare: String,
    salted_password: Option<[u8; 32]>,
    auth_message: String,
}

impl ScramClient {
    /// Create a new client for the given username/password pair.
    pub fn new(username: &str, password: &str) -> Self {
        let client_nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CLIENT_NONCE_LEN)
            .map(char::from)
            .collect();
        Self {
            username: username.to_string(),
            password: password.to_string(),
            client_nonce,
            client_first_bare: String::new(),
            salted_password: None,
            auth_message: String::new(),
        }
    }

    /// Build the `client-first-message` to send as the SASL initial response.
    ///
    /// The username is intentionally omitted from `client-first-message-bare`
    /// (`n=`) since PostgreSQL ignores it and relies on the startup message's
    /// `user` parameter instead.
    pub fn client_first(&mut self) -> Vec<u8> {
        self.client_first_bare = format!("n=,r={}", self.client_nonce);
        let message = format!("{GS2_HEADER}{}", self.client_first_bare);
        message.into_bytes()
    }

    /// Consume `server-first-message`, returning the `client-final-message` to send.
    pub fn process_server_first(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|_| auth_error("server-first-message is not valid UTF-8"))?;

        let mut combined_nonce = None;
        let mut salt_b64 = None;
        let mut iterations = None;
        for part in text.split(',') {
            if let Some(rest) = part.strip_prefix("r=") {
                combined_nonce = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("s=") {
                salt_b64 = Some(rest.to_string());
            } else if let Some(rest) = part.strip_prefix("i=") {
                iterations = rest.parse::<u32>().ok();
            }
        }

        let combined_nonce = combined_nonce.ok_or_else(|| auth_error("server-first-message missing nonce"))?;
        let salt_b64 = salt_b64.ok_or_else(|| auth_error("server-first-message missing salt"))?;
        let iterations = iterations.ok_or_else(|| auth_error("server-first-message missing iteration count"))?;

        if !combined_nonce.starts_with(&self.client_nonce) {
            return Err(auth_error("server nonce does not extend client nonce"));
        }

        let salt = base64_engine
            .decode(salt_b64.as_bytes())
            .map_err(|_| auth_error("server-first-message salt is not valid base64"))?;

        let salted_password = salt_password(self.password.as_bytes(), &salt, iterations);
        self.salted_password = Some(salted_password);

        let client_key = hmac_sha256(&salted_password, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();

        let channel_binding = base64_engine.encode(GS2_HEADER.as_bytes());
        let client_final_without_proof = format!("c={channel_binding},r={combined_nonce}");

        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, text, client_final_without_proof
        );
        self.auth_message = auth_message.clone();

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let client_proof = xor_bytes(&client_key, &client_signature);
        let proof_b64 = base64_engine.encode(client_proof);

        let client_final = format!("{client_final_without_proof},p={proof_b64}");
        Ok(client_final.into_bytes())
    }

    /// Verify `server-final-message` against the locally computed `ServerKey`.
    ///
    /// Uses constant-time comparison so a timing side channel can't leak how
    /// many signature bytes matched.
    pub fn verify_server_final(&self, data: &[u8]) -> Result<(), Error> {
        let text = std::str::from_utf8(data)
            .map_err(|_| auth_error("server-final-message is not valid UTF-8"))?;

        if let Some(err) = text.strip_prefix("e=") {
            return Err(auth_error(format!("server rejected SCRAM exchange: {err}")));
        }

        let signature_b64 = text
            .strip_prefix("v=")
            .ok_or_else(|| auth_error("server-final-message missing verifier"))?;
        let server_signature = base64_engine
            .decode(signature_b64.as_bytes())
            .map_err(|_| auth_error("server-final-message verifier is not valid base64"))?;

        let salted_password = self
            .salted_password
            .ok_or_else(|| auth_error("verify_server_final called before process_server_first"))?;
        let server_key = hmac_sha256(&salted_password, b"Server Key");
        let expected_signature = hmac_sha256(&server_key, self.auth_message.as_bytes());

        if expected_signature.ct_eq(&server_signature[..]).unwrap_u8() == 1 {
            Ok(())
        } else {
            Err(auth_error("server SCRAM signature verification failed"))
        }
    }
}

fn salt_password(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut output = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
    output
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn xor_bytes(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_first_has_expected_shape() {
        let mut client = ScramClient::new("alice", "hunter2");
        let msg = String::from_utf8(client.client_first()).unwrap();
        assert!(msg.starts_with("n,,n=,r="));
    }

    #[test]
    fn full_exchange_against_a_simulated_server() {
        let username = "alice";
        let password = "hunter2";
        let salt = b"abcdsalt";
        let iterations = 4096u32;

        let mut client = ScramClient::new(username, password);
        let first = String::from_utf8(client.client_first()).unwrap();
        let client_nonce = first.strip_prefix("n,,n=,r=").unwrap().to_string();

        let server_nonce = format!("{client_nonce}servernoncepart");
        let salt_b64 = base64_engine.encode(salt);
        let server_first = format!("r={server_nonce},s={salt_b64},i={iterations}");

        let client_final = String::from_utf8(client.process_server_first(server_first.as_bytes()).unwrap()).unwrap();
        assert!(client_final.contains(&format!("r={server_nonce}")));
        assert!(client_final.contains("p="));

        let salted_password = salt_password(password.as_bytes(), salt, iterations);
        let server_key = hmac_sha256(&salted_password, b"Server Key");

        let client_first_bare = format!("n=,r={client_nonce}");
        let channel_binding = base64_engine.encode(GS2_HEADER.as_bytes());
        let client_final_without_proof = format!("c={channel_binding},r={server_nonce}");
        let auth_message = format!("{client_first_bare},{server_first},{client_final_without_proof}");
        let server_signature = hmac_sha256(&server_key, auth_message.as_bytes());
        let server_final = format!("v={}", base64_engine.encode(server_signature));

        assert!(client.verify_server_final(server_final.as_bytes()).is_ok());
    }

    #[test]
    fn rejects_server_nonce_that_does_not_extend_client_nonce() {
        let mut client = ScramClient::new("alice", "hunter2");
        let _ = client.client_first();
        let server_first = "r=totallydifferentnonce,s=c2FsdA==,i=4096";
        assert!(client.process_server_first(server_first.as_bytes()).is_err());
    }

    #[test]
    fn rejects_error_in_server_final_message() {
        let mut client = ScramClient::new("alice", "hunter2");
        let first = String::from_utf8(client.client_first()).unwrap();
        let client_nonce = first.strip_prefix("n,,n=,r=").unwrap().to_string();
        let server_first = format!("r={client_nonce}x,s=c2FsdA==,i=4096");
        client.process_server_first(server_first.as_bytes()).unwrap();
        assert!(client.verify_server_final(b"e=other-error").is_err());
    }
}
