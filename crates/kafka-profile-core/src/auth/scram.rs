//! Client side of the SASL exchanges spoken to brokers.
//!
//! SCRAM-SHA-256 / SCRAM-SHA-512 follow RFC 5802 and RFC 7677. The exchange
//! is kept free of I/O: the connection feeds server messages in and sends
//! whatever comes out. OAUTHBEARER needs a single initial response
//! (RFC 7628), built by [`oauthbearer_initial_response`].

use std::marker::PhantomData;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};

/// Nonce length in bytes, before base64.
pub const NONCE_LENGTH: usize = 24;

/// Hash algorithm behind a SCRAM variant.
pub trait ScramHash: Send + Sync + std::fmt::Debug {
    /// The SASL mechanism name.
    fn name() -> &'static str;
    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8>;
    fn hash(data: &[u8]) -> Vec<u8>;
    fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8>;
}

#[derive(Debug)]
pub struct ScramSha256;

impl ScramHash for ScramSha256 {
    fn name() -> &'static str {
        "SCRAM-SHA-256"
    }

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha256::digest(data).to_vec()
    }

    fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut output = vec![0u8; 32];
        pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output);
        output
    }
}

#[derive(Debug)]
pub struct ScramSha512;

impl ScramHash for ScramSha512 {
    fn name() -> &'static str {
        "SCRAM-SHA-512"
    }

    fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    fn hash(data: &[u8]) -> Vec<u8> {
        Sha512::digest(data).to_vec()
    }

    fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut output = vec![0u8; 64];
        pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut output);
        output
    }
}

/// One SCRAM conversation from the client's point of view.
///
/// ```rust,ignore
/// let mut scram = ScramClient::<ScramSha512>::new("burrow", "secret");
/// let server_first = send(scram.client_first())?;
/// let server_final = send(scram.client_final(&server_first)?)?;
/// scram.verify_server_final(&server_final)?;
/// ```
#[derive(Debug)]
pub struct ScramClient<H: ScramHash> {
    password: String,
    client_nonce: String,
    client_first_bare: String,
    expected_server_signature: Option<Vec<u8>>,
    _hash: PhantomData<H>,
}

impl<H: ScramHash> ScramClient<H> {
    pub fn new(username: &str, password: &str) -> Self {
        let random_bytes: [u8; NONCE_LENGTH] = rand::thread_rng().gen();
        Self::with_nonce(username, password, &BASE64.encode(random_bytes))
    }

    /// Start a conversation with a fixed client nonce.
    pub fn with_nonce(username: &str, password: &str, nonce: &str) -> Self {
        Self {
            password: password.to_string(),
            client_nonce: nonce.to_string(),
            client_first_bare: format!("n={},r={}", escape_username(username), nonce),
            expected_server_signature: None,
            _hash: PhantomData,
        }
    }

    /// `n,,n=<user>,r=<nonce>`: no channel binding, no authzid.
    pub fn client_first(&self) -> String {
        format!("n,,{}", self.client_first_bare)
    }

    /// Answer the server-first-message with the client proof.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the server message is
    /// malformed or its nonce does not extend ours.
    pub fn client_final(&mut self, server_first: &str) -> Result<String, String> {
        let (combined_nonce, salt, iterations) = parse_server_first(server_first)?;
        if !combined_nonce.starts_with(&self.client_nonce) {
            return Err("server nonce does not start with client nonce".to_string());
        }

        let salted_password = H::pbkdf2(self.password.as_bytes(), &salt, iterations);
        let client_key = H::hmac(&salted_password, b"Client Key");
        let stored_key = H::hash(&client_key);
        let server_key = H::hmac(&salted_password, b"Server Key");

        // c=biws is base64("n,,")
        let without_proof = format!("c=biws,r={combined_nonce}");
        let auth_message = format!("{},{},{}", self.client_first_bare, server_first, without_proof);

        let client_signature = H::hmac(&stored_key, auth_message.as_bytes());
        let client_proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();

        self.expected_server_signature = Some(H::hmac(&server_key, auth_message.as_bytes()));

        Ok(format!("{without_proof},p={}", BASE64.encode(client_proof)))
    }

    /// Check the server signature in the server-final-message.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the server reported an error,
    /// the signature does not match, or [`client_final`] was never called.
    ///
    /// [`client_final`]: ScramClient::client_final
    pub fn verify_server_final(&self, server_final: &str) -> Result<(), String> {
        if let Some(error) = server_final.strip_prefix("e=") {
            return Err(format!("server rejected authentication: {error}"));
        }

        let expected = self
            .expected_server_signature
            .as_ref()
            .ok_or_else(|| "server-final received before client-final".to_string())?;
        let verifier = server_final
            .strip_prefix("v=")
            .ok_or_else(|| format!("malformed server-final-message: {server_final}"))?;
        let signature = BASE64
            .decode(verifier)
            .map_err(|e| format!("invalid base64 server signature: {e}"))?;

        if &signature != expected {
            return Err("server signature verification failed".to_string());
        }
        Ok(())
    }
}

/// `r=<nonce>,s=<salt>,i=<iterations>`
fn parse_server_first(message: &str) -> Result<(String, Vec<u8>, u32), String> {
    let mut combined_nonce = None;
    let mut salt = None;
    let mut iterations = None;

    for part in message.split(',') {
        if let Some(value) = part.strip_prefix("r=") {
            combined_nonce = Some(value.to_string());
        } else if let Some(value) = part.strip_prefix("s=") {
            salt = Some(
                BASE64
                    .decode(value)
                    .map_err(|e| format!("invalid base64 salt: {e}"))?,
            );
        } else if let Some(value) = part.strip_prefix("i=") {
            iterations = Some(
                value
                    .parse::<u32>()
                    .map_err(|e| format!("invalid iteration count: {e}"))?,
            );
        } else if let Some(error) = part.strip_prefix("e=") {
            return Err(format!("server rejected authentication: {error}"));
        }
    }

    Ok((
        combined_nonce.ok_or("missing nonce (r=)")?,
        salt.ok_or("missing salt (s=)")?,
        iterations.ok_or("missing iterations (i=)")?,
    ))
}

/// RFC 5802 saslname escaping.
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// The OAUTHBEARER initial client response carrying `token`.
pub fn oauthbearer_initial_response(token: &str) -> Vec<u8> {
    format!("n,,\x01auth=Bearer {token}\x01\x01").into_bytes()
}
