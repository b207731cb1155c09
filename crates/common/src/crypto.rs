//! RSA key material for HTTP signatures.
//!
//! Local actors own a key pair: the private half signs outbound deliveries and
//! the public half is published in the actor document. Remote actors only ever
//! carry a public key.
//!
//! ```
//! use vernissage_common::crypto::{generate_rsa_keypair, parse_private_key, parse_public_key};
//!
//! let keypair = generate_rsa_keypair().expect("Failed to generate keypair");
//! assert!(keypair.public_key_pem.contains("BEGIN PUBLIC KEY"));
//! let _private = parse_private_key(&keypair.private_key_pem).expect("Failed to parse");
//! let _public = parse_public_key(&keypair.public_key_pem).expect("Failed to parse");
//! ```

use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
};

use crate::{AppError, AppResult};

/// RSA key pair in PEM form (PKCS#8 private key, SPKI public key).
#[derive(Debug, Clone)]
pub struct RsaKeypair {
    /// Public key in PEM format (SPKI encoding).
    pub public_key_pem: String,
    /// Private key in PEM format (PKCS#8 encoding).
    pub private_key_pem: String,
}

const RSA_KEY_SIZE: usize = 2048;

/// Generate a new 2048-bit RSA key pair.
pub fn generate_rsa_keypair() -> AppResult<RsaKeypair> {
    let mut rng = rand::thread_rng();

    let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_SIZE)
        .map_err(|e| AppError::Internal(format!("Failed to generate RSA key: {e}")))?;

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(format!("Failed to encode private key: {e}")))?
        .to_string();

    Ok(RsaKeypair {
        public_key_pem: public_key_pem_of(&private_key)?,
        private_key_pem,
    })
}

/// Derive the SPKI PEM public key belonging to a private key.
pub fn public_key_pem_of(private_key: &RsaPrivateKey) -> AppResult<String> {
    RsaPublicKey::from(private_key)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::Internal(format!("Failed to encode public key: {e}")))
}

/// Parse a PKCS#8 PEM private key.
pub fn parse_private_key(pem: &str) -> AppResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| AppError::Internal(format!("Failed to parse private key: {e}")))
}

/// Parse an SPKI PEM public key.
///
/// Some peers still publish PKCS#1 (`BEGIN RSA PUBLIC KEY`) documents, so that
/// encoding is accepted as well.
pub fn parse_public_key(pem: &str) -> AppResult<RsaPublicKey> {
    use rsa::pkcs1::DecodeRsaPublicKey;

    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::BadRequest(format!("Failed to parse public key: {e}")))
}
