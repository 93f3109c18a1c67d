//! Identity vault
//!
//! Keypair lifecycle and every confidentiality operation on plate text.
//! Plates are stored at rest as (a) a deterministic, non-reversible
//! fingerprint used as the cross-batch join key and (b) an RSA-OAEP
//! ciphertext recoverable only by the custodian holding the private key and
//! its password.
//!
//! The fingerprint is `base64(SHA-256(SHA-256(public_pem) || SHA-256(plate)))`.
//! It is a pure function of the canonical plate and the public key bytes, so
//! the same plate under the same key always correlates; rotating the keypair
//! breaks cross-batch correlation by design.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

/// RSA modulus size for generated keypairs
const KEY_BITS: usize = 2048;

/// Vault errors
#[derive(Debug, Error)]
pub enum VaultError {
    /// Entropy or parameter failure during keypair generation
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Loaded bytes are not a well-formed key of the expected kind
    #[error("Key format error: {0}")]
    KeyFormat(String),

    /// Private key decryption failed at the PKCS#5 layer
    #[error("Wrong private key password")]
    WrongPassword,

    /// Private key material is structurally damaged
    #[error("Corrupt private key: {0}")]
    CorruptKey(String),

    /// Encrypt/decrypt failure (malformed or mismatched ciphertext)
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Key file I/O
    #[error("Key file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generate a fresh RSA keypair.
///
/// Returns `(public_pem, private_pem)`: the public half as SPKI PEM, the
/// private half as scrypt-encrypted PKCS#8 PEM under `password`.
pub fn generate_keypair(password: &str) -> Result<(String, String), VaultError> {
    generate_keypair_with_size(password, KEY_BITS)
}

/// Keypair generation with an explicit modulus size (tests use small keys)
pub fn generate_keypair_with_size(
    password: &str,
    bits: usize,
) -> Result<(String, String), VaultError> {
    let mut rng = rand::thread_rng();

    let private_key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| VaultError::KeyGeneration(e.to_string()))?;
    let public_key = RsaPublicKey::from(&private_key);

    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| VaultError::KeyGeneration(e.to_string()))?;

    let private_pem = private_key
        .to_pkcs8_encrypted_pem(&mut rng, password.as_bytes(), LineEnding::LF)
        .map_err(|e| VaultError::KeyGeneration(e.to_string()))?;

    Ok((public_pem, private_pem.to_string()))
}

/// Encrypt canonical plate text for at-rest storage.
///
/// OAEP with SHA-256; the scheme is randomized, so two calls yield different
/// (both valid) ciphertexts. Returns base64 for direct ledger storage.
pub fn encrypt_plate(plate: &str, public_pem: &str) -> Result<String, VaultError> {
    let public_key = RsaPublicKey::from_public_key_pem(public_pem)
        .map_err(|e| VaultError::KeyFormat(e.to_string()))?;

    let mut rng = rand::thread_rng();
    let ciphertext = public_key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), plate.as_bytes())
        .map_err(|e| VaultError::Cipher(e.to_string()))?;

    Ok(BASE64.encode(ciphertext))
}

/// Decrypt a stored ciphertext with the custodian's private key.
///
/// Wrong password and corrupt key material fail distinctly; this never
/// returns garbage.
pub fn decrypt_plate(
    ciphertext_b64: &str,
    private_pem: &str,
    password: Option<&str>,
) -> Result<String, VaultError> {
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| VaultError::Cipher(format!("base64: {}", e)))?;

    let private_key = parse_private_key(private_pem, password)?;

    let plaintext = private_key
        .decrypt(Oaep::new::<Sha256>(), &ciphertext)
        .map_err(|e| VaultError::Cipher(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| VaultError::Cipher(e.to_string()))
}

/// Deterministic fingerprint binding a canonical plate to a public key.
///
/// Pure: no randomness, no salt beyond the key bytes themselves. Identical
/// inputs always yield identical output.
pub fn fingerprint(plate: &str, public_pem: &str) -> String {
    let key_hash = Sha256::digest(public_pem.as_bytes());
    let plate_hash = Sha256::digest(plate.as_bytes());

    let mut combined = Sha256::new();
    combined.update(key_hash);
    combined.update(plate_hash);

    BASE64.encode(combined.finalize())
}

/// Load and validate a public key PEM.
///
/// Rejects private key material outright: loading never silently accepts a
/// non-matching key type.
pub fn load_public_key(path: &Path) -> Result<String, VaultError> {
    let pem = read_pem(path)?;

    if pem.contains("PRIVATE KEY") {
        return Err(VaultError::KeyFormat(format!(
            "{} holds a private key, expected a public key",
            path.display()
        )));
    }

    RsaPublicKey::from_public_key_pem(&pem)
        .map_err(|e| VaultError::KeyFormat(format!("not a valid RSA public key: {}", e)))?;

    Ok(pem)
}

/// Load and validate a private key PEM.
///
/// Validates PEM framing and key kind; the full decrypt-and-parse check runs
/// when a password is supplied (encrypted PKCS#8 cannot be structurally
/// validated without it).
pub fn load_private_key(path: &Path, password: Option<&str>) -> Result<String, VaultError> {
    let pem = read_pem(path)?;

    if !pem.contains("PRIVATE KEY") {
        return Err(VaultError::KeyFormat(format!(
            "{} does not hold a private key",
            path.display()
        )));
    }

    parse_private_key(&pem, password)?;

    Ok(pem)
}

/// Write a PEM artifact to disk
pub fn save_key(pem: &str, path: &Path) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, pem)?;
    Ok(())
}

fn read_pem(path: &Path) -> Result<String, VaultError> {
    let pem = std::fs::read_to_string(path)?;

    if !pem.starts_with("-----BEGIN") {
        return Err(VaultError::KeyFormat(format!(
            "{} is not PEM-framed",
            path.display()
        )));
    }

    Ok(pem)
}

fn parse_private_key(pem: &str, password: Option<&str>) -> Result<RsaPrivateKey, VaultError> {
    if pem.contains("ENCRYPTED PRIVATE KEY") {
        let password = password.ok_or_else(|| {
            VaultError::KeyFormat("encrypted private key requires a password".to_string())
        })?;

        RsaPrivateKey::from_pkcs8_encrypted_pem(pem, password.as_bytes()).map_err(|e| match e {
            // PKCS#5 layer failure: the password did not decrypt the blob
            rsa::pkcs8::Error::EncryptedPrivateKey(_) => VaultError::WrongPassword,
            other => VaultError::CorruptKey(other.to_string()),
        })
    } else {
        RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| VaultError::CorruptKey(e.to_string()))
    }
}
