//! Cryptographic primitives: envelope encryption, checksums, blind indexes,
//! and the password KDF.
//!
//! A [`CryptoService`] wraps exactly one 32-byte key. The master-key instance
//! and the vault-key instance of a running node are separate services; key
//! material is zeroized when the service is dropped.
//!
//! The envelope format is fixed: plaintext is length-prefixed and padded to a
//! multiple of 4096 bytes (so ciphertext length does not leak the size of
//! short secrets), sealed with AES-256-GCM under a fresh 12-byte IV, and
//! serialized as `base64(ciphertext) + "." + base64(tag)` with the IV carried
//! separately as base64.

pub mod phrase;
pub mod rsa;
pub mod shamir;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{EngramError, Result};

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce in bytes.
pub const IV_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Plaintext is padded to a multiple of this many bytes before sealing.
const PAD_BLOCK: usize = 4096;

/// PBKDF2-SHA256 iteration count for password-derived keys.
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// An encrypted payload: `ciphertext` is `base64(ct) + "." + base64(tag)`,
/// `iv` is base64 of the 12-byte nonce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub ciphertext: String,
    pub iv: String,
}

impl Envelope {
    /// Serialize to a single opaque blob string (`iv:ciphertext.tag`) for
    /// storage in a journal column or a sync payload.
    pub fn to_blob(&self) -> String {
        format!("{}:{}", self.iv, self.ciphertext)
    }

    /// Parse a blob string produced by [`Envelope::to_blob`].
    pub fn from_blob(blob: &str) -> Result<Self> {
        let (iv, ciphertext) = blob
            .split_once(':')
            .ok_or_else(|| EngramError::Format("envelope blob has no iv delimiter".into()))?;
        Ok(Self {
            ciphertext: ciphertext.to_string(),
            iv: iv.to_string(),
        })
    }
}

/// AES-256-GCM envelope encryption under a single 32-byte key.
pub struct CryptoService {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl CryptoService {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Encrypt a UTF-8 string into an [`Envelope`] with a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<Envelope> {
        let key: &[u8; KEY_SIZE] = &self.key;
        let cipher = Aes256Gcm::new(key.into());

        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let padded = pad_plaintext(plaintext.as_bytes());
        let sealed = cipher
            .encrypt(nonce, padded.as_slice())
            .map_err(|e| EngramError::Auth(format!("encryption failed: {e}")))?;

        // aes-gcm appends the 16-byte tag; serialize it as a separate segment.
        let split = sealed.len() - TAG_SIZE;
        let ciphertext = format!(
            "{}.{}",
            BASE64.encode(&sealed[..split]),
            BASE64.encode(&sealed[split..])
        );

        Ok(Envelope {
            ciphertext,
            iv: BASE64.encode(iv),
        })
    }

    /// Decrypt an [`Envelope`]. Fails with [`EngramError::Auth`] on tag
    /// mismatch and [`EngramError::Format`] on a malformed envelope. Callers
    /// must treat either as fatal for the payload.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<String> {
        let (ct_b64, tag_b64) = envelope
            .ciphertext
            .split_once('.')
            .ok_or_else(|| EngramError::Format("envelope has no tag segment".into()))?;

        let mut sealed = BASE64
            .decode(ct_b64)
            .map_err(|e| EngramError::Format(format!("bad ciphertext base64: {e}")))?;
        let tag = BASE64
            .decode(tag_b64)
            .map_err(|e| EngramError::Format(format!("bad tag base64: {e}")))?;
        if tag.len() != TAG_SIZE {
            return Err(EngramError::Format(format!(
                "tag must be {TAG_SIZE} bytes, got {}",
                tag.len()
            )));
        }
        sealed.extend_from_slice(&tag);

        let iv = BASE64
            .decode(&envelope.iv)
            .map_err(|e| EngramError::Format(format!("bad iv base64: {e}")))?;
        if iv.len() != IV_SIZE {
            return Err(EngramError::Format(format!(
                "iv must be {IV_SIZE} bytes, got {}",
                iv.len()
            )));
        }

        let key: &[u8; KEY_SIZE] = &self.key;
        let cipher = Aes256Gcm::new(key.into());
        let padded = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
            .map_err(|_| EngramError::Auth("GCM tag verification failed".into()))?;

        let plaintext = unpad_plaintext(&padded)?;
        String::from_utf8(plaintext)
            .map_err(|e| EngramError::Format(format!("plaintext is not UTF-8: {e}")))
    }
}

/// Prefix a 4-byte big-endian length header and pad with random bytes to a
/// multiple of [`PAD_BLOCK`].
fn pad_plaintext(plaintext: &[u8]) -> Zeroizing<Vec<u8>> {
    let raw_len = plaintext.len() + 4;
    let padded_len = raw_len.div_ceil(PAD_BLOCK) * PAD_BLOCK;

    let mut out = Zeroizing::new(Vec::with_capacity(padded_len));
    out.extend_from_slice(&(plaintext.len() as u32).to_be_bytes());
    out.extend_from_slice(plaintext);

    let mut pad = vec![0u8; padded_len - raw_len];
    OsRng.fill_bytes(&mut pad);
    out.extend_from_slice(&pad);
    out
}

/// Strip the padding applied by [`pad_plaintext`].
fn unpad_plaintext(padded: &[u8]) -> Result<Vec<u8>> {
    if padded.len() < 4 {
        return Err(EngramError::Format("padded payload too short".into()));
    }
    let len = u32::from_be_bytes([padded[0], padded[1], padded[2], padded[3]]) as usize;
    if len > padded.len() - 4 {
        return Err(EngramError::Format("length header exceeds payload".into()));
    }
    Ok(padded[4..4 + len].to_vec())
}

/// Generate a fresh random 32-byte key.
pub fn generate_master_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Hex-encoded SHA-256 of arbitrary bytes. Used as the journal checksum.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Privacy-preserving lookup id: hex `HMAC-SHA256(blind_key, name)`.
///
/// The server can deduplicate records by this id without learning `name`.
pub fn blind_index(blind_key: &[u8], name: &str) -> Result<String> {
    if blind_key.len() < KEY_SIZE {
        return Err(EngramError::Config(format!(
            "blind-index key must be at least {KEY_SIZE} bytes"
        )));
    }
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(blind_key)
        .map_err(|e| EngramError::Config(format!("bad blind-index key: {e}")))?;
    mac.update(name.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Derive a 32-byte key from a password with PBKDF2-HMAC-SHA256 at
/// [`PBKDF2_ITERATIONS`] iterations.
pub fn derive_key_from_password(password: &str, salt: &[u8]) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}
