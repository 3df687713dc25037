//! RSA-4096 OAEP-SHA256 key wrapping for device authorization.
//!
//! Each device holds a 4096-bit keypair. Authorizing a device wraps the
//! vault key under the device's public key (SPKI PEM); the device unwraps
//! it with its private key (PKCS#8 PEM, stored encrypted under the master
//! key).

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{EngramError, Result};

/// Modulus size for device keypairs.
pub const DEVICE_RSA_BITS: usize = 4096;

/// Generate a device keypair at the default modulus size. Expensive; called
/// once per device.
pub fn generate_keypair() -> Result<(RsaPrivateKey, RsaPublicKey)> {
    generate_keypair_with_bits(DEVICE_RSA_BITS)
}

pub(crate) fn generate_keypair_with_bits(bits: usize) -> Result<(RsaPrivateKey, RsaPublicKey)> {
    let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|e| EngramError::Auth(format!("RSA keygen failed: {e}")))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

/// Export a public key as SPKI PEM (the wire format for device records).
pub fn public_key_to_pem(public: &RsaPublicKey) -> Result<String> {
    public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| EngramError::Format(format!("public key encode failed: {e}")))
}

/// Parse an SPKI PEM public key.
pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| EngramError::Format(format!("invalid public key PEM: {e}")))
}

/// Export a private key as PKCS#8 PEM. Callers encrypt the result before
/// persisting it.
pub fn private_key_to_pem(private: &RsaPrivateKey) -> Result<String> {
    private
        .to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| EngramError::Format(format!("private key encode failed: {e}")))
}

/// Parse a PKCS#8 PEM private key.
pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|e| EngramError::Format(format!("invalid private key PEM: {e}")))
}

/// Wrap key material under a device public key with OAEP-SHA256.
pub fn wrap_key(public: &RsaPublicKey, key: &[u8]) -> Result<Vec<u8>> {
    public
        .encrypt(&mut rand::rngs::OsRng, Oaep::new::<Sha256>(), key)
        .map_err(|e| EngramError::Auth(format!("key wrap failed: {e}")))
}

/// Unwrap key material with the device private key. A wrong key or a
/// tampered blob fails with [`EngramError::Auth`].
pub fn unwrap_key(private: &RsaPrivateKey, wrapped: &[u8]) -> Result<Vec<u8>> {
    private
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| EngramError::Auth("OAEP unwrap failed".into()))
}
