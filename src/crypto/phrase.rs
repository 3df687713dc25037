//! BIP39 recovery phrase: 24 English words ↔ 256-bit key.

use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{EngramError, Result};

use super::KEY_SIZE;

/// Generate a fresh 24-word recovery phrase from 32 random bytes.
pub fn generate_recovery_phrase() -> Result<String> {
    let mut entropy = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut entropy);
    key_to_phrase(&entropy)
}

/// Encode a 32-byte key as its 24-word mnemonic.
pub fn key_to_phrase(key: &[u8; KEY_SIZE]) -> Result<String> {
    let mnemonic = Mnemonic::from_entropy(key)
        .map_err(|e| EngramError::Format(format!("invalid key entropy: {e}")))?;
    Ok(mnemonic.to_string())
}

/// Decode a 24-word mnemonic back into its 32-byte key.
///
/// Rejects unknown words, bad checksums, and phrases of any other length.
pub fn phrase_to_key(phrase: &str) -> Result<[u8; KEY_SIZE]> {
    let mnemonic = Mnemonic::parse_normalized(phrase)
        .map_err(|e| EngramError::Format(format!("invalid recovery phrase: {e}")))?;
    let entropy = mnemonic.to_entropy();
    let key: [u8; KEY_SIZE] = entropy.as_slice().try_into().map_err(|_| {
        EngramError::Format(format!(
            "phrase encodes {} bytes of entropy, expected {KEY_SIZE}",
            entropy.len()
        ))
    })?;
    Ok(key)
}
