//! Key lifecycle: master key in the keychain, vault key in its single-row
//! table, and the device RSA keypair stored MK-encrypted in `sync_state`.
//!
//! Hierarchy: the master key (MK) is device-local and unlocks device-scoped
//! artifacts like the RSA private key envelope; the vault key (VK) is shared
//! across a user's authorized devices and encrypts secrets and sync blobs.

use rusqlite::{params, Connection, OptionalExtension};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::crypto::rsa::{
    generate_keypair_with_bits, private_key_from_pem, private_key_to_pem, public_key_to_pem,
    DEVICE_RSA_BITS,
};
use crate::crypto::{generate_master_key, CryptoService, Envelope, KEY_SIZE};
use crate::error::{EngramError, Result};
use crate::keyvault::{KeyVault, MASTER_KEY_ENTRY};
use crate::memory::now_ms;
use crate::sync::{get_state, set_state};

const DEVICE_PRIVATE_KEY_STATE: &str = "device_private_key";
const DEVICE_PUBLIC_KEY_STATE: &str = "device_public_key";

/// Load the master key from the keychain, creating it on first use.
pub fn ensure_master_key(vault: &dyn KeyVault) -> Result<[u8; KEY_SIZE]> {
    if let Some(bytes) = vault.get(MASTER_KEY_ENTRY)? {
        let key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            EngramError::Format(format!(
                "keychain master key has {} bytes, expected {KEY_SIZE}",
                bytes.len()
            ))
        })?;
        return Ok(key);
    }

    let key = generate_master_key();
    vault.set(MASTER_KEY_ENTRY, &key)?;
    tracing::info!("generated new master key");
    Ok(key)
}

/// Load the master key without creating one.
pub fn load_master_key(vault: &dyn KeyVault) -> Result<[u8; KEY_SIZE]> {
    let bytes = vault
        .get(MASTER_KEY_ENTRY)?
        .ok_or_else(|| EngramError::NotInitialized("master key absent from keychain".into()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| EngramError::Format("keychain master key has wrong length".into()))
}

/// Persist the unwrapped vault key for this device. Overwrites on rotation.
pub fn store_vault_key(conn: &Connection, vault_key: &[u8; KEY_SIZE]) -> Result<()> {
    let now = now_ms();
    conn.execute(
        "INSERT INTO local_vault_key (id, vault_key, created_at, updated_at) \
         VALUES ('default', ?1, ?2, ?2) \
         ON CONFLICT(id) DO UPDATE SET vault_key = ?1, updated_at = ?2",
        params![vault_key.as_slice(), now],
    )?;
    Ok(())
}

/// Load the active vault key, failing with `NotInitialized` when the device
/// has not unwrapped one yet.
pub fn load_vault_key(conn: &Connection) -> Result<[u8; KEY_SIZE]> {
    let bytes: Option<Vec<u8>> = conn
        .query_row(
            "SELECT vault_key FROM local_vault_key WHERE id = 'default'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let bytes =
        bytes.ok_or_else(|| EngramError::NotInitialized("vault key absent on device".into()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| EngramError::Format("stored vault key has wrong length".into()))
}

/// Load the active vault key, or generate and persist a fresh one (first
/// device in a vault bootstraps it).
pub fn ensure_vault_key(conn: &Connection) -> Result<[u8; KEY_SIZE]> {
    match load_vault_key(conn) {
        Ok(key) => Ok(key),
        Err(EngramError::NotInitialized(_)) => {
            let key = generate_master_key();
            store_vault_key(conn, &key)?;
            tracing::info!("bootstrapped new vault key");
            Ok(key)
        }
        Err(e) => Err(e),
    }
}

/// Derive the blind-index key from the vault key, so every authorized
/// device computes identical lookup ids.
pub fn derive_blind_index_key(vault_key: &[u8; KEY_SIZE]) -> Vec<u8> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(vault_key).expect("HMAC accepts 32-byte keys");
    mac.update(b"engram-blind-index");
    mac.finalize().into_bytes().to_vec()
}

/// This device's RSA keypair: public PEM plus the parsed private key.
pub struct DeviceKeys {
    pub public_pem: String,
    pub private: RsaPrivateKey,
}

/// Load the device keypair, generating one on first use. The private key is
/// persisted as an MK-encrypted PKCS#8 envelope in `sync_state`.
pub fn ensure_device_keys(conn: &Connection, master: &CryptoService) -> Result<DeviceKeys> {
    ensure_device_keys_with_bits(conn, master, DEVICE_RSA_BITS)
}

pub(crate) fn ensure_device_keys_with_bits(
    conn: &Connection,
    master: &CryptoService,
    bits: usize,
) -> Result<DeviceKeys> {
    if let (Some(blob), Some(public_pem)) = (
        get_state(conn, DEVICE_PRIVATE_KEY_STATE)?,
        get_state(conn, DEVICE_PUBLIC_KEY_STATE)?,
    ) {
        let private_pem = master.decrypt(&Envelope::from_blob(&blob)?)?;
        let private = private_key_from_pem(&private_pem)?;
        return Ok(DeviceKeys {
            public_pem,
            private,
        });
    }

    tracing::info!(bits, "generating device RSA keypair");
    let (private, public): (RsaPrivateKey, RsaPublicKey) = generate_keypair_with_bits(bits)?;
    let public_pem = public_key_to_pem(&public)?;
    let private_pem = private_key_to_pem(&private)?;

    let envelope = master.encrypt(&private_pem)?;
    set_state(conn, DEVICE_PRIVATE_KEY_STATE, &envelope.to_blob())?;
    set_state(conn, DEVICE_PUBLIC_KEY_STATE, &public_pem)?;

    Ok(DeviceKeys {
        public_pem,
        private,
    })
}
