//! Device authorization over the remote backend.
//!
//! Authorizing a device wraps the vault key under the device's RSA public
//! key so the server only ever relays an opaque envelope. These operations
//! ride on the memory engine's client and connection state.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::crypto::rsa::{public_key_from_pem, wrap_key};
use crate::crypto::KEY_SIZE;
use crate::error::Result;
use crate::sync::memory::{check_status, MemorySyncEngine};
use crate::sync::wire::{AuthorizeDeviceRequest, DeviceInfo, LinkDeviceRequest};

impl MemorySyncEngine {
    /// Wrap the vault key under `device_public_key_pem` and register the
    /// envelope with the backend.
    pub async fn authorize_device(
        &self,
        device_id: &str,
        device_public_key_pem: &str,
        vault_key: &[u8; KEY_SIZE],
    ) -> Result<()> {
        self.ensure_connected()?;

        let public_key = public_key_from_pem(device_public_key_pem)?;
        let wrapped = wrap_key(&public_key, vault_key)?;

        let request = AuthorizeDeviceRequest {
            device_id: device_id.to_string(),
            encrypted_vault_key: BASE64.encode(wrapped),
        };
        let response = self
            .client()
            .post(self.url("/api/devices/authorize"))
            .json(&request)
            .send()
            .await?;
        check_status(response)?;

        tracing::info!(device_id, "device authorized");
        Ok(())
    }

    /// Revoke a previously authorized device.
    pub async fn revoke_device(&self, device_id: &str) -> Result<()> {
        self.ensure_connected()?;

        let response = self
            .client()
            .post(self.url(&format!("/api/devices/{device_id}/revoke")))
            .send()
            .await?;
        check_status(response)?;

        tracing::info!(device_id, "device revoked");
        Ok(())
    }

    /// List this user's registered devices.
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.ensure_connected()?;

        let response = self
            .client()
            .get(self.url("/api/devices"))
            .send()
            .await?;
        let response = check_status(response)?;
        Ok(response.json().await?)
    }

    /// Complete a link-code enrollment for this device.
    pub async fn link_device(
        &self,
        code: &str,
        device_id: &str,
        device_public_key_pem: &str,
    ) -> Result<()> {
        self.ensure_connected()?;

        let request = LinkDeviceRequest {
            code: code.to_string(),
            device_id: device_id.to_string(),
            public_key: device_public_key_pem.to_string(),
        };
        let response = self
            .client()
            .post(self.url("/api/devices/link"))
            .json(&request)
            .send()
            .await?;
        check_status(response)?;

        tracing::info!(device_id, "device linked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::crypto::generate_master_key;
    use crate::db;
    use crate::error::EngramError;

    #[tokio::test]
    async fn device_operations_require_connect() {
        let conn = db::open_memory_database().unwrap();
        let engine = MemorySyncEngine::new("https://sync.example", Arc::new(Mutex::new(conn)));

        let vault_key = generate_master_key();
        assert!(matches!(
            engine.authorize_device("dev-1", "pem", &vault_key).await,
            Err(EngramError::Config(_))
        ));
        assert!(matches!(
            engine.revoke_device("dev-1").await,
            Err(EngramError::Config(_))
        ));
        assert!(matches!(
            engine.list_devices().await,
            Err(EngramError::Config(_))
        ));
    }

    #[tokio::test]
    async fn authorize_rejects_garbage_pem_before_any_network_io() {
        let conn = db::open_memory_database().unwrap();
        let engine = MemorySyncEngine::new("https://sync.example", Arc::new(Mutex::new(conn)));
        engine.connect();

        let vault_key = generate_master_key();
        assert!(matches!(
            engine
                .authorize_device("dev-1", "not a pem", &vault_key)
                .await,
            Err(EngramError::Format(_))
        ));
    }
}
