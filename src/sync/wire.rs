//! Wire types for the remote sync backend. All JSON is camelCase; encrypted
//! payloads are opaque to the server.

use serde::{Deserialize, Serialize};

/// `POST /api/sync/push` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBlobRequest {
    pub encrypted_data: String,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blind_id: Option<String>,
}

/// `POST /api/sync/push` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBlobResponse {
    pub blob_id: String,
}

/// One replicated journal entry as served by `GET /api/sync/pull`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncEvent {
    pub id: String,
    pub event_type: String,
    pub memory_id: String,
    #[serde(default)]
    pub blob_id: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    pub timestamp: i64,
    pub sequence_num: i64,
}

/// A blob attachment: small payloads arrive inline as base64 `data`, larger
/// ones as a signed `url` the engine fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBlob {
    pub blob_id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// `GET /api/sync/pull` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub events: Vec<RemoteSyncEvent>,
    #[serde(default)]
    pub blobs: Vec<RemoteBlob>,
    pub cursor: i64,
    pub has_more: bool,
}

/// `POST /api/secrets/push` request body. DELETE events carry no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretPushRequest {
    pub secret_id: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub blind_id: String,
}

/// One replicated secret event as served by `GET /api/secrets/pull`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSecretEvent {
    pub secret_id: String,
    pub event_type: String,
    #[serde(default)]
    pub encrypted_data: Option<String>,
    #[serde(default)]
    pub iv: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub blind_id: Option<String>,
    pub sequence_num: i64,
}

/// `GET /api/secrets/pull` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretPullResponse {
    pub events: Vec<RemoteSecretEvent>,
    pub cursor: i64,
    pub has_more: bool,
}

/// A registered device as served by `GET /api/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// RSA public key, SPKI PEM.
    pub public_key: String,
    pub created_at: i64,
    #[serde(default)]
    pub last_sync_at: Option<i64>,
}

/// `POST /api/devices/authorize` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeDeviceRequest {
    pub device_id: String,
    /// Vault key wrapped with the device's public key, base64.
    pub encrypted_vault_key: String,
}

/// `POST /api/devices/link` request body (link-code flow).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDeviceRequest {
    pub code: String,
    pub device_id: String,
    pub public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_request_serializes_camel_case() {
        let req = PushBlobRequest {
            encrypted_data: "iv:ct.tag".into(),
            checksum: "abc".into(),
            blind_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["encryptedData"], "iv:ct.tag");
        assert!(json.get("blindId").is_none());
    }

    #[test]
    fn pull_response_tolerates_missing_blob_fields() {
        let json = r#"{
            "events": [{"id":"e1","eventType":"ADD","memoryId":"m1","blobId":"b1","checksum":"c","timestamp":1,"sequenceNum":1}],
            "blobs": [{"blobId":"b1","url":"https://signed.example/b1"}],
            "cursor": 1,
            "hasMore": false
        }"#;
        let parsed: PullResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].blob_id.as_deref(), Some("b1"));
        assert!(parsed.blobs[0].data.is_none());
        assert!(!parsed.has_more);
    }

    #[test]
    fn secret_push_omits_null_payload_fields() {
        let req = SecretPushRequest {
            secret_id: "s1".into(),
            event_type: "DELETE".into(),
            encrypted_data: None,
            iv: None,
            checksum: None,
            blind_id: "deadbeef".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("encryptedData"));
        assert!(json.contains("\"eventType\":\"DELETE\""));
    }
}
