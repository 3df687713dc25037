//! Parameter definitions for the device-management MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `mcp_authorize_device` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AuthorizeDeviceParams {
    /// ID of the device to authorize.
    #[schemars(description = "ID of the device to authorize")]
    pub device_id: String,

    /// The device's RSA public key, SPKI PEM.
    #[schemars(description = "The device's RSA public key (SPKI PEM)")]
    pub public_key: String,
}

/// Parameters for the `mcp_revoke_device` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RevokeDeviceParams {
    /// ID of the device to revoke.
    #[schemars(description = "ID of the device to revoke")]
    pub device_id: String,
}

/// Parameters for the `mcp_list_devices` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListDevicesParams {}
