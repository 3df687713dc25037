//! Parameter definitions for the secrets and recovery MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `mcp_get_secret` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetSecretParams {
    /// Case-sensitive secret name.
    #[schemars(description = "Name of the secret, e.g. OPENAI_API_KEY")]
    pub key: String,
}

/// Parameters for the `mcp_set_secret` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SetSecretParams {
    /// Case-sensitive secret name.
    #[schemars(description = "Name of the secret, e.g. OPENAI_API_KEY")]
    pub key: String,

    /// The secret value. Encrypted with the vault key before storage.
    #[schemars(description = "The secret value to store")]
    pub value: String,

    /// Optional human-readable description.
    #[schemars(description = "Optional description of what this secret is for")]
    pub description: Option<String>,
}

/// Parameters for the `mcp_create_recovery_kit` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateRecoveryKitParams {
    /// Total number of shares to generate. Defaults to 5.
    #[schemars(description = "Total number of shares to generate (default 5)")]
    pub shares: Option<u8>,

    /// Shares required to recover. Defaults to 3.
    #[schemars(description = "Number of shares required to recover (default 3)")]
    pub threshold: Option<u8>,
}
