//! Parameter definitions for the memory-facing MCP tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `mcp_save_memory` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SaveMemoryParams {
    /// The fact to remember. Credentials are redacted before storage.
    #[schemars(description = "The fact or note to remember")]
    pub content: String,

    /// Optional tags for the memory.
    #[schemars(description = "Optional tags, e.g. [\"programming\", \"rust\"]")]
    pub tags: Option<Vec<String>>,
}

/// Parameters for the `mcp_read_memory` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadMemoryParams {
    /// Natural language query.
    #[schemars(description = "Natural language query to search memories with")]
    pub query: String,

    /// Maximum number of results. Defaults to 5.
    #[schemars(description = "Maximum number of results (default 5)")]
    pub limit: Option<usize>,
}

/// Parameters for the `mcp_delete_memory` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteMemoryParams {
    /// ID of the memory to delete.
    #[schemars(description = "ID of the memory to delete")]
    pub memory_id: String,
}

/// Parameters for the `mcp_list_memories` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListMemoriesParams {
    /// Maximum number of memories to list. Defaults to 10.
    #[schemars(description = "Maximum number of memories to list (default 10)")]
    pub limit: Option<usize>,

    /// Filter to memories with this exact source path.
    #[schemars(description = "Filter to memories with this exact source path")]
    pub source: Option<String>,
}

/// Parameters for the `mcp_memory_status` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryStatusParams {}

/// Parameters for the `mcp_find_similar_sessions` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FindSimilarSessionsParams {
    /// What you are about to work on.
    #[schemars(description = "Description of the work you are about to do")]
    pub intent: String,

    /// Maximum number of sessions. Defaults to 3.
    #[schemars(description = "Maximum number of sessions to return (default 3)")]
    pub limit: Option<usize>,
}
