pub mod hashing;

use crate::error::Result;

/// Number of dimensions in the embedding vectors.
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly
/// [`EMBEDDING_DIM`] dimensions (unless constructed otherwise). All methods
/// are synchronous — callers in async contexts should use
/// `tokio::task::spawn_blocking`. Implementations must tolerate concurrent
/// `embed()` calls or serialize internally; first-call lazy initialization
/// is allowed, which is what [`Embedder::is_loading`] reports.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Whether the provider is fully initialized and ready to embed.
    fn is_ready(&self) -> bool;

    /// Whether the provider is still initializing (model load in flight).
    fn is_loading(&self) -> bool;
}

/// Create an embedding provider from config.
///
/// `"hashing"` is the built-in deterministic provider; external model
/// runtimes are injected by the embedding host instead of constructed here.
pub fn create_provider(config: &crate::config::EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "hashing" => Ok(Box::new(hashing::HashingEmbedder::new(config.dimensions))),
        other => Err(crate::error::EngramError::Config(format!(
            "unknown embedding provider: {other}. Supported: hashing"
        ))),
    }
}
