use async_trait::async_trait;

use emb_model::TaskKey;

use crate::error::ApiError;

/// Backend of `POST /embedding`.
///
/// [`crate::DispatcherAdapter`] is the stock implementation; tests and embedders
/// can provide their own.
#[async_trait]
pub trait EmbeddingHandler: Send + Sync + 'static {
    /// Compute the embedding of `image` under `key` and return the serialized artifact.
    async fn embed(&self, key: TaskKey, image: Vec<u8>) -> Result<Vec<u8>, ApiError>;
}
