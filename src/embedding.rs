//! Capability boundary to the embedding model.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Number;
use crate::error::{Error, Result};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding backend error: {0}")]
    Backend(String),

    /// A batch call returned a different number of vectors than inputs.
    #[error("Embedding backend returned {returned} vectors for {requested} inputs")]
    CountMismatch { requested: usize, returned: usize },
}

/// Maps text to a fixed-dimension vector. Every call against one index must
/// produce the same dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<Number>, EmbeddingError>;

    /// Output order matches `texts`. The default embeds one text at a time;
    /// backends with native batching should override it.
    async fn embed_batch(
        &self,
        texts: &[&str],
    ) -> std::result::Result<Vec<Vec<Number>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Embeds a single query, giving up after `limit`.
pub async fn embed_query(embedder: &dyn Embedder, text: &str, limit: Duration) -> Result<Vec<Number>> {
    tokio::time::timeout(limit, embedder.embed(text))
        .await
        .map_err(|_| Error::Timeout {
            operation: "query embedding",
            after: limit,
        })?
        .map_err(Error::from)
}

/// Embeds `texts` in consecutive batches of at most `batch_size`, each bounded
/// by `limit`. The result is in input order whatever the batch boundaries.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[&str],
    batch_size: usize,
    limit: Duration,
) -> Result<Vec<Vec<Number>>> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for (batch_number, batch) in texts.chunks(batch_size).enumerate() {
        let embedded = tokio::time::timeout(limit, embedder.embed_batch(batch))
            .await
            .map_err(|_| Error::Timeout {
                operation: "batch embedding",
                after: limit,
            })??;
        if embedded.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                requested: batch.len(),
                returned: embedded.len(),
            }
            .into());
        }
        debug!(
            "Embedded batch {} ({} texts, {} total)",
            batch_number,
            batch.len(),
            vectors.len() + embedded.len()
        );
        vectors.extend(embedded);
    }

    Ok(vectors)
}
