//! Offline build phase: documents in, aligned index and metadata out.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::Settings;
use crate::document::{read_documents, Document};
use crate::embedding::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::index::{FlatIndex, NearestNeighbors};
use crate::metadata;

/// An index and the documents for its rows, in row order.
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: FlatIndex,
    pub metadata: Vec<Document>,
}

impl BuiltIndex {
    /// Writes metadata, then the index, each through a staging file and a
    /// rename. The index header records the digest of the metadata bytes, so
    /// a reader that finds new metadata next to an older index (between the
    /// renames, or after the index write failed) refuses the pair.
    pub fn publish(&self, settings: &Settings) -> Result<()> {
        let digest = metadata::save(&settings.metadata_path, &self.metadata)?;
        self.index.persist_paired(&settings.index_path, digest)?;
        info!(
            "Published {} vectors to {} and metadata to {}",
            self.index.count(),
            settings.index_path.display(),
            settings.metadata_path.display()
        );
        Ok(())
    }
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    settings: Settings,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, settings: Settings) -> Self {
        Self { embedder, settings }
    }

    /// Embeds each document's context and indexes it at the document's
    /// position.
    pub async fn build(&self, documents: Vec<Document>) -> Result<BuiltIndex> {
        if documents.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let start = Instant::now();
        let texts: Vec<&str> = documents.iter().map(|d| d.context.as_str()).collect();
        let vectors = embed_in_batches(
            self.embedder.as_ref(),
            &texts,
            self.settings.batch_size,
            self.settings.embed_timeout,
        )
        .await?;

        let mut index = match self.settings.dimensions {
            Some(dimensions) => FlatIndex::with_dimensions(dimensions)?,
            None => FlatIndex::new(),
        };
        index.add_batch(&vectors)?;

        if index.count() != documents.len() {
            return Err(Error::CorruptState(format!(
                "built {} vectors for {} documents",
                index.count(),
                documents.len()
            )));
        }

        info!(
            "Indexed {} documents (dimension {:?}) in {:?}",
            documents.len(),
            index.dimensions(),
            start.elapsed()
        );
        Ok(BuiltIndex {
            index,
            metadata: documents,
        })
    }

    /// Builds from the normalized corpus at `settings.documents_path`.
    pub async fn build_from_corpus(&self) -> Result<BuiltIndex> {
        let documents = read_documents(&self.settings.documents_path)?;
        info!(
            "Loaded {} documents from {}",
            documents.len(),
            self.settings.documents_path.display()
        );
        self.build(documents).await
    }
}
