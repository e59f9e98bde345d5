//! Query phase: embed, search, and join search rows back to documents.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::answer::{select_answer, ANSWER_NOT_FOUND};
use crate::config::{Number, Settings};
use crate::document::Document;
use crate::embedding::{embed_query, Embedder};
use crate::error::{Error, Result};
use crate::index::{FlatIndex, NearestNeighbors};
use crate::metadata;
use crate::translate::{translate_all, Translation, Translator};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub document: Document,
    /// Squared Euclidean distance to the query embedding.
    pub distance: Number,
    pub row: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    /// The document the answer was taken from, if anything was retrieved.
    pub source: Option<RetrievedDocument>,
    pub translations: Vec<Translation>,
}

/// Read-only view over one loaded index/metadata pair. Shared by reference
/// across concurrent queries.
pub struct Retriever<I: NearestNeighbors = FlatIndex> {
    index: I,
    metadata: Vec<Document>,
    embedder: Arc<dyn Embedder>,
    translator: Option<Arc<dyn Translator>>,
    settings: Settings,
}

impl Retriever<FlatIndex> {
    /// Loads the persisted pair named by `settings`. When the index records
    /// a metadata digest, the metadata file must match it byte for byte.
    pub fn open(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let start = Instant::now();
        let (index, expected_digest) = FlatIndex::load_paired(&settings.index_path)?;
        let (metadata, digest) = metadata::load_with_digest(&settings.metadata_path)?;
        match expected_digest {
            Some(expected) if expected != digest => {
                return Err(Error::CorruptState(format!(
                    "metadata at '{}' was not published with the index at '{}'",
                    settings.metadata_path.display(),
                    settings.index_path.display()
                )))
            }
            Some(_) => {}
            None => warn!(
                "Index at '{}' carries no metadata digest; only row counts are checked",
                settings.index_path.display()
            ),
        }
        debug!("Loaded index and metadata in {:?}", start.elapsed());
        Self::new(index, metadata, embedder, settings)
    }
}

impl<I: NearestNeighbors> Retriever<I> {
    pub fn new(
        index: I,
        metadata: Vec<Document>,
        embedder: Arc<dyn Embedder>,
        settings: Settings,
    ) -> Result<Self> {
        if index.count() != metadata.len() {
            return Err(Error::CorruptState(format!(
                "index holds {} vectors but metadata holds {} documents",
                index.count(),
                metadata.len()
            )));
        }
        Ok(Self {
            index,
            metadata,
            embedder,
            translator: None,
            settings,
        })
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The `k` documents nearest to `query`, nearest first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let embedding = embed_query(self.embedder.as_ref(), query, self.settings.embed_timeout).await?;
        let neighbors = self.index.search(&embedding, k)?;
        debug!("Query matched {} of {} rows", neighbors.len(), self.index.count());

        neighbors
            .into_iter()
            .map(|neighbor| {
                let document = self.metadata.get(neighbor.row).ok_or_else(|| {
                    Error::CorruptState(format!(
                        "row {} has no metadata (metadata holds {} documents)",
                        neighbor.row,
                        self.metadata.len()
                    ))
                })?;
                Ok(RetrievedDocument {
                    document: document.clone(),
                    distance: neighbor.distance,
                    row: neighbor.row,
                })
            })
            .collect()
    }

    /// Extractive answer from the nearest document, translated into each of
    /// `languages` when a translator is attached.
    pub async fn answer(&self, query: &str, languages: &[String]) -> Result<Answer> {
        let source = self
            .retrieve(query, self.settings.top_k)
            .await?
            .into_iter()
            .next();
        let answer = match &source {
            Some(retrieved) => select_answer(&retrieved.document),
            None => ANSWER_NOT_FOUND.to_string(),
        };

        let translations = match &self.translator {
            Some(translator) if !languages.is_empty() => {
                translate_all(
                    translator.as_ref(),
                    &answer,
                    languages,
                    self.settings.translate_timeout,
                )
                .await
            }
            _ => Vec::new(),
        };

        Ok(Answer {
            query: query.to_string(),
            answer,
            source,
            translations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AnswerRepresentation;
    use crate::embedding::EmbeddingError;
    use crate::index::Neighbor;
    use crate::translate::TranslationError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct TableEmbedder(HashMap<String, Vec<Number>>);

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed(&self, text: &str) -> std::result::Result<Vec<Number>, EmbeddingError> {
            self.0
                .get(text)
                .cloned()
                .ok_or_else(|| EmbeddingError::Backend(format!("unknown text '{}'", text)))
        }
    }

    /// Index that reports a row the metadata does not have.
    struct DanglingIndex;

    impl NearestNeighbors for DanglingIndex {
        fn dimensions(&self) -> Option<usize> {
            Some(1)
        }

        fn count(&self) -> usize {
            1
        }

        fn search(&self, _query: &[Number], _k: usize) -> Result<Vec<Neighbor>> {
            Ok(vec![Neighbor {
                distance: 0.0,
                row: 7,
            }])
        }
    }

    struct FrenchOnly;

    #[async_trait]
    impl Translator for FrenchOnly {
        async fn translate(
            &self,
            text: &str,
            language: &str,
        ) -> std::result::Result<String, TranslationError> {
            match language {
                "fr" => Ok(format!("{} (fr)", text)),
                other => Err(TranslationError::UnsupportedLanguage(other.to_string())),
            }
        }
    }

    fn doc(context: &str, answers: AnswerRepresentation) -> Document {
        Document {
            context: context.to_string(),
            question: format!("q {}", context),
            answers,
            language: None,
        }
    }

    fn list(items: &[&str]) -> AnswerRepresentation {
        AnswerRepresentation::List(items.iter().map(|s| s.to_string()).collect())
    }

    /// Documents at Euclidean distance 0.9, 0.1 and 0.5 from the query
    /// "capital", inserted in that order.
    fn scenario() -> Retriever {
        let embedder = TableEmbedder(HashMap::from([
            ("capital".to_string(), vec![0.0, 0.0]),
            ("far".to_string(), vec![9.0, 9.0]),
        ]));
        let index = FlatIndex::build(&[vec![0.9, 0.0], vec![0.0, 0.1], vec![0.5, 0.0]]).unwrap();
        let metadata = vec![
            doc("far away", list(&["Lyon"])),
            doc("nearest", list(&["Paris"])),
            doc("middle", list(&["Marseille"])),
        ];
        Retriever::new(index, metadata, Arc::new(embedder), Settings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_two_nearest_in_ascending_order() {
        let results = scenario().retrieve("capital", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].row, 1);
        assert_eq!(results[0].document.context, "nearest");
        assert!((results[0].distance - 0.01).abs() < 1e-6);
        assert_eq!(results[1].row, 2);
        assert_eq!(results[1].document.context, "middle");
        assert!((results[1].distance - 0.25).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_k_larger_than_corpus() {
        let results = scenario().retrieve("capital", 10).await.unwrap();
        let rows: Vec<usize> = results.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![1, 2, 0]);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_fatal() {
        let err = scenario().retrieve("unknown", 2).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(EmbeddingError::Backend(_))));
    }

    #[test]
    fn test_count_mismatch_refused() {
        let index = FlatIndex::build(&[vec![0.0], vec![1.0]]).unwrap();
        let result = Retriever::new(
            index,
            vec![doc("only", list(&[]))],
            Arc::new(TableEmbedder(HashMap::new())),
            Settings::default(),
        );
        assert!(matches!(result, Err(Error::CorruptState(_))));
    }

    #[tokio::test]
    async fn test_dangling_row_is_corrupt_state() {
        let embedder = TableEmbedder(HashMap::from([("q".to_string(), vec![0.0])]));
        let retriever = Retriever::new(
            DanglingIndex,
            vec![doc("only", list(&["x"]))],
            Arc::new(embedder),
            Settings::default(),
        )
        .unwrap();
        assert!(matches!(
            retriever.retrieve("q", 1).await,
            Err(Error::CorruptState(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_with_translations() {
        let retriever = scenario().with_translator(Arc::new(FrenchOnly));
        let languages = vec!["fr".to_string(), "xx".to_string()];

        let answer = retriever.answer("capital", &languages).await.unwrap();

        assert_eq!(answer.answer, "Paris");
        assert_eq!(answer.source.unwrap().row, 1);
        assert_eq!(answer.translations[0].text, "Paris (fr)");
        assert_eq!(answer.translations[1].text, "Paris");
        assert!(answer.translations[1].is_degraded());
    }

    #[tokio::test]
    async fn test_answer_without_translator() {
        let answer = scenario().answer("capital", &["fr".to_string()]).await.unwrap();
        assert_eq!(answer.answer, "Paris");
        assert!(answer.translations.is_empty());
    }

    #[tokio::test]
    async fn test_answer_sentinel_when_nearest_has_no_answer() {
        let embedder = TableEmbedder(HashMap::from([("q".to_string(), vec![0.0])]));
        let retriever = Retriever::new(
            FlatIndex::build(&[vec![0.0]]).unwrap(),
            vec![doc(
                "ctx",
                AnswerRepresentation::Keyed {
                    text: vec![],
                    answer_start: None,
                },
            )],
            Arc::new(embedder),
            Settings::default(),
        )
        .unwrap();

        let answer = retriever.answer("q", &[]).await.unwrap();
        assert_eq!(answer.answer, ANSWER_NOT_FOUND);
    }
}
