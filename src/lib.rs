//! Multilingual extractive question answering over an exact-search vector
//! index.
//!
//! The build phase embeds a normalized QA corpus into a [`index::FlatIndex`]
//! and writes a metadata store whose row `i` describes index row `i`. The query
//! phase embeds a question, searches the index, joins rows back to documents
//! and extracts a stored answer, optionally translated.

pub mod answer;
pub mod builder;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
pub mod metadata;
pub mod providers;
pub mod retriever;
pub mod storage;
pub mod translate;
pub mod vector_ops;

pub use answer::{select_answer, ANSWER_NOT_FOUND};
pub use builder::{BuiltIndex, IndexBuilder};
pub use config::Settings;
pub use document::{AnswerRepresentation, Document};
pub use embedding::{Embedder, EmbeddingError};
pub use error::{Error, Result};
pub use index::{FlatIndex, NearestNeighbors, Neighbor};
pub use retriever::{Answer, RetrievedDocument, Retriever};
pub use translate::{Translation, TranslationError, Translator};
