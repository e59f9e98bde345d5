//! Best-effort translation of answers.
//!
//! Backends report failure through [`TranslationError`]; the helpers here
//! always fall back to the untranslated text and never fail.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("translation timed out after {0:?}")]
    Timeout(Duration),

    #[error("translation service error: {0}")]
    Service(String),

    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, language: &str) -> Result<String, TranslationError>;
}

/// The text rendered for one language. `failure` is set when the original
/// text was returned because translation failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub language: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Translation {
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

pub async fn translate_or_original(
    translator: &dyn Translator,
    text: &str,
    language: &str,
    limit: Duration,
) -> Translation {
    let outcome = match tokio::time::timeout(limit, translator.translate(text, language)).await {
        Ok(result) => result,
        Err(_) => Err(TranslationError::Timeout(limit)),
    };

    match outcome {
        Ok(translated) => {
            debug!("Translated answer into '{}'", language);
            Translation {
                language: language.to_string(),
                text: translated,
                failure: None,
            }
        }
        Err(err) => {
            warn!("Translation into '{}' failed, keeping original: {}", language, err);
            Translation {
                language: language.to_string(),
                text: text.to_string(),
                failure: Some(err.to_string()),
            }
        }
    }
}

/// Translates `text` into every language concurrently; output follows the
/// order of `languages`.
pub async fn translate_all(
    translator: &dyn Translator,
    text: &str,
    languages: &[String],
    limit: Duration,
) -> Vec<Translation> {
    join_all(
        languages
            .iter()
            .map(|language| translate_or_original(translator, text, language, limit)),
    )
    .await
}
