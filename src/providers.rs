//! HTTP adapters for the embedding and translation capabilities.
//!
//! `OllamaEmbedder` talks to an Ollama-compatible `/api/embed` endpoint and
//! `LibreTranslator` to a LibreTranslate-compatible `/translate` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Number, Settings};
use crate::embedding::{Embedder, EmbeddingError};
use crate::translate::{TranslationError, Translator};

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.embedding_url, &settings.embedding_model)
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<Number>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<Number>, EmbeddingError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                requested: 1,
                returned: 0,
            })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Number>>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Backend(format!("{}: {}", status, body)));
        }

        let parsed = response
            .json::<EmbedResponse>()
            .await
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;
        Ok(parsed.embeddings)
    }
}

#[derive(Debug, Clone)]
pub struct LibreTranslator {
    base_url: String,
    http_client: reqwest::Client,
}

impl LibreTranslator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.translator_url)
    }
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Deserialize)]
struct TranslateErrorBody {
    error: String,
}

#[async_trait]
impl Translator for LibreTranslator {
    async fn translate(&self, text: &str, language: &str) -> Result<String, TranslationError> {
        let url = format!("{}/translate", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&TranslateRequest {
                q: text,
                source: "auto",
                target: language,
                format: "text",
            })
            .send()
            .await
            .map_err(|e| TranslationError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TranslateErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            // LibreTranslate answers 400 for a target it does not know.
            if status == reqwest::StatusCode::BAD_REQUEST && message.contains("not supported") {
                return Err(TranslationError::UnsupportedLanguage(language.to_string()));
            }
            return Err(TranslationError::Service(format!("{}: {}", status, message)));
        }

        response
            .json::<TranslateResponse>()
            .await
            .map(|r| r.translated_text)
            .map_err(|e| TranslationError::Service(e.to_string()))
    }
}
