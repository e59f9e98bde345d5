use anyhow::{Context, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;

pub type Number = f32;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_LANGUAGES: &str = "en,hi,kn,ml";

/// Raw values as they come out of the config file and environment.
pub struct PolyqaConfig {
    pub index_path: Option<String>,
    pub metadata_path: Option<String>,
    pub documents_path: Option<String>,
    pub dimensions: Option<usize>,
    pub top_k: Option<usize>,
    pub batch_size: Option<usize>,
    pub languages: Option<String>,
    pub embed_timeout_secs: Option<u64>,
    pub translate_timeout_secs: Option<u64>,
    pub embedding_url: Option<String>,
    pub embedding_model: Option<String>,
    pub translator_url: Option<String>,
}

impl PolyqaConfig {
    pub fn try_from(config: &Config) -> Result<Self, ConfigError> {
        Ok(PolyqaConfig {
            index_path: optional(config, "index_path")?,
            metadata_path: optional(config, "metadata_path")?,
            documents_path: optional(config, "documents_path")?,
            dimensions: optional(config, "dimensions")?,
            top_k: optional(config, "top_k")?,
            batch_size: optional(config, "batch_size")?,
            languages: optional(config, "languages")?,
            embed_timeout_secs: optional(config, "embed_timeout_secs")?,
            translate_timeout_secs: optional(config, "translate_timeout_secs")?,
            embedding_url: optional(config, "embedding_url")?,
            embedding_model: optional(config, "embedding_model")?,
            translator_url: optional(config, "translator_url")?,
        })
    }
}

// A missing key falls back to the default; a key with the wrong type is an error.
fn optional<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>, ConfigError> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Paths and knobs handed to every component at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    pub index_path: PathBuf,
    pub metadata_path: PathBuf,
    pub documents_path: PathBuf,
    /// Expected embedding dimension. When set, the build phase rejects an
    /// embedder that produces anything else.
    pub dimensions: Option<usize>,
    pub top_k: usize,
    pub batch_size: usize,
    pub languages: Vec<String>,
    pub embed_timeout: Duration,
    pub translate_timeout: Duration,
    pub embedding_url: String,
    pub embedding_model: String,
    pub translator_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("data/index/vectors.pqix"),
            metadata_path: PathBuf::from("data/index/metadata.json"),
            documents_path: PathBuf::from("data/processed/documents.jsonl"),
            dimensions: None,
            top_k: DEFAULT_TOP_K,
            batch_size: DEFAULT_BATCH_SIZE,
            languages: parse_languages(DEFAULT_LANGUAGES),
            embed_timeout: Duration::from_secs(30),
            translate_timeout: Duration::from_secs(10),
            embedding_url: "http://localhost:11434".to_string(),
            embedding_model: "paraphrase-multilingual-minilm".to_string(),
            translator_url: "http://localhost:5000".to_string(),
        }
    }
}

impl Settings {
    /// Reads `polyqa_config.*` from the working directory (optional), then
    /// `POLYQA_*` environment variables on top.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(ConfigFile::with_name("polyqa_config").required(false))
            .add_source(Environment::with_prefix("POLYQA").try_parsing(true))
            .build()
            .context("Failed to read polyqa configuration")?;

        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let raw = PolyqaConfig::try_from(config).context("Invalid polyqa configuration")?;
        let defaults = Settings::default();

        let settings = Self {
            index_path: raw.index_path.map(PathBuf::from).unwrap_or(defaults.index_path),
            metadata_path: raw
                .metadata_path
                .map(PathBuf::from)
                .unwrap_or(defaults.metadata_path),
            documents_path: raw
                .documents_path
                .map(PathBuf::from)
                .unwrap_or(defaults.documents_path),
            dimensions: raw.dimensions,
            top_k: raw.top_k.unwrap_or(defaults.top_k),
            batch_size: raw.batch_size.unwrap_or(defaults.batch_size),
            languages: raw
                .languages
                .as_deref()
                .map(parse_languages)
                .unwrap_or(defaults.languages),
            embed_timeout: raw
                .embed_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.embed_timeout),
            translate_timeout: raw
                .translate_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.translate_timeout),
            embedding_url: raw.embedding_url.unwrap_or(defaults.embedding_url),
            embedding_model: raw.embedding_model.unwrap_or(defaults.embedding_model),
            translator_url: raw.translator_url.unwrap_or(defaults.translator_url),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            anyhow::bail!("POLYQA_TOP_K must be at least 1.");
        }
        if self.batch_size == 0 {
            anyhow::bail!("POLYQA_BATCH_SIZE must be at least 1.");
        }
        if self.dimensions == Some(0) {
            anyhow::bail!("POLYQA_DIMENSIONS must be at least 1 when set.");
        }
        Ok(())
    }

    pub fn print_config(&self) {
        println!("index_path={}", self.index_path.display());
        println!("metadata_path={}", self.metadata_path.display());
        println!("documents_path={}", self.documents_path.display());
        match self.dimensions {
            Some(dimensions) => println!("dimensions={}", dimensions),
            None => println!("dimensions=auto"),
        }
        println!("top_k={}", self.top_k);
        println!("batch_size={}", self.batch_size);
        println!("languages={}", self.languages.join(","));
        println!("embed_timeout_secs={}", self.embed_timeout.as_secs());
        println!("translate_timeout_secs={}", self.translate_timeout.as_secs());
        println!("embedding_url={}", self.embedding_url);
        println!("embedding_model={}", self.embedding_model);
        println!("translator_url={}", self.translator_url);
    }
}

fn parse_languages(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}
