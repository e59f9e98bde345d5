//! QA documents and the normalization that turns raw corpus records into them.

use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Ground-truth answers as they appear in the corpus: either a bare list of
/// strings or a SQuAD-style object with a `text` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerRepresentation {
    List(Vec<String>),
    Keyed {
        text: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer_start: Option<Vec<i64>>,
    },
}

impl Default for AnswerRepresentation {
    fn default() -> Self {
        AnswerRepresentation::List(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub context: String,
    pub question: String,
    #[serde(default)]
    pub answers: AnswerRepresentation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A corpus record before normalization; any field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    pub id: Option<String>,
    pub context: Option<String>,
    pub question: Option<String>,
    /// `None` when absent, `null`, or in neither recognized shape.
    #[serde(default, deserialize_with = "lenient_answers")]
    pub answers: Option<AnswerRepresentation>,
    pub language: Option<String>,
}

// An odd answers value only costs the record its answers, never the line.
fn lenient_answers<'de, D>(deserializer: D) -> std::result::Result<Option<AnswerRepresentation>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match serde_json::from_value(value) {
        Ok(answers) => Some(answers),
        Err(e) => {
            debug!("Ignoring answers in an unrecognized shape: {}", e);
            None
        }
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub read: usize,
    pub kept: usize,
    pub dropped: usize,
}

/// Keeps a record only when both context and question have content.
pub fn normalize(raw: RawRecord) -> Option<Document> {
    let context = raw.context.as_deref().map(str::trim).unwrap_or_default();
    let question = raw.question.as_deref().map(str::trim).unwrap_or_default();
    if context.is_empty() || question.is_empty() {
        return None;
    }

    let language = raw
        .language
        .filter(|l| !l.trim().is_empty())
        .or_else(|| raw.id.as_deref().and_then(language_from_id));

    Some(Document {
        context: context.to_string(),
        question: question.to_string(),
        answers: raw.answers.unwrap_or_default(),
        language,
    })
}

// TyDi ids look like "finnish-6271413478421917962-0".
fn language_from_id(id: &str) -> Option<String> {
    let (prefix, rest) = id.split_once('-')?;
    if rest.is_empty() || prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(prefix.to_ascii_lowercase())
}

/// Streams raw JSONL, dropping records that fail [`normalize`]. Blank lines
/// are skipped; a line that is not a JSON record is an error.
pub fn normalize_jsonl<R: BufRead>(reader: R) -> Result<(Vec<Document>, IngestStats)> {
    let mut documents = Vec::new();
    let mut stats = IngestStats::default();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawRecord = serde_json::from_str(&line).map_err(|source| Error::MalformedRecord {
            line: number + 1,
            source,
        })?;
        stats.read += 1;
        match normalize(raw) {
            Some(document) => {
                documents.push(document);
                stats.kept += 1;
            }
            None => stats.dropped += 1,
        }
    }

    debug!(
        "Normalized {} records: kept {}, dropped {}",
        stats.read, stats.kept, stats.dropped
    );
    Ok((documents, stats))
}

pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let reader = BufReader::new(File::open(path)?);
    let mut documents = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let document = serde_json::from_str(&line).map_err(|source| Error::MalformedRecord {
            line: number + 1,
            source,
        })?;
        documents.push(document);
    }
    Ok(documents)
}

pub fn write_documents(path: &Path, documents: &[Document]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(path)?);
    for document in documents {
        serde_json::to_writer(&mut out, document).map_err(std::io::Error::from)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
