//! Dictionary-backed entity recognizer.
//!
//! The model is a JSON file listing known entity texts and their labels:
//!
//! ```json
//! { "entities": [ { "text": "Acme Corp", "label": "ORG" } ] }
//! ```
//!
//! Matching is case-sensitive and whole-word. At any position the longest
//! known entry wins, and matches never overlap.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::entity::EntitySpan;
use crate::recognizer::{EntityRecognizer, ExtractionError, ModelLoadError};

/// One known entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub text: String,
    pub label: String,
}

impl GazetteerEntry {
    pub fn new(text: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
        }
    }
}

/// On-disk gazetteer model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GazetteerModel {
    pub entities: Vec<GazetteerEntry>,
}

impl GazetteerModel {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_slice(&raw).map_err(|source| ModelLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Recognizer that looks up known entity texts.
pub struct GazetteerRecognizer {
    pattern: Regex,
    labels: HashMap<String, String>,
}

impl GazetteerRecognizer {
    /// Load and compile a gazetteer file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading gazetteer model");
        Self::from_model(GazetteerModel::from_path(path)?)
    }

    /// Compile an in-memory model.
    pub fn from_model(model: GazetteerModel) -> Result<Self, ModelLoadError> {
        if model.entities.is_empty() {
            return Err(ModelLoadError::Invalid(
                "gazetteer contains no entities".to_string(),
            ));
        }

        let mut labels = HashMap::with_capacity(model.entities.len());
        for entry in model.entities {
            if entry.text.trim().is_empty() || entry.label.trim().is_empty() {
                return Err(ModelLoadError::Invalid(format!(
                    "gazetteer entry {:?} has an empty text or label",
                    entry.text
                )));
            }
            // Earlier entries win on duplicate texts
            labels.entry(entry.text).or_insert(entry.label);
        }

        // Longest first so the alternation prefers the longest entry at a position
        let mut texts: Vec<&String> = labels.keys().collect();
        texts.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let alternation = texts
            .iter()
            .map(|text| bounded(text))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = Regex::new(&alternation)
            .map_err(|e| ModelLoadError::Invalid(format!("failed to compile gazetteer: {e}")))?;

        info!(entries = labels.len(), "Gazetteer model ready");

        Ok(Self { pattern, labels })
    }

    /// Number of distinct entity texts in the model.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Entities found in `text`, in document order.
    pub fn spans(&self, text: &str) -> Vec<EntitySpan> {
        self.pattern
            .find_iter(text)
            .filter_map(|m| {
                self.labels
                    .get(m.as_str())
                    .map(|label| EntitySpan::new(m.as_str(), label.clone()))
            })
            .collect()
    }
}

/// Escaped pattern for `text`, anchored on word boundaries where the entry
/// itself starts or ends with a word character.
fn bounded(text: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let starts_word = text.chars().next().is_some_and(is_word);
    let ends_word = text.chars().last().is_some_and(is_word);

    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(text),
        if ends_word { r"\b" } else { "" }
    )
}

#[async_trait]
impl EntityRecognizer for GazetteerRecognizer {
    fn name(&self) -> &str {
        "gazetteer"
    }

    async fn extract(&mut self, text: &str) -> Result<Vec<EntitySpan>, ExtractionError> {
        let spans = self.spans(text);
        debug!(text_len = text.len(), entities = spans.len(), "Gazetteer extraction complete");
        Ok(spans)
    }
}
