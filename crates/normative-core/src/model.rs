use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single regulatory text record from the knowledge base.
///
/// Entries are immutable once loaded; the engine only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormativeEntry {
    /// Unique identifier, e.g. "lgpd_art_7"
    pub id: String,
    /// Short human-readable title
    pub title: String,
    /// Full regulatory text; inserted verbatim into the document
    pub body: String,
    /// Lowercased keyword phrases, each possibly multi-word
    #[serde(default)]
    pub keyword_phrases: Vec<String>,
}

impl NormativeEntry {
    /// Text the host inserts after the current selection when this entry is picked.
    pub fn insert_text(&self) -> String {
        format!("\n{}\n", self.body)
    }

    /// First `max_chars` characters of the body, with an ellipsis when cut.
    pub fn excerpt(&self, max_chars: usize) -> String {
        if self.body.chars().count() > max_chars {
            format!("{}...", self.body.chars().take(max_chars).collect::<String>())
        } else {
            self.body.clone()
        }
    }
}

/// An entry that matched at least one keyword phrase, scored by its best phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredSuggestion {
    pub entry: NormativeEntry,
    pub score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionMode {
    #[default]
    Keyword,
    Ai,
}

impl FromStr for SuggestionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(SuggestionMode::Keyword),
            "ai" | "gemini" => Ok(SuggestionMode::Ai),
            other => Err(format!("unknown suggestion mode: '{other}' (expected keyword or ai)")),
        }
    }
}

impl fmt::Display for SuggestionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionMode::Keyword => f.write_str("keyword"),
            SuggestionMode::Ai => f.write_str("ai"),
        }
    }
}

/// One request for suggestions, built fresh for every trigger.
#[derive(Clone, PartialEq, Eq)]
pub struct SuggestionQuery {
    pub context_text: String,
    pub mode: SuggestionMode,
    pub api_key: Option<String>,
}

impl SuggestionQuery {
    pub fn keyword(context_text: impl Into<String>) -> Self {
        Self {
            context_text: context_text.into(),
            mode: SuggestionMode::Keyword,
            api_key: None,
        }
    }

    pub fn ai(context_text: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            context_text: context_text.into(),
            mode: SuggestionMode::Ai,
            api_key: Some(api_key.into()),
        }
    }
}

// Keeps the API key out of logs.
impl fmt::Debug for SuggestionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuggestionQuery")
            .field("context_text", &self.context_text)
            .field("mode", &self.mode)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Keyword,
    Ai,
    AiFallbackToKeyword,
}

/// Ranked suggestions handed to the rendering side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionResult {
    pub entries: Vec<NormativeEntry>,
    pub source: SuggestionSource,
    /// Lexical score per entry, parallel to `entries`. AI selections carry none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_message: Option<String>,
}

impl SuggestionResult {
    pub fn new(entries: Vec<NormativeEntry>, source: SuggestionSource) -> Self {
        Self {
            entries,
            source,
            scores: None,
            diagnostic_message: None,
        }
    }

    pub fn scored(scored: Vec<ScoredSuggestion>, source: SuggestionSource) -> Self {
        let (entries, scores) = scored.into_iter().map(|s| (s.entry, s.score)).unzip();
        Self {
            entries,
            source,
            scores: Some(scores),
            diagnostic_message: None,
        }
    }

    pub fn empty(source: SuggestionSource, diagnostic: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            source,
            scores: None,
            diagnostic_message: Some(diagnostic.into()),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic_message = Some(diagnostic.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep the first `len` entries (and their scores).
    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        if let Some(scores) = self.scores.as_mut() {
            scores.truncate(len);
        }
    }

    pub fn score_of(&self, index: usize) -> Option<u64> {
        self.scores.as_ref().and_then(|s| s.get(index).copied())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id.as_str()).collect()
    }
}
