use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::{NormativeEntry, SuggestionResult, SuggestionSource};

/// Characters of body text shown per suggestion.
pub const SUGGESTION_EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SuggestNormativesParams {
    /// The text currently under focus in the document (e.g. the current paragraph).
    pub context_text: String,
    /// "keyword" or "ai". Defaults to the server's configured mode.
    pub mode: Option<String>,
    /// API key for AI mode. Defaults to the server's configured key.
    pub api_key: Option<String>,
    /// Maximum number of suggestions (default and upper bound: the server setting).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetNormativeParams {
    /// Normative id such as "lgpd_art_7".
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListNormativesParams {
    /// Index of the first entry to return (default: 0).
    pub offset: Option<u32>,
    /// Number of entries to return (default: 50, max: 200).
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuggestionItem {
    pub rank: usize,
    pub id: String,
    pub title: String,
    pub excerpt: String,
    /// Keyword match score; absent for AI selections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuggestNormativesResponse {
    pub source: SuggestionSource,
    pub suggestions: Vec<SuggestionItem>,
    pub diagnostic_message: Option<String>,
}

impl From<SuggestionResult> for SuggestNormativesResponse {
    fn from(result: SuggestionResult) -> Self {
        let suggestions = result
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| SuggestionItem {
                rank: i + 1,
                id: e.id.clone(),
                title: e.title.clone(),
                excerpt: e.excerpt(SUGGESTION_EXCERPT_CHARS),
                score: result.score_of(i),
            })
            .collect();
        Self {
            source: result.source,
            suggestions,
            diagnostic_message: result.diagnostic_message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NormativeDetailResponse {
    pub id: String,
    pub title: String,
    pub body: String,
    pub keyword_phrases: Vec<String>,
    /// Exact text to insert after the current selection.
    pub insert_text: String,
}

impl From<&NormativeEntry> for NormativeDetailResponse {
    fn from(entry: &NormativeEntry) -> Self {
        Self {
            id: entry.id.clone(),
            title: entry.title.clone(),
            body: entry.body.clone(),
            keyword_phrases: entry.keyword_phrases.clone(),
            insert_text: entry.insert_text(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NormativeSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListNormativesResponse {
    pub total: usize,
    pub offset: usize,
    pub normatives: Vec<NormativeSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReloadKnowledgeBaseResponse {
    pub entry_count: usize,
}
