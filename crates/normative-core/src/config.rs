use std::time::Duration;

use crate::model::{SuggestionMode, SuggestionQuery};

pub const DEFAULT_MIN_CONTEXT_LEN: usize = 10;
pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_DEBOUNCE_MS: u64 = 750;

/// Engine configuration, passed explicitly into every component that needs it.
#[derive(Clone)]
pub struct EngineConfig {
    pub mode: SuggestionMode,
    pub api_key: Option<String>,
    /// Trimmed context shorter than this is rejected before any strategy runs.
    pub min_context_length: usize,
    pub max_results: usize,
    /// Total attempts for one AI request, including the first.
    pub max_retries: u32,
    pub debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: SuggestionMode::Keyword,
            api_key: None,
            min_context_length: DEFAULT_MIN_CONTEXT_LEN,
            max_results: DEFAULT_MAX_RESULTS,
            max_retries: DEFAULT_MAX_RETRIES,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables. All are optional:
    /// - `NORMATIVE_MODE` (`keyword` | `ai`, default `keyword`)
    /// - `GEMINI_API_KEY`
    /// - `NORMATIVE_MIN_CONTEXT_LEN` (default 10)
    /// - `NORMATIVE_MAX_RESULTS` (default 10)
    /// - `NORMATIVE_MAX_RETRIES` (default 3)
    /// - `NORMATIVE_DEBOUNCE_MS` (default 750)
    pub fn from_env() -> Self {
        let mode = std::env::var("NORMATIVE_MODE")
            .ok()
            .and_then(|s| s.parse::<SuggestionMode>().ok())
            .unwrap_or_default();

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let min_context_length = std::env::var("NORMATIVE_MIN_CONTEXT_LEN")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MIN_CONTEXT_LEN);

        let max_results = std::env::var("NORMATIVE_MAX_RESULTS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let max_retries = std::env::var("NORMATIVE_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let debounce = std::env::var("NORMATIVE_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(DEFAULT_DEBOUNCE_MS));

        Self {
            mode,
            api_key,
            min_context_length,
            max_results,
            max_retries,
            debounce,
        }
    }

    /// Build a query for `context_text` using the configured mode and key.
    pub fn query(&self, context_text: impl Into<String>) -> SuggestionQuery {
        SuggestionQuery {
            context_text: context_text.into(),
            mode: self.mode,
            api_key: self.api_key.clone(),
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("mode", &self.mode)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("min_context_length", &self.min_context_length)
            .field("max_results", &self.max_results)
            .field("max_retries", &self.max_retries)
            .field("debounce", &self.debounce)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.mode, SuggestionMode::Keyword);
        assert_eq!(config.min_context_length, 10);
        assert_eq!(config.max_results, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.debounce, Duration::from_millis(750));
    }

    #[test]
    fn query_carries_mode_and_key() {
        let config = EngineConfig {
            mode: SuggestionMode::Ai,
            api_key: Some("k".to_string()),
            ..EngineConfig::default()
        };
        let query = config.query("tratamento de dados pessoais");
        assert_eq!(query.mode, SuggestionMode::Ai);
        assert_eq!(query.api_key.as_deref(), Some("k"));
    }
}
