/// Strategy coordinator: picks keyword or AI selection for a query and applies the
/// keyword fallback when the AI path fails.
///
/// Only `MissingCredential` ever escapes `suggest`; every other AI failure is logged and
/// replaced by the lexical result with `source = AiFallbackToKeyword`.
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::SuggestError;
use crate::lexical::LexicalScorer;
use crate::model::{NormativeEntry, SuggestionMode, SuggestionQuery, SuggestionResult, SuggestionSource};
use crate::selector::RelevanceSelector;

pub const NO_SUGGESTIONS_MESSAGE: &str = "No suggestions found for the current context.";

pub struct StrategyCoordinator {
    scorer: LexicalScorer,
    selector: Arc<dyn RelevanceSelector>,
    min_context_length: usize,
    max_results: usize,
}

impl StrategyCoordinator {
    pub fn new(config: &EngineConfig, selector: Arc<dyn RelevanceSelector>) -> Self {
        Self {
            scorer: LexicalScorer::new(config.max_results),
            selector,
            min_context_length: config.min_context_length,
            max_results: config.max_results,
        }
    }

    pub fn min_context_length(&self) -> usize {
        self.min_context_length
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn suggest(
        &self,
        query: &SuggestionQuery,
        entries: &[NormativeEntry],
    ) -> Result<SuggestionResult, SuggestError> {
        let context = query.context_text.trim();
        if context.chars().count() < self.min_context_length {
            debug!(len = context.chars().count(), "context too short, skipping suggestions");
            return Ok(SuggestionResult::empty(
                source_for(query.mode),
                format!(
                    "Type at least {} characters to get suggestions.",
                    self.min_context_length
                ),
            ));
        }

        match query.mode {
            SuggestionMode::Keyword => Ok(self.keyword(context, entries, SuggestionSource::Keyword)),
            SuggestionMode::Ai => {
                let api_key = query
                    .api_key
                    .as_deref()
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .ok_or(SuggestError::MissingCredential)?;
                Ok(self.ai(context, entries, api_key).await)
            }
        }
    }

    async fn ai(&self, context: &str, entries: &[NormativeEntry], api_key: &str) -> SuggestionResult {
        match self.selector.select(context, entries, api_key).await {
            Ok(mut selected) => {
                selected.truncate(self.max_results);
                info!(results = selected.len(), "AI suggestions ready");
                with_empty_diagnostic(SuggestionResult::new(selected, SuggestionSource::Ai))
            }
            Err(e) => {
                warn!(error = %e, "AI selection failed, falling back to keyword matching");
                let fallback = self.keyword(context, entries, SuggestionSource::AiFallbackToKeyword);
                if fallback.is_empty() {
                    fallback
                } else {
                    fallback.with_diagnostic(format!(
                        "AI suggestions unavailable ({e}); showing keyword matches."
                    ))
                }
            }
        }
    }

    fn keyword(&self, context: &str, entries: &[NormativeEntry], source: SuggestionSource) -> SuggestionResult {
        let scored = self.scorer.score(context, entries);
        debug!(results = scored.len(), ?source, "keyword suggestions ready");
        with_empty_diagnostic(SuggestionResult::scored(scored, source))
    }
}

fn source_for(mode: SuggestionMode) -> SuggestionSource {
    match mode {
        SuggestionMode::Keyword => SuggestionSource::Keyword,
        SuggestionMode::Ai => SuggestionSource::Ai,
    }
}

fn with_empty_diagnostic(result: SuggestionResult) -> SuggestionResult {
    if result.is_empty() {
        result.with_diagnostic(NO_SUGGESTIONS_MESSAGE)
    } else {
        result
    }
}
