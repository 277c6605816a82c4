/// Deterministic keyword scoring over the knowledge base.
///
/// A keyword phrase matches when every whitespace-separated token of the phrase occurs
/// somewhere in the lowercased context (order and adjacency are ignored). Each entry is
/// scored by its best matching phrase, weighted by the square of the phrase length so that
/// specific phrases outrank generic ones.
use crate::model::{NormativeEntry, ScoredSuggestion};

/// Phrases shorter than this never match.
pub const MIN_PHRASE_CHARS: usize = 4;
/// Context shorter than this (after trimming) is not scored at all.
pub const COARSE_MIN_CONTEXT_CHARS: usize = 3;
pub const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Debug, Clone)]
pub struct LexicalScorer {
    min_context_chars: usize,
    min_phrase_chars: usize,
    max_results: usize,
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESULTS)
    }
}

impl LexicalScorer {
    pub fn new(max_results: usize) -> Self {
        Self {
            min_context_chars: COARSE_MIN_CONTEXT_CHARS,
            min_phrase_chars: MIN_PHRASE_CHARS,
            max_results,
        }
    }

    pub fn with_min_context_chars(mut self, min_context_chars: usize) -> Self {
        self.min_context_chars = min_context_chars;
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Rank `entries` against `context_text`.
    ///
    /// Ties keep knowledge-base order. At most `max_results` suggestions are returned.
    pub fn score(&self, context_text: &str, entries: &[NormativeEntry]) -> Vec<ScoredSuggestion> {
        let context = context_text.trim().to_lowercase();
        if context.chars().count() < self.min_context_chars {
            return Vec::new();
        }

        let mut scored: Vec<ScoredSuggestion> = entries
            .iter()
            .filter_map(|entry| {
                let best = self.best_phrase_score(&context, entry);
                (best > 0).then(|| ScoredSuggestion {
                    entry: entry.clone(),
                    score: best,
                })
            })
            .collect();

        // sort_by is stable, which gives the knowledge-base-order tie break.
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(self.max_results);
        scored
    }

    fn best_phrase_score(&self, context_lower: &str, entry: &NormativeEntry) -> u64 {
        entry
            .keyword_phrases
            .iter()
            .map(|phrase| phrase.trim())
            .filter(|phrase| phrase.chars().count() >= self.min_phrase_chars)
            .filter(|phrase| phrase_matches(context_lower, phrase))
            .map(phrase_weight)
            .max()
            .unwrap_or(0)
    }
}

/// True when every token of `phrase` appears (case-insensitively) in `context_lower`.
///
/// `context_lower` must already be lowercased.
pub fn phrase_matches(context_lower: &str, phrase: &str) -> bool {
    let phrase = phrase.to_lowercase();
    let mut tokens = phrase.split_whitespace().peekable();
    if tokens.peek().is_none() {
        return false;
    }
    tokens.all(|token| context_lower.contains(token))
}

fn phrase_weight(phrase: &str) -> u64 {
    let len = phrase.chars().count() as u64;
    len * len
}
