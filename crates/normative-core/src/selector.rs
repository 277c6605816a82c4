/// AI-assisted selection of relevant normative entries.
///
/// The selector sends the context and a compact rendering of every candidate to the
/// completion service, constrained to return `{ "relevantIDs": [string] }`. The response is
/// validated strictly; any deviation is an `AiResponseFormat` error rather than an empty
/// selection.
use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::SuggestError;
use crate::gemini::{
    extract_candidate_text, Content, GeminiClient, GenerateContentRequest, GenerationConfig,
};
use crate::model::NormativeEntry;
use crate::retry::RetryPolicy;

/// Body characters of each candidate included in the prompt.
pub const PROMPT_EXCERPT_CHARS: usize = 150;
pub const RELEVANT_IDS_FIELD: &str = "relevantIDs";

const SYSTEM_INSTRUCTION: &str = "You are an expert assistant in auditing and regulatory \
compliance. Your task is to identify, from a supplied list, the normative texts that are most \
relevant to a passage of an audit report.";

/// Something that can pick relevant entries for a context, possibly over the network.
#[async_trait]
pub trait RelevanceSelector: Send + Sync {
    async fn select(
        &self,
        context_text: &str,
        entries: &[NormativeEntry],
        api_key: &str,
    ) -> Result<Vec<NormativeEntry>, SuggestError>;
}

pub struct GeminiSelector {
    client: GeminiClient,
    policy: RetryPolicy,
    excerpt_chars: usize,
}

impl GeminiSelector {
    pub fn new(client: GeminiClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            excerpt_chars: PROMPT_EXCERPT_CHARS,
        }
    }

    pub fn build_request(&self, context_text: &str, entries: &[NormativeEntry]) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::text(build_prompt(
                context_text,
                entries,
                self.excerpt_chars,
            ))],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: relevance_schema(),
                temperature: Some(self.client.config().temperature),
            },
            system_instruction: Some(Content::text(SYSTEM_INSTRUCTION)),
        }
    }
}

#[async_trait]
impl RelevanceSelector for GeminiSelector {
    async fn select(
        &self,
        context_text: &str,
        entries: &[NormativeEntry],
        api_key: &str,
    ) -> Result<Vec<NormativeEntry>, SuggestError> {
        let request = self.build_request(context_text, entries);
        let body = self
            .client
            .generate_content(api_key, &request, &self.policy)
            .await?;

        let payload = extract_candidate_text(&body)?;
        let ids = parse_relevant_ids(&payload)?;
        let selected = resolve_ids(&ids, entries);
        info!(
            returned = ids.len(),
            resolved = selected.len(),
            "AI selection completed"
        );
        Ok(selected)
    }
}

/// Response schema handed to the service: one object with a single string-array field.
pub fn relevance_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            RELEVANT_IDS_FIELD: {
                "type": "ARRAY",
                "items": { "type": "STRING" }
            }
        },
        "required": [RELEVANT_IDS_FIELD]
    })
}

pub fn build_prompt(context_text: &str, entries: &[NormativeEntry], excerpt_chars: usize) -> String {
    let candidates = entries
        .iter()
        .map(|e| {
            format!(
                "- ID: {}\n  Title: {}\n  Description: {}",
                e.id,
                e.title,
                e.excerpt(excerpt_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Based on the following paragraph of an audit report, analyse the list of normative \
texts and return the IDs of those that are MOST RELEVANT to the context.\n\n\
Report paragraph:\n\"{context_text}\"\n\n\
Available normative texts:\n{candidates}\n\n\
Your answer MUST be a JSON object containing ONLY the key \"{RELEVANT_IDS_FIELD}\", an array of \
strings with the IDs of the most relevant normative texts.\n\
Example: {{ \"{RELEVANT_IDS_FIELD}\": [\"iso_27001_a5_1\", \"lgpd_art_7\"] }}\n\
If none is relevant, return an empty array: {{ \"{RELEVANT_IDS_FIELD}\": [] }}"
    )
}

/// Decode the inner JSON payload and return the ids it names, in service order.
pub fn parse_relevant_ids(payload: &str) -> Result<Vec<String>, SuggestError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| {
        SuggestError::AiResponseFormat(format!("payload is not valid JSON: {e}"))
    })?;

    let object = value.as_object().ok_or_else(|| {
        SuggestError::AiResponseFormat("payload is not a JSON object".to_string())
    })?;

    let ids = object
        .get(RELEVANT_IDS_FIELD)
        .ok_or_else(|| {
            SuggestError::AiResponseFormat(format!("payload is missing '{RELEVANT_IDS_FIELD}'"))
        })?
        .as_array()
        .ok_or_else(|| {
            SuggestError::AiResponseFormat(format!("'{RELEVANT_IDS_FIELD}' is not an array"))
        })?;

    ids.iter()
        .map(|id| {
            id.as_str().map(str::to_string).ok_or_else(|| {
                SuggestError::AiResponseFormat(format!(
                    "'{RELEVANT_IDS_FIELD}' must contain only strings, found {id}"
                ))
            })
        })
        .collect()
}

/// Map ids back to candidate entries, keeping the given order.
///
/// Unknown ids are dropped and repeated ids are kept once.
pub fn resolve_ids(ids: &[String], entries: &[NormativeEntry]) -> Vec<NormativeEntry> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| {
            let found = entries.iter().find(|e| &e.id == id);
            if found.is_none() {
                debug!(id = %id, "AI returned unknown normative id");
            }
            found.cloned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use std::time::Duration;

    use super::*;
    use crate::gemini::GeminiConfig;

    fn entry(id: &str, body: &str) -> NormativeEntry {
        NormativeEntry {
            id: id.to_string(),
            title: format!("Title {id}"),
            body: body.to_string(),
            keyword_phrases: vec![],
        }
    }

    #[test]
    fn prompt_bounds_body_excerpt() {
        let long_body = "x".repeat(500);
        let prompt = build_prompt("context paragraph", &[entry("n1", &long_body)], 150);
        assert!(prompt.contains("- ID: n1"));
        assert!(prompt.contains("Title: Title n1"));
        assert!(prompt.contains(&format!("{}...", "x".repeat(150))));
        assert!(!prompt.contains(&"x".repeat(151)));
        assert!(prompt.contains("\"context paragraph\""));
    }

    #[test]
    fn schema_requires_relevant_ids_string_array() {
        let schema = relevance_schema();
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["relevantIDs"]["items"]["type"], "STRING");
        assert_eq!(schema["required"][0], "relevantIDs");
    }

    #[test]
    fn parses_valid_payload() {
        let ids = parse_relevant_ids(r#"{"relevantIDs":["b","a"]}"#).unwrap();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(parse_relevant_ids(r#"{"relevantIDs":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_payloads() {
        for payload in [
            "not json",
            r#"["a","b"]"#,
            r#"{"ids":["a"]}"#,
            r#"{"relevantIDs":"a"}"#,
            r#"{"relevantIDs":["a",1]}"#,
        ] {
            let err = parse_relevant_ids(payload).unwrap_err();
            assert!(matches!(err, SuggestError::AiResponseFormat(_)), "{payload}: {err:?}");
        }
    }

    #[test]
    fn resolves_in_service_order_dropping_unknown_ids() {
        let entries = vec![entry("a", "A"), entry("b", "B"), entry("c", "C")];
        let ids: Vec<String> = ["c", "ghost", "a", "c"].iter().map(|s| s.to_string()).collect();
        let resolved = resolve_ids(&ids, &entries);
        let resolved_ids: Vec<&str> = resolved.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(resolved_ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn selects_entries_from_double_encoded_response() {
        let server = MockServer::start_async().await;
        let inner = r#"{"relevantIDs":["lgpd_art_7","unknown"]}"#;
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": inner}]}}]
        });
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/m:generateContent");
                then.status(200).json_body(body);
            })
            .await;

        let client = GeminiClient::new(GeminiConfig {
            base_url: server.base_url(),
            model: "m".to_string(),
            ..GeminiConfig::default()
        })
        .unwrap();
        let selector = GeminiSelector::new(client, RetryPolicy::new(3, Duration::from_millis(1)));
        let entries = vec![entry("iso_27001_a5_1", "ISO"), entry("lgpd_art_7", "LGPD")];

        let selected = selector
            .select("tratamento de dados pessoais", &entries, "key")
            .await
            .unwrap();

        assert_eq!(selected, vec![entries[1].clone()]);
    }
}
