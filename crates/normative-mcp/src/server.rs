/// MCP server exposing the normative suggestion engine.
///
/// Exposes four tools:
/// - `suggest_normatives`: Ranked suggestions for the text under focus
/// - `get_normative`: Full entry plus the exact text to insert
/// - `list_normatives`: Paged listing of the knowledge base
/// - `reload_knowledge_base`: Re-read the configured knowledge base files
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use normative_core::config::EngineConfig;
use normative_core::coordinator::StrategyCoordinator;
use normative_core::error::SuggestError;
use normative_core::knowledge_base::{load_knowledge_base, KnowledgeBase};
use normative_core::mcp_api::{
    GetNormativeParams, ListNormativesParams, ListNormativesResponse, NormativeDetailResponse,
    NormativeSummary, ReloadKnowledgeBaseResponse, SuggestNormativesParams,
    SuggestNormativesResponse,
};
use normative_core::model::{SuggestionMode, SuggestionQuery};

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct NormativeServer {
    knowledge_base: Arc<RwLock<KnowledgeBase>>,
    coordinator: Arc<StrategyCoordinator>,
    engine: EngineConfig,
    config: Config,
    tool_router: ToolRouter<NormativeServer>,
}

impl NormativeServer {
    pub fn new(
        knowledge_base: KnowledgeBase,
        coordinator: Arc<StrategyCoordinator>,
        engine: EngineConfig,
        config: Config,
    ) -> Self {
        Self {
            knowledge_base: Arc::new(RwLock::new(knowledge_base)),
            coordinator,
            engine,
            config,
            tool_router: Self::tool_router(),
        }
    }

    fn build_query(&self, params: SuggestNormativesParams) -> Result<SuggestionQuery, String> {
        let mode = match params.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.parse::<SuggestionMode>()?,
            None => self.engine.mode,
        };
        let api_key = params
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| self.engine.api_key.clone());

        Ok(SuggestionQuery {
            context_text: params.context_text,
            mode,
            api_key,
        })
    }
}

#[tool_router]
impl NormativeServer {
    #[tool(description = "Suggest regulatory texts (normatives) relevant to the given document passage. Uses keyword matching or AI selection; AI failures fall back to keyword matching automatically.")]
    async fn suggest_normatives(
        &self,
        Parameters(params): Parameters<SuggestNormativesParams>,
    ) -> Result<Json<SuggestNormativesResponse>, String> {
        let limit = params
            .limit
            .map(|l| (l as usize).clamp(1, self.coordinator.max_results().max(1)))
            .unwrap_or(self.coordinator.max_results());
        let query = self.build_query(params)?;

        // Snapshot so a concurrent reload never blocks on a slow AI call.
        let knowledge_base = self.knowledge_base.read().await.clone();
        let mut result = self
            .coordinator
            .suggest(&query, &knowledge_base)
            .await
            .map_err(|e| match e {
                SuggestError::MissingCredential => {
                    "AI mode requires an API key: pass api_key or set GEMINI_API_KEY".to_string()
                }
                other => format!("suggestion failed: {other}"),
            })?;
        result.truncate(limit);

        info!(
            mode = %query.mode,
            source = ?result.source,
            results = result.entries.len(),
            "suggest_normatives completed"
        );
        Ok(Json(result.into()))
    }

    #[tool(description = "Get the full text of a normative by id, including the exact text to insert into the document.")]
    async fn get_normative(
        &self,
        Parameters(params): Parameters<GetNormativeParams>,
    ) -> Result<Json<NormativeDetailResponse>, String> {
        let id = params.id.trim().to_string();
        if id.is_empty() {
            return Err("id must not be empty".to_string());
        }

        let knowledge_base = self.knowledge_base.read().await;
        let entry = knowledge_base
            .get(&id)
            .or_else(|| knowledge_base.iter().find(|e| e.id.eq_ignore_ascii_case(&id)))
            .ok_or_else(|| format!("normative not found: {id}"))?;

        Ok(Json(entry.into()))
    }

    #[tool(description = "List normatives in knowledge base order (id and title), paged with offset/limit.")]
    async fn list_normatives(
        &self,
        Parameters(params): Parameters<ListNormativesParams>,
    ) -> Result<Json<ListNormativesResponse>, String> {
        let offset = params.offset.unwrap_or(0) as usize;
        let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT) as usize;

        let knowledge_base = self.knowledge_base.read().await;
        let normatives = knowledge_base
            .iter()
            .skip(offset)
            .take(limit)
            .map(|e| NormativeSummary {
                id: e.id.clone(),
                title: e.title.clone(),
            })
            .collect();

        Ok(Json(ListNormativesResponse {
            total: knowledge_base.len(),
            offset,
            normatives,
        }))
    }

    #[tool(description = "Re-read the configured knowledge base files and replace the in-memory entries.")]
    async fn reload_knowledge_base(&self) -> Result<Json<ReloadKnowledgeBaseResponse>, String> {
        info!("reload_knowledge_base tool invoked");

        let reloaded = load_knowledge_base(&self.config.kb_paths)
            .await
            .map_err(|e| format!("reload failed: {e}"))?;
        let entry_count = reloaded.len();

        *self.knowledge_base.write().await = reloaded;
        info!(entry_count, "in-memory knowledge base replaced");

        Ok(Json(ReloadKnowledgeBaseResponse { entry_count }))
    }
}

#[tool_handler]
impl ServerHandler for NormativeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "normative-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Normative suggestion MCP server. Call suggest_normatives with the paragraph \
                 the user is editing to get relevant regulatory texts, get_normative to fetch \
                 the full text to insert, list_normatives to browse, and \
                 reload_knowledge_base after the knowledge base files change."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use normative_core::model::{NormativeEntry, SuggestionSource};
    use normative_core::selector::RelevanceSelector;

    use super::*;

    struct FailingSelector;

    #[async_trait]
    impl RelevanceSelector for FailingSelector {
        async fn select(
            &self,
            _context_text: &str,
            _entries: &[NormativeEntry],
            _api_key: &str,
        ) -> Result<Vec<NormativeEntry>, SuggestError> {
            Err(SuggestError::RetriesExhausted {
                attempts: 3,
                last: "status 503".to_string(),
            })
        }
    }

    fn server(api_key: Option<&str>) -> NormativeServer {
        let engine = EngineConfig {
            api_key: api_key.map(str::to_string),
            ..EngineConfig::default()
        };
        let kb = KnowledgeBase::from_entries(vec![
            NormativeEntry {
                id: "lgpd_art_7".to_string(),
                title: "LGPD Art. 7".to_string(),
                body: "O tratamento de dados pessoais somente poderá ser realizado...".to_string(),
                keyword_phrases: vec!["dados pessoais".to_string()],
            },
            NormativeEntry {
                id: "lei_14133_art_5".to_string(),
                title: "Lei 14.133 Art. 5".to_string(),
                body: "Na aplicação desta Lei, serão observados os princípios...".to_string(),
                keyword_phrases: vec!["licitação".to_string()],
            },
        ])
        .unwrap();
        let coordinator = Arc::new(StrategyCoordinator::new(&engine, Arc::new(FailingSelector)));
        let config = Config {
            kb_paths: vec![PathBuf::from("normativos.json")],
        };
        NormativeServer::new(kb, coordinator, engine, config)
    }

    fn write_kb(path: &std::path::Path, ids: &[&str]) {
        let entries: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id,
                    "title": format!("Title {id}"),
                    "body": format!("Body of {id}"),
                    "keywordPhrases": ["dados pessoais"],
                })
            })
            .collect();
        std::fs::write(path, serde_json::Value::Array(entries).to_string()).unwrap();
    }

    async fn server_from_files(paths: Vec<PathBuf>) -> NormativeServer {
        let engine = EngineConfig::default();
        let kb = load_knowledge_base(&paths).await.unwrap();
        let coordinator = Arc::new(StrategyCoordinator::new(&engine, Arc::new(FailingSelector)));
        NormativeServer::new(kb, coordinator, engine, Config { kb_paths: paths })
    }

    async fn listed_ids(server: &NormativeServer) -> Vec<String> {
        let Json(page) = server
            .list_normatives(Parameters(ListNormativesParams {
                offset: None,
                limit: None,
            }))
            .await
            .unwrap();
        page.normatives.into_iter().map(|n| n.id).collect()
    }

    fn params(context_text: &str, mode: Option<&str>) -> SuggestNormativesParams {
        SuggestNormativesParams {
            context_text: context_text.to_string(),
            mode: mode.map(str::to_string),
            api_key: None,
            limit: None,
        }
    }

    #[test]
    fn tools_publish_output_schemas() {
        let tools = NormativeServer::tool_router().list_all();
        for name in [
            "suggest_normatives",
            "get_normative",
            "list_normatives",
            "reload_knowledge_base",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    #[tokio::test]
    async fn ai_failure_is_reported_as_fallback_result() {
        let Json(response) = server(Some("key"))
            .suggest_normatives(Parameters(params(
                "Houve tratamento de dados pessoais sem base legal.",
                Some("ai"),
            )))
            .await
            .unwrap();

        assert_eq!(response.source, SuggestionSource::AiFallbackToKeyword);
        assert_eq!(response.suggestions.len(), 1);
        assert_eq!(response.suggestions[0].id, "lgpd_art_7");
        assert_eq!(response.suggestions[0].rank, 1);
        assert_eq!(response.suggestions[0].score, Some(14 * 14));
    }

    #[tokio::test]
    async fn ai_mode_without_key_is_a_tool_error() {
        let err = server(None)
            .suggest_normatives(Parameters(params(
                "Houve tratamento de dados pessoais sem base legal.",
                Some("ai"),
            )))
            .await
            .err().expect("expected error");
        assert!(err.contains("API key"));
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected() {
        let err = server(None)
            .suggest_normatives(Parameters(params("texto longo o suficiente", Some("semantic"))))
            .await
            .err().expect("expected error");
        assert!(err.contains("unknown suggestion mode"));
    }

    #[tokio::test]
    async fn get_normative_returns_insert_text() {
        let Json(detail) = server(None)
            .get_normative(Parameters(GetNormativeParams {
                id: "LGPD_ART_7".to_string(),
            }))
            .await
            .unwrap();

        assert_eq!(detail.id, "lgpd_art_7");
        assert_eq!(detail.insert_text, format!("\n{}\n", detail.body));
    }

    #[tokio::test]
    async fn reload_picks_up_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("normativos.json");
        let second = dir.path().join("normativos_lgpd.json");
        write_kb(&first, &["iso_a9"]);
        write_kb(&second, &["lgpd_art_7"]);
        let server = server_from_files(vec![first, second.clone()]).await;
        assert_eq!(listed_ids(&server).await, vec!["iso_a9", "lgpd_art_7"]);

        write_kb(&second, &["lgpd_art_7", "lgpd_art_11"]);
        let Json(reloaded) = server.reload_knowledge_base().await.unwrap();

        assert_eq!(reloaded.entry_count, 3);
        assert_eq!(listed_ids(&server).await, vec!["iso_a9", "lgpd_art_7", "lgpd_art_11"]);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normativos.json");
        write_kb(&path, &["iso_a9", "lgpd_art_7"]);
        let server = server_from_files(vec![path.clone()]).await;

        std::fs::write(&path, "{ not a json array").unwrap();
        let err = server.reload_knowledge_base().await.err().expect("expected error");
        assert!(err.contains("reload failed"), "{err}");
        assert_eq!(listed_ids(&server).await, vec!["iso_a9", "lgpd_art_7"]);

        std::fs::remove_file(&path).unwrap();
        assert!(server.reload_knowledge_base().await.is_err());
        assert_eq!(listed_ids(&server).await, vec!["iso_a9", "lgpd_art_7"]);
    }

    #[tokio::test]
    async fn list_normatives_pages_in_order() {
        let Json(page) = server(None)
            .list_normatives(Parameters(ListNormativesParams {
                offset: Some(1),
                limit: Some(10),
            }))
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.normatives.len(), 1);
        assert_eq!(page.normatives[0].id, "lei_14133_art_5");
    }
}
