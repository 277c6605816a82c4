mod config;
mod error;
mod server;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use normative_core::config::EngineConfig;
use normative_core::coordinator::StrategyCoordinator;
use normative_core::gemini::{GeminiClient, GeminiConfig};
use normative_core::knowledge_base::load_knowledge_base;
use normative_core::retry::RetryPolicy;
use normative_core::selector::GeminiSelector;
use server::NormativeServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting normative-mcp server");

    let config = Config::from_env()?;
    let engine = EngineConfig::from_env();
    info!(
        kb_files = config.kb_paths.len(),
        mode = %engine.mode,
        api_key = engine.api_key.is_some(),
        max_results = engine.max_results,
        max_retries = engine.max_retries,
        "configuration loaded"
    );

    let gemini_config = GeminiConfig::from_env();
    info!(
        base_url = %gemini_config.base_url,
        model = %gemini_config.model,
        timeout_ms = gemini_config.default_timeout.as_millis(),
        "gemini client configured"
    );
    let policy = RetryPolicy::new(engine.max_retries, gemini_config.initial_backoff);
    let selector = GeminiSelector::new(GeminiClient::new(gemini_config)?, policy);
    let coordinator = Arc::new(StrategyCoordinator::new(&engine, Arc::new(selector)));

    let knowledge_base = load_knowledge_base(&config.kb_paths).await?;
    info!(entries = knowledge_base.len(), "knowledge base loaded");

    let server = NormativeServer::new(knowledge_base, coordinator, engine, config);

    if let Ok(addr) = std::env::var("MCP_TCP_LISTEN_ADDR") {
        let listener = TcpListener::bind(&addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
