mod config;
mod error;

use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::AppError;
use normative_core::config::EngineConfig;
use normative_core::coordinator::StrategyCoordinator;
use normative_core::gemini::{GeminiClient, GeminiConfig};
use normative_core::knowledge_base::load_knowledge_base;
use normative_core::model::SuggestionMode;
use normative_core::pipeline::{Delivery, StrategySelection, SuggestionPipeline};
use normative_core::retry::RetryPolicy;
use normative_core::selector::GeminiSelector;

enum Input {
    Context(String),
    SetMode(SuggestionMode),
    SetApiKey(Option<String>),
}

/// Every stdin line is a "selection changed" event carrying the current context text.
/// Lines starting with `:` are commands (`:mode keyword|ai`, `:key <api key>`).
fn parse_input(line: &str) -> Result<Input, AppError> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(Input::Context(line.to_string()));
    };
    let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
    match name {
        "mode" => arg
            .parse::<SuggestionMode>()
            .map(Input::SetMode)
            .map_err(AppError::UnknownCommand),
        "key" => {
            let key = arg.trim();
            Ok(Input::SetApiKey((!key.is_empty()).then(|| key.to_string())))
        }
        other => Err(AppError::UnknownCommand(other.to_string())),
    }
}

/// Tracks the newest printed generation so an older result never replaces a newer one.
#[derive(Debug, Default)]
struct NewestOnly {
    printed: u64,
}

impl NewestOnly {
    fn admit(&mut self, generation: u64) -> bool {
        if generation <= self.printed {
            return false;
        }
        self.printed = generation;
        true
    }
}

fn render(delivery: Delivery, pretty: bool) -> String {
    let value = match delivery.outcome {
        Ok(result) => json!({
            "generation": delivery.generation,
            "context": delivery.context_text,
            "result": result,
        }),
        Err(e) => json!({
            "generation": delivery.generation,
            "context": delivery.context_text,
            "error": e.to_string(),
        }),
    };
    let rendered = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    rendered.unwrap_or_else(|e| format!(r#"{{"error":"failed to render result: {e}"}}"#))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::from_env()?;
    let engine = EngineConfig::from_env();
    info!(
        kb_files = config.kb_paths.len(),
        mode = %engine.mode,
        debounce_ms = engine.debounce.as_millis(),
        "starting normative-watch"
    );

    let gemini_config = GeminiConfig::from_env();
    let policy = RetryPolicy::new(engine.max_retries, gemini_config.initial_backoff);
    let selector = GeminiSelector::new(GeminiClient::new(gemini_config)?, policy);
    let coordinator = Arc::new(StrategyCoordinator::new(&engine, Arc::new(selector)));
    let knowledge_base = load_knowledge_base(&config.kb_paths).await?;

    let (pipeline, mut deliveries) = SuggestionPipeline::spawn(
        coordinator,
        knowledge_base,
        StrategySelection::from(&engine),
        engine.debounce,
    );

    let pretty = config.pretty;
    let printer = tokio::spawn(async move {
        let mut newest = NewestOnly::default();
        while let Some(delivery) = deliveries.recv().await {
            if !newest.admit(delivery.generation) {
                warn!(generation = delivery.generation, "dropping out-of-order suggestion result");
                continue;
            }
            println!("{}", render(delivery, pretty));
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Ok(Input::Context(text)) => pipeline.notify(text),
            Ok(Input::SetMode(mode)) => {
                info!(%mode, "mode changed");
                pipeline.set_mode(mode);
            }
            Ok(Input::SetApiKey(key)) => {
                info!(api_key = key.is_some(), "api key updated");
                pipeline.set_api_key(key);
            }
            Err(e) => warn!(error = %e, "ignoring input line"),
        }
    }

    info!("input closed, waiting for in-flight suggestions");
    pipeline.finish().await;
    printer.await?;
    Ok(())
}
