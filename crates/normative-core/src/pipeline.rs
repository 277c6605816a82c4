/// Debounced suggestion pipeline.
///
/// Couples a [`Debouncer`] to the [`StrategyCoordinator`]. Every debounced trigger gets the
/// next generation number and runs in its own task to completion (retries included). When it
/// completes, its outcome is delivered only if no newer trigger has fired in the meantime, so
/// the consumer never renders a result for a superseded context.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::coordinator::StrategyCoordinator;
use crate::debounce::Debouncer;
use crate::error::SuggestError;
use crate::knowledge_base::KnowledgeBase;
use crate::model::{SuggestionMode, SuggestionQuery, SuggestionResult};

/// Mode and credential read at the moment a trigger fires.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StrategySelection {
    pub mode: SuggestionMode,
    pub api_key: Option<String>,
}

impl From<&EngineConfig> for StrategySelection {
    fn from(config: &EngineConfig) -> Self {
        Self {
            mode: config.mode,
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Delivery {
    pub generation: u64,
    pub context_text: String,
    pub outcome: Result<SuggestionResult, SuggestError>,
}

pub struct SuggestionPipeline {
    debouncer: Debouncer,
    selection: watch::Sender<StrategySelection>,
    last_text: Arc<Mutex<Option<String>>>,
    /// Newest fired generation. Bumping it and the stale check plus send both happen under
    /// this lock, so a superseded result can never be sent after a newer one.
    latest: Arc<Mutex<u64>>,
}

impl SuggestionPipeline {
    pub fn spawn(
        coordinator: Arc<StrategyCoordinator>,
        knowledge_base: KnowledgeBase,
        selection: StrategySelection,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (selection_tx, selection_rx) = watch::channel(selection);
        let latest = Arc::new(Mutex::new(0u64));

        let fire_latest = Arc::clone(&latest);
        let debouncer = Debouncer::spawn(debounce, move |context_text: String| {
            let generation = {
                let mut latest = fire_latest.lock().unwrap_or_else(PoisonError::into_inner);
                *latest += 1;
                *latest
            };
            let current = selection_rx.borrow().clone();
            let query = SuggestionQuery {
                context_text: context_text.clone(),
                mode: current.mode,
                api_key: current.api_key,
            };
            debug!(generation, mode = %query.mode, "suggestion trigger fired");

            let coordinator = Arc::clone(&coordinator);
            let knowledge_base = knowledge_base.clone();
            let latest = Arc::clone(&fire_latest);
            let tx = delivery_tx.clone();
            tokio::spawn(async move {
                let outcome = coordinator.suggest(&query, &knowledge_base).await;
                let newest = latest.lock().unwrap_or_else(PoisonError::into_inner);
                if *newest != generation {
                    info!(generation, newest = *newest, "discarding stale suggestion result");
                    return;
                }
                let _ = tx.send(Delivery {
                    generation,
                    context_text,
                    outcome,
                });
            });
        });

        let pipeline = Self {
            debouncer,
            selection: selection_tx,
            last_text: Arc::new(Mutex::new(None)),
            latest,
        };
        (pipeline, delivery_rx)
    }

    /// Feed one raw "selection changed" event.
    pub fn notify(&self, context_text: impl Into<String>) {
        let text = context_text.into();
        if let Ok(mut last) = self.last_text.lock() {
            *last = Some(text.clone());
        }
        self.debouncer.notify(text);
    }

    /// Switch strategy and re-trigger with the last seen context, if any.
    pub fn set_mode(&self, mode: SuggestionMode) {
        self.selection.send_modify(|s| s.mode = mode);
        self.retrigger();
    }

    /// Replace the API key used by subsequent triggers.
    pub fn set_api_key(&self, api_key: Option<String>) {
        self.selection.send_modify(|s| s.api_key = api_key);
    }

    /// Generation of the most recently fired trigger (0 before the first one).
    pub fn latest_generation(&self) -> u64 {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire pending input and stop. The delivery channel closes once in-flight work ends.
    pub async fn finish(self) {
        self.debouncer.finish().await;
    }

    fn retrigger(&self) {
        let last = self.last_text.lock().ok().and_then(|l| l.clone());
        if let Some(text) = last {
            self.debouncer.notify(text);
        }
    }
}
