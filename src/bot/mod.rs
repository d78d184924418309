// src/bot/mod.rs - Moderation engine entry point

use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{ConfigurationManager, EngineSettings};
use crate::platforms::Transport;
use crate::types::{Action, ConfigLoadError, MalformedEventError};

pub mod analytics;
pub mod commands;
pub mod evaluator;
pub mod executor;
pub mod exemptions;
pub mod extraction;
pub mod messages;
pub mod normalizer;
pub mod pattern_matching;
pub mod timers;

use analytics::EngineStats;
use commands::CommandRegistry;
use evaluator::RuleEvaluator;
use executor::ActionExecutor;
use exemptions::ExemptionSet;
use extraction::Extractor;

/// The decided action plus the detached task carrying out its side effects
pub struct HandledUpdate {
    pub action: Action,
    pub execution: Option<JoinHandle<()>>,
}

impl HandledUpdate {
    fn decided(action: Action) -> Self {
        Self {
            action,
            execution: None,
        }
    }

    /// Wait for the side effects to finish
    pub async fn finished(self) -> Action {
        if let Some(execution) = self.execution {
            if let Err(e) = execution.await {
                error!("Action execution aborted: {}", e);
            }
        }
        self.action
    }
}

/// Core engine: normalize, evaluate against the current snapshot, execute
pub struct ModerationBot {
    config: ConfigurationManager,
    evaluator: RuleEvaluator,
    exemptions: ExemptionSet,
    executor: Arc<ActionExecutor>,
    transport: Arc<dyn Transport>,
    stats: Arc<EngineStats>,
}

impl ModerationBot {
    pub fn new(
        settings: &EngineSettings,
        config: ConfigurationManager,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        let commands = Arc::new(CommandRegistry::with_defaults());
        let stats = Arc::new(EngineStats::new());

        info!("Moderation engine using {} transport", transport.platform_name());

        Self {
            config,
            evaluator: RuleEvaluator::new(settings.routing.clone(), commands.names()),
            exemptions: settings.exemptions.clone(),
            executor: Arc::new(ActionExecutor::new(
                Arc::clone(&transport),
                extractor,
                commands,
                Arc::clone(&stats),
            )),
            transport,
            stats,
        }
    }

    pub fn config(&self) -> &ConfigurationManager {
        &self.config
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Decide what to do with one webhook body and start doing it in the background.
    /// Only a malformed payload is an error; collaborator failures stay inside the
    /// execution task.
    pub async fn handle_update(&self, payload: &[u8]) -> Result<HandledUpdate, MalformedEventError> {
        let event = match normalizer::normalize(payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.stats.record_ignored();
                return Ok(HandledUpdate::decided(Action::NoOp));
            }
            Err(e) => {
                warn!("Rejected webhook payload: {}", e);
                self.stats.record_malformed();
                return Err(e);
            }
        };

        let snapshot = self.config.snapshot().await;
        let decision = self.evaluator.decide(&event, &snapshot, &self.exemptions);
        self.stats.record_action(&decision.action);

        match decision.step {
            Some(step) if !decision.action.is_noop() => info!(
                "{} in {} -> {} (step {}, config generation {})",
                event.message_id,
                event.chat_id,
                decision.action.kind(),
                step,
                snapshot.generation
            ),
            _ => debug!("{} in {} -> no action", event.message_id, event.chat_id),
        }

        if decision.action.is_noop() {
            return Ok(HandledUpdate::decided(decision.action));
        }

        let executor = Arc::clone(&self.executor);
        let action = decision.action.clone();
        let execution = tokio::spawn(async move {
            executor.execute(&event, &action, &snapshot.templates).await;
        });

        Ok(HandledUpdate {
            action: decision.action,
            execution: Some(execution),
        })
    }

    /// Reload the rule documents; the previous snapshot stays on failure
    pub async fn reload_config(&self) -> Result<u64, ConfigLoadError> {
        let snapshot = self.config.reload().await?;
        Ok(snapshot.generation)
    }
}
