// src/bot/executor.rs - Carries out decided actions against the transport

use log::{error, info, warn};
use std::sync::Arc;

use crate::bot::analytics::EngineStats;
use crate::bot::commands::{CommandContext, CommandRegistry};
use crate::bot::evaluator::EXTRACT_TEST_RESULT;
use crate::bot::extraction::Extractor;
use crate::bot::messages::MessageTemplates;
use crate::platforms::Transport;
use crate::types::{Action, CollaboratorError, Event};

/// Performs the side effect of a decided action. Never evaluates rules,
/// never retries, never propagates a collaborator failure.
pub struct ActionExecutor {
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn Extractor>,
    commands: Arc<CommandRegistry>,
    stats: Arc<EngineStats>,
}

impl ActionExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn Extractor>,
        commands: Arc<CommandRegistry>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            transport,
            extractor,
            commands,
            stats,
        }
    }

    pub async fn execute(&self, event: &Event, action: &Action, templates: &MessageTemplates) {
        match action {
            Action::NoOp => {}
            Action::Reply {
                text,
                thread_id,
                reply_to,
            } => {
                self.reply(event, text, thread_id.as_deref(), reply_to.as_deref()).await;
            }
            Action::ReplyAndDelete {
                text,
                thread_id,
                reply_to,
                delete_message_id,
            } => {
                // The delete goes ahead even when the notice could not be posted
                self.reply(event, text, thread_id.as_deref(), reply_to.as_deref()).await;
                self.delete(event, delete_message_id).await;
            }
            Action::DeleteSilently { message_id } => {
                self.delete(event, message_id).await;
            }
            Action::Dispatch { handler_name } if handler_name == EXTRACT_TEST_RESULT => {
                self.extract_test_result(event, templates).await;
            }
            Action::Dispatch { handler_name } => {
                self.run_command(event, handler_name, templates).await;
            }
        }
    }

    async fn reply(&self, event: &Event, text: &str, thread_id: Option<&str>, reply_to: Option<&str>) {
        if let Err(e) = self
            .transport
            .send_reply(&event.chat_id, text, thread_id, reply_to)
            .await
        {
            self.failed("send reply", event, &e);
        }
    }

    async fn delete(&self, event: &Event, message_id: &str) {
        match self.transport.delete_message(&event.chat_id, message_id).await {
            Ok(()) => info!("Deleted message {} in {}", message_id, event.chat_id),
            Err(e) => self.failed("delete message", event, &e),
        }
    }

    async fn extract_test_result(&self, event: &Event, templates: &MessageTemplates) {
        let text = match self.extractor.extract_and_summarize(event).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Could not extract test result from message {}: {}", event.message_id, e);
                self.stats.record_collaborator_failure();
                templates.unsupported_format.clone()
            }
        };
        self.reply(event, &text, event.thread_id.as_deref(), None).await;
    }

    async fn run_command(&self, event: &Event, name: &str, templates: &MessageTemplates) {
        let handler = self.commands.get(name);
        let ctx = CommandContext {
            event,
            templates,
            transport: self.transport.as_ref(),
        };

        info!("Executing command '{}' for {} in {}", handler.name(), event.sender_id, event.chat_id);
        if let Err(e) = handler.handle(&ctx).await {
            self.failed(&format!("run /{}", name), event, &e);
        }
    }

    fn failed(&self, what: &str, event: &Event, e: &CollaboratorError) {
        error!("Failed to {} for message {} in {}: {}", what, event.message_id, event.chat_id, e);
        self.stats.record_collaborator_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::extraction::UnconfiguredExtractor;
    use crate::platforms::{DryRunTransport, TransportOperation};
    use crate::types::EventKind;
    use async_trait::async_trait;

    struct FixedExtractor;

    #[async_trait]
    impl Extractor for FixedExtractor {
        async fn extract_and_summarize(&self, _event: &Event) -> Result<String, CollaboratorError> {
            Ok("Tirzepatide 10mg: 98.7% purity".to_string())
        }
    }

    fn event() -> Event {
        Event {
            kind: EventKind::Message,
            chat_id: "-1001".to_string(),
            thread_id: Some("9".to_string()),
            message_id: "55".to_string(),
            sender_id: "42".to_string(),
            sender_handle: None,
            sender_display_name: None,
            raw_text: String::new(),
            normalized_text: "/newbie".to_string(),
            has_document: true,
            has_photo: false,
            attachment_file_id: Some("file-1".to_string()),
            membership: None,
        }
    }

    fn executor(transport: Arc<DryRunTransport>, extractor: Arc<dyn Extractor>) -> (ActionExecutor, Arc<EngineStats>) {
        let stats = Arc::new(EngineStats::new());
        let executor = ActionExecutor::new(
            transport,
            extractor,
            Arc::new(CommandRegistry::with_defaults()),
            Arc::clone(&stats),
        );
        (executor, stats)
    }

    fn reply_and_delete() -> Action {
        Action::ReplyAndDelete {
            text: "no links".to_string(),
            thread_id: Some("9".to_string()),
            reply_to: None,
            delete_message_id: "55".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reply_then_delete() {
        let transport = Arc::new(DryRunTransport::recording());
        let (executor, _) = executor(transport.clone(), Arc::new(UnconfiguredExtractor));

        executor
            .execute(&event(), &reply_and_delete(), &MessageTemplates::default())
            .await;

        assert_eq!(
            transport.operations().await,
            vec![
                TransportOperation::Reply {
                    chat_id: "-1001".to_string(),
                    text: "no links".to_string(),
                    thread_id: Some("9".to_string()),
                    reply_to: None,
                },
                TransportOperation::Delete {
                    chat_id: "-1001".to_string(),
                    message_id: "55".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_runs_after_failed_reply() {
        let transport = Arc::new(DryRunTransport::recording().failing_replies());
        let (executor, stats) = executor(transport.clone(), Arc::new(UnconfiguredExtractor));

        executor
            .execute(&event(), &reply_and_delete(), &MessageTemplates::default())
            .await;

        assert_eq!(
            transport.operations().await,
            vec![TransportOperation::Delete {
                chat_id: "-1001".to_string(),
                message_id: "55".to_string(),
            }]
        );
        assert_eq!(stats.snapshot().collaborator_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_delete_is_logged_and_counted() {
        let transport = Arc::new(DryRunTransport::recording().failing_deletes());
        let (executor, stats) = executor(transport.clone(), Arc::new(UnconfiguredExtractor));

        executor
            .execute(&event(), &reply_and_delete(), &MessageTemplates::default())
            .await;

        assert_eq!(transport.replies().await, vec!["no links".to_string()]);
        assert_eq!(transport.operations().await.len(), 1);
        assert_eq!(stats.snapshot().collaborator_failures, 1);
    }

    #[tokio::test]
    async fn test_extraction_failure_becomes_fallback_reply() {
        let transport = Arc::new(DryRunTransport::recording());
        let (executor, _) = executor(transport.clone(), Arc::new(UnconfiguredExtractor));
        let templates = MessageTemplates::default();

        executor
            .execute(
                &event(),
                &Action::Dispatch {
                    handler_name: EXTRACT_TEST_RESULT.to_string(),
                },
                &templates,
            )
            .await;

        assert_eq!(transport.replies().await, vec![templates.unsupported_format.clone()]);
    }

    #[tokio::test]
    async fn test_extraction_summary_is_posted_in_thread() {
        let transport = Arc::new(DryRunTransport::recording());
        let (executor, _) = executor(transport.clone(), Arc::new(FixedExtractor));

        executor
            .execute(
                &event(),
                &Action::Dispatch {
                    handler_name: EXTRACT_TEST_RESULT.to_string(),
                },
                &MessageTemplates::default(),
            )
            .await;

        match &transport.operations().await[..] {
            [TransportOperation::Reply { text, thread_id, .. }] => {
                assert_eq!(text, "Tirzepatide 10mg: 98.7% purity");
                assert_eq!(thread_id.as_deref(), Some("9"));
            }
            other => panic!("unexpected operations: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_noop_and_silent_delete() {
        let transport = Arc::new(DryRunTransport::recording());
        let (executor, _) = executor(transport.clone(), Arc::new(UnconfiguredExtractor));
        let templates = MessageTemplates::default();

        executor.execute(&event(), &Action::NoOp, &templates).await;
        assert!(transport.operations().await.is_empty());

        executor
            .execute(
                &event(),
                &Action::DeleteSilently {
                    message_id: "55".to_string(),
                },
                &templates,
            )
            .await;
        assert_eq!(transport.replies().await.len(), 0);
        assert_eq!(transport.operations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_command_dispatch() {
        let transport = Arc::new(DryRunTransport::recording());
        let (executor, _) = executor(transport.clone(), Arc::new(UnconfiguredExtractor));
        let templates = MessageTemplates::default();

        executor
            .execute(
                &event(),
                &Action::Dispatch {
                    handler_name: "newbie".to_string(),
                },
                &templates,
            )
            .await;

        assert_eq!(transport.replies().await, vec![templates.welcome_anonymous()]);
    }
}
