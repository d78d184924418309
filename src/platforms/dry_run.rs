// src/platforms/dry_run.rs - Transport that logs instead of calling the platform

use async_trait::async_trait;
use log::info;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::platforms::Transport;
use crate::types::{CollaboratorError, MemberStatus};

/// A side effect the transport was asked to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOperation {
    Reply {
        chat_id: String,
        text: String,
        thread_id: Option<String>,
        reply_to: Option<String>,
    },
    Delete {
        chat_id: String,
        message_id: String,
    },
    SetWebhook {
        url: String,
    },
}

/// Logs what would be sent instead of talking to the platform.
/// Only a `recording()` transport keeps the operations it was asked for.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    record: bool,
    operations: RwLock<Vec<TransportOperation>>,
    member_count: u64,
    members: HashMap<(String, String), MemberStatus>,
    fail_replies: bool,
    fail_deletes: bool,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every operation for later inspection
    pub fn recording() -> Self {
        Self {
            record: true,
            ..Self::default()
        }
    }

    pub fn with_member_count(mut self, count: u64) -> Self {
        self.member_count = count;
        self
    }

    /// Report `status` for `user_id` in `chat_id`; everyone else has left
    pub fn with_member(mut self, chat_id: &str, user_id: &str, status: MemberStatus) -> Self {
        self.members
            .insert((chat_id.to_string(), user_id.to_string()), status);
        self
    }

    /// Reject every reply; deletions are still recorded
    #[cfg(test)]
    pub fn failing_replies(mut self) -> Self {
        self.fail_replies = true;
        self
    }

    /// Reject every deletion
    #[cfg(test)]
    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub async fn operations(&self) -> Vec<TransportOperation> {
        self.operations.read().await.clone()
    }

    /// Texts of all recorded replies, in order
    pub async fn replies(&self) -> Vec<String> {
        self.operations
            .read()
            .await
            .iter()
            .filter_map(|op| match op {
                TransportOperation::Reply { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    async fn push(&self, operation: TransportOperation) {
        if self.record {
            self.operations.write().await.push(operation);
        }
    }
}

#[async_trait]
impl Transport for DryRunTransport {
    async fn send_reply(
        &self,
        chat_id: &str,
        text: &str,
        thread_id: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<(), CollaboratorError> {
        if self.fail_replies {
            return Err(CollaboratorError::Rejected("replies disabled".to_string()));
        }

        info!(
            "Would send to {} (thread {:?}, reply to {:?}): {}",
            chat_id, thread_id, reply_to, text
        );
        self.push(TransportOperation::Reply {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            thread_id: thread_id.map(str::to_string),
            reply_to: reply_to.map(str::to_string),
        })
        .await;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), CollaboratorError> {
        if self.fail_deletes {
            return Err(CollaboratorError::Rejected("deletes disabled".to_string()));
        }

        info!("Would delete message {} in {}", message_id, chat_id);
        self.push(TransportOperation::Delete {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        })
        .await;
        Ok(())
    }

    async fn chat_member_count(&self, _chat_id: &str) -> Result<u64, CollaboratorError> {
        Ok(self.member_count)
    }

    async fn member_status(&self, chat_id: &str, user_id: &str) -> Result<MemberStatus, CollaboratorError> {
        Ok(self
            .members
            .get(&(chat_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(MemberStatus::Left))
    }

    async fn set_webhook(&self, url: &str) -> Result<(), CollaboratorError> {
        info!("Would register webhook {}", url);
        self.push(TransportOperation::SetWebhook { url: url.to_string() }).await;
        Ok(())
    }

    fn platform_name(&self) -> &str {
        "dry_run"
    }
}
