// src/platforms/mod.rs - Outbound transport seam

use async_trait::async_trait;

use crate::types::{CollaboratorError, MemberStatus};

pub mod dry_run;
pub mod telegram;

pub use dry_run::{DryRunTransport, TransportOperation};
pub use telegram::{TelegramClient, TelegramConfig};

/// Outbound side of a chat platform. Every call is best-effort: callers
/// log failures and move on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a message, optionally inside a forum thread and as a reply
    async fn send_reply(
        &self,
        chat_id: &str,
        text: &str,
        thread_id: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<(), CollaboratorError>;

    /// Remove a message from a chat
    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), CollaboratorError>;

    /// Number of members in a chat, the bot included
    async fn chat_member_count(&self, chat_id: &str) -> Result<u64, CollaboratorError>;

    /// Membership status of one user in a chat
    async fn member_status(&self, chat_id: &str, user_id: &str) -> Result<MemberStatus, CollaboratorError>;

    /// Point the platform's update delivery at `url`
    async fn set_webhook(&self, url: &str) -> Result<(), CollaboratorError>;

    /// Get the platform identifier (e.g., "telegram", "dry_run")
    fn platform_name(&self) -> &str;
}
