//! # chatwarden
//!
//! Rule-driven moderation and auto-response engine for Telegram group chats.
//!
//! Webhook updates are normalized into platform-neutral events, run through an
//! ordered pipeline of rule steps against an immutable snapshot of the YAML rule
//! documents, and turned into exactly one action per event.
//!
//! ## Features
//!
//! - **Ordered rule pipeline**: commands, welcomes, auto-removal, banned topics,
//!   newbie FAQ, test-result ingestion and link moderation
//! - **Hot reload**: rule documents are recompiled and swapped atomically
//! - **Exemptions**: moderator handles and exempt threads per rule family
//! - **Dry run**: log every reply and deletion instead of calling Telegram
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwarden::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = EngineSettings::from_env()?;
//!     let config = ConfigurationManager::new(&settings.config_dir);
//!     config.initialize().await?;
//!
//!     let bot = ModerationBot::new(
//!         &settings,
//!         config,
//!         Arc::new(DryRunTransport::new()),
//!         Arc::new(UnconfiguredExtractor),
//!     );
//!     bot.handle_update(br#"{"update_id": 1}"#).await?;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod platforms;
pub mod types;

#[cfg(feature = "web")]
pub mod web;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used items
pub mod prelude {
    pub use crate::bot::evaluator::RuleEvaluator;
    pub use crate::bot::extraction::{Extractor, UnconfiguredExtractor};
    pub use crate::bot::{HandledUpdate, ModerationBot};
    pub use crate::config::{ConfigurationManager, EngineSettings, ModerationConfiguration};
    pub use crate::platforms::{DryRunTransport, TelegramClient, TelegramConfig, Transport};
    pub use crate::types::{Action, CollaboratorError, Event, EventKind};
    #[cfg(feature = "web")]
    pub use crate::web::WebhookServer;
    pub use anyhow::Result;
}
