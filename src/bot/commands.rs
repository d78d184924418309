// src/bot/commands.rs - Slash-command handlers

use async_trait::async_trait;
use log::{debug, info};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bot::evaluator::UNSUPPORTED_COMMAND;
use crate::bot::messages::{render, MessageTemplates};
use crate::platforms::Transport;
use crate::types::{CollaboratorError, Event};

/// What a command handler gets to work with
pub struct CommandContext<'a> {
    pub event: &'a Event,
    pub templates: &'a MessageTemplates,
    pub transport: &'a dyn Transport,
}

impl CommandContext<'_> {
    /// Answer the command in its own thread, as a reply to it
    async fn reply(&self, text: &str) -> Result<(), CollaboratorError> {
        self.transport
            .send_reply(
                &self.event.chat_id,
                text,
                self.event.thread_id.as_deref(),
                Some(&self.event.message_id),
            )
            .await
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<(), CollaboratorError>;
}

/// `/newbie` - repost the welcome text
pub struct NewbieCommand;

#[async_trait]
impl CommandHandler for NewbieCommand {
    fn name(&self) -> &str {
        "newbie"
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<(), CollaboratorError> {
        ctx.reply(&ctx.templates.welcome_anonymous()).await
    }
}

/// `/lastcall cost=600 vialdonors=2 vdvalue=20` - group test cost split
pub struct LastCallCommand;

#[async_trait]
impl CommandHandler for LastCallCommand {
    fn name(&self) -> &str {
        "lastcall"
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<(), CollaboratorError> {
        let member_count = ctx.transport.chat_member_count(&ctx.event.chat_id).await?;
        let text = lastcall_message(ctx.templates, &ctx.event.normalized_text, member_count);
        ctx.reply(&text).await
    }
}

/// `/safety` - a random harm-reduction link
pub struct SafetyCommand;

#[async_trait]
impl CommandHandler for SafetyCommand {
    fn name(&self) -> &str {
        "safety"
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<(), CollaboratorError> {
        let link = pick(&ctx.templates.safety_links).unwrap_or_default();
        ctx.reply(&ctx.templates.safety(link)).await
    }
}

/// Fallback for everything not registered
pub struct UnsupportedCommand;

#[async_trait]
impl CommandHandler for UnsupportedCommand {
    fn name(&self) -> &str {
        UNSUPPORTED_COMMAND
    }

    async fn handle(&self, ctx: &CommandContext<'_>) -> Result<(), CollaboratorError> {
        ctx.reply(&ctx.templates.unsupported_command).await
    }
}

/// Pick a random entry, `None` for an empty list
pub fn pick(items: &[String]) -> Option<&str> {
    if items.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..items.len());
    Some(items[index].as_str())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostSplit {
    pub cost: f64,
    pub vial_donors: u32,
    pub donor_value: f64,
    pub per_member: f64,
    pub per_donor: f64,
}

/// Parse `key=value` arguments and split the cost across the chat's members.
/// `member_count` includes the bot itself.
pub fn split_cost(command_text: &str, member_count: u64) -> Option<CostSplit> {
    let arguments: HashMap<&str, &str> = command_text
        .split_whitespace()
        .skip(1)
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let cost: f64 = arguments.get("cost")?.parse().ok()?;
    let vial_donors: u32 = arguments.get("vialdonors")?.parse().ok()?;
    let donor_value: f64 = match arguments.get("vdvalue") {
        Some(raw) => raw.parse().ok()?,
        None => 0.0,
    };

    let members = member_count.saturating_sub(1);
    if !cost.is_finite() || !donor_value.is_finite() || members <= u64::from(vial_donors) {
        return None;
    }

    let per_member = (cost + f64::from(vial_donors) * donor_value) / members as f64;
    Some(CostSplit {
        cost,
        vial_donors,
        donor_value,
        per_member,
        per_donor: per_member - donor_value,
    })
}

/// The `/lastcall` announcement, or the usage text when the arguments don't work out
pub fn lastcall_message(templates: &MessageTemplates, command_text: &str, member_count: u64) -> String {
    let Some(split) = split_cost(command_text, member_count) else {
        debug!("Invalid /lastcall arguments: {}", command_text);
        return render(&templates.lastcall_usage, &[]);
    };

    let donor_note = if split.vial_donors > 0 {
        let note = render(
            &templates.lastcall_donor_note,
            &[("vdvalue", &format!("{:.2}", split.donor_value))],
        );
        format!("\n\n{}", note)
    } else {
        String::new()
    };

    render(
        &templates.lastcall,
        &[
            ("cost", &format!("{:.2}", split.cost)),
            ("split", &format!("{:.2}", split.per_member)),
            ("donor_split", &format!("{:.2}", split.per_donor)),
            ("donor_note", &donor_note),
        ],
    )
}

/// Command handlers by name, with a fallback for unknown names
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    fallback: Arc<dyn CommandHandler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(UnsupportedCommand),
        }
    }

    /// Registry with the built-in commands
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NewbieCommand));
        registry.register(Arc::new(LastCallCommand));
        registry.register(Arc::new(SafetyCommand));
        registry.register(Arc::new(UnsupportedCommand));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        let name = handler.name().to_lowercase();
        info!("Registered command: /{}", name);
        self.handlers.insert(name, handler);
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Arc<dyn CommandHandler> {
        self.handlers
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::{DryRunTransport, TransportOperation};
    use crate::types::EventKind;

    fn command(text: &str) -> Event {
        Event {
            kind: EventKind::Command,
            chat_id: "-1001".to_string(),
            thread_id: Some("5".to_string()),
            message_id: "31".to_string(),
            sender_id: "42".to_string(),
            sender_handle: Some("sam".to_string()),
            sender_display_name: None,
            raw_text: text.to_string(),
            normalized_text: text.to_string(),
            has_document: false,
            has_photo: false,
            attachment_file_id: None,
            membership: None,
        }
    }

    #[test]
    fn test_cost_split_arithmetic() {
        // 11 members reported, one is the bot
        let split = split_cost("/lastcall cost=600 vialdonors=2 vdvalue=20", 11).unwrap();

        assert_eq!(split.cost, 600.0);
        assert_eq!(split.vial_donors, 2);
        assert!((split.per_member - 64.0).abs() < 1e-9);
        assert!((split.per_donor - 44.0).abs() < 1e-9);
    }

    #[test]
    fn test_cost_split_rejects_bad_input() {
        assert!(split_cost("/lastcall", 11).is_none());
        assert!(split_cost("/lastcall cost=abc vialdonors=1", 11).is_none());
        assert!(split_cost("/lastcall cost=100", 11).is_none());
        assert!(split_cost("/lastcall cost=100 vialdonors=-1", 11).is_none());
        // Nobody left to split with
        assert!(split_cost("/lastcall cost=100 vialdonors=10", 11).is_none());
        assert!(split_cost("/lastcall cost=100 vialdonors=0", 1).is_none());
    }

    #[test]
    fn test_lastcall_message_variants() {
        let templates = MessageTemplates::default();

        let with_donors = lastcall_message(&templates, "/lastcall cost=600 vialdonors=2 vdvalue=20", 11);
        assert!(with_donors.contains("$600.00"));
        assert!(with_donors.contains("$64.00 (non-vial)"));
        assert!(with_donors.contains("$44.00 (vial donor)"));
        assert!(with_donors.contains("$20.00"));

        let without_donors = lastcall_message(&templates, "/lastcall cost=100 vialdonors=0", 5);
        assert!(without_donors.contains("$25.00 (non-vial)"));
        assert!(!without_donors.contains("NOTE"));

        let usage = lastcall_message(&templates, "/lastcall please", 5);
        assert!(usage.contains("/lastcall cost=600 vialdonors=2 vdvalue=20"));
    }

    #[test]
    fn test_registry_falls_back_to_unsupported() {
        let registry = CommandRegistry::with_defaults();

        assert_eq!(registry.names(), vec!["lastcall", "newbie", "safety", "unsupported"]);
        assert_eq!(registry.get("SAFETY").name(), "safety");
        assert_eq!(registry.get("nope").name(), "unsupported");
    }

    #[tokio::test]
    async fn test_lastcall_uses_member_count() {
        let transport = DryRunTransport::recording().with_member_count(11);
        let templates = MessageTemplates::default();
        let event = command("/lastcall cost=600 vialdonors=2 vdvalue=20");
        let ctx = CommandContext {
            event: &event,
            templates: &templates,
            transport: &transport,
        };

        LastCallCommand.handle(&ctx).await.unwrap();

        match &transport.operations().await[..] {
            [TransportOperation::Reply { chat_id, text, thread_id, reply_to }] => {
                assert_eq!(chat_id, "-1001");
                assert!(text.contains("$64.00"));
                assert_eq!(thread_id.as_deref(), Some("5"));
                assert_eq!(reply_to.as_deref(), Some("31"));
            }
            other => panic!("unexpected operations: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_safety_and_unsupported_replies() {
        let transport = DryRunTransport::recording();
        let templates = MessageTemplates::default();
        let event = command("/safety");
        let ctx = CommandContext {
            event: &event,
            templates: &templates,
            transport: &transport,
        };

        SafetyCommand.handle(&ctx).await.unwrap();
        UnsupportedCommand.handle(&ctx).await.unwrap();

        let replies = transport.replies().await;
        assert!(replies[0].starts_with("Did someone say Safety?"));
        assert!(templates.safety_links.iter().any(|link| replies[0].ends_with(link.as_str())));
        assert_eq!(replies[1], "tehehe stop poking me. this command doesn't do anything.");
    }

    #[test]
    fn test_pick_from_empty_list() {
        assert_eq!(pick(&[]), None);
        assert_eq!(pick(&["only".to_string()]), Some("only"));
    }
}
