// src/bot/evaluator.rs - Ordered rule-evaluation pipeline

use log::debug;
use std::collections::HashSet;

use crate::bot::exemptions::{ExemptionSet, RuleFamily};
use crate::bot::pattern_matching::first_match_in;
use crate::config::{ChatRouting, ModerationConfiguration};
use crate::types::{Action, Event, EventKind, ThreadRole};

pub const UNSUPPORTED_COMMAND: &str = "unsupported";
pub const EXTRACT_TEST_RESULT: &str = "extract_test_result";

/// Result of a single pipeline step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Decide(Action),
}

/// Everything a step may look at. Steps perform no I/O.
pub struct StepInput<'a> {
    pub event: &'a Event,
    pub config: &'a ModerationConfiguration,
    pub exemptions: &'a ExemptionSet,
    pub routing: &'a ChatRouting,
    pub known_commands: &'a HashSet<String>,
    pub role: Option<ThreadRole>,
}

pub type Step = fn(&StepInput<'_>) -> StepOutcome;

/// Evaluation order. The first step that decides wins.
pub const PIPELINE: &[(&str, Step)] = &[
    ("command_dispatch", command_dispatch),
    ("scope_filter", scope_filter),
    ("membership_welcome", membership_welcome),
    ("auto_remove", auto_remove),
    ("banned_topic", banned_topic),
    ("newbie_faq", newbie_faq),
    ("test_result_ingestion", test_result_ingestion),
    ("link_moderation", link_moderation),
];

/// The chosen action and the step that chose it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub step: Option<&'static str>,
    pub action: Action,
}

pub struct RuleEvaluator {
    routing: ChatRouting,
    known_commands: HashSet<String>,
}

impl RuleEvaluator {
    pub fn new<I>(routing: ChatRouting, known_commands: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            routing,
            known_commands: known_commands.into_iter().map(|c| c.to_lowercase()).collect(),
        }
    }

    pub fn evaluate(&self, event: &Event, config: &ModerationConfiguration, exemptions: &ExemptionSet) -> Action {
        self.decide(event, config, exemptions).action
    }

    /// Like `evaluate`, but also reports which step decided
    pub fn decide(&self, event: &Event, config: &ModerationConfiguration, exemptions: &ExemptionSet) -> Decision {
        let input = StepInput {
            event,
            config,
            exemptions,
            routing: &self.routing,
            known_commands: &self.known_commands,
            role: self.routing.thread_role(&event.chat_id, event.thread_id.as_deref()),
        };

        for &(name, step) in PIPELINE {
            if let StepOutcome::Decide(action) = step(&input) {
                debug!("Step '{}' decided {} for message {}", name, action.kind(), event.message_id);
                return Decision {
                    step: Some(name),
                    action,
                };
            }
        }

        Decision {
            step: None,
            action: Action::NoOp,
        }
    }
}

/// Command name from a leading `/token`, lower-cased, without any `@botname` suffix
pub fn command_name(text: &str) -> Option<String> {
    let token = text.split_whitespace().next()?.strip_prefix('/')?;
    let name = token.split('@').next().unwrap_or_default();
    Some(name.to_lowercase())
}

fn command_dispatch(input: &StepInput<'_>) -> StepOutcome {
    if input.event.kind != EventKind::Command {
        return StepOutcome::Continue;
    }

    let handler_name = match command_name(&input.event.normalized_text) {
        Some(name) if input.known_commands.contains(&name) => name,
        _ => UNSUPPORTED_COMMAND.to_string(),
    };
    StepOutcome::Decide(Action::Dispatch { handler_name })
}

fn scope_filter(input: &StepInput<'_>) -> StepOutcome {
    if input.routing.is_moderated(&input.event.chat_id) {
        StepOutcome::Continue
    } else {
        StepOutcome::Decide(Action::NoOp)
    }
}

fn membership_welcome(input: &StepInput<'_>) -> StepOutcome {
    if input.event.kind != EventKind::MembershipChange {
        return StepOutcome::Continue;
    }

    match input.event.membership {
        Some(transition) if transition.is_join() => StepOutcome::Decide(Action::Reply {
            text: input.config.templates.welcome(input.event),
            thread_id: None,
            reply_to: None,
        }),
        _ => StepOutcome::Decide(Action::NoOp),
    }
}

fn auto_remove(input: &StepInput<'_>) -> StepOutcome {
    let event = input.event;
    if event.normalized_text.is_empty() || input.exemptions.is_exempt(event, RuleFamily::AutoRemove) {
        return StepOutcome::Continue;
    }

    let Some(found) = first_match_in(&input.config.auto_remove_topics, &event.normalized_text, input.role) else {
        return StepOutcome::Continue;
    };

    if found.silent {
        return StepOutcome::Decide(Action::DeleteSilently {
            message_id: event.message_id.clone(),
        });
    }

    StepOutcome::Decide(Action::ReplyAndDelete {
        text: input
            .config
            .templates
            .auto_remove_notice(event, found.header, &found.label, found.detail),
        thread_id: event.thread_id.clone(),
        reply_to: None,
        delete_message_id: event.message_id.clone(),
    })
}

fn banned_topic(input: &StepInput<'_>) -> StepOutcome {
    let event = input.event;
    if event.normalized_text.is_empty() || input.exemptions.is_exempt(event, RuleFamily::BannedTopic) {
        return StepOutcome::Continue;
    }

    match first_match_in(&input.config.banned_topics, &event.normalized_text, input.role) {
        Some(found) => StepOutcome::Decide(Action::Reply {
            text: input
                .config
                .templates
                .banned_notice(event, found.header, &found.label, found.detail),
            thread_id: event.thread_id.clone(),
            reply_to: Some(event.message_id.clone()),
        }),
        None => StepOutcome::Continue,
    }
}

fn newbie_faq(input: &StepInput<'_>) -> StepOutcome {
    let event = input.event;
    if input.role != Some(ThreadRole::Newbies)
        || event.normalized_text.is_empty()
        || input.exemptions.is_exempt(event, RuleFamily::NewbieFaq)
    {
        return StepOutcome::Continue;
    }

    match first_match_in(&input.config.newbie_faq_topics, &event.normalized_text, input.role) {
        Some(found) => StepOutcome::Decide(Action::Reply {
            text: input.config.templates.faq_reply(found.header, found.detail),
            thread_id: event.thread_id.clone(),
            reply_to: Some(event.message_id.clone()),
        }),
        None => StepOutcome::Continue,
    }
}

fn test_result_ingestion(input: &StepInput<'_>) -> StepOutcome {
    if input.role == Some(ThreadRole::TestResults) && input.event.has_attachment() {
        StepOutcome::Decide(Action::Dispatch {
            handler_name: EXTRACT_TEST_RESULT.to_string(),
        })
    } else {
        StepOutcome::Continue
    }
}

fn link_moderation(input: &StepInput<'_>) -> StepOutcome {
    let event = input.event;
    let text = event.normalized_text.to_lowercase();
    if text.is_empty() {
        return StepOutcome::Continue;
    }

    let config = input.config;
    if config.link_ignore_domains.iter().any(|domain| text.contains(domain.as_str())) {
        return StepOutcome::Decide(Action::NoOp);
    }

    if !config.link_block_domains.iter().any(|domain| text.contains(domain.as_str()))
        || input.exemptions.is_exempt(event, RuleFamily::LinkBlock)
    {
        return StepOutcome::Continue;
    }

    StepOutcome::Decide(Action::ReplyAndDelete {
        text: config
            .templates
            .dont_link(event, input.role == Some(ThreadRole::GroupTest)),
        thread_id: event.thread_id.clone(),
        reply_to: None,
        delete_message_id: event.message_id.clone(),
    })
}
