// src/bot/exemptions.rs - Per-family exemption policy

use serde::Serialize;
use std::collections::HashSet;

use crate::types::Event;

/// The rule families the evaluator consults exemptions for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFamily {
    BannedTopic,
    AutoRemove,
    LinkBlock,
    NewbieFaq,
}

/// Moderators and automation-exempt threads
#[derive(Debug, Clone, Default)]
pub struct ExemptionSet {
    moderator_handles: HashSet<String>,
    exempt_thread_ids: HashSet<String>,
}

fn canonical_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}

impl ExemptionSet {
    pub fn new<H, T>(moderator_handles: H, exempt_thread_ids: T) -> Self
    where
        H: IntoIterator<Item = String>,
        T: IntoIterator<Item = String>,
    {
        Self {
            moderator_handles: moderator_handles
                .into_iter()
                .map(|h| canonical_handle(&h))
                .filter(|h| !h.is_empty())
                .collect(),
            exempt_thread_ids: exempt_thread_ids
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn moderator_count(&self) -> usize {
        self.moderator_handles.len()
    }

    pub fn is_moderator(&self, event: &Event) -> bool {
        event
            .sender_handle
            .as_deref()
            .is_some_and(|handle| self.moderator_handles.contains(&canonical_handle(handle)))
    }

    pub fn is_exempt_thread(&self, event: &Event) -> bool {
        event
            .thread_id
            .as_deref()
            .is_some_and(|thread| self.exempt_thread_ids.contains(thread))
    }

    /// Banned-topic detection applies to everyone, moderators included.
    pub fn is_exempt(&self, event: &Event, family: RuleFamily) -> bool {
        match family {
            RuleFamily::BannedTopic => false,
            RuleFamily::AutoRemove | RuleFamily::LinkBlock => {
                self.is_moderator(event) || self.is_exempt_thread(event)
            }
            RuleFamily::NewbieFaq => self.is_moderator(event),
        }
    }
}
