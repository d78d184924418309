// src/bot/analytics.rs - Engine counters served by the status API

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Action;

/// Lock-free counters for everything the engine decided since startup
#[derive(Debug)]
pub struct EngineStats {
    started_at: DateTime<Utc>,
    events: AtomicU64,
    no_op: AtomicU64,
    replies: AtomicU64,
    reply_and_delete: AtomicU64,
    silent_deletes: AtomicU64,
    dispatches: AtomicU64,
    malformed_payloads: AtomicU64,
    ignored_updates: AtomicU64,
    collaborator_failures: AtomicU64,
}

/// Point-in-time copy of the counters, served by the status API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub events: u64,
    pub no_op: u64,
    pub replies: u64,
    pub reply_and_delete: u64,
    pub silent_deletes: u64,
    pub dispatches: u64,
    pub malformed_payloads: u64,
    pub ignored_updates: u64,
    pub collaborator_failures: u64,
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            events: AtomicU64::new(0),
            no_op: AtomicU64::new(0),
            replies: AtomicU64::new(0),
            reply_and_delete: AtomicU64::new(0),
            silent_deletes: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            malformed_payloads: AtomicU64::new(0),
            ignored_updates: AtomicU64::new(0),
            collaborator_failures: AtomicU64::new(0),
        }
    }

    pub fn record_action(&self, action: &Action) {
        self.events.fetch_add(1, Ordering::Relaxed);
        let counter = match action {
            Action::NoOp => &self.no_op,
            Action::Reply { .. } => &self.replies,
            Action::ReplyAndDelete { .. } => &self.reply_and_delete,
            Action::DeleteSilently { .. } => &self.silent_deletes,
            Action::Dispatch { .. } => &self.dispatches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Valid update with nothing for the engine to look at
    pub fn record_ignored(&self) {
        self.ignored_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collaborator_failure(&self) {
        self.collaborator_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            uptime_seconds: Utc::now().signed_duration_since(self.started_at).num_seconds(),
            events: self.events.load(Ordering::Relaxed),
            no_op: self.no_op.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            reply_and_delete: self.reply_and_delete.load(Ordering::Relaxed),
            silent_deletes: self.silent_deletes.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            ignored_updates: self.ignored_updates.load(Ordering::Relaxed),
            collaborator_failures: self.collaborator_failures.load(Ordering::Relaxed),
        }
    }
}
