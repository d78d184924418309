// src/types/mod.rs - Core event, action and rule document types

use serde::{Deserialize, Serialize};

pub mod errors;

pub use errors::{
    CollaboratorError, ConfigLoadError, MalformedEventError, MatchEvaluationError, RuleCompileError,
};

/// Classification of an inbound chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    EditedMessage,
    MembershipChange,
    Command,
}

/// Membership status of a chat participant as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted { is_member: bool },
    Left,
    Kicked,
}

impl MemberStatus {
    /// Parse a Telegram status string. Unknown statuses are treated as not-a-member.
    pub fn from_platform(status: &str, is_member: Option<bool>) -> Self {
        match status {
            "creator" | "owner" => MemberStatus::Creator,
            "administrator" => MemberStatus::Administrator,
            "member" => MemberStatus::Member,
            "restricted" => MemberStatus::Restricted {
                is_member: is_member.unwrap_or(false),
            },
            "kicked" | "banned" => MemberStatus::Kicked,
            _ => MemberStatus::Left,
        }
    }

    pub fn is_member(&self) -> bool {
        match self {
            MemberStatus::Creator | MemberStatus::Administrator | MemberStatus::Member => true,
            MemberStatus::Restricted { is_member } => *is_member,
            MemberStatus::Left | MemberStatus::Kicked => false,
        }
    }
}

/// Old and new membership status carried by a membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipTransition {
    pub from: MemberStatus,
    pub to: MemberStatus,
}

impl MembershipTransition {
    /// The legacy "new participant" shape: always a fresh join
    pub fn legacy_join() -> Self {
        Self {
            from: MemberStatus::Left,
            to: MemberStatus::Member,
        }
    }

    /// "not-a-member -> member"
    pub fn is_join(&self) -> bool {
        !self.from.is_member() && self.to.is_member()
    }
}

/// One inbound unit of work, built once per webhook call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub chat_id: String,
    pub thread_id: Option<String>,
    pub message_id: String,
    pub sender_id: String,
    pub sender_handle: Option<String>,
    pub sender_display_name: Option<String>,
    pub raw_text: String,
    pub normalized_text: String,
    pub has_document: bool,
    pub has_photo: bool,
    pub attachment_file_id: Option<String>,
    pub membership: Option<MembershipTransition>,
}

impl Event {
    pub fn has_attachment(&self) -> bool {
        self.has_document || self.has_photo
    }
}

/// The single decided outcome of evaluating one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Reply {
        text: String,
        thread_id: Option<String>,
        reply_to: Option<String>,
    },
    ReplyAndDelete {
        text: String,
        thread_id: Option<String>,
        reply_to: Option<String>,
        delete_message_id: String,
    },
    DeleteSilently {
        message_id: String,
    },
    Dispatch {
        handler_name: String,
    },
}

impl Action {
    pub fn is_noop(&self) -> bool {
        matches!(self, Action::NoOp)
    }

    /// Stable name used for logging and statistics
    pub fn kind(&self) -> &'static str {
        match self {
            Action::NoOp => "no_op",
            Action::Reply { .. } => "reply",
            Action::ReplyAndDelete { .. } => "reply_and_delete",
            Action::DeleteSilently { .. } => "delete_silently",
            Action::Dispatch { .. } => "dispatch",
        }
    }
}

/// Role a forum thread plays inside a moderated chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadRole {
    Newbies,
    TestResults,
    GroupTest,
}

/// Literal term entry: either `DNP` or `{ term: DNP, detail: "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermEntry {
    Plain(String),
    Detailed {
        term: String,
        #[serde(default)]
        detail: Option<String>,
    },
}

impl TermEntry {
    pub fn term(&self) -> &str {
        match self {
            TermEntry::Plain(term) => term,
            TermEntry::Detailed { term, .. } => term,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            TermEntry::Plain(_) => None,
            TermEntry::Detailed { detail, .. } => detail.as_deref(),
        }
    }
}

/// Regex entry: either `'L\d{2}.*\?'` or `{ pattern: ..., detail: "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternEntry {
    Plain(String),
    Detailed {
        pattern: String,
        #[serde(default)]
        detail: Option<String>,
    },
}

impl PatternEntry {
    pub fn pattern(&self) -> &str {
        match self {
            PatternEntry::Plain(pattern) => pattern,
            PatternEntry::Detailed { pattern, .. } => pattern,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            PatternEntry::Plain(_) => None,
            PatternEntry::Detailed { detail, .. } => detail.as_deref(),
        }
    }
}

/// Declarative form of one rule category as written in the YAML documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDocument {
    pub header: String,
    #[serde(default)]
    pub terms: Vec<TermEntry>,
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
    /// Restrict the category to these thread roles; empty means everywhere
    #[serde(default)]
    pub threads: Vec<ThreadRole>,
    /// Auto-removal only: delete without posting a notice
    #[serde(default)]
    pub silent: bool,
}
