// src/types/errors.rs - Error taxonomy for the moderation engine

use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be loaded; the previously published snapshot stays active.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema violation in {document}: {reason}")]
    Schema { document: String, reason: String },
}

impl ConfigLoadError {
    pub fn schema(document: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigLoadError::Schema {
            document: document.into(),
            reason: reason.into(),
        }
    }
}

/// A single rule failed to compile and was skipped.
#[derive(Debug, Clone, Error)]
#[error("rule '{rule}' in category '{category}' failed to compile: {reason}")]
pub struct RuleCompileError {
    pub category: String,
    pub rule: String,
    pub reason: String,
}

/// A compiled rule failed while scanning a message.
#[derive(Debug, Clone, Error)]
#[error("rule '{rule}' failed during matching: {reason}")]
pub struct MatchEvaluationError {
    pub rule: String,
    pub reason: String,
}

/// Failures reported by external collaborators (transport, extraction).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("transport request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("platform rejected request: {0}")]
    Rejected(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("collaborator not configured: {0}")]
    Unavailable(String),
}

/// The webhook payload could not be turned into an event.
#[derive(Debug, Error)]
pub enum MalformedEventError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("update has an unexpected shape: {0}")]
    InvalidShape(#[source] serde_json::Error),
}
