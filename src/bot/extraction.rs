// src/bot/extraction.rs - Test-result extraction seam

use async_trait::async_trait;

use crate::types::{CollaboratorError, Event};

/// Reads an uploaded lab report and produces a summary to post back
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract_and_summarize(&self, event: &Event) -> Result<String, CollaboratorError>;
}

/// Used when no extraction backend is wired in; every upload gets the fallback reply.
pub struct UnconfiguredExtractor;

#[async_trait]
impl Extractor for UnconfiguredExtractor {
    async fn extract_and_summarize(&self, event: &Event) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Unavailable(format!(
            "no extraction backend for attachment {:?}",
            event.attachment_file_id
        )))
    }
}
