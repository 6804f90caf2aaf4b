pub mod keyword;
pub mod llm;

use async_trait::async_trait;

use crate::models::NluResult;

/// Turns one caller utterance into an intent plus entities.
#[async_trait]
pub trait NluAdapter: Send + Sync {
    async fn classify(&self, text: &str) -> anyhow::Result<NluResult>;
}
