use anyhow::Result;
use async_trait::async_trait;

/// Text-in, text-out completion seam for any hosted or local model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
