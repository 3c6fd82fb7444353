// Language model contract
// The assistant and the LLM-classified router only depend on this trait

use async_trait::async_trait;

use crate::Result;

/// Generates a completion for a fully rendered prompt
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
