// Text-generation providers
//
// Reviewers and document regenerators all talk to a `TextGenerator`: a prompt
// goes in, free text comes out. Structure is recovered later by the review
// interpreter, so providers impose no schema on the reply.

use anyhow::Result;
use async_trait::async_trait;

pub mod claude;
pub mod factory;
pub mod openai;
pub mod retry;

pub use claude::ClaudeGenerator;
pub use factory::{create_generator, create_role_generators, Role, RoleGenerators};
pub use openai::OpenAiGenerator;
pub use retry::{with_retry, RetryPolicy};

/// A prompt-in, text-out generation capability.
///
/// Implementations are injected into the refinement loop; tests substitute
/// scripted generators.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one prompt and return the complete reply
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider name for logs
    fn name(&self) -> &str;
}
