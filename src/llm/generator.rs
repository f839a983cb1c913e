//! `ResponseGenerator` trait and its backends.
//!
//! The generator produces the full reply once a turn is complete.  Streaming
//! is optional: the default [`ResponseGenerator::generate_stream`] delivers
//! the whole reply as a single fragment.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::LlmConfig;
use crate::llm::client::{ChatClient, LlmError};
use crate::llm::prompt::PromptBuilder;

// ---------------------------------------------------------------------------
// ResponseGenerator trait
// ---------------------------------------------------------------------------

/// Async trait for reply generation.
///
/// # Arguments
/// * `prompt`    – The combined prompt (accumulated context + utterance).
/// * `fragments` – Receives text deltas in order; their concatenation equals
///                 the returned reply.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    async fn generate_stream(
        &self,
        prompt: &str,
        fragments: mpsc::UnboundedSender<String>,
    ) -> Result<String, LlmError> {
        let reply = self.generate(prompt).await?;
        let _ = fragments.send(reply.clone());
        Ok(reply)
    }
}

// ---------------------------------------------------------------------------
// ApiGenerator
// ---------------------------------------------------------------------------

/// OpenAI-compatible generator with SSE streaming.
pub struct ApiGenerator {
    client: ChatClient,
    prompt_builder: PromptBuilder,
}

impl ApiGenerator {
    pub fn from_config(config: &LlmConfig, language: &str) -> Self {
        Self {
            client: ChatClient::from_config(config),
            prompt_builder: PromptBuilder::new(language),
        }
    }
}

#[async_trait]
impl ResponseGenerator for ApiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let (system_msg, user_msg) = self.prompt_builder.generator_chat(prompt);
        self.client.complete(&system_msg, &user_msg).await
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        fragments: mpsc::UnboundedSender<String>,
    ) -> Result<String, LlmError> {
        let (system_msg, user_msg) = self.prompt_builder.generator_chat(prompt);
        self.client
            .complete_stream(&system_msg, &user_msg, &fragments)
            .await
    }
}

// ---------------------------------------------------------------------------
// DisabledGenerator
// ---------------------------------------------------------------------------

/// Stand-in used when the generator is switched off.  Completed turns get
/// the configured error marker as their reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGenerator;

#[async_trait]
impl ResponseGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ResponseGenerator for Echo {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            Ok(format!("re: {prompt}"))
        }
    }

    #[tokio::test]
    async fn default_stream_sends_whole_reply_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = Echo.generate_stream("hello", tx).await.unwrap();
        assert_eq!(reply, "re: hello");
        assert_eq!(rx.recv().await.as_deref(), Some("re: hello"));
        // Sender dropped with the call.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn default_stream_survives_dropped_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        assert_eq!(Echo.generate_stream("x", tx).await.unwrap(), "re: x");
    }

    #[tokio::test]
    async fn disabled_generator_streams_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = DisabledGenerator.generate_stream("x", tx).await.unwrap_err();
        assert!(matches!(err, LlmError::Disabled));
        assert!(rx.recv().await.is_none());
    }
}
