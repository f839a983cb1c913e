//! `TurnClassifier` trait and its backends.
//!
//! A classifier turns one utterance into *raw* model text.  It never decides
//! anything itself: the raw text is handed to
//! [`parse_decision`](crate::turn::parse_decision), which owns every fallback.

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::llm::client::{ChatClient, LlmError};
use crate::llm::prompt::PromptBuilder;

// ---------------------------------------------------------------------------
// TurnClassifier trait
// ---------------------------------------------------------------------------

/// Async trait for turn classification.
///
/// Implementors must be `Send + Sync` so they can be shared with the
/// orchestrator worker as `Arc<dyn TurnClassifier>`.
#[async_trait]
pub trait TurnClassifier: Send + Sync {
    async fn classify(&self, utterance: &str) -> Result<String, LlmError>;
}

// ---------------------------------------------------------------------------
// ApiClassifier
// ---------------------------------------------------------------------------

/// Asks an OpenAI-compatible endpoint for a
/// `{"continueConversation": …, "acknowledgement": …}` object.
pub struct ApiClassifier {
    client: ChatClient,
    prompt_builder: PromptBuilder,
}

impl ApiClassifier {
    pub fn from_config(config: &LlmConfig, language: &str) -> Self {
        Self {
            client: ChatClient::from_config(config),
            prompt_builder: PromptBuilder::new(language),
        }
    }
}

#[async_trait]
impl TurnClassifier for ApiClassifier {
    async fn classify(&self, utterance: &str) -> Result<String, LlmError> {
        let (system_msg, user_msg) = self.prompt_builder.classifier_chat(utterance);
        let raw = self.client.complete(&system_msg, &user_msg).await?;
        log::debug!(
            "classifier: model={} raw_len={}",
            self.client.config().model,
            raw.len()
        );
        Ok(raw)
    }
}

// ---------------------------------------------------------------------------
// DisabledClassifier
// ---------------------------------------------------------------------------

/// Stand-in used when the classifier is switched off.  Every call fails with
/// [`LlmError::Disabled`], so turn-taking runs purely on the heuristic.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledClassifier;

#[async_trait]
impl TurnClassifier for DisabledClassifier {
    async fn classify(&self, _utterance: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;
    use std::sync::Arc;

    #[tokio::test]
    async fn disabled_classifier_always_errors() {
        let classifier: Arc<dyn TurnClassifier> = Arc::new(DisabledClassifier);
        let err = classifier.classify("今日は").await.unwrap_err();
        assert!(matches!(err, LlmError::Disabled));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_request_error() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAiCompatible,
            // Port 9 (discard) on localhost is closed on test machines.
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..LlmConfig::classifier_default()
        };
        let classifier = ApiClassifier::from_config(&config, "ja");
        let err = classifier.classify("今日は").await.unwrap_err();
        assert!(matches!(err, LlmError::Request(_) | LlmError::Timeout));
    }
}
