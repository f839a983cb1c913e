//! Model backends for the conversation loop.
//!
//! This module provides:
//! * [`TurnClassifier`] — utterance → raw classifier text.
//! * [`ResponseGenerator`] — prompt → reply, optionally streamed.
//! * [`ApiClassifier`] / [`ApiGenerator`] — OpenAI-compatible REST backends
//!   sharing one [`ChatClient`].
//! * [`DisabledClassifier`] / [`DisabledGenerator`] — stand-ins for switched
//!   off backends.
//! * [`PromptBuilder`] — Japanese/English system prompts.
//! * [`LlmError`] — error variants for model calls.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_chat::config::AppConfig;
//! use voice_chat::llm::{ApiClassifier, TurnClassifier};
//! use voice_chat::turn::{parse_decision, HeuristicRules};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let classifier = ApiClassifier::from_config(&config.classifier, "ja");
//!
//!     let utterance = "今日はちょっと";
//!     let raw = classifier.classify(utterance).await.unwrap_or_default();
//!     let decision = parse_decision(&raw, utterance, &HeuristicRules::default());
//!     println!("continue={}", decision.continue_conversation);
//! }
//! ```

pub mod classifier;
pub mod client;
pub mod generator;
pub mod prompt;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use classifier::{ApiClassifier, DisabledClassifier, TurnClassifier};
pub use client::{parse_sse_line, ChatClient, LlmError, SseLine};
pub use generator::{ApiGenerator, DisabledGenerator, ResponseGenerator};
pub use prompt::PromptBuilder;
