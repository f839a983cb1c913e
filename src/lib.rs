//! Real-time turn-taking conversation loop.
//!
//! Final transcripts flow into a single-writer [`pipeline::TurnOrchestrator`],
//! which asks a [`llm::TurnClassifier`] whether the speaker has finished,
//! resolves the answer with [`turn::parse_decision`], and either acknowledges
//! and keeps listening or asks a [`llm::ResponseGenerator`] for a full reply.
//! Every state change is published to a [`snapshot::SnapshotStore`] that the
//! [`presentation`] layer polls.

pub mod config;
pub mod llm;
pub mod pipeline;
pub mod presentation;
pub mod snapshot;
pub mod transcript;
pub mod turn;
