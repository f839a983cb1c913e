//! Turn-taking orchestrator and the conversation state it owns.
//!
//! # Architecture
//!
//! ```text
//! TranscriptSink / stdin ──submit()──▶ unbounded mpsc (FIFO)
//!                                            │
//!                                            ▼
//!                          TurnOrchestrator::run()  ← single tokio task
//!                                            │
//!                 ├─ TurnClassifier::classify → parse_decision
//!                 ├─ continue → AccumulatedContext::push
//!                 └─ complete → ResponseGenerator::generate_stream
//!                                            │ publish (version += 1)
//!                          ┌─────────────────┴──────────────────┐
//!                          ▼                                    ▼
//!              watch::Receiver<ConversationState>     SnapshotStore (JSON file)
//!              (OrchestratorHandle::subscribe)        (PresentationLoop polls)
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_chat::config::AppConfig;
//! use voice_chat::llm::{ApiClassifier, ApiGenerator};
//! use voice_chat::pipeline::{OrchestratorOptions, TurnOrchestrator};
//! use voice_chat::snapshot::SnapshotStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let store = SnapshotStore::new(config.snapshot.resolved_path());
//!
//!     let (handle, worker) = TurnOrchestrator::new(
//!         Arc::new(ApiClassifier::from_config(&config.classifier, "ja")),
//!         Arc::new(ApiGenerator::from_config(&config.generator, "ja")),
//!         OrchestratorOptions::from_config(&config),
//!     )
//!     .with_store(store)
//!     .spawn();
//!
//!     handle.submit_text("今日は").unwrap();
//!     handle.shutdown();
//!     let final_state = worker.await.unwrap();
//!     println!("{} turns", final_state.pair_count());
//! }
//! ```

pub mod context;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use context::AccumulatedContext;
pub use runner::{
    OrchestratorCommand, OrchestratorHandle, OrchestratorOptions, PipelineError, SubmitError,
    TurnOrchestrator,
};
pub use state::{ConversationState, TurnPhase, TurnRecord, Utterance};
