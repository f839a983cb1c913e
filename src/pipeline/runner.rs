//! Turn orchestrator: drives classify → accumulate-or-reply → publish.
//!
//! [`TurnOrchestrator`] owns the canonical [`ConversationState`] and consumes
//! [`OrchestratorCommand`]s from an unbounded `tokio::sync::mpsc` queue, one
//! at a time.  Producers hold a cloneable [`OrchestratorHandle`]; submitting
//! never blocks.
//!
//! # Turn flow
//!
//! ```text
//! Utterance
//!   └─▶ classifier.classify (timeout)              [Classifying]
//!         └─▶ parse_decision (never fails)
//!               ├─ continue → context.push, pair (utterance, ack)       [Idle]
//!               └─ complete → prompt = context + utterance
//!                     └─▶ generator (timeout, fragments republished)  [Generating]
//!                           ├─ Ok  → pair (prompt, reply)               [Idle]
//!                           └─ Err → pair (prompt, error marker)        [Idle]
//!                           context cleared either way
//! ```
//!
//! Every publication bumps `version`, replaces the `watch` copy and, when a
//! [`SnapshotStore`] is attached, rewrites the snapshot on the blocking pool.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::llm::{LlmError, ResponseGenerator, TurnClassifier};
use crate::snapshot::SnapshotStore;
use crate::turn::{parse_decision, HeuristicRules};

use super::context::AccumulatedContext;
use super::state::{ConversationState, TurnPhase, TurnRecord, Utterance};

// ---------------------------------------------------------------------------
// Commands & errors
// ---------------------------------------------------------------------------

/// Work items carried by the orchestrator queue.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorCommand {
    Utterance(Utterance),
    /// Empty the history and the accumulated context.
    ClearHistory,
}

/// The only error a producer can see: the queue is unbounded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("orchestrator has stopped")]
    Closed,
}

/// Failures inside the worker.  Logged at the loop boundary, never fatal.
#[derive(Debug)]
pub enum PipelineError {
    /// A blocking snapshot task could not be joined.
    Internal(String),
    /// Processing a command panicked.
    Panic(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Internal(msg) => write!(f, "Internal error: {msg}"),
            PipelineError::Panic(msg) => write!(f, "Turn processing panicked: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

// ---------------------------------------------------------------------------
// OrchestratorOptions
// ---------------------------------------------------------------------------

/// Tunables for [`TurnOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub classifier_timeout: Duration,
    pub generator_timeout: Duration,
    /// Use `generate_stream` and republish every fragment.
    pub stream_replies: bool,
    /// Reply recorded when the generator fails or times out.
    pub error_marker: String,
    /// Pause after an error at the loop boundary.
    pub error_pause: Duration,
    pub rules: HeuristicRules,
}

impl OrchestratorOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            classifier_timeout: config.classifier.timeout(),
            generator_timeout: config.generator.timeout(),
            stream_replies: config.turn.stream_replies,
            error_marker: config.turn.error_marker.clone(),
            error_pause: config.turn.error_pause(),
            rules: HeuristicRules::from_config(&config.turn),
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

struct ShutdownSignal {
    stop: AtomicBool,
    wake: Notify,
}

impl ShutdownSignal {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    fn trigger(&self) {
        self.stop.store(true, Ordering::SeqCst);
        // Stores a permit if the worker is busy; it wakes on the next wait.
        self.wake.notify_one();
    }

    fn is_set(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// OrchestratorHandle
// ---------------------------------------------------------------------------

/// Producer/reader side of a running orchestrator.  Cheap to clone.
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<OrchestratorCommand>,
    shutdown: Arc<ShutdownSignal>,
    published: watch::Receiver<ConversationState>,
}

impl OrchestratorHandle {
    /// Enqueue a final utterance.  Returns immediately.
    pub fn submit(&self, utterance: Utterance) -> Result<(), SubmitError> {
        self.send(OrchestratorCommand::Utterance(utterance))
    }

    /// Enqueue `text` stamped with the current time.
    pub fn submit_text(&self, text: impl Into<String>) -> Result<(), SubmitError> {
        self.submit(Utterance::new(text))
    }

    /// Enqueue a history reset, ordered after everything already queued.
    pub fn clear_history(&self) -> Result<(), SubmitError> {
        self.send(OrchestratorCommand::ClearHistory)
    }

    /// Ask the worker to stop after the in-flight command.  Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_set() || self.commands.is_closed()
    }

    /// In-process view of every publication.
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.published.clone()
    }

    /// Copy of the most recent publication.
    pub fn snapshot(&self) -> ConversationState {
        self.published.borrow().clone()
    }

    fn send(&self, command: OrchestratorCommand) -> Result<(), SubmitError> {
        if self.shutdown.is_set() {
            return Err(SubmitError::Closed);
        }
        self.commands.send(command).map_err(|_| SubmitError::Closed)
    }
}

// ---------------------------------------------------------------------------
// TurnOrchestrator
// ---------------------------------------------------------------------------

/// Single-writer owner of the conversation.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_chat::llm::{DisabledClassifier, DisabledGenerator};
/// use voice_chat::pipeline::{OrchestratorOptions, TurnOrchestrator};
///
/// # async fn example() {
/// let orchestrator = TurnOrchestrator::new(
///     Arc::new(DisabledClassifier),
///     Arc::new(DisabledGenerator),
///     OrchestratorOptions::default(),
/// );
/// let (handle, worker) = orchestrator.spawn();
/// handle.submit_text("今日は").unwrap();
/// handle.shutdown();
/// let final_state = worker.await.unwrap();
/// # }
/// ```
pub struct TurnOrchestrator {
    state: ConversationState,
    context: AccumulatedContext,
    classifier: Arc<dyn TurnClassifier>,
    generator: Arc<dyn ResponseGenerator>,
    store: Option<SnapshotStore>,
    options: OrchestratorOptions,
    publisher: watch::Sender<ConversationState>,
}

impl TurnOrchestrator {
    /// Create an orchestrator with empty state and no persistence.
    pub fn new(
        classifier: Arc<dyn TurnClassifier>,
        generator: Arc<dyn ResponseGenerator>,
        options: OrchestratorOptions,
    ) -> Self {
        let state = ConversationState::default();
        let (publisher, _) = watch::channel(state.clone());
        Self {
            state,
            context: AccumulatedContext::new(),
            classifier,
            generator,
            store: None,
            options,
            publisher,
        }
    }

    /// Persist every publication to `store`.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Start from a previously persisted state.
    pub fn with_state(mut self, mut state: ConversationState) -> Self {
        state.settle();
        self.publisher.send_replace(state.clone());
        self.state = state;
        self
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// The returned `JoinHandle` resolves to the final state once the worker
    /// has stopped (after [`OrchestratorHandle::shutdown`] or when every
    /// handle is dropped).
    pub fn spawn(self) -> (OrchestratorHandle, JoinHandle<ConversationState>) {
        let (commands, queue) = mpsc::unbounded_channel();
        let shutdown = Arc::new(ShutdownSignal::new());
        let handle = OrchestratorHandle {
            commands,
            shutdown: Arc::clone(&shutdown),
            published: self.publisher.subscribe(),
        };
        let worker = tokio::spawn(self.run(queue, shutdown));
        (handle, worker)
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    async fn run(
        mut self,
        mut queue: mpsc::UnboundedReceiver<OrchestratorCommand>,
        shutdown: Arc<ShutdownSignal>,
    ) -> ConversationState {
        log::info!(
            "orchestrator: started with {} turns of history",
            self.state.pair_count()
        );

        loop {
            if shutdown.is_set() {
                break;
            }

            let command = tokio::select! {
                biased;
                _ = shutdown.wake.notified() => break,
                command = queue.recv() => command,
            };
            let Some(command) = command else {
                log::info!("orchestrator: all handles dropped");
                break;
            };

            let outcome = AssertUnwindSafe(self.handle(command)).catch_unwind().await;
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(payload) => {
                    self.recover_after_panic().await;
                    PipelineError::Panic(panic_message(payload.as_ref()))
                }
            };
            log::error!("orchestrator: {error}");
            tokio::time::sleep(self.options.error_pause).await;
        }

        queue.close();
        let mut dropped = 0usize;
        while let Ok(command) = queue.try_recv() {
            dropped += 1;
            log::warn!("orchestrator: dropped on shutdown: {command:?}");
        }

        self.state.is_generating = false;
        self.state.phase = TurnPhase::Idle;
        if let Err(e) = self.publish().await {
            log::error!("orchestrator: final snapshot failed: {e}");
        }

        log::info!(
            "orchestrator: stopped ({} turns, {dropped} queued commands dropped)",
            self.state.pair_count()
        );
        self.state
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    async fn handle(&mut self, command: OrchestratorCommand) -> Result<(), PipelineError> {
        match command {
            OrchestratorCommand::Utterance(utterance) => self.handle_utterance(utterance).await,
            OrchestratorCommand::ClearHistory => {
                log::info!("orchestrator: clearing history");
                self.context.clear();
                self.state.clear_history();
                self.publish().await
            }
        }
    }

    async fn handle_utterance(&mut self, utterance: Utterance) -> Result<(), PipelineError> {
        let text = utterance.text.trim().to_string();
        if text.is_empty() {
            log::debug!("orchestrator: ignoring blank utterance");
            return Ok(());
        }

        self.state.current_transcript = text.clone();
        self.state.current_response.clear();
        self.state.phase = TurnPhase::Classifying;
        self.publish().await?;

        let raw = self.classify(&text).await;
        let decision = parse_decision(&raw, &text, &self.options.rules);
        log::info!(
            "orchestrator: {:?} → {} via {}{}",
            text,
            if decision.continue_conversation { "continue" } else { "complete" },
            decision.method.label(),
            if decision.overridden { " (question override)" } else { "" }
        );

        if decision.continue_conversation {
            self.context.push(&text);
            let ack = decision.acknowledgement.clone();
            self.state.current_response = ack.clone();
            self.state.push_pair(text, ack.clone());
            self.state
                .turns
                .push(TurnRecord::new(&utterance, &decision, &raw, ack));
            self.state.phase = TurnPhase::Idle;
            return self.publish().await;
        }

        let prompt = self.context.combine(&text);
        self.state.is_generating = true;
        self.state.phase = TurnPhase::Generating;
        self.state.current_response.clear();
        self.publish().await?;

        let reply = self.generate(&prompt).await?;

        self.context.clear();
        self.state.current_response = reply.clone();
        self.state.push_pair(prompt, reply.clone());
        self.state
            .turns
            .push(TurnRecord::new(&utterance, &decision, &raw, reply));
        self.state.is_generating = false;
        self.state.phase = TurnPhase::Idle;
        self.publish().await
    }

    // -----------------------------------------------------------------------
    // Model calls
    // -----------------------------------------------------------------------

    /// Raw classifier text; empty when the classifier failed or timed out.
    async fn classify(&self, text: &str) -> String {
        match tokio::time::timeout(self.options.classifier_timeout, self.classifier.classify(text))
            .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(LlmError::Disabled)) => String::new(),
            Ok(Err(e)) => {
                log::warn!("orchestrator: classifier unavailable ({e}), using heuristic");
                String::new()
            }
            Err(_) => {
                log::warn!(
                    "orchestrator: classifier timed out after {:?}, using heuristic",
                    self.options.classifier_timeout
                );
                String::new()
            }
        }
    }

    /// Full reply, or the error marker when the generator fails.
    async fn generate(&mut self, prompt: &str) -> Result<String, PipelineError> {
        let generator = Arc::clone(&self.generator);
        let limit = self.options.generator_timeout;

        let outcome = if self.options.stream_replies {
            let (fragments, mut incoming) = mpsc::unbounded_channel::<String>();
            let call = tokio::time::timeout(
                limit,
                contained(generator.generate_stream(prompt, fragments)),
            );
            tokio::pin!(call);

            let mut streamed = String::new();
            let outcome = loop {
                tokio::select! {
                    outcome = &mut call => break outcome,
                    Some(fragment) = incoming.recv() => {
                        streamed.push_str(&fragment);
                        self.state.current_response.push_str(&fragment);
                        self.publish().await?;
                    }
                }
            };
            while let Ok(fragment) = incoming.try_recv() {
                streamed.push_str(&fragment);
                self.state.current_response.push_str(&fragment);
                self.publish().await?;
            }

            // Observers have already seen the streamed text; keep it verbatim.
            outcome.map(|result| {
                result.map(|reply| if streamed.trim().is_empty() { reply } else { streamed })
            })
        } else {
            tokio::time::timeout(limit, contained(generator.generate(prompt))).await
        };

        let reply = match outcome {
            Ok(Ok(reply)) if !reply.trim().is_empty() => reply,
            Ok(Ok(_)) => {
                log::warn!("orchestrator: generator returned an empty reply");
                self.options.error_marker.clone()
            }
            Ok(Err(e)) => {
                log::warn!("orchestrator: generator failed: {e}");
                self.options.error_marker.clone()
            }
            Err(_) => {
                log::warn!("orchestrator: generator timed out after {limit:?}");
                self.options.error_marker.clone()
            }
        };
        Ok(reply)
    }

    // -----------------------------------------------------------------------
    // Publication
    // -----------------------------------------------------------------------

    async fn publish(&mut self) -> Result<(), PipelineError> {
        self.state.touch();
        self.publisher.send_replace(self.state.clone());

        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        let snapshot = self.state.clone();
        let written = tokio::task::spawn_blocking(move || store.write(&snapshot))
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        if let Err(e) = written {
            log::warn!("snapshot: write failed ({e}), keeping in-memory state");
        }
        Ok(())
    }

    /// Restore the pairing invariant after a panic interrupted a turn.
    async fn recover_after_panic(&mut self) {
        let history = self.state.pair_count();
        self.context.clear();
        self.state.settle();
        self.state.turns.truncate(history);
        if let Err(e) = self.publish().await {
            log::error!("orchestrator: snapshot after panic failed: {e}");
        }
    }
}

/// Run a model call, turning a panic into [`LlmError::Panicked`].
async fn contained<F>(call: F) -> Result<String, LlmError>
where
    F: Future<Output = Result<String, LlmError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(LlmError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
