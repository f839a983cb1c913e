//! Conversation state and the records the orchestrator appends to it.
//!
//! [`ConversationState`] is the single source of truth for everything the
//! presentation layer shows.  Only the orchestrator worker mutates it; every
//! other context sees a *copy* (a [`watch`](tokio::sync::watch) snapshot or
//! the on-disk record).
//!
//! Invariant at every publication: `transcripts.len() == responses.len()`.
//! Readers detect change through [`ConversationState::version`], which grows
//! by one on every publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::turn::{DecisionMethod, TurnDecision};

// ---------------------------------------------------------------------------
// Utterance
// ---------------------------------------------------------------------------

/// One finalized segment of recognized speech.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl Utterance {
    /// Stamp `text` with the current time.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// TurnPhase
// ---------------------------------------------------------------------------

/// What the orchestrator worker is doing right now.
///
/// ```text
/// Idle ──utterance──▶ Classifying ──continue──▶ Idle
///                                 ──complete──▶ Generating ──reply──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    Classifying,
    Generating,
}

impl TurnPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TurnPhase::Idle => "Idle",
            TurnPhase::Classifying => "Listening",
            TurnPhase::Generating => "Replying",
        }
    }
}

// ---------------------------------------------------------------------------
// TurnRecord
// ---------------------------------------------------------------------------

/// One processed utterance.  Appended once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// The utterance as received (not the combined prompt).
    pub transcript: String,
    pub is_continuation: bool,
    /// The acknowledgement for a continuation, the full reply otherwise.
    pub reply: String,
    /// Verbatim classifier output; empty when the classifier failed.
    pub raw_classifier_output: String,
    pub decided_at: DateTime<Utc>,
    pub method: DecisionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TurnRecord {
    pub fn new(
        utterance: &Utterance,
        decision: &TurnDecision,
        raw_classifier_output: &str,
        reply: String,
    ) -> Self {
        Self {
            transcript: utterance.text.clone(),
            is_continuation: decision.continue_conversation,
            reply,
            raw_classifier_output: raw_classifier_output.to_string(),
            decided_at: Utc::now(),
            method: decision.method,
            reason: decision.reason.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

/// Everything the presentation layer renders.
///
/// `transcripts[i]` pairs with `responses[i]`: for a continuation that is
/// `(utterance, acknowledgement)`, for a completion `(combined prompt, reply)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    pub transcripts: Vec<String>,
    pub responses: Vec<String>,
    /// Utterance currently being handled (empty when idle).
    pub current_transcript: String,
    /// Acknowledgement or (partial, growing) reply for the current turn.
    pub current_response: String,
    pub is_generating: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// Monotonic publication counter.
    pub version: u64,
    pub phase: TurnPhase,
    /// Full turn history with decision diagnostics.
    pub turns: Vec<TurnRecord>,
}

impl ConversationState {
    /// Number of completed `(transcript, response)` pairs.
    pub fn pair_count(&self) -> usize {
        self.transcripts.len().min(self.responses.len())
    }

    /// `true` when every transcript has exactly one response.
    pub fn is_consistent(&self) -> bool {
        self.transcripts.len() == self.responses.len()
    }

    /// The last `n` pairs, oldest first, with their absolute indices.
    pub fn recent(&self, n: usize) -> Vec<(usize, &str, &str)> {
        let count = self.pair_count();
        let start = count.saturating_sub(n);
        (start..count)
            .map(|i| (i, self.transcripts[i].as_str(), self.responses[i].as_str()))
            .collect()
    }

    /// Append one `(transcript, response)` pair.
    pub fn push_pair(&mut self, transcript: String, response: String) {
        self.transcripts.push(transcript);
        self.responses.push(response);
    }

    /// Drop all history and per-turn fields.  `version` keeps counting.
    pub fn clear_history(&mut self) {
        self.transcripts.clear();
        self.responses.clear();
        self.turns.clear();
        self.current_transcript.clear();
        self.current_response.clear();
        self.is_generating = false;
        self.phase = TurnPhase::Idle;
    }

    /// Stamp a new publication: bump `version`, refresh `last_updated`.
    pub fn touch(&mut self) {
        self.version += 1;
        self.last_updated = Some(Utc::now());
    }

    /// Bring a restored snapshot back to a resting state.  A crash while
    /// generating leaves `is_generating` set on disk.
    pub fn settle(&mut self) {
        self.is_generating = false;
        self.phase = TurnPhase::Idle;
        self.current_transcript.clear();
        self.current_response.clear();
        let count = self.pair_count();
        self.transcripts.truncate(count);
        self.responses.truncate(count);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
