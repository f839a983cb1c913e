//! The parsed turn decision and the record of how it was reached.

use serde::{Deserialize, Serialize};

/// Which parser stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMethod {
    /// A whole JSON object was parsed out of the classifier output.
    Structured,
    /// Individual fields were regex-recovered from malformed output.
    PartialRecovery,
    /// The classifier output was unusable; the utterance itself was judged.
    Heuristic,
}

impl DecisionMethod {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionMethod::Structured => "structured",
            DecisionMethod::PartialRecovery => "partial",
            DecisionMethod::Heuristic => "heuristic",
        }
    }
}

/// Outcome of [`parse_decision`](crate::turn::parse_decision).
#[derive(Debug, Clone, PartialEq)]
pub struct TurnDecision {
    /// `true` → the speaker is mid-turn; acknowledge and keep accumulating.
    /// `false` → the turn is complete; generate a full reply.
    pub continue_conversation: bool,
    /// Short acknowledgement phrase.
    pub acknowledgement: String,
    pub method: DecisionMethod,
    /// Explanation from the classifier (`"reason"` field) or the heuristic.
    pub reason: Option<String>,
    /// Set when the question override flipped a "continue" to "complete".
    pub overridden: bool,
}

impl TurnDecision {
    /// `true` when a full reply should be generated.
    pub fn is_complete(&self) -> bool {
        !self.continue_conversation
    }
}
