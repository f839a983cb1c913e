//! Turn decision: classifier-output parsing and lexical turn heuristics.
//!
//! This module provides:
//! * [`parse_decision`] — the single, pure three-stage parser
//!   (structured → partial recovery → heuristic) plus the question override.
//! * [`HeuristicRules`] — question markers, clause endings, sentence-final
//!   particles and the short-utterance threshold.
//! * [`TurnDecision`] / [`DecisionMethod`] — the parser's result.

pub mod decision;
pub mod heuristic;
pub mod parser;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use decision::{DecisionMethod, TurnDecision};
pub use heuristic::{HeuristicRules, HeuristicVerdict};
pub use parser::{extract_structured, parse_decision, recover_fields, ParsedFields};
