//! Three-stage decision parser for turn-classifier output.
//!
//! The classifier is itself a language model, so its "JSON" output arrives
//! wrapped in prose, inside code fences, truncated, or with keys in either
//! camelCase or snake_case.  [`parse_decision`] turns whatever came back into
//! a [`TurnDecision`]:
//!
//! ```text
//! raw output ──empty?──────────────────────────────┐
//!     │                                            │
//!     ▼                                            ▼
//! 1. structured: largest balanced {…}, serde_json  │
//!     │ no boolean continuation                    │
//!     ▼                                            │
//! 2. partial: regex per field                      │
//!     │ no boolean continuation                    │
//!     ▼                                            ▼
//! 3. heuristic on the utterance text ◀─────────────┘
//!     │
//!     ▼
//! question override (utterance has question markers → complete)
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::decision::{DecisionMethod, TurnDecision};
use super::heuristic::HeuristicRules;

const CONTINUE_KEYS: &[&str] = &["continueConversation", "continue_conversation"];
const ACK_KEYS: &[&str] = &["acknowledgement", "acknowledgment", "ack"];

/// Fields read out of the classifier output by stage 1 or 2.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFields {
    pub continue_conversation: bool,
    pub acknowledgement: Option<String>,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse the classifier's raw output for `utterance` into a decision.
///
/// Pure and infallible: every input, including an empty string, yields a
/// decision.
///
/// # Example
/// ```rust
/// use voice_chat::turn::{parse_decision, DecisionMethod, HeuristicRules};
///
/// let raw = r#"sure, here: {"continueConversation": false, "acknowledgement": "ok"}"#;
/// let d = parse_decision(raw, "今日はいい天気でした", &HeuristicRules::default());
/// assert!(!d.continue_conversation);
/// assert_eq!(d.acknowledgement, "ok");
/// assert_eq!(d.method, DecisionMethod::Structured);
/// ```
pub fn parse_decision(raw: &str, utterance: &str, rules: &HeuristicRules) -> TurnDecision {
    let parsed = if raw.trim().is_empty() {
        None
    } else {
        extract_structured(raw)
            .map(|fields| (fields, DecisionMethod::Structured))
            .or_else(|| recover_fields(raw).map(|fields| (fields, DecisionMethod::PartialRecovery)))
    };

    let decision = match parsed {
        Some((fields, method)) => TurnDecision {
            continue_conversation: fields.continue_conversation,
            acknowledgement: fields
                .acknowledgement
                .unwrap_or_else(|| rules.default_acknowledgement.clone()),
            method,
            reason: fields.reason,
            overridden: false,
        },
        None => {
            log::debug!("parser: no usable classifier fields, using heuristic fallback");
            let verdict = rules.evaluate(utterance);
            TurnDecision {
                continue_conversation: verdict.continue_conversation,
                acknowledgement: verdict.acknowledgement,
                method: DecisionMethod::Heuristic,
                reason: Some(verdict.reason.to_string()),
                overridden: false,
            }
        }
    };

    apply_question_override(decision, utterance, rules)
}

/// Force "complete" for utterances that carry question markers.
fn apply_question_override(
    mut decision: TurnDecision,
    utterance: &str,
    rules: &HeuristicRules,
) -> TurnDecision {
    if decision.continue_conversation && rules.has_question_markers(utterance) {
        log::debug!("parser: question markers in utterance, forcing complete");
        decision.continue_conversation = false;
        decision.overridden = true;
    }
    decision
}

// ---------------------------------------------------------------------------
// Stage 1 — structured extraction
// ---------------------------------------------------------------------------

/// Parse the first brace-delimited object that carries a boolean
/// continuation field.
///
/// Candidates are tried in order of their opening brace; each candidate is
/// the largest balanced object starting there.
pub fn extract_structured(raw: &str) -> Option<ParsedFields> {
    json_object_candidates(raw).find_map(|candidate| {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => fields_from_object(&map),
            _ => None,
        }
    })
}

fn fields_from_object(map: &Map<String, Value>) -> Option<ParsedFields> {
    let continue_conversation = CONTINUE_KEYS
        .iter()
        .find_map(|key| map.get(*key))
        .and_then(Value::as_bool)?;

    let acknowledgement = ACK_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|ack| !ack.is_empty())
        .map(str::to_string);

    let reason = map
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(ParsedFields {
        continue_conversation,
        acknowledgement,
        reason,
    })
}

/// Iterate over every balanced `{…}` span in `text`, one per opening brace,
/// in order.  Braces inside JSON strings are ignored while balancing.
/// Unterminated spans are skipped.
fn json_object_candidates(text: &str) -> impl Iterator<Item = &str> + '_ {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .filter_map(move |(start, _)| balanced_end(bytes, start).map(|end| &text[start..=end]))
}

/// Index of the `}` closing the object that opens at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Stage 2 — partial-field recovery
// ---------------------------------------------------------------------------

fn continue_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)["']?continue_?conversation["']?\s*[:=]\s*["']?(true|false)"#)
            .expect("continue-field pattern is valid")
    })
}

fn ack_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)["']?(?:acknowledge?ment|ack)["']?\s*[:=]\s*"((?:[^"\\]|\\.)*)""#)
            .expect("ack-field pattern is valid")
    })
}

fn reason_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""reason"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("reason-field pattern is valid")
    })
}

/// Recover the continuation flag and acknowledgement independently from
/// output that is not valid JSON.  Requires the continuation flag.
pub fn recover_fields(raw: &str) -> Option<ParsedFields> {
    let continue_conversation = continue_field_re()
        .captures(raw)
        .map(|caps| caps[1].eq_ignore_ascii_case("true"))?;

    let acknowledgement = ack_field_re()
        .captures(raw)
        .map(|caps| unescape(&caps[1]))
        .map(|ack| ack.trim().to_string())
        .filter(|ack| !ack.is_empty());

    let reason = reason_field_re()
        .captures(raw)
        .map(|caps| unescape(&caps[1]));

    Some(ParsedFields {
        continue_conversation,
        acknowledgement,
        reason,
    })
}

/// Decode JSON string escapes in a regex-captured fragment; keep it verbatim
/// if it does not decode.
fn unescape(fragment: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{fragment}\"")).unwrap_or_else(|_| fragment.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
