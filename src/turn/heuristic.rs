//! Surface-feature turn heuristics for Japanese (and pluggable) speech.
//!
//! [`HeuristicRules`] answers two questions about an utterance without any
//! model call:
//!
//! * does it contain question markers ([`HeuristicRules::has_question_markers`]),
//!   which forces a "complete" decision regardless of the classifier, and
//! * is the speaker probably still mid-sentence ([`HeuristicRules::evaluate`]),
//!   the terminal fallback of the decision parser.
//!
//! The built-in tables target Japanese; every list can be replaced through
//! [`TurnConfig`](crate::config::TurnConfig).

use crate::config::TurnConfig;

// ---------------------------------------------------------------------------
// Static tables
// ---------------------------------------------------------------------------

static QUESTION_MARKS: &[&str] = &["?", "？"];

static QUESTION_WORDS: &[&str] = &["何", "どう", "なぜ", "いつ", "どこ", "だれ", "誰", "ですか"];

/// Clause endings that leave the sentence hanging ("今日は", "雨だけど").
static INCOMPLETE_ENDINGS: &[&str] = &["は", "が", "けど", "って", "とか", "ので", "から"];

/// Sentence-final particles that close an utterance ("いい天気だね").
static FINAL_PARTICLES: &[&str] = &["ね", "よ", "な", "わ", "ぞ", "ぜ", "のだ", "んだ"];

/// Trailing punctuation ignored when looking at how an utterance ends.
const TRAILING_PUNCTUATION: &[char] = &['。', '．', '.', '、', ',', '！', '!', '…', '　', ' '];

const CONTINUE_ACK: &str = "はい";
const COMPLETE_ACK: &str = "なるほど、わかりました";

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// HeuristicVerdict
// ---------------------------------------------------------------------------

/// Result of the heuristic fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicVerdict {
    pub continue_conversation: bool,
    pub acknowledgement: String,
    /// Which rule fired.
    pub reason: &'static str,
}

// ---------------------------------------------------------------------------
// HeuristicRules
// ---------------------------------------------------------------------------

/// Lexical rules used by the decision parser.
///
/// # Example
/// ```rust
/// use voice_chat::turn::HeuristicRules;
///
/// let rules = HeuristicRules::default();
/// assert!(rules.has_question_markers("明日は晴れますか？"));
/// assert!(rules.evaluate("今日は").continue_conversation);
/// assert!(!rules.evaluate("いい天気だね").continue_conversation);
/// ```
#[derive(Debug, Clone)]
pub struct HeuristicRules {
    pub question_marks: Vec<String>,
    pub question_words: Vec<String>,
    pub incomplete_endings: Vec<String>,
    pub final_particles: Vec<String>,
    /// Utterances with fewer characters than this are "short".
    pub short_utterance_chars: usize,
    /// Filler used when a model decision came without an acknowledgement.
    pub default_acknowledgement: String,
}

impl HeuristicRules {
    /// Build the rules from config, falling back to the built-in tables for
    /// any list the config leaves unset.
    pub fn from_config(config: &TurnConfig) -> Self {
        let defaults = Self::default();
        Self {
            question_marks: defaults.question_marks,
            question_words: config
                .question_words
                .clone()
                .unwrap_or(defaults.question_words),
            incomplete_endings: config
                .incomplete_endings
                .clone()
                .unwrap_or(defaults.incomplete_endings),
            final_particles: config
                .final_particles
                .clone()
                .unwrap_or(defaults.final_particles),
            short_utterance_chars: config.short_utterance_chars,
            default_acknowledgement: config.default_acknowledgement.clone(),
        }
    }

    /// `true` when the utterance carries a question mark or an interrogative
    /// word.
    pub fn has_question_markers(&self, utterance: &str) -> bool {
        self.question_marks
            .iter()
            .chain(self.question_words.iter())
            .any(|marker| !marker.is_empty() && utterance.contains(marker.as_str()))
    }

    /// Classify an utterance from its surface features alone.  Never fails.
    ///
    /// Rules, first match wins:
    /// 1. question markers → complete
    /// 2. ends with an incomplete-clause marker → continue
    /// 3. ends with a sentence-final particle → complete
    /// 4. shorter than `short_utterance_chars` → continue
    /// 5. otherwise → complete
    pub fn evaluate(&self, utterance: &str) -> HeuristicVerdict {
        let trimmed = utterance.trim();
        let stem = trimmed.trim_end_matches(TRAILING_PUNCTUATION);

        let (continue_conversation, reason) = if self.has_question_markers(trimmed) {
            (false, "question detected")
        } else if ends_with_any(stem, &self.incomplete_endings) {
            (true, "clause left incomplete")
        } else if ends_with_any(stem, &self.final_particles) {
            (false, "sentence-final particle")
        } else if trimmed.chars().count() < self.short_utterance_chars {
            (true, "short utterance without closing particle")
        } else {
            (false, "default: treated as complete")
        };

        let acknowledgement = if continue_conversation {
            CONTINUE_ACK
        } else {
            COMPLETE_ACK
        };

        HeuristicVerdict {
            continue_conversation,
            acknowledgement: acknowledgement.to_string(),
            reason,
        }
    }
}

impl Default for HeuristicRules {
    fn default() -> Self {
        Self {
            question_marks: owned(QUESTION_MARKS),
            question_words: owned(QUESTION_WORDS),
            incomplete_endings: owned(INCOMPLETE_ENDINGS),
            final_particles: owned(FINAL_PARTICLES),
            short_utterance_chars: 10,
            default_acknowledgement: "なるほど".into(),
        }
    }
}

fn ends_with_any(text: &str, endings: &[String]) -> bool {
    endings
        .iter()
        .any(|ending| !ending.is_empty() && text.ends_with(ending.as_str()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_mark_is_a_question_marker() {
        let rules = HeuristicRules::default();
        assert!(rules.has_question_markers("今日は天気がいい？"));
        assert!(rules.has_question_markers("really?"));
    }

    #[test]
    fn interrogative_word_is_a_question_marker() {
        let rules = HeuristicRules::default();
        assert!(rules.has_question_markers("どこに行きたい"));
        assert!(rules.has_question_markers("それは本当ですか"));
        assert!(!rules.has_question_markers("今日はいい天気"));
    }

    #[test]
    fn question_is_complete() {
        let v = HeuristicRules::default().evaluate("なぜ");
        assert!(!v.continue_conversation);
        assert_eq!(v.reason, "question detected");
    }

    #[test]
    fn incomplete_clause_continues() {
        let rules = HeuristicRules::default();
        assert!(rules.evaluate("今日は").continue_conversation);
        assert!(rules.evaluate("雨が降っているけど").continue_conversation);
        assert_eq!(rules.evaluate("今日は").acknowledgement, "はい");
    }

    #[test]
    fn trailing_ellipsis_is_ignored() {
        let v = HeuristicRules::default().evaluate("今日は...");
        assert!(v.continue_conversation);
        assert_eq!(v.reason, "clause left incomplete");
    }

    #[test]
    fn final_particle_completes_even_when_short() {
        let v = HeuristicRules::default().evaluate("いいね");
        assert!(!v.continue_conversation);
        assert_eq!(v.reason, "sentence-final particle");
    }

    #[test]
    fn short_utterance_continues() {
        let v = HeuristicRules::default().evaluate("それで");
        assert!(v.continue_conversation);
    }

    #[test]
    fn long_utterance_defaults_to_complete() {
        let v = HeuristicRules::default().evaluate("昨日の会議の資料を全部読み終わりました");
        assert!(!v.continue_conversation);
        assert_eq!(v.acknowledgement, "なるほど、わかりました");
    }

    #[test]
    fn config_overrides_replace_tables() {
        let config = TurnConfig {
            question_words: Some(vec!["what".into()]),
            short_utterance_chars: 3,
            ..TurnConfig::default()
        };
        let rules = HeuristicRules::from_config(&config);

        assert!(rules.has_question_markers("so what"));
        assert!(!rules.has_question_markers("何"));
        // Marks are not configurable and stay active.
        assert!(rules.has_question_markers("ok?"));
        assert_eq!(rules.short_utterance_chars, 3);
        assert_eq!(rules.incomplete_endings, owned(INCOMPLETE_ENDINGS));
    }
}
