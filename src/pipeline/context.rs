//! Accumulated context for an in-progress turn.
//!
//! Utterances judged "still speaking" are joined here (single-space
//! separated) until the classifier decides the turn is complete; the next
//! completion consumes the whole buffer as the prefix of its prompt.

/// Concatenation of the utterances of the current, unfinished turn.
///
/// # Example
/// ```rust
/// use voice_chat::pipeline::AccumulatedContext;
///
/// let mut ctx = AccumulatedContext::new();
/// ctx.push("今日は");
/// assert_eq!(ctx.combine("いい天気ですね"), "今日は いい天気ですね");
/// ctx.clear();
/// assert_eq!(ctx.combine("はい"), "はい");
/// ```
#[derive(Debug, Default, Clone)]
pub struct AccumulatedContext {
    text: String,
}

impl AccumulatedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one continuation utterance.
    pub fn push(&mut self, utterance: &str) {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(utterance);
    }

    /// Prompt for a completed turn: context + `" "` + utterance, or just the
    /// utterance when nothing has accumulated.
    pub fn combine(&self, utterance: &str) -> String {
        if self.text.trim().is_empty() {
            utterance.to_string()
        } else {
            format!("{} {}", self.text, utterance)
        }
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushes_join_with_single_space() {
        let mut ctx = AccumulatedContext::new();
        ctx.push("それって");
        ctx.push("  昨日の話  ");
        assert_eq!(ctx.as_str(), "それって 昨日の話");
    }

    #[test]
    fn blank_push_is_ignored() {
        let mut ctx = AccumulatedContext::new();
        ctx.push("   ");
        assert!(ctx.is_empty());
        assert_eq!(ctx.combine("x"), "x");
    }

    #[test]
    fn combine_does_not_consume() {
        let mut ctx = AccumulatedContext::new();
        ctx.push("a");
        assert_eq!(ctx.combine("b"), "a b");
        assert_eq!(ctx.as_str(), "a");
    }
}
