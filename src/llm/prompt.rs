//! System prompts for turn classification and reply generation.
//!
//! [`PromptBuilder`] returns `(system_msg, user_msg)` pairs for the
//! chat-completions endpoint.  Japanese (`"ja"`) and English (`"en"`) have
//! dedicated instructions; any other language code falls back to English.

// ---------------------------------------------------------------------------
// Turn detection
// ---------------------------------------------------------------------------

const TURN_DETECTION_JA: &str = "\
あなたは会話分析を担当します。ユーザーの発言が言い終わったものか、まだ続きがあるものかを判定してください。

次の形式の JSON だけを出力し、説明文は付けないでください：
{\"continueConversation\": true/false, \"acknowledgement\": \"短い相槌\", \"reason\": \"判定理由\"}

基準：
- false: 発言が完結している（質問・依頼・意見がはっきり述べられている）
- true: 発言が途中である（言いかけて止まっている、単語だけ、接続助詞で終わっている）

例：
- 「今日はどんな天気ですか？」→ {\"continueConversation\": false, \"acknowledgement\": \"お答えしますね\", \"reason\": \"質問\"}
- 「今日は…」→ {\"continueConversation\": true, \"acknowledgement\": \"はい\", \"reason\": \"途中で止まっている\"}
- 「それって」→ {\"continueConversation\": true, \"acknowledgement\": \"はい？\", \"reason\": \"続きがある\"}

質問や明確な意見表明は必ず false にしてください。";

const TURN_DETECTION_EN: &str = "\
You analyse spoken conversation. Decide whether the user's utterance is finished or whether they are still mid-sentence.

Reply with ONLY this JSON, no explanation:
{\"continueConversation\": true/false, \"acknowledgement\": \"short backchannel\", \"reason\": \"why\"}

Criteria:
- false: the utterance is complete (a question, request or opinion has been stated)
- true: the speaker stopped mid-thought (trailing conjunction, single word, unfinished clause)

Examples:
- \"What's the weather like today?\" → {\"continueConversation\": false, \"acknowledgement\": \"Let me check\", \"reason\": \"question\"}
- \"So today I...\" → {\"continueConversation\": true, \"acknowledgement\": \"Mm-hm\", \"reason\": \"unfinished\"}

Questions and clear statements must always be false.";

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

const CONVERSATION_JA: &str = "\
あなたは音声で会話する相手です。ユーザーの発言に自然な話し言葉で返答してください。
質問には答え、意見には共感や別の視点を返し、会話を広げてください。
読み上げられる前提なので、箇条書きや記号は使わず、簡潔に話してください。";

const CONVERSATION_EN: &str = "\
You are a spoken conversation partner. Reply to the user in natural, conversational speech.
Answer questions, respond to opinions with empathy or another angle, and keep the conversation going.
Your reply will be read aloud: no lists or markup, keep it brief.";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds chat-message pairs for the classifier and the generator.
///
/// # Example
/// ```rust
/// use voice_chat::llm::PromptBuilder;
///
/// let builder = PromptBuilder::new("ja");
/// let (system, user) = builder.classifier_chat("今日は");
/// assert!(system.contains("continueConversation"));
/// assert!(user.contains("今日は"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: String,
}

impl PromptBuilder {
    /// Create a builder for the given ISO-639-1 language code.
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// `(system_msg, user_msg)` asking for a turn decision on `utterance`.
    pub fn classifier_chat(&self, utterance: &str) -> (String, String) {
        let system = match self.language.as_str() {
            "ja" => TURN_DETECTION_JA,
            _ => TURN_DETECTION_EN,
        };
        let user = match self.language.as_str() {
            "ja" => format!("発言：「{utterance}」"),
            _ => format!("Utterance: \"{utterance}\""),
        };
        (system.to_string(), user)
    }

    /// `(system_msg, user_msg)` asking for a full reply to `prompt`.
    pub fn generator_chat(&self, prompt: &str) -> (String, String) {
        let system = match self.language.as_str() {
            "ja" => CONVERSATION_JA,
            _ => CONVERSATION_EN,
        };
        (system.to_string(), prompt.to_string())
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new("ja")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn japanese_classifier_prompt_asks_for_json() {
        let (system, user) = PromptBuilder::new("ja").classifier_chat("それって");
        assert!(system.contains("\"continueConversation\""));
        assert!(system.contains("\"acknowledgement\""));
        assert_eq!(user, "発言：「それって」");
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let (system, user) = PromptBuilder::new("de").classifier_chat("also");
        assert!(system.starts_with("You analyse"));
        assert_eq!(user, "Utterance: \"also\"");
    }

    #[test]
    fn generator_passes_prompt_through() {
        let (system, user) = PromptBuilder::new("en").generator_chat("tell me a joke");
        assert!(system.contains("conversation partner"));
        assert_eq!(user, "tell me a joke");
    }
}
