//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// LlmProvider
// ---------------------------------------------------------------------------

/// Selects which backend answers classifier / generator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LlmProvider {
    /// Ollama running locally (OpenAI mode) — no authentication required.
    Ollama,
    /// Any OpenAI-compatible REST API (OpenAI, Groq, Together.ai, LM Studio …).
    OpenAiCompatible,
    /// Backend switched off.  A disabled classifier means heuristic-only
    /// turn-taking; a disabled generator means every reply is the error marker.
    Disabled,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Ollama
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Connection settings for one chat-completions endpoint.
///
/// The classifier and the generator each get their own copy so they can run
/// on different models (a small fast one for turn detection, a larger one for
/// replies).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Whether this backend is used at all.
    pub enabled: bool,
    /// Which backend to use.
    pub provider: LlmProvider,
    /// Base URL of the API endpoint.
    ///
    /// - Ollama default: `http://localhost:11434`
    /// - OpenAI: `https://api.openai.com`
    pub base_url: String,
    /// API key — `None` for local providers.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is not set.
    pub api_key_env: Option<String>,
    /// Model identifier sent to the API (e.g. `"qwen2.5:3b"`, `"gpt-4o-mini"`).
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Upper bound on generated tokens per call.
    pub max_tokens: u32,
    /// Maximum seconds to wait for a response before timing out.
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Defaults tuned for the turn classifier: deterministic, short output,
    /// tight timeout.
    pub fn classifier_default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::default(),
            base_url: "http://localhost:11434".into(),
            api_key: None,
            api_key_env: None,
            model: "qwen2.5:3b".into(),
            temperature: 0.2,
            max_tokens: 128,
            timeout_secs: 10,
        }
    }

    /// Defaults tuned for the response generator.
    pub fn generator_default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::default(),
            base_url: "http://localhost:11434".into(),
            api_key: None,
            api_key_env: None,
            model: "qwen2.5:7b".into(),
            temperature: 0.9,
            max_tokens: 2048,
            timeout_secs: 60,
        }
    }

    /// `true` unless the section is switched off by either flag.
    pub fn is_active(&self) -> bool {
        self.enabled && self.provider != LlmProvider::Disabled
    }

    /// The key to send, if any: `api_key` first, then the `api_key_env`
    /// variable.  Empty strings count as "no key".
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
            })
            .filter(|key| !key.is_empty())
    }

    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::classifier_default()
    }
}

// ---------------------------------------------------------------------------
// TurnConfig
// ---------------------------------------------------------------------------

/// Turn-taking behaviour of the orchestrator and the decision parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Prompt language as an ISO-639-1 code (`"ja"`, `"en"`).
    pub language: String,
    /// Stream generator replies fragment by fragment into the snapshot.
    pub stream_replies: bool,
    /// Reply recorded when the generator fails or times out.
    pub error_marker: String,
    /// Pause after a failed utterance before the worker takes the next one.
    pub error_pause_ms: u64,
    /// Filler used when the classifier gave a decision but no acknowledgement.
    pub default_acknowledgement: String,
    /// Utterances shorter than this many characters count as "short" for the
    /// heuristic fallback.
    pub short_utterance_chars: usize,
    /// Replaces the built-in interrogative word list when set.
    pub question_words: Option<Vec<String>>,
    /// Replaces the built-in incomplete-clause endings when set.
    pub incomplete_endings: Option<Vec<String>>,
    /// Replaces the built-in sentence-final particles when set.
    pub final_particles: Option<Vec<String>>,
}

impl TurnConfig {
    pub fn error_pause(&self) -> Duration {
        Duration::from_millis(self.error_pause_ms)
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            language: "ja".into(),
            stream_replies: true,
            error_marker: "（応答を生成できませんでした）".into(),
            error_pause_ms: 1_000,
            default_acknowledgement: "なるほど".into(),
            short_utterance_chars: 10,
            question_words: None,
            incomplete_endings: None,
            final_particles: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SnapshotConfig
// ---------------------------------------------------------------------------

/// Where and whether the conversation snapshot is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Explicit snapshot path.  `None` uses [`AppPaths::state_file`].
    pub path: Option<PathBuf>,
    /// Load the previous conversation on startup.
    pub restore_on_start: bool,
}

impl SnapshotConfig {
    /// The effective snapshot path.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppPaths::new().state_file)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: None,
            restore_on_start: true,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Presentation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Snapshot poll cadence in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of exchanges kept in the rendered "recent" view.
    pub recent_turns: usize,
    /// Colourise terminal output.
    pub color: bool,
}

impl UiConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            recent_turns: 10,
            color: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_chat::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Turn classifier endpoint.
    pub classifier: LlmConfig,
    /// Response generator endpoint.
    pub generator: LlmConfig,
    /// Turn-taking behaviour.
    pub turn: TurnConfig,
    /// Snapshot persistence.
    pub snapshot: SnapshotConfig,
    /// Presentation loop.
    pub ui: UiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            classifier: LlmConfig::classifier_default(),
            generator: LlmConfig::generator_default(),
            turn: TurnConfig::default(),
            snapshot: SnapshotConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.classifier.base_url, loaded.classifier.base_url);
        assert_eq!(original.classifier.model, loaded.classifier.model);
        assert_eq!(original.classifier.timeout_secs, loaded.classifier.timeout_secs);
        assert_eq!(original.generator.model, loaded.generator.model);
        assert_eq!(original.generator.max_tokens, loaded.generator.max_tokens);

        assert_eq!(original.turn.stream_replies, loaded.turn.stream_replies);
        assert_eq!(original.turn.error_marker, loaded.turn.error_marker);
        assert_eq!(
            original.turn.short_utterance_chars,
            loaded.turn.short_utterance_chars
        );

        assert_eq!(original.snapshot.restore_on_start, loaded.snapshot.restore_on_start);
        assert_eq!(original.ui.poll_interval_ms, loaded.ui.poll_interval_ms);
        assert_eq!(original.ui.recent_turns, loaded.ui.recent_turns);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        let default = AppConfig::default();

        assert_eq!(config.classifier.model, default.classifier.model);
        assert_eq!(config.turn.error_marker, default.turn.error_marker);
        assert_eq!(config.ui.poll_interval_ms, default.ui.poll_interval_ms);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[generator]\nmodel = \"gpt-4o-mini\"\n\n[ui]\nrecent_turns = 3\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.generator.model, "gpt-4o-mini");
        assert_eq!(cfg.generator.max_tokens, 2048);
        assert_eq!(cfg.ui.recent_turns, 3);
        assert_eq!(cfg.ui.poll_interval_ms, 500);
        assert_eq!(cfg.classifier.model, "qwen2.5:3b");
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.classifier.base_url, "http://localhost:11434");
        assert_eq!(cfg.classifier.timeout_secs, 10);
        assert!(cfg.classifier.api_key.is_none());
        assert_eq!(cfg.generator.timeout_secs, 60);
        assert!(cfg.turn.stream_replies);
        assert_eq!(cfg.turn.language, "ja");
        assert_eq!(cfg.turn.short_utterance_chars, 10);
        assert_eq!(cfg.turn.default_acknowledgement, "なるほど");
        assert_eq!(cfg.ui.recent_turns, 10);
        assert!(cfg.snapshot.path.is_none());
    }

    #[test]
    fn disabled_provider_is_inactive() {
        let mut cfg = LlmConfig::classifier_default();
        assert!(cfg.is_active());
        cfg.provider = LlmProvider::Disabled;
        assert!(!cfg.is_active());
        cfg.provider = LlmProvider::OpenAiCompatible;
        cfg.enabled = false;
        assert!(!cfg.is_active());
    }

    #[test]
    fn api_key_prefers_explicit_value_and_ignores_empty() {
        let mut cfg = LlmConfig::generator_default();
        cfg.api_key = Some("sk-explicit".into());
        cfg.api_key_env = Some("VOICE_CHAT_TEST_KEY_UNSET".into());
        assert_eq!(cfg.resolved_api_key().as_deref(), Some("sk-explicit"));

        cfg.api_key = Some(String::new());
        assert_eq!(cfg.resolved_api_key(), None);

        cfg.api_key = None;
        assert_eq!(cfg.resolved_api_key(), None);
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.classifier.provider = LlmProvider::OpenAiCompatible;
        cfg.classifier.base_url = "https://api.openai.com".into();
        cfg.classifier.api_key_env = Some("OPENAI_API_KEY".into());
        cfg.generator.provider = LlmProvider::Disabled;
        cfg.turn.stream_replies = false;
        cfg.turn.question_words = Some(vec!["what".into(), "why".into()]);
        cfg.snapshot.path = Some(PathBuf::from("/tmp/state.json"));

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.classifier.provider, LlmProvider::OpenAiCompatible);
        assert_eq!(loaded.classifier.base_url, "https://api.openai.com");
        assert_eq!(loaded.classifier.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
        assert_eq!(loaded.generator.provider, LlmProvider::Disabled);
        assert!(!loaded.turn.stream_replies);
        assert_eq!(
            loaded.turn.question_words,
            Some(vec!["what".to_string(), "why".to_string()])
        );
        assert_eq!(loaded.snapshot.path, Some(PathBuf::from("/tmp/state.json")));
    }
}
