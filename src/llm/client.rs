//! OpenAI-compatible chat-completions client shared by the classifier and
//! the generator.
//!
//! [`ChatClient`] calls any `/v1/chat/completions` endpoint — Ollama (OpenAI
//! mode), OpenAI, Groq, LM Studio, vLLM, etc.  All connection details come
//! from [`LlmConfig`]; nothing is hardcoded.  Streaming uses the
//! server-sent-events wire format (`data: {…}` lines, `data: [DONE]`).

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::LlmConfig;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

/// Errors that can occur while calling a model backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport, connection or status error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("LLM request timed out")]
    Timeout,

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The model returned no usable text content.
    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// The backend is switched off in config.
    #[error("LLM backend is disabled")]
    Disabled,

    /// The backend panicked while producing a result.
    #[error("LLM backend panicked: {0}")]
    Panicked(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SSE line parsing
// ---------------------------------------------------------------------------

/// One line of a streaming chat-completions response.
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// A content delta.
    Fragment(String),
    /// The `data: [DONE]` terminator.
    Done,
    /// Anything else: blank lines, comments, role-only deltas.
    Skip,
}

/// Classify one line of an SSE chat-completions stream.
pub fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    let Some(payload) = line.trim().strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let json: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| LlmError::Parse(e.to_string()))?;

    match json["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Ok(SseLine::Fragment(content.to_string())),
        _ => Ok(SseLine::Skip),
    }
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Thin wrapper around `reqwest` for one configured endpoint.
pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    /// Build a client from config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.  A default (no-timeout) client is used as a
    /// last-resort fallback if the builder fails.
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn request(&self, system: &str, user: &str, stream: bool) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let body = serde_json::json!({
            "model":       self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user",   "content": user   }
            ],
            "stream":      stream,
            "temperature": self.config.temperature,
            "max_tokens":  self.config.max_tokens
        });

        let mut req = self.client.post(&url).json(&body);

        // Authorization only when a non-empty key is configured.
        if let Some(key) = self.config.resolved_api_key() {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Single-shot completion.  Returns the trimmed message content.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let response = self
            .request(system, user, false)
            .send()
            .await?
            .error_for_status()?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::EmptyResponse)?
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(content)
    }

    /// Streaming completion.  Every content delta is sent on `fragments` as
    /// it arrives; the concatenated text is returned at the end.
    pub async fn complete_stream(
        &self,
        system: &str,
        user: &str,
        fragments: &mpsc::UnboundedSender<String>,
    ) -> Result<String, LlmError> {
        let response = self
            .request(system, user, true)
            .send()
            .await?
            .error_for_status()?;

        let mut body = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut full = String::new();

        'stream: while let Some(chunk) = body.next().await {
            pending.extend_from_slice(&chunk?);

            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(&line)? {
                    SseLine::Fragment(text) => {
                        full.push_str(&text);
                        // Receiver gone means nobody renders; keep collecting.
                        let _ = fragments.send(text);
                    }
                    SseLine::Done => break 'stream,
                    SseLine::Skip => {}
                }
            }
        }

        if full.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(full)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    fn make_config(api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            enabled: true,
            provider: LlmProvider::OpenAiCompatible,
            base_url: "http://localhost:11434/".into(),
            api_key: api_key.map(|s| s.to_string()),
            api_key_env: None,
            model: "qwen2.5:3b".into(),
            temperature: 0.3,
            max_tokens: 64,
            timeout_secs: 10,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _client = ChatClient::from_config(&make_config(None));
        let _client = ChatClient::from_config(&make_config(Some("")));
        let _client = ChatClient::from_config(&make_config(Some("sk-test-1234")));
    }

    #[test]
    fn request_targets_chat_completions_without_double_slash() {
        let client = ChatClient::from_config(&make_config(None));
        let req = client.request("sys", "user", false).build().unwrap();
        assert_eq!(req.url().as_str(), "http://localhost:11434/v1/chat/completions");
        assert!(req.headers().get("authorization").is_none());
    }

    #[test]
    fn request_sets_bearer_only_for_non_empty_key() {
        let client = ChatClient::from_config(&make_config(Some("sk-test")));
        let req = client.request("sys", "user", true).build().unwrap();
        assert_eq!(
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok()),
            Some("Bearer sk-test")
        );

        let client = ChatClient::from_config(&make_config(Some("")));
        let req = client.request("sys", "user", true).build().unwrap();
        assert!(req.headers().get("authorization").is_none());
    }

    #[test]
    fn sse_content_delta_is_fragment() {
        let line = r#"data: {"choices":[{"delta":{"content":"こん"}}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            SseLine::Fragment("こん".into())
        );
    }

    #[test]
    fn sse_done_terminates() {
        assert_eq!(parse_sse_line("data: [DONE]\n").unwrap(), SseLine::Done);
    }

    #[test]
    fn sse_role_only_delta_and_blank_lines_are_skipped() {
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role).unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
    }

    #[test]
    fn sse_garbage_payload_is_parse_error() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(LlmError::Parse(_))
        ));
    }
}
