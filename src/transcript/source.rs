//! Transcript events and the console stand-in for a speech recognizer.
//!
//! A recognizer emits partial hypotheses followed by one final result per
//! utterance.  [`TranscriptSink`] forwards only final, non-blank text to the
//! orchestrator.  For the terminal front-end every stdin line is a final
//! transcript; a leading `~` marks a partial one, and `/`-prefixed lines are
//! console commands.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::pipeline::{OrchestratorHandle, SubmitError};

// ---------------------------------------------------------------------------
// TranscriptEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptEvent {
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TranscriptSink
// ---------------------------------------------------------------------------

/// Filters recognizer events into orchestrator submissions.
pub struct TranscriptSink {
    handle: OrchestratorHandle,
    forwarded: u64,
}

impl TranscriptSink {
    pub fn new(handle: OrchestratorHandle) -> Self {
        Self {
            handle,
            forwarded: 0,
        }
    }

    /// Submit `event` if it is final and non-blank.  Returns whether it was
    /// forwarded.
    pub fn accept(&mut self, event: TranscriptEvent) -> Result<bool, SubmitError> {
        if !event.is_final {
            log::trace!("transcript: partial {:?}", event.text);
            return Ok(false);
        }
        let text = event.text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        self.handle.submit_text(text)?;
        self.forwarded += 1;
        Ok(true)
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

// ---------------------------------------------------------------------------
// Console input
// ---------------------------------------------------------------------------

/// Commands understood by the terminal front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Clear,
    History,
    /// Export to the given path, or a timestamped file when `None`.
    Export(Option<String>),
    Help,
    Quit,
    Unknown(String),
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    Transcript(TranscriptEvent),
    Command(ConsoleCommand),
}

/// Parse a stdin line.  Blank lines yield `None`.
pub fn parse_console_line(line: &str) -> Option<ConsoleLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(partial) = line.strip_prefix('~') {
        return Some(ConsoleLine::Transcript(TranscriptEvent::partial(
            partial.trim(),
        )));
    }

    let Some(command) = line.strip_prefix('/') else {
        return Some(ConsoleLine::Transcript(TranscriptEvent::final_text(line)));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
        None => (command, None),
    };
    let command = match name {
        "clear" => ConsoleCommand::Clear,
        "history" => ConsoleCommand::History,
        "export" | "save" => ConsoleCommand::Export(arg),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => ConsoleCommand::Unknown(other.to_string()),
    };
    Some(ConsoleLine::Command(command))
}

/// Read `reader` line by line and forward every parsed line on `lines`.
/// Returns at end of input or when the receiver is gone.
pub async fn read_console<R>(reader: R, lines: mpsc::UnboundedSender<ConsoleLine>)
where
    R: AsyncBufRead + Unpin,
{
    let mut input = reader.lines();
    loop {
        match input.next_line().await {
            Ok(Some(line)) => {
                if let Some(parsed) = parse_console_line(&line) {
                    if lines.send(parsed).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("transcript: stdin read failed: {e}");
                break;
            }
        }
    }
    log::debug!("transcript: console input closed");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
