//! Terminal renderer: prints new turns and streaming progress.
//!
//! Output is append-only, the way a chat log scrolls:
//!
//! ```text
//! you> 今日は
//!  ... うん
//! you> いい天気ですね
//! bot> そうですね、散歩日和です。      ← streamed fragment by fragment
//! ```

use std::io::{self, Write};

use colored::Colorize;

use crate::pipeline::ConversationState;

use super::poller::Renderer;

pub struct TerminalRenderer<W: Write + Send> {
    out: W,
    color: bool,
    recent: usize,
    /// Pairs already printed.  `None` until the first render.
    printed: Option<usize>,
    /// Reply text already echoed while streaming.
    streamed: Option<String>,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout(color: bool, recent: usize) -> Self {
        Self::new(io::stdout(), color, recent)
    }
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W, color: bool, recent: usize) -> Self {
        Self {
            out,
            color,
            recent,
            printed: None,
            streamed: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn try_render(&mut self, state: &ConversationState) -> io::Result<()> {
        let count = state.pair_count();

        let printed = match self.printed {
            // First render: show only the recent tail of restored history.
            None => count.saturating_sub(self.recent),
            Some(printed) if count < printed => {
                let line = self.paint_system("-- history cleared --");
                writeln!(self.out, "{line}")?;
                self.streamed = None;
                0
            }
            Some(printed) => printed,
        };

        for index in printed..count {
            self.print_pair(state, index)?;
        }
        self.printed = Some(count);

        if state.is_generating {
            self.print_streaming(state)?;
        }
        self.out.flush()
    }

    fn print_pair(&mut self, state: &ConversationState, index: usize) -> io::Result<()> {
        let transcript = &state.transcripts[index];
        let response = &state.responses[index];
        let you = self.paint_you();
        let bot = self.paint_bot();

        // The tail of a reply that was being streamed.
        if let Some(shown) = self.streamed.take() {
            match response.strip_prefix(shown.as_str()) {
                Some(rest) => {
                    let rest = self.paint_reply(rest);
                    writeln!(self.out, "{rest}")?;
                }
                None => {
                    let reply = self.paint_reply(response);
                    writeln!(self.out)?;
                    writeln!(self.out, "{bot} {reply}")?;
                }
            }
            return Ok(());
        }

        let continuation = state
            .turns
            .get(index)
            .map(|turn| turn.is_continuation)
            .unwrap_or(false);

        writeln!(self.out, "{you} {transcript}")?;
        if continuation {
            let ack = self.paint_ack(response);
            writeln!(self.out, " ... {ack}")?;
        } else {
            let reply = self.paint_reply(response);
            writeln!(self.out, "{bot} {reply}")?;
        }
        Ok(())
    }

    fn print_streaming(&mut self, state: &ConversationState) -> io::Result<()> {
        let current = state.current_response.as_str();
        match self.streamed.clone() {
            None => {
                let you = self.paint_you();
                let bot = self.paint_bot();
                let reply = self.paint_reply(current);
                writeln!(self.out, "{you} {}", state.current_transcript)?;
                write!(self.out, "{bot} {reply}")?;
                self.streamed = Some(current.to_string());
            }
            Some(shown) => {
                if let Some(rest) = current.strip_prefix(shown.as_str()) {
                    if !rest.is_empty() {
                        let rest = self.paint_reply(rest);
                        write!(self.out, "{rest}")?;
                        self.streamed = Some(current.to_string());
                    }
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Styling
    // -----------------------------------------------------------------------

    fn paint_you(&self) -> String {
        if self.color {
            "you>".green().bold().to_string()
        } else {
            "you>".to_string()
        }
    }

    fn paint_bot(&self) -> String {
        if self.color {
            "bot>".bright_magenta().bold().to_string()
        } else {
            "bot>".to_string()
        }
    }

    fn paint_reply(&self, text: &str) -> String {
        if self.color {
            text.bright_blue().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_ack(&self, text: &str) -> String {
        if self.color {
            text.bright_black().to_string()
        } else {
            text.to_string()
        }
    }

    fn paint_system(&self, text: &str) -> String {
        if self.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn render(&mut self, state: &ConversationState) {
        if let Err(e) = self.try_render(state) {
            log::warn!("presentation: terminal write failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> TerminalRenderer<Vec<u8>> {
        TerminalRenderer::new(Vec::new(), false, 10)
    }

    fn output(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn prints_each_pair_once() {
        let mut renderer = plain();
        let mut state = ConversationState::default();
        state.push_pair("こんにちは".into(), "こんにちは！".into());
        renderer.render(&state);
        state.touch();
        renderer.render(&state);

        assert_eq!(output(renderer), "you> こんにちは\nbot> こんにちは！\n");
    }

    #[test]
    fn streamed_reply_is_not_repeated() {
        let mut renderer = plain();
        let mut state = ConversationState::default();
        renderer.render(&state);

        state.current_transcript = "挨拶して".into();
        state.is_generating = true;
        state.current_response = "こん".into();
        renderer.render(&state);
        state.current_response = "こんにち".into();
        renderer.render(&state);

        state.is_generating = false;
        state.current_response = "こんにちは".into();
        state.push_pair("挨拶して".into(), "こんにちは".into());
        renderer.render(&state);

        assert_eq!(output(renderer), "you> 挨拶して\nbot> こんにちは\n");
    }

    #[test]
    fn first_render_shows_recent_tail_only() {
        let mut renderer = TerminalRenderer::new(Vec::new(), false, 1);
        let mut state = ConversationState::default();
        state.push_pair("古い".into(), "古い返事".into());
        state.push_pair("新しい".into(), "新しい返事".into());
        renderer.render(&state);

        assert_eq!(output(renderer), "you> 新しい\nbot> 新しい返事\n");
    }

    #[test]
    fn cleared_history_is_announced() {
        let mut renderer = plain();
        let mut state = ConversationState::default();
        state.push_pair("a".into(), "b".into());
        renderer.render(&state);
        state.clear_history();
        renderer.render(&state);

        assert!(output(renderer).ends_with("-- history cleared --\n"));
    }
}
