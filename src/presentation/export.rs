//! Save a conversation as a self-contained HTML page.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

use crate::pipeline::ConversationState;

const STYLE: &str = "\
body{font-family:sans-serif;max-width:46rem;margin:2rem auto;padding:0 1rem;background:#fafafa}
.turn{margin:.6rem 0;padding:.5rem .8rem;border-radius:.5rem}
.user{background:#e3f2e3}
.ack{background:#f0f0f0;color:#666;font-size:.9em}
.reply{background:#e6ecfa}
.meta{color:#999;font-size:.75em}";

/// Render `state` as an HTML document.  All conversation text is escaped.
pub fn render_html(state: &ConversationState) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"ja\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Conversation</title>\n<style>\n");
    html.push_str(STYLE);
    html.push_str("\n</style>\n</head>\n<body>\n<h1>Conversation</h1>\n");

    if let Some(updated) = state.last_updated {
        html.push_str(&format!(
            "<p class=\"meta\">Last updated {}</p>\n",
            escape_html(&local_time(updated))
        ));
    }

    for (index, transcript, response) in state.recent(state.pair_count()) {
        let continuation = state
            .turns
            .get(index)
            .map(|turn| turn.is_continuation)
            .unwrap_or(false);
        let class = if continuation { "ack" } else { "reply" };

        html.push_str(&format!(
            "<div class=\"turn user\">{}</div>\n<div class=\"turn {class}\">{}</div>\n",
            escape_html(transcript),
            escape_html(response)
        ));
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Write the conversation to `path`, creating parent directories.
pub fn export_html(state: &ConversationState, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating export directory {parent:?}"))?;
        }
    }
    std::fs::write(path, render_html(state))
        .with_context(|| format!("writing conversation export {path:?}"))?;
    Ok(())
}

/// `<dir>/conversation-YYYYmmdd-HHMMSS.html` for the current local time.
pub fn timestamped_export_path(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("conversation-{stamp}.html"))
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            _ => out.push(c),
        }
    }
    out
}
