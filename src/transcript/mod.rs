//! Transcript source boundary: recognizer events in, utterances out.

pub mod source;

pub use source::{
    parse_console_line, read_console, ConsoleCommand, ConsoleLine, TranscriptEvent, TranscriptSink,
};
