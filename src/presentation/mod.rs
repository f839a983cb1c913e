//! Presentation layer: snapshot polling, terminal rendering, HTML export.
//!
//! The presentation side never holds a reference into the orchestrator.  It
//! polls the snapshot file and re-renders when `version` changes.

pub mod export;
pub mod poller;
pub mod terminal;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use export::{export_html, render_html, timestamped_export_path};
pub use poller::{PresentationLoop, Renderer, StopHandle};
pub use terminal::TerminalRenderer;
