//! Durable conversation snapshot shared with the presentation layer.

pub mod store;

pub use store::{SnapshotError, SnapshotRecord, SnapshotStore};
