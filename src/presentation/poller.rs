//! Timer-driven presentation loop.
//!
//! [`PresentationLoop`] re-reads the snapshot file every poll interval and
//! hands it to a [`Renderer`] only when its `version` moved.  It never talks
//! to the orchestrator directly, so it can run in another task (or process)
//! and tolerates reading a turn that is still being generated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::pipeline::ConversationState;
use crate::snapshot::SnapshotStore;

// ---------------------------------------------------------------------------
// Renderer trait
// ---------------------------------------------------------------------------

/// Something that can display a conversation snapshot.
pub trait Renderer: Send {
    fn render(&mut self, state: &ConversationState);
}

// ---------------------------------------------------------------------------
// StopHandle
// ---------------------------------------------------------------------------

/// Stops a running [`PresentationLoop`].  Cheap to clone.
#[derive(Clone)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

struct StopInner {
    stopped: AtomicBool,
    wake: Notify,
}

impl StopHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        }
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// PresentationLoop
// ---------------------------------------------------------------------------

pub struct PresentationLoop<R: Renderer> {
    store: SnapshotStore,
    renderer: R,
    interval: Duration,
    last_version: Option<u64>,
    stop: StopHandle,
}

impl<R: Renderer> PresentationLoop<R> {
    pub fn new(store: SnapshotStore, renderer: R, interval: Duration) -> Self {
        Self {
            store,
            renderer,
            interval,
            last_version: None,
            stop: StopHandle::new(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Read the snapshot once; render if it changed.  Returns `true` when
    /// the renderer was called.
    pub async fn poll_once(&mut self) -> bool {
        let store = self.store.clone();
        let state = match tokio::task::spawn_blocking(move || store.read()).await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("presentation: snapshot read task failed: {e}");
                return false;
            }
        };
        self.render_if_changed(&state)
    }

    fn render_if_changed(&mut self, state: &ConversationState) -> bool {
        if self.last_version == Some(state.version) {
            return false;
        }
        log::debug!(
            "presentation: rendering version {} ({} turns)",
            state.version,
            state.pair_count()
        );
        self.renderer.render(state);
        self.last_version = Some(state.version);
        true
    }

    /// Poll until stopped.  Returns the renderer so callers can inspect it.
    pub async fn run(mut self) -> R {
        log::info!("presentation: polling every {:?}", self.interval);
        let stop = self.stop.clone();
        while !stop.is_stopped() {
            self.poll_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = stop.inner.wake.notified() => {}
            }
        }
        // One last look so the final snapshot is shown.
        self.poll_once().await;
        log::info!("presentation: stopped");
        self.renderer
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the version of every rendered snapshot.
    #[derive(Clone, Default)]
    struct Versions(Arc<Mutex<Vec<u64>>>);

    impl Versions {
        fn seen(&self) -> Vec<u64> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Renderer for Versions {
        fn render(&mut self, state: &ConversationState) {
            self.0.lock().unwrap().push(state.version);
        }
    }

    fn versioned(version: u64) -> ConversationState {
        ConversationState {
            version,
            ..ConversationState::default()
        }
    }

    #[tokio::test]
    async fn renders_only_when_version_changes() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        let versions = Versions::default();
        let mut poller =
            PresentationLoop::new(store.clone(), versions.clone(), Duration::from_millis(10));

        store.write(&versioned(1)).unwrap();
        assert!(poller.poll_once().await);
        assert!(!poller.poll_once().await);

        store.write(&versioned(2)).unwrap();
        assert!(poller.poll_once().await);
        assert_eq!(versions.seen(), vec![1, 2]);
    }

    #[tokio::test]
    async fn missing_snapshot_renders_empty_state_once() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("absent.json"));
        let versions = Versions::default();
        let mut poller = PresentationLoop::new(store, versions.clone(), Duration::from_millis(10));

        assert!(poller.poll_once().await);
        assert!(!poller.poll_once().await);
        assert_eq!(versions.seen(), vec![0]);
    }

    #[tokio::test]
    async fn growing_reply_is_rendered_each_time() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        let versions = Versions::default();
        let mut poller =
            PresentationLoop::new(store.clone(), versions.clone(), Duration::from_millis(10));

        let mut state = versioned(1);
        state.is_generating = true;
        for piece in ["こん", "にち", "は"] {
            state.current_response.push_str(piece);
            state.touch();
            store.write(&state).unwrap();
            assert!(poller.poll_once().await);
        }
        assert_eq!(versions.seen(), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn stop_handle_ends_run() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("state.json"));
        store.write(&versioned(7)).unwrap();

        let poller = PresentationLoop::new(store, Versions::default(), Duration::from_secs(60));
        let stop = poller.stop_handle();
        let task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.stop();
        let renderer = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renderer.seen(), vec![7]);
    }
}
