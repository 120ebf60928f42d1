//! `StoryBoard` — the scene pipeline orchestrator.
//!
//! ## Per-final-transcript work
//!
//! ```text
//! 1. Trim; empty text → no scene
//! 2. Read SharedVolume → loudness frozen for this scene
//! 3. Classify tone, assign fresh id + timestamp, append Scene
//! 4. If the text clears the illustration threshold, dispatch one async
//!    request keyed by the scene id (pending count incremented)
//! 5. On completion, merge the result back by identity; stale or duplicate
//!    results are discarded silently
//! ```
//!
//! The scene collection is owned exclusively by the board; consumers observe
//! it through [`StoryBoard::scenes`] snapshots and the broadcast channel.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::illustrate::Illustrator;
use crate::scene::{ImageRef, Scene, SceneId, Tone};
use crate::volume::SharedVolume;

/// Broadcast channel capacity: 256 story events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Finalized text must exceed this many characters (after trimming) to
/// qualify for an illustration request.
pub const DEFAULT_ILLUSTRATION_THRESHOLD: usize = 10;

/// Storyboard change notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "type")]
pub enum StoryEvent {
    /// A new scene was appended.
    SceneAdded { scene: Scene },
    /// An illustration result was merged into its scene.
    SceneIllustrated { scene_id: SceneId, image: ImageRef },
    /// An illustration request failed; the scene stays text-only.
    IllustrationFailed { scene_id: SceneId, reason: String },
    /// The whole storyboard was cleared.
    Cleared,
}

/// The ordered scene collection plus illustration dispatch.
///
/// `StoryBoard` is `Send + Sync` — all fields use interior mutability. Wrap
/// in `Arc` (the constructors already do) so merge tasks can hold it.
pub struct StoryBoard {
    scenes: Mutex<Vec<Scene>>,
    next_id: AtomicU64,
    /// Count of illustration requests currently in flight.
    pending: AtomicUsize,
    volume: SharedVolume,
    illustrator: Arc<dyn Illustrator>,
    events_tx: broadcast::Sender<StoryEvent>,
    illustration_threshold: usize,
}

impl StoryBoard {
    pub fn new(volume: SharedVolume, illustrator: Arc<dyn Illustrator>) -> Arc<Self> {
        Self::with_threshold(volume, illustrator, DEFAULT_ILLUSTRATION_THRESHOLD)
    }

    pub fn with_threshold(
        volume: SharedVolume,
        illustrator: Arc<dyn Illustrator>,
        illustration_threshold: usize,
    ) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(BROADCAST_CAP);
        Arc::new(Self {
            scenes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            volume,
            illustrator,
            events_tx,
            illustration_threshold,
        })
    }

    /// Handle one finalized transcript: create a scene and, when the text is
    /// long enough, dispatch its illustration request.
    ///
    /// Returns the new scene's id, or `None` when the text is empty after
    /// trimming (no scene created).
    pub fn on_final_transcript(self: &Arc<Self>, text: &str) -> Option<SceneId> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("ignoring empty final transcript");
            return None;
        }

        let loudness = self.volume.get();
        let scene = Scene {
            id: SceneId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            text: trimmed.to_string(),
            image_ref: None,
            created_at: Utc::now(),
            loudness,
            tone: Tone::from_loudness(loudness),
        };
        let id = scene.id;

        info!(
            scene = %id,
            tone = %scene.tone,
            loudness = format_args!("{loudness:.2}"),
            "scene created"
        );

        self.scenes.lock().push(scene.clone());
        let _ = self.events_tx.send(StoryEvent::SceneAdded { scene });

        if trimmed.chars().count() > self.illustration_threshold {
            self.dispatch_illustration(id, trimmed.to_string());
        } else {
            debug!(scene = %id, "below illustration threshold — scene stays text-only");
        }

        Some(id)
    }

    fn dispatch_illustration(self: &Arc<Self>, id: SceneId, text: String) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let board = Arc::clone(self);
        tokio::spawn(async move {
            match board.illustrator.request(id, &text).await {
                Ok(image) => board.attach_image(id, image),
                Err(e) => {
                    warn!(
                        scene = %id,
                        error = %e,
                        "illustration request failed — scene stays unillustrated"
                    );
                    let _ = board.events_tx.send(StoryEvent::IllustrationFailed {
                        scene_id: id,
                        reason: e.to_string(),
                    });
                }
            }
            board.pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Merge an illustration result by scene identity.
    ///
    /// Sets the image only when the scene still exists and has none. Results
    /// for cleared or already-illustrated scenes are discarded silently —
    /// stale completions are expected, not errors.
    pub fn attach_image(&self, id: SceneId, image: ImageRef) {
        let mut scenes = self.scenes.lock();
        match scenes.iter_mut().find(|s| s.id == id) {
            Some(scene) if scene.image_ref.is_none() => {
                scene.image_ref = Some(image.clone());
                drop(scenes);
                info!(scene = %id, "illustration attached");
                let _ = self.events_tx.send(StoryEvent::SceneIllustrated {
                    scene_id: id,
                    image,
                });
            }
            Some(_) => {
                debug!(scene = %id, "scene already illustrated — discarding duplicate result");
            }
            None => {
                debug!(scene = %id, "scene no longer present — discarding stale result");
            }
        }
    }

    /// Snapshot of the ordered scene list.
    pub fn scenes(&self) -> Vec<Scene> {
        self.scenes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.scenes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.lock().is_empty()
    }

    /// True while at least one illustration request is in flight.
    pub fn is_processing(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    pub fn pending_illustrations(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Empty the storyboard. Outstanding illustration results for removed
    /// scenes fall under the staleness rule and are discarded on arrival.
    pub fn clear(&self) {
        let mut scenes = self.scenes.lock();
        if scenes.is_empty() {
            return;
        }
        scenes.clear();
        drop(scenes);
        info!("storyboard cleared");
        let _ = self.events_tx.send(StoryEvent::Cleared);
    }

    /// Subscribe to storyboard change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoryEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use crate::error::{FabulaError, Result};

    /// Resolves immediately, recording every call.
    struct RecordingIllustrator {
        calls: Mutex<Vec<(SceneId, String)>>,
    }

    impl RecordingIllustrator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(SceneId, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Illustrator for RecordingIllustrator {
        async fn request(&self, scene: SceneId, text: &str) -> Result<ImageRef> {
            self.calls.lock().push((scene, text.to_string()));
            Ok(ImageRef(format!("img://{scene}")))
        }
    }

    /// Completion order controlled by per-scene oneshot gates.
    struct GatedIllustrator {
        gates: Mutex<HashMap<SceneId, oneshot::Receiver<Result<ImageRef>>>>,
    }

    impl GatedIllustrator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gates: Mutex::new(HashMap::new()),
            })
        }

        fn gate(&self, id: SceneId) -> oneshot::Sender<Result<ImageRef>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().insert(id, rx);
            tx
        }
    }

    #[async_trait]
    impl Illustrator for GatedIllustrator {
        async fn request(&self, scene: SceneId, _text: &str) -> Result<ImageRef> {
            let rx = self
                .gates
                .lock()
                .remove(&scene)
                .expect("gate registered for scene");
            rx.await.expect("gate sender dropped")
        }
    }

    struct FailingIllustrator;

    #[async_trait]
    impl Illustrator for FailingIllustrator {
        async fn request(&self, _scene: SceneId, _text: &str) -> Result<ImageRef> {
            Err(FabulaError::Illustration("service unavailable".into()))
        }
    }

    async fn recv_event(rx: &mut broadcast::Receiver<StoryEvent>) -> StoryEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for story event")
            .expect("story event channel closed")
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(1);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn scenes_follow_transcript_order_with_frozen_loudness() {
        let volume = SharedVolume::new();
        let board = StoryBoard::new(volume.clone(), RecordingIllustrator::new());

        volume.set(0.2);
        board.on_final_transcript("A gentle breeze blew.");
        volume.set(0.9);
        board.on_final_transcript("RUN NOW!");

        // A later volume change must not touch existing scenes.
        volume.set(0.5);

        let scenes = board.scenes();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].text, "A gentle breeze blew.");
        assert_eq!(scenes[0].tone, Tone::Calm);
        assert!((scenes[0].loudness - 0.2).abs() < 1e-6);
        assert_eq!(scenes[1].text, "RUN NOW!");
        assert_eq!(scenes[1].tone, Tone::Excited);
        assert!(scenes[0].id < scenes[1].id);
    }

    #[tokio::test]
    async fn empty_and_whitespace_transcripts_create_no_scene() {
        let board = StoryBoard::new(SharedVolume::new(), RecordingIllustrator::new());
        assert_eq!(board.on_final_transcript(""), None);
        assert_eq!(board.on_final_transcript("   \t\n"), None);
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn transcript_text_is_trimmed_before_storage() {
        let board = StoryBoard::new(SharedVolume::new(), RecordingIllustrator::new());
        board.on_final_transcript("  ok  ");
        assert_eq!(board.scenes()[0].text, "ok");
    }

    #[tokio::test]
    async fn short_transcripts_never_request_illustration() {
        let illustrator = RecordingIllustrator::new();
        let board = StoryBoard::new(SharedVolume::new(), Arc::clone(&illustrator) as Arc<dyn Illustrator>);

        board.on_final_transcript("ok");
        // Exactly at the threshold (10 chars) — still not illustrated.
        board.on_final_transcript("0123456789");
        // One past the threshold — illustrated.
        board.on_final_transcript("0123456789a");

        wait_until(|| !board.is_processing()).await;

        let calls = illustrator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "0123456789a");
        assert_eq!(board.len(), 3);
        assert!(board.scenes()[0].image_ref.is_none());
        assert!(board.scenes()[1].image_ref.is_none());
    }

    #[tokio::test]
    async fn out_of_order_completion_merges_by_identity() {
        let illustrator = GatedIllustrator::new();
        let board = StoryBoard::new(SharedVolume::new(), Arc::clone(&illustrator) as Arc<dyn Illustrator>);
        let mut events = board.subscribe();

        let gate_a = illustrator.gate(SceneId(0));
        let gate_b = illustrator.gate(SceneId(1));

        let a = board
            .on_final_transcript("The fox crept through the fog.")
            .expect("scene a");
        let b = board
            .on_final_transcript("Thunder rolled over the hills.")
            .expect("scene b");

        // Drain the two SceneAdded events.
        recv_event(&mut events).await;
        recv_event(&mut events).await;

        // Resolve B before A.
        gate_b
            .send(Ok(ImageRef("img://b".into())))
            .expect("deliver b");
        match recv_event(&mut events).await {
            StoryEvent::SceneIllustrated { scene_id, image } => {
                assert_eq!(scene_id, b);
                assert_eq!(image.0, "img://b");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        gate_a
            .send(Ok(ImageRef("img://a".into())))
            .expect("deliver a");
        match recv_event(&mut events).await {
            StoryEvent::SceneIllustrated { scene_id, image } => {
                assert_eq!(scene_id, a);
                assert_eq!(image.0, "img://a");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let scenes = board.scenes();
        assert_eq!(scenes[0].image_ref.as_ref().map(|i| i.0.as_str()), Some("img://a"));
        assert_eq!(scenes[1].image_ref.as_ref().map(|i| i.0.as_str()), Some("img://b"));
    }

    #[tokio::test]
    async fn stale_result_after_clear_is_discarded() {
        let illustrator = GatedIllustrator::new();
        let board = StoryBoard::new(SharedVolume::new(), Arc::clone(&illustrator) as Arc<dyn Illustrator>);

        let gate = illustrator.gate(SceneId(0));
        board.on_final_transcript("A castle rose from the mist.");

        board.clear();
        assert!(board.is_empty());

        gate.send(Ok(ImageRef("img://late".into())))
            .expect("deliver late result");

        wait_until(|| !board.is_processing()).await;
        // The late result neither recreated the scene nor crashed anything.
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn failed_request_leaves_scene_unillustrated_and_siblings_intact() {
        let board = StoryBoard::new(SharedVolume::new(), Arc::new(FailingIllustrator));
        let mut events = board.subscribe();

        let id = board
            .on_final_transcript("The storm devoured the coast.")
            .expect("scene created");
        recv_event(&mut events).await; // SceneAdded

        match recv_event(&mut events).await {
            StoryEvent::IllustrationFailed { scene_id, reason } => {
                assert_eq!(scene_id, id);
                assert!(reason.contains("service unavailable"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        wait_until(|| !board.is_processing()).await;
        assert!(board.scenes()[0].image_ref.is_none());

        // The failure must not impair later scenes.
        board.on_final_transcript("ok");
        assert_eq!(board.len(), 2);
    }

    #[tokio::test]
    async fn processing_flag_counts_all_outstanding_requests() {
        let illustrator = GatedIllustrator::new();
        let board = StoryBoard::new(SharedVolume::new(), Arc::clone(&illustrator) as Arc<dyn Illustrator>);
        let mut events = board.subscribe();

        let gate_a = illustrator.gate(SceneId(0));
        let gate_b = illustrator.gate(SceneId(1));
        board.on_final_transcript("First scene with a long text.");
        board.on_final_transcript("Second scene with a long text.");
        recv_event(&mut events).await;
        recv_event(&mut events).await;

        assert!(board.is_processing());
        assert_eq!(board.pending_illustrations(), 2);

        // Finishing one request must not clear the flag while the other is
        // still in flight.
        gate_a.send(Ok(ImageRef("img://a".into()))).expect("deliver a");
        recv_event(&mut events).await;
        assert!(board.is_processing());

        gate_b.send(Ok(ImageRef("img://b".into()))).expect("deliver b");
        recv_event(&mut events).await;
        wait_until(|| !board.is_processing()).await;
    }

    #[tokio::test]
    async fn duplicate_attach_is_discarded() {
        let board = StoryBoard::new(SharedVolume::new(), RecordingIllustrator::new());
        let id = board.on_final_transcript("ok").expect("scene created");

        board.attach_image(id, ImageRef("img://first".into()));
        board.attach_image(id, ImageRef("img://second".into()));

        assert_eq!(
            board.scenes()[0].image_ref.as_ref().map(|i| i.0.as_str()),
            Some("img://first")
        );
    }

    #[tokio::test]
    async fn clear_on_empty_board_emits_nothing() {
        let board = StoryBoard::new(SharedVolume::new(), RecordingIllustrator::new());
        let mut events = board.subscribe();
        board.clear();
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn story_events_serialize_with_tagged_camel_case() {
        let event = StoryEvent::SceneIllustrated {
            scene_id: SceneId(2),
            image: ImageRef("https://img.example/2.png".into()),
        };
        let json = serde_json::to_value(&event).expect("serialize story event");
        assert_eq!(json["type"], "sceneIllustrated");
        assert_eq!(json["sceneId"], 2);
        assert_eq!(json["image"], "https://img.example/2.png");

        let cleared = serde_json::to_value(StoryEvent::Cleared).expect("serialize cleared");
        assert_eq!(cleared["type"], "cleared");
    }
}
