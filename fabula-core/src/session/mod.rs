//! Recording session lifecycle.
//!
//! `StorySession` wires the capture ring, volume monitor, recognizer, and
//! storyboard into one controller with a small state machine:
//!
//! ```text
//! Idle ──start()──▶ Starting ──▶ Recording ──stop()──▶ Stopping ──▶ Idle
//!                      │                                   ▲
//!                      └──────────── failure ──────────────┘
//! ```
//!
//! `start()` fails on anything other than `Idle`; `stop()` is safe to call
//! from any state, any number of times. Teardown runs as three independent
//! steps (recognizer, monitor, capture) so one failing resource never leaves
//! the others live, and always ends with the volume reset to silence.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::audio::AudioConsumer;
#[cfg(feature = "audio-cpal")]
use crate::audio::{create_capture_ring, AudioCapture};
use crate::error::{FabulaError, Result};
use crate::illustrate::Illustrator;
use crate::segment::{RecognizerEvent, SpeechRecognizer};
use crate::story::{StoryBoard, DEFAULT_ILLUSTRATION_THRESHOLD};
use crate::volume::{SharedVolume, VolumeMonitor, DEFAULT_TICK};

const BROADCAST_CAP: usize = 256;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

/// Broadcast on every state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub state: SessionState,
    /// Populated when the transition was caused by a failure.
    pub detail: Option<String>,
}

/// Interim (display-only) transcript, broadcast as it streams in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterimEvent {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Volume sampling cadence.
    pub volume_tick: Duration,
    /// Minimum finalized-text length (chars, exclusive) for illustration.
    pub illustration_threshold: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            volume_tick: DEFAULT_TICK,
            illustration_threshold: DEFAULT_ILLUSTRATION_THRESHOLD,
        }
    }
}

struct SessionInner {
    state: Mutex<SessionState>,
    volume: SharedVolume,
    monitor: Mutex<Option<VolumeMonitor>>,
    recognizer: Mutex<Box<dyn SpeechRecognizer>>,
    /// Kill switch for the capture callback and its holding thread.
    capture_running: Arc<AtomicBool>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    interim_tx: broadcast::Sender<InterimEvent>,
}

impl SessionInner {
    fn set_state(&self, next: SessionState, detail: Option<String>) {
        *self.state.lock() = next;
        let _ = self.status_tx.send(SessionStatusEvent {
            state: next,
            detail,
        });
    }

    /// Stop everything and return to `Idle`. Idempotent: no-op unless the
    /// session is `Starting` or `Recording`.
    ///
    /// `failure` carries the reason when teardown was triggered by an error;
    /// it is surfaced in the final `Idle` status event.
    fn teardown(&self, failure: Option<String>) {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::Idle | SessionState::Stopping => return,
                SessionState::Starting | SessionState::Recording => {
                    *state = SessionState::Stopping;
                }
            }
        }
        let _ = self.status_tx.send(SessionStatusEvent {
            state: SessionState::Stopping,
            detail: None,
        });

        if let Some(reason) = &failure {
            warn!(reason = reason.as_str(), "session teardown after failure");
        } else {
            info!("session teardown");
        }

        // Independent steps: each resource is released even when another
        // was never acquired.
        {
            self.recognizer.lock().stop();
        }
        {
            if let Some(monitor) = self.monitor.lock().take() {
                monitor.stop();
            }
        }
        {
            self.capture_running.store(false, Ordering::Release);
        }

        self.volume.reset();
        self.set_state(SessionState::Idle, failure);
    }
}

/// One live-narration session: audio in, scenes out.
pub struct StorySession {
    config: SessionConfig,
    board: Arc<StoryBoard>,
    inner: Arc<SessionInner>,
}

impl StorySession {
    pub fn new(
        config: SessionConfig,
        recognizer: Box<dyn SpeechRecognizer>,
        illustrator: Arc<dyn Illustrator>,
    ) -> Self {
        let volume = SharedVolume::new();
        let board =
            StoryBoard::with_threshold(volume.clone(), illustrator, config.illustration_threshold);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (interim_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            board,
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState::Idle),
                volume,
                monitor: Mutex::new(None),
                recognizer: Mutex::new(recognizer),
                capture_running: Arc::new(AtomicBool::new(false)),
                status_tx,
                interim_tx,
            }),
        }
    }

    /// Start recording from the system default microphone.
    ///
    /// # Errors
    /// `FabulaError::AlreadyRecording` unless the session is `Idle`;
    /// device/stream errors from the audio layer; recognizer start errors.
    /// On any failure the session is returned to `Idle` with everything torn
    /// down.
    #[cfg(feature = "audio-cpal")]
    pub async fn start(&self) -> Result<()> {
        self.begin_start()?;

        let (producer, consumer) = create_capture_ring();
        self.inner.capture_running.store(true, Ordering::Release);
        let running = Arc::clone(&self.inner.capture_running);

        // cpal streams are !Send: open and drop on one dedicated blocking
        // thread, confirm the outcome through a sync channel.
        let (confirm_tx, confirm_rx) = crossbeam_channel::bounded::<Result<u32>>(1);
        tokio::task::spawn_blocking(move || {
            let capture = match AudioCapture::open_default(producer, Arc::clone(&running)) {
                Ok(capture) => {
                    let _ = confirm_tx.send(Ok(capture.sample_rate));
                    capture
                }
                Err(e) => {
                    let _ = confirm_tx.send(Err(e));
                    return;
                }
            };
            while running.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(50));
            }
            capture.stop();
            debug!("capture thread exiting");
        });

        let opened = tokio::task::spawn_blocking(move || confirm_rx.recv())
            .await
            .map_err(|e| FabulaError::AudioStream(e.to_string()))?;

        match opened {
            Ok(Ok(sample_rate)) => {
                info!(sample_rate, "audio capture running");
                self.finish_start(consumer)
            }
            Ok(Err(e)) => {
                self.abort_start(e.to_string());
                Err(e)
            }
            Err(_) => {
                let e = FabulaError::AudioStream("capture thread exited unexpectedly".into());
                self.abort_start(e.to_string());
                Err(e)
            }
        }
    }

    /// Start recording from a caller-supplied audio source instead of the
    /// microphone. Used by hosts with synthetic audio and by tests.
    pub fn start_with_audio(&self, consumer: AudioConsumer) -> Result<()> {
        self.begin_start()?;
        self.finish_start(consumer)
    }

    fn begin_start(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if *state != SessionState::Idle {
            return Err(FabulaError::AlreadyRecording);
        }
        *state = SessionState::Starting;
        drop(state);
        let _ = self.inner.status_tx.send(SessionStatusEvent {
            state: SessionState::Starting,
            detail: None,
        });
        Ok(())
    }

    #[cfg(feature = "audio-cpal")]
    fn abort_start(&self, reason: String) {
        error!(reason = reason.as_str(), "session start failed");
        self.inner.capture_running.store(false, Ordering::Release);
        self.inner.teardown(Some(reason));
    }

    fn finish_start(&self, consumer: AudioConsumer) -> Result<()> {
        let monitor =
            VolumeMonitor::start(consumer, self.inner.volume.clone(), self.config.volume_tick);
        *self.inner.monitor.lock() = Some(monitor);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.inner.recognizer.lock().start(events_tx) {
            self.inner.teardown(Some(e.to_string()));
            return Err(e);
        }

        spawn_forwarder(Arc::clone(&self.inner), Arc::clone(&self.board), events_rx);

        self.inner.set_state(SessionState::Recording, None);
        info!("session recording");
        Ok(())
    }

    /// Stop recording. Safe to call from any state, any number of times;
    /// never fails. Scenes and in-flight illustrations are untouched.
    pub fn stop(&self) {
        self.inner.teardown(None);
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    /// The storyboard this session feeds.
    pub fn board(&self) -> &Arc<StoryBoard> {
        &self.board
    }

    /// Latest loudness sample, [0, 1].
    pub fn current_volume(&self) -> f32 {
        self.inner.volume.get()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.inner.status_tx.subscribe()
    }

    pub fn subscribe_interim(&self) -> broadcast::Receiver<InterimEvent> {
        self.inner.interim_tx.subscribe()
    }
}

impl Drop for StorySession {
    fn drop(&mut self) {
        self.inner.teardown(None);
    }
}

/// Route recognizer events into the storyboard while the session records.
///
/// Exits when the feed closes, the session leaves `Recording`, or the
/// recognizer reports a terminal error. Events arriving after stop are
/// dropped, not queued.
fn spawn_forwarder(
    inner: Arc<SessionInner>,
    board: Arc<StoryBoard>,
    mut events_rx: mpsc::UnboundedReceiver<RecognizerEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if *inner.state.lock() != SessionState::Recording {
                debug!("dropping recognizer event after stop");
                break;
            }
            match event {
                RecognizerEvent::Interim { text } => {
                    let _ = inner.interim_tx.send(InterimEvent { text });
                }
                RecognizerEvent::Final { text } => {
                    board.on_final_transcript(&text);
                }
                RecognizerEvent::Error { reason } => {
                    error!(reason = reason.as_str(), "recognizer failed");
                    inner.teardown(Some(reason));
                    break;
                }
            }
        }
        debug!("recognizer forwarder exiting");
    });
}
