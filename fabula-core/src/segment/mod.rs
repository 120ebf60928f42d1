//! Transcription segmenter boundary.
//!
//! Speech recognition itself is an opaque external service; the core only
//! consumes its event stream. The `SpeechRecognizer` trait is the seam:
//! swap in a platform recognizer, a network service, or the channel-driven
//! implementation in [`channel`] without touching the session.

pub mod channel;

pub use channel::{channel_recognizer, ChannelRecognizer, RecognizerFeed};

use tokio::sync::mpsc;

use crate::error::Result;

/// Events emitted by a speech-recognition backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Best-effort text, superseded by the next event. Display only — never
    /// persisted as a scene.
    Interim { text: String },
    /// Stable utterance text, emitted once per utterance boundary, in the
    /// order utterances completed.
    Final { text: String },
    /// Terminal failure. No further events follow; the session force-stops.
    Error { reason: String },
}

/// Trait for speech-recognition backends.
///
/// Implementors must emit `Final` events in utterance-completion order and
/// at most once per utterance. After sending `Error` the stream is dead.
pub trait SpeechRecognizer: Send + 'static {
    /// Begin recognition, delivering events into `events` until stopped or a
    /// terminal error.
    fn start(&mut self, events: mpsc::UnboundedSender<RecognizerEvent>) -> Result<()>;

    /// Halt recognition. Must be safe to call repeatedly, including before
    /// `start`.
    fn stop(&mut self);
}
