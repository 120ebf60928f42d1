//! # fabula-core
//!
//! Voice-driven storyboard engine: turns a live spoken narration into an
//! ordered list of story scenes, each tagged with a tone derived from vocal
//! loudness and paired (asynchronously) with a generated illustration.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → VolumeMonitor → SharedVolume
//!                                                                   │ read at
//!                                                                   │ finalization
//! SpeechRecognizer ── interim/final events ──► StorySession ──► StoryBoard
//!                                                                   │ append
//!                                                                   │ Scene(tone)
//!                                                    Illustrator::request
//!                                                      (async, keyed by id)
//!                                                                   │
//!                                                            merge-by-id
//!                                                                   │
//!                                               broadcast::Sender<StoryEvent>
//! ```
//!
//! The audio callback is zero-alloc. Scene creation order is strictly the
//! order of final transcripts; illustration results may land in any order and
//! are merged back by scene identity.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod error;
pub mod illustrate;
pub mod scene;
pub mod segment;
pub mod session;
pub mod story;
pub mod volume;

// Convenience re-exports for downstream crates
pub use error::FabulaError;
pub use illustrate::{HttpIllustrator, HttpIllustratorConfig, Illustrator, PlaceholderIllustrator};
pub use scene::{ImageRef, Scene, SceneId, Tone};
pub use segment::{channel_recognizer, RecognizerEvent, RecognizerFeed, SpeechRecognizer};
pub use session::{SessionConfig, SessionState, SessionStatusEvent, StorySession};
pub use story::{StoryBoard, StoryEvent};
pub use volume::SharedVolume;
