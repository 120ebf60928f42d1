//! Channel-driven recognizer.
//!
//! A deterministic recognizer that lets hosts and tests exercise the whole
//! pipeline by scripting interim/final/error sequences through a
//! [`RecognizerFeed`] — stdin bridges, scripted demos, and tests all use it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::mpsc;
use tracing::debug;

use super::{RecognizerEvent, SpeechRecognizer};
use crate::error::{FabulaError, Result};

/// Write half handed to whoever produces transcripts (a host reading stdin,
/// a test script, an external bridge).
#[derive(Clone)]
pub struct RecognizerFeed {
    tx: mpsc::UnboundedSender<RecognizerEvent>,
}

impl RecognizerFeed {
    /// Push an interim (display-only) transcript. Returns `false` once the
    /// recognizer has shut down.
    pub fn interim(&self, text: impl Into<String>) -> bool {
        self.tx
            .send(RecognizerEvent::Interim { text: text.into() })
            .is_ok()
    }

    /// Push a finalized utterance.
    pub fn finalize(&self, text: impl Into<String>) -> bool {
        self.tx
            .send(RecognizerEvent::Final { text: text.into() })
            .is_ok()
    }

    /// Signal a terminal recognition failure.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(RecognizerEvent::Error {
                reason: reason.into(),
            })
            .is_ok()
    }
}

/// The recognizer half: forwards fed events to the session once started.
pub struct ChannelRecognizer {
    feed_rx: Option<mpsc::UnboundedReceiver<RecognizerEvent>>,
    halted: Arc<AtomicBool>,
}

/// Create a recognizer/feed pair.
pub fn channel_recognizer() -> (ChannelRecognizer, RecognizerFeed) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelRecognizer {
            feed_rx: Some(rx),
            halted: Arc::new(AtomicBool::new(false)),
        },
        RecognizerFeed { tx },
    )
}

impl SpeechRecognizer for ChannelRecognizer {
    fn start(&mut self, events: mpsc::UnboundedSender<RecognizerEvent>) -> Result<()> {
        let mut feed_rx = self
            .feed_rx
            .take()
            .ok_or_else(|| FabulaError::Recognition("recognizer already started".into()))?;
        let halted = Arc::clone(&self.halted);

        tokio::spawn(async move {
            while let Some(event) = feed_rx.recv().await {
                if halted.load(Ordering::Relaxed) {
                    break;
                }
                let terminal = matches!(event, RecognizerEvent::Error { .. });
                if events.send(event).is_err() {
                    break;
                }
                if terminal {
                    break;
                }
            }
            debug!("channel recognizer drained");
        });

        Ok(())
    }

    fn stop(&mut self) {
        self.halted.store(true, Ordering::Relaxed);
    }
}
