//! Microphone capture via cpal, feeding a lock-free ring buffer.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (beyond one-time scratch growth)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback downmixes to mono and writes directly into an SPSC ring
//! buffer producer whose `push_slice` is lock-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must therefore be created and dropped on the same
//! thread; the session accomplishes this by opening it inside
//! `tokio::task::spawn_blocking` and parking that thread until stop.

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

#[cfg(feature = "audio-cpal")]
use crate::error::{FabulaError, Result};
#[cfg(feature = "audio-cpal")]
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Type alias for the producer half — held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half — held by the volume monitor task.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz.
/// The volume monitor only ever cares about the most recent tick's worth of
/// audio, so a few seconds of slack is plenty.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_capture_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

/// Average interleaved frames down to mono into `out` (reuses its capacity).
#[cfg(feature = "audio-cpal")]
fn downmix_f32(data: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(data);
        return;
    }
    let frames = data.len() / channels;
    out.reserve(frames);
    for f in 0..frames {
        let base = f * channels;
        let sum: f32 = data[base..base + channels].iter().sum();
        out.push(sum / channels as f32);
    }
}

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
#[cfg(feature = "audio-cpal")]
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    _stream: Stream,
    /// Shared flag — set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
impl AudioCapture {
    /// Open the system default microphone and push mono f32 frames into
    /// `producer`.
    ///
    /// Must be called from the thread that will also drop this value — in
    /// practice, inside `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// `FabulaError::NoDefaultInputDevice` when no microphone is available,
    /// `FabulaError::AudioStream` if cpal fails to build or play the stream.
    pub fn open_default(mut producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(FabulaError::NoDefaultInputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| FabulaError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let ch = channels as usize;

        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let flag = Arc::clone(&running);
                let mut mono: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_f32(data, ch, &mut mono);
                        let written = producer.push_slice(&mono);
                        if written < mono.len() {
                            warn!(
                                "capture ring full: dropped {} frames",
                                mono.len() - written
                            );
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let flag = Arc::clone(&running);
                let mut mono: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        mono.clear();
                        let frames = data.len() / ch;
                        mono.reserve(frames);
                        if ch <= 1 {
                            mono.extend(data.iter().map(|s| *s as f32 / 32768.0));
                        } else {
                            for f in 0..frames {
                                let base = f * ch;
                                let sum: f32 = data[base..base + ch]
                                    .iter()
                                    .map(|s| *s as f32 / 32768.0)
                                    .sum();
                                mono.push(sum / ch as f32);
                            }
                        }
                        let written = producer.push_slice(&mono);
                        if written < mono.len() {
                            warn!(
                                "capture ring full: dropped {} frames",
                                mono.len() - written
                            );
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(FabulaError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| FabulaError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| FabulaError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(all(test, feature = "audio-cpal"))]
mod tests {
    use super::downmix_f32;

    #[test]
    fn downmix_passes_mono_through() {
        let mut out = Vec::new();
        downmix_f32(&[0.1, -0.2, 0.3], 1, &mut out);
        assert_eq!(out, vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn downmix_averages_stereo_frames() {
        let mut out = Vec::new();
        downmix_f32(&[1.0, 0.0, -0.5, 0.5], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.0]);
    }

    #[test]
    fn downmix_drops_trailing_partial_frame() {
        let mut out = Vec::new();
        downmix_f32(&[1.0, 1.0, 1.0], 2, &mut out);
        assert_eq!(out.len(), 1);
    }
}
