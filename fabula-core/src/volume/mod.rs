//! Continuous microphone loudness sampling.
//!
//! ## Per-tick work (~60 Hz)
//!
//! ```text
//! 1. Drain the capture ring buffer (up to one scratch window)
//! 2. Compute mean |sample| of the drained window → normalized [0, 1]
//! 3. Store into SharedVolume (latest sample only, no history)
//! ```
//!
//! The loop is cooperative: it yields between ticks and checks a cancellation
//! flag before every iteration, so `stop()` takes effect within one tick.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::audio::{AudioConsumer, Consumer};

/// Default sampling cadence: ~60 Hz, matching typical display refresh.
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Samples drained per tick. 1024 covers ~21 ms at 48 kHz, comfortably more
/// than one tick's worth of capture.
const SCRATCH_LEN: usize = 1024;

/// The current loudness value, shared between the monitor task (sole writer)
/// and readers such as the orchestrator.
///
/// Single f32 in [0, 1], bit-cast through an `AtomicU32` — no lock, no
/// history. Hosts running without a live monitor (synthetic audio, tests)
/// may drive it directly via [`SharedVolume::set`].
#[derive(Clone, Debug, Default)]
pub struct SharedVolume(Arc<AtomicU32>);

impl SharedVolume {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest normalized loudness sample.
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Store a new sample, clamped into [0, 1]. Non-finite input becomes 0.
    pub fn set(&self, value: f32) {
        let clamped = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.0.store(clamped.to_bits(), Ordering::Relaxed);
    }

    /// Reset to silence. Called by the session controller on teardown.
    pub fn reset(&self) {
        self.set(0.0);
    }
}

/// Mean magnitude of a sample window. Samples are already normalized to
/// [-1, 1], so the result lands in [0, 1] without further scaling.
pub fn mean_magnitude(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
}

/// Cancellable periodic sampling task.
///
/// `stop()` is idempotent; dropping the monitor also cancels the loop.
pub struct VolumeMonitor {
    running: Arc<AtomicBool>,
}

impl VolumeMonitor {
    /// Spawn the sampling loop on the current Tokio runtime.
    ///
    /// `consumer` is the capture ring's read half; `shared` receives every
    /// computed sample. An empty tick (no new audio) leaves the previous
    /// value in place.
    pub fn start(mut consumer: AudioConsumer, shared: SharedVolume, tick: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        tokio::spawn(async move {
            let mut scratch = vec![0f32; SCRATCH_LEN];
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if !flag.load(Ordering::Relaxed) {
                    break;
                }
                let n = consumer.pop_slice(&mut scratch);
                if n == 0 {
                    continue;
                }
                shared.set(mean_magnitude(&scratch[..n]));
            }
            debug!("volume monitor stopped");
        });

        Self { running }
    }

    /// Cancel the sampling loop. Calling this on an already-stopped monitor
    /// is a no-op.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

impl Drop for VolumeMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{create_capture_ring, Producer};
    use approx::assert_abs_diff_eq;
    use std::time::Instant;

    #[test]
    fn mean_magnitude_of_constant_signal() {
        let samples = vec![0.25f32; 512];
        assert_abs_diff_eq!(mean_magnitude(&samples), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn mean_magnitude_rectifies_negative_samples() {
        let samples: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert_abs_diff_eq!(mean_magnitude(&samples), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn mean_magnitude_of_empty_window_is_zero() {
        assert_eq!(mean_magnitude(&[]), 0.0);
    }

    #[test]
    fn shared_volume_clamps_and_resets() {
        let shared = SharedVolume::new();
        shared.set(1.7);
        assert_eq!(shared.get(), 1.0);
        shared.set(-0.3);
        assert_eq!(shared.get(), 0.0);
        shared.set(f32::NAN);
        assert_eq!(shared.get(), 0.0);
        shared.set(0.42);
        shared.reset();
        assert_eq!(shared.get(), 0.0);
    }

    #[tokio::test]
    async fn monitor_tracks_ring_contents_and_retains_last_value() {
        let (mut producer, consumer) = create_capture_ring();
        let shared = SharedVolume::new();
        let monitor = VolumeMonitor::start(consumer, shared.clone(), Duration::from_millis(1));

        producer.push_slice(&vec![0.2f32; 2048]);

        let deadline = Instant::now() + Duration::from_secs(1);
        while (shared.get() - 0.2).abs() > 1e-3 {
            assert!(Instant::now() < deadline, "monitor never observed the signal");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // No new audio: the last sample must be retained, not zeroed.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_abs_diff_eq!(shared.get(), 0.2, epsilon = 1e-3);

        monitor.stop();
        monitor.stop(); // idempotent
    }

    #[tokio::test]
    async fn stopped_monitor_ignores_new_audio() {
        let (mut producer, consumer) = create_capture_ring();
        let shared = SharedVolume::new();
        let monitor = VolumeMonitor::start(consumer, shared.clone(), Duration::from_millis(1));
        monitor.stop();

        // Give the task time to observe cancellation, then push audio.
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.push_slice(&vec![0.9f32; 2048]);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(shared.get(), 0.0);
    }
}
