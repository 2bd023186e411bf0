// Audio timing - the monotonic clock everything is scheduled against
//
// The render engine advances a frame counter after every block; the control
// side reads it as seconds. Tests drive a `ManualClock` instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic clock readable from any thread, in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Shared frame counter, incremented by the render callback
#[derive(Clone)]
pub struct AudioTiming {
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioTiming {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate as f64,
        }
    }

    /// Frames rendered so far
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Called from the render callback once a block is done
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::AcqRel);
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }

    /// Clock seconds to the frame index that plays at that time
    #[inline]
    pub fn seconds_to_frame(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate).round() as u64
    }

    #[inline]
    pub fn frame_to_seconds(&self, frame: u64) -> f64 {
        frame as f64 / self.sample_rate
    }
}

impl Clock for AudioTiming {
    fn now(&self) -> f64 {
        self.frame_to_seconds(self.current_sample())
    }
}

/// Clock that only moves when told to
#[derive(Clone, Default)]
pub struct ManualClock {
    seconds_bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        self.seconds_bits
            .store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds_bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_timing_as_clock() {
        let timing = AudioTiming::new(48000.0);
        assert_eq!(timing.now(), 0.0);

        timing.advance(24000);
        assert_eq!(timing.current_sample(), 24000);
        assert!((timing.now() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_seconds_to_frame_rounds() {
        let timing = AudioTiming::new(44100.0);
        assert_eq!(timing.seconds_to_frame(1.0), 44100);
        assert_eq!(timing.seconds_to_frame(0.5), 22050);
        assert_eq!(timing.seconds_to_frame(-3.0), 0);
    }

    #[test]
    fn test_clones_share_position() {
        let timing = AudioTiming::new(48000.0);
        let reader = timing.clone();
        timing.advance(512);
        assert_eq!(reader.current_sample(), 512);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.set(1.25);
        other.advance(0.25);
        assert_eq!(clock.now(), 1.5);
    }
}
