// DSP utilities - audio hygiene, smoothing and gain laws
//
// Everything here runs inside the real-time callback.

use std::f32::consts::FRAC_PI_2;

/// Flush denormals to zero
///
/// Denormal numbers (very close to 0) are slow on some CPUs. Threshold: 1e-15.
#[inline]
pub fn flush_denormals_to_zero(x: f32) -> f32 {
    if x.abs() < 1e-15 { 0.0 } else { x }
}

/// Soft clipping with tanh
///
/// - Input below -1 or above 1: asymptotic saturation
/// - Input near 0: almost linear
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Equal-power crossfade gains for a wet amount in [0, 1]
///
/// Returns `(dry, wet)` with `dry = cos(mix·π/2)` and `wet = sin(mix·π/2)`,
/// so `dry² + wet² == 1` for every mix.
#[inline]
pub fn equal_power_gains(mix: f32) -> (f32, f32) {
    let angle = mix.clamp(0.0, 1.0) * FRAC_PI_2;
    (angle.cos(), angle.sin())
}

/// Equal-power pan law, `pan` in [-1, 1]. Returns `(left, right)`.
#[inline]
pub fn equal_power_pan(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5 * FRAC_PI_2;
    (angle.cos(), angle.sin())
}

/// Semitone offset to frequency ratio
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2.0f32.powf(semitones / 12.0)
}

/// MIDI note to frequency (A4 = 440 Hz)
#[inline]
pub fn midi_to_frequency(note: u8) -> f32 {
    440.0 * semitones_to_ratio(note as f32 - 69.0)
}

/// One-pole smoother (first-order low-pass)
///
/// Formula: y[n] = y[n-1] + α * (x[n] - y[n-1])
#[derive(Debug, Clone)]
pub struct OnePoleSmoother {
    current: f32,
    coefficient: f32,
}

impl OnePoleSmoother {
    /// * `time_constant_ms` - Time to reach ~63% of the target
    pub fn new(initial_value: f32, time_constant_ms: f32, sample_rate: f32) -> Self {
        // α ≈ 1 / (τ * sr)
        let time_constant_samples = time_constant_ms * 0.001 * sample_rate;
        let coefficient = if time_constant_samples > 0.0 {
            1.0 / time_constant_samples
        } else {
            1.0
        };

        Self {
            current: initial_value,
            coefficient: coefficient.min(1.0),
        }
    }

    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.current += self.coefficient * (target - self.current);
        self.current = flush_denormals_to_zero(self.current);
        self.current
    }

    /// Jump to a new value without smoothing
    #[inline]
    pub fn reset(&mut self, value: f32) {
        self.current = value;
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormals() {
        assert_eq!(flush_denormals_to_zero(1e-20), 0.0);
        assert_eq!(flush_denormals_to_zero(0.1), 0.1);
        assert_eq!(flush_denormals_to_zero(-0.1), -0.1);
    }

    #[test]
    fn test_soft_clip() {
        assert!((soft_clip(0.0) - 0.0).abs() < 0.001);
        assert!((soft_clip(0.5) - 0.462).abs() < 0.01);

        // tanh approaches ±1.0 asymptotically
        assert!(soft_clip(10.0) <= 1.0);
        assert!(soft_clip(10.0) > 0.99);
        assert!(soft_clip(-10.0) >= -1.0);
    }

    #[test]
    fn test_equal_power_crossfade_keeps_power() {
        for i in 0..=100 {
            let mix = i as f32 / 100.0;
            let (dry, wet) = equal_power_gains(mix);
            assert!((dry * dry + wet * wet - 1.0).abs() < 1e-5, "mix {mix}");
        }
        assert_eq!(equal_power_gains(0.0), (1.0, 0.0));
        let (dry, wet) = equal_power_gains(1.0);
        assert!(dry.abs() < 1e-6 && (wet - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pan_law() {
        let (l, r) = equal_power_pan(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);

        let (l, r) = equal_power_pan(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
    }

    #[test]
    fn test_midi_to_frequency() {
        assert!((midi_to_frequency(69) - 440.0).abs() < 1e-3);
        assert!((midi_to_frequency(81) - 880.0).abs() < 1e-2);
        assert!((midi_to_frequency(60) - 261.63).abs() < 0.01);
    }

    #[test]
    fn test_smoother_convergence() {
        let mut smoother = OnePoleSmoother::new(0.0, 10.0, 44100.0);

        // 10 ms at 44.1 kHz = 441 samples for 63%; 100 ms for ~99.99%
        let mut final_value = 0.0;
        for _ in 0..4410 {
            final_value = smoother.process(1.0);
        }
        assert!((final_value - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_smoother_no_overshoot() {
        let mut smoother = OnePoleSmoother::new(0.0, 5.0, 44100.0);
        for _ in 0..10000 {
            let value = smoother.process(1.0);
            assert!(value <= 1.0);
        }
    }

    #[test]
    fn test_smoother_reset() {
        let mut smoother = OnePoleSmoother::new(0.0, 10.0, 44100.0);
        smoother.process(1.0);
        smoother.reset(0.25);
        assert_eq!(smoother.get(), 0.25);
    }
}
