// Oscillateurs - Générateurs de formes d'onde
//
// Phase runs over [0, 1). The band-limited saw and square subtract a
// polynomial residual (PolyBLEP) around each discontinuity.

use std::f32::consts::PI;

pub trait Oscillator {
    fn next_sample(&mut self) -> f32;
    fn set_frequency(&mut self, freq: f32);
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum WaveformType {
    #[default]
    Sine,
    Triangle,
    Saw,
    Square,
    /// Band-limited saw
    SawBlep,
    /// Band-limited square
    SquareBlep,
    Noise,
}

impl WaveformType {
    pub const ALL: [WaveformType; 7] = [
        WaveformType::Sine,
        WaveformType::Triangle,
        WaveformType::Saw,
        WaveformType::Square,
        WaveformType::SawBlep,
        WaveformType::SquareBlep,
        WaveformType::Noise,
    ];

    /// Parameter value -> waveform. Values are rounded and clamped.
    pub fn from_index(value: f32) -> Self {
        let index = value.round().clamp(0.0, (Self::ALL.len() - 1) as f32) as usize;
        Self::ALL[index]
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|w| *w == self).unwrap_or(0)
    }
}

/// Polynomial band-limited step residual
/// `t` is the phase in [0, 1), `dt` the phase increment per sample
#[inline]
pub fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

pub struct SimpleOscillator {
    waveform: WaveformType,
    phase: f32,
    phase_increment: f32,
    sample_rate: f32,
    noise_state: u32,
}

impl SimpleOscillator {
    pub fn new(waveform: WaveformType, sample_rate: f32) -> Self {
        Self {
            waveform,
            phase: 0.0,
            phase_increment: 0.0,
            sample_rate,
            noise_state: 0x9E37_79B9,
        }
    }

    pub fn waveform(&self) -> WaveformType {
        self.waveform
    }

    pub fn set_waveform(&mut self, waveform: WaveformType) {
        self.waveform = waveform;
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Different seeds keep simultaneous noise voices uncorrelated
    pub fn seed_noise(&mut self, seed: u32) {
        self.noise_state = seed.max(1);
    }

    #[inline]
    fn next_noise(&mut self) -> f32 {
        // xorshift32
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

impl Oscillator for SimpleOscillator {
    #[inline]
    fn next_sample(&mut self) -> f32 {
        let t = self.phase;
        let dt = self.phase_increment;
        let sample = match self.waveform {
            WaveformType::Sine => (t * 2.0 * PI).sin(),
            WaveformType::Square => {
                if t < 0.5 { 1.0 } else { -1.0 }
            }
            WaveformType::Saw => (t * 2.0) - 1.0,
            WaveformType::Triangle => {
                if t < 0.5 {
                    (t * 4.0) - 1.0
                } else {
                    3.0 - (t * 4.0)
                }
            }
            WaveformType::SawBlep => (t * 2.0) - 1.0 - poly_blep(t, dt),
            WaveformType::SquareBlep => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(t, dt) - poly_blep((t + 0.5) % 1.0, dt)
            }
            WaveformType::Noise => self.next_noise(),
        };

        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    fn set_frequency(&mut self, freq: f32) {
        // Keep below Nyquist so phase wrapping stays a single subtraction
        self.phase_increment = (freq / self.sample_rate).clamp(0.0, 0.5);
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 44100.0;
    const EPSILON: f32 = 0.001;

    #[test]
    fn test_oscillator_frequency() {
        let mut osc = SimpleOscillator::new(WaveformType::Sine, SAMPLE_RATE);
        osc.set_frequency(440.0);

        // Phase increment doit être freq / sample_rate
        assert!((osc.phase_increment - 440.0 / SAMPLE_RATE).abs() < EPSILON);
    }

    #[test]
    fn test_oscillator_reset() {
        let mut osc = SimpleOscillator::new(WaveformType::Sine, SAMPLE_RATE);
        osc.set_frequency(440.0);
        for _ in 0..100 {
            osc.next_sample();
        }
        assert!(osc.phase() > 0.0);

        osc.reset();
        assert_eq!(osc.phase(), 0.0);
    }

    #[test]
    fn test_all_waveforms_stay_in_range() {
        for waveform in WaveformType::ALL {
            let mut osc = SimpleOscillator::new(waveform, SAMPLE_RATE);
            osc.set_frequency(3520.0);
            for _ in 0..4096 {
                let sample = osc.next_sample();
                assert!(
                    (-1.5..=1.5).contains(&sample),
                    "{waveform:?} produced {sample}"
                );
            }
        }
    }

    #[test]
    fn test_poly_blep_is_zero_away_from_edges() {
        assert_eq!(poly_blep(0.5, 0.01), 0.0);
        assert!((poly_blep(0.0, 0.01) + 1.0).abs() < EPSILON);
        assert!(poly_blep(0.995, 0.01) > 0.0);
    }

    #[test]
    fn test_blep_saw_softens_the_reset() {
        // The naive saw jumps by 2.0 at the wrap; the corrected one jumps less
        let mut naive = SimpleOscillator::new(WaveformType::Saw, SAMPLE_RATE);
        let mut blep = SimpleOscillator::new(WaveformType::SawBlep, SAMPLE_RATE);
        naive.set_frequency(5000.0);
        blep.set_frequency(5000.0);

        let max_jump = |osc: &mut SimpleOscillator| {
            let mut prev = osc.next_sample();
            let mut max: f32 = 0.0;
            for _ in 0..1000 {
                let s = osc.next_sample();
                max = max.max((s - prev).abs());
                prev = s;
            }
            max
        };
        assert!(max_jump(&mut blep) < max_jump(&mut naive));
    }

    #[test]
    fn test_waveform_from_index() {
        assert_eq!(WaveformType::from_index(0.0), WaveformType::Sine);
        assert_eq!(WaveformType::from_index(4.2), WaveformType::SawBlep);
        assert_eq!(WaveformType::from_index(99.0), WaveformType::Noise);
        assert_eq!(WaveformType::SquareBlep.index(), 5);
    }

    #[test]
    fn test_noise_seeds_differ() {
        let mut a = SimpleOscillator::new(WaveformType::Noise, SAMPLE_RATE);
        let mut b = SimpleOscillator::new(WaveformType::Noise, SAMPLE_RATE);
        b.seed_noise(12345);
        let same = (0..64).filter(|_| a.next_sample() == b.next_sample()).count();
        assert!(same < 4);
    }
}
