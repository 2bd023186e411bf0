// Filter - State Variable Filter (Chamberlin) and 3-stage ladder
//
// The SVF is the 12 dB/oct path, with simultaneous LP/HP/BP/notch outputs:
// - Hal Chamberlin, "Musical Applications of Microprocessors" (1985)
// - https://www.earlevel.com/main/2003/03/02/the-digital-state-variable-filter/
// Stable up to ~Fs/6, so cutoff is clamped there.
//
// The ladder is the steep path: three zero-delay one-pole stages with a tanh
// saturated feedback loop, g = tan(π·fc/Fs).

use crate::audio::dsp_utils::{OnePoleSmoother, flush_denormals_to_zero};
use std::f32::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum FilterType {
    /// 12dB/octave
    #[default]
    LowPass,
    /// 12dB/octave
    HighPass,
    /// 6dB/octave on each side
    BandPass,
    Notch,
}

impl FilterType {
    pub const ALL: [FilterType; 4] = [
        FilterType::LowPass,
        FilterType::HighPass,
        FilterType::BandPass,
        FilterType::Notch,
    ];

    pub fn from_index(value: f32) -> Self {
        let index = value.round().clamp(0.0, 3.0) as usize;
        Self::ALL[index]
    }
}

/// Slope of a voice filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum FilterSlope {
    /// 2-pole state variable
    #[default]
    Db12,
    /// 3-stage tanh ladder
    Db24,
}

impl FilterSlope {
    pub fn from_index(value: f32) -> Self {
        if value.round() >= 1.0 {
            FilterSlope::Db24
        } else {
            FilterSlope::Db12
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FilterParams {
    /// Cutoff frequency in Hz (20Hz - 20kHz)
    pub cutoff: f32,
    /// Q factor: 0.5 - 20.0, >10 can self-oscillate
    pub resonance: f32,
    pub filter_type: FilterType,
    pub enabled: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            cutoff: 1000.0,
            resonance: 0.707, // Butterworth
            filter_type: FilterType::LowPass,
            enabled: true,
        }
    }
}

/// Map a normalized resonance amount (0..1) to an SVF Q factor
#[inline]
pub fn resonance_to_q(amount: f32) -> f32 {
    0.707 + amount.clamp(0.0, 1.0) * 9.3
}

/// State Variable Filter (Chamberlin)
///
/// Keeps two state variables (low-pass and band-pass) and derives every
/// output from them.
#[derive(Debug, Clone)]
pub struct StateVariableFilter {
    params: FilterParams,
    sample_rate: f32,

    low: f32,
    band: f32,

    // f = 2·sin(π·fc/Fs), q = 1/Q
    f: f32,
    q: f32,

    cutoff_smoother: OnePoleSmoother,
    resonance_smoother: OnePoleSmoother,
}

impl StateVariableFilter {
    pub fn new(params: FilterParams, sample_rate: f32) -> Self {
        // 5ms: fast but no clicks
        let cutoff_smoother = OnePoleSmoother::new(params.cutoff, 5.0, sample_rate);
        let resonance_smoother = OnePoleSmoother::new(params.resonance, 5.0, sample_rate);

        let mut filter = Self {
            params,
            sample_rate,
            low: 0.0,
            band: 0.0,
            f: 0.0,
            q: 0.0,
            cutoff_smoother,
            resonance_smoother,
        };
        filter.set_coefficients(params.cutoff, params.resonance);
        filter
    }

    /// Parameters are smoothed inside `process`
    pub fn set_params(&mut self, params: FilterParams) {
        self.params = params;
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    pub fn reset(&mut self) {
        self.low = 0.0;
        self.band = 0.0;
    }

    /// Recompute coefficients directly (no smoothing)
    pub fn set_coefficients(&mut self, cutoff: f32, resonance: f32) {
        let max_cutoff = self.sample_rate / 6.0;
        let safe_cutoff = cutoff.clamp(20.0, max_cutoff);
        self.f = 2.0 * (PI * safe_cutoff / self.sample_rate).sin();

        let q_factor = resonance.clamp(0.5, 20.0);
        self.q = (1.0 / q_factor).clamp(0.01, 2.0);
    }

    /// Process one sample with smoothed parameters
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        if !self.params.enabled {
            return input;
        }

        let cutoff = self.cutoff_smoother.process(self.params.cutoff);
        let resonance = self.resonance_smoother.process(self.params.resonance);
        self.set_coefficients(cutoff, resonance);

        self.tick(input, self.params.filter_type)
    }

    /// Process with the current coefficients, for callers that modulate
    /// the cutoff at control rate
    #[inline]
    pub fn tick(&mut self, input: f32, filter_type: FilterType) -> f32 {
        let high = input - self.low - self.q * self.band;
        self.band = flush_denormals_to_zero(self.band + self.f * high);
        self.low = flush_denormals_to_zero(self.low + self.f * self.band);

        match filter_type {
            FilterType::LowPass => self.low,
            FilterType::HighPass => high,
            FilterType::BandPass => self.band,
            FilterType::Notch => input - self.q * self.band,
        }
    }
}

/// Three cascaded one-pole low-pass stages (TPT form) inside a tanh
/// feedback loop
#[derive(Debug, Clone)]
pub struct LadderFilter {
    sample_rate: f32,
    stages: [f32; 3],
    output: f32,
    /// g / (1 + g)
    big_g: f32,
    /// Feedback gain, 0..7 (self-oscillation around 8)
    k: f32,
}

impl LadderFilter {
    pub const MAX_FEEDBACK: f32 = 7.0;

    pub fn new(sample_rate: f32) -> Self {
        let mut filter = Self {
            sample_rate,
            stages: [0.0; 3],
            output: 0.0,
            big_g: 0.0,
            k: 0.0,
        };
        filter.set_coefficients(1000.0, 0.0);
        filter
    }

    /// `resonance` is normalized to 0..1
    pub fn set_coefficients(&mut self, cutoff: f32, resonance: f32) {
        let nyquist_guard = self.sample_rate * 0.45;
        let fc = cutoff.clamp(20.0, nyquist_guard);
        let g = (PI * fc / self.sample_rate).tan();
        self.big_g = g / (1.0 + g);
        self.k = resonance.clamp(0.0, 1.0) * Self::MAX_FEEDBACK;
    }

    pub fn reset(&mut self) {
        self.stages = [0.0; 3];
        self.output = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let mut u = (input - self.k * self.output).tanh();
        for state in &mut self.stages {
            let v = (u - *state) * self.big_g;
            let y = v + *state;
            *state = flush_denormals_to_zero(y + v);
            u = y;
        }
        self.output = u;
        u
    }
}
