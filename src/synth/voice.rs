// Voice - one played note
//
// A voice is one sounding note inside an instrument's pool. The pool only
// needs the `PolyVoice` surface; how the voice makes sound is up to it.

use super::envelope::{AdsrEnvelope, AdsrParams, DecayEnvelope};
use super::filter::{FilterParams, FilterSlope, FilterType, LadderFilter, StateVariableFilter, resonance_to_q};
use super::oscillator::{Oscillator, SimpleOscillator, WaveformType};
use crate::audio::dsp_utils::{midi_to_frequency, semitones_to_ratio};

/// Samples between two filter modulation updates
pub const CONTROL_RATE: usize = 64;

/// Resonance added at full filter envelope and full amount
pub const RESONANCE_ENV_DEPTH: f32 = 0.5;

/// Octaves the mod wheel opens the filter by at full travel
pub const MOD_WHEEL_OCTAVES: f32 = 2.0;

/// Note instance tag, unique per scheduled note or live key press
pub type VoiceTag = u64;

/// Lifecycle shared by every voice kind
pub trait PolyVoice: Send {
    /// (Re)initialise for a new note
    fn start(&mut self, pitch: u8, velocity: u8, tag: VoiceTag, age: u64);
    /// Enter release
    fn release(&mut self);
    /// Silence immediately
    fn kill(&mut self);
    fn is_active(&self) -> bool;
    fn is_released(&self) -> bool;
    fn pitch(&self) -> u8;
    fn tag(&self) -> VoiceTag;
    fn age(&self) -> u64;
    /// Current amplitude envelope level
    fn level(&self) -> f32;
}

/// Sound settings shared by every voice of a subtractive instrument
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubtractiveSettings {
    pub waveform: WaveformType,
    pub amp_envelope: AdsrParams,
    /// Hz
    pub cutoff: f32,
    /// 0..1
    pub resonance: f32,
    pub slope: FilterSlope,
    /// Octaves of sweep at full envelope, -1..1 (×4 octaves)
    pub filter_env_amount: f32,
    /// Seconds
    pub filter_env_decay: f32,
    pub gain: f32,
    /// Semitones
    pub tune: f32,
}

impl Default for SubtractiveSettings {
    fn default() -> Self {
        Self {
            waveform: WaveformType::SawBlep,
            amp_envelope: AdsrParams::default(),
            cutoff: 8000.0,
            resonance: 0.1,
            slope: FilterSlope::Db12,
            filter_env_amount: 0.0,
            filter_env_decay: 0.3,
            gain: 0.5,
            tune: 0.0,
        }
    }
}

pub struct SubtractiveVoice {
    oscillator: SimpleOscillator,
    envelope: AdsrEnvelope,
    filter_env: DecayEnvelope,
    svf: StateVariableFilter,
    ladder: LadderFilter,
    pitch: u8,
    tag: VoiceTag,
    velocity: f32,
    released: bool,
    age: u64,
    mod_counter: usize,
    /// Pitch bend as a frequency ratio
    bend_ratio: f32,
    /// 0..1
    mod_wheel: f32,
    /// Cutoff and resonance applied at the last control update
    filter_state: (f32, f32),
}

impl SubtractiveVoice {
    pub fn new(settings: &SubtractiveSettings, sample_rate: f32, seed: u32) -> Self {
        let mut oscillator = SimpleOscillator::new(settings.waveform, sample_rate);
        oscillator.seed_noise(seed.wrapping_mul(0x9E37_79B9).wrapping_add(1));
        Self {
            oscillator,
            envelope: AdsrEnvelope::new(settings.amp_envelope, sample_rate),
            filter_env: DecayEnvelope::new(settings.filter_env_decay, sample_rate),
            svf: StateVariableFilter::new(FilterParams::default(), sample_rate),
            ladder: LadderFilter::new(sample_rate),
            pitch: 0,
            tag: 0,
            velocity: 0.0,
            released: false,
            age: 0,
            mod_counter: 0,
            bend_ratio: 1.0,
            mod_wheel: 0.0,
            filter_state: (settings.cutoff, settings.resonance),
        }
    }

    /// Push changed instrument settings into this voice
    pub fn apply_settings(&mut self, settings: &SubtractiveSettings) {
        self.oscillator.set_waveform(settings.waveform);
        self.envelope.set_params(settings.amp_envelope);
        self.filter_env.set_decay(settings.filter_env_decay);
        if self.is_active() {
            self.oscillator.set_frequency(self.frequency(settings));
        }
    }

    /// Live pitch bend and mod wheel. Retunes a sounding voice at once.
    pub fn set_performance(&mut self, bend_ratio: f32, mod_wheel: f32, settings: &SubtractiveSettings) {
        self.bend_ratio = bend_ratio;
        self.mod_wheel = mod_wheel.clamp(0.0, 1.0);
        if self.is_active() {
            self.oscillator.set_frequency(self.frequency(settings));
        }
    }

    /// (cutoff Hz, resonance 0..1) after envelope and mod wheel
    pub fn filter_state(&self) -> (f32, f32) {
        self.filter_state
    }

    fn update_filter(&mut self, settings: &SubtractiveSettings) {
        let env = self.filter_env.level();
        let octaves = settings.filter_env_amount * 4.0 * env + self.mod_wheel * MOD_WHEEL_OCTAVES;
        let cutoff = settings.cutoff * 2.0f32.powf(octaves);
        let resonance =
            (settings.resonance + settings.filter_env_amount * RESONANCE_ENV_DEPTH * env).clamp(0.0, 1.0);
        match settings.slope {
            FilterSlope::Db12 => self.svf.set_coefficients(cutoff, resonance_to_q(resonance)),
            FilterSlope::Db24 => self.ladder.set_coefficients(cutoff, resonance),
        }
        self.filter_state = (cutoff, resonance);
        self.filter_env.advance(CONTROL_RATE);
    }

    /// One output sample (mono)
    #[inline]
    pub fn next_sample(&mut self, settings: &SubtractiveSettings) -> f32 {
        if self.mod_counter == 0 {
            self.update_filter(settings);
        }
        self.mod_counter = (self.mod_counter + 1) % CONTROL_RATE;

        let raw = self.oscillator.next_sample();
        let filtered = match settings.slope {
            FilterSlope::Db12 => self.svf.tick(raw, FilterType::LowPass),
            FilterSlope::Db24 => self.ladder.process(raw),
        };
        filtered * self.envelope.process() * self.velocity * settings.gain
    }

    /// Frequency the oscillator was tuned to for `settings`, bend included
    pub fn frequency(&self, settings: &SubtractiveSettings) -> f32 {
        midi_to_frequency(self.pitch) * semitones_to_ratio(settings.tune) * self.bend_ratio
    }
}

impl PolyVoice for SubtractiveVoice {
    fn start(&mut self, pitch: u8, velocity: u8, tag: VoiceTag, age: u64) {
        let retrigger = self.is_active();
        self.pitch = pitch.min(127);
        self.velocity = velocity.min(127) as f32 / 127.0;
        self.tag = tag;
        self.age = age;
        self.released = false;
        self.mod_counter = 0;

        // Free voice starts from a clean state; a retrigger keeps its phase
        if !retrigger {
            self.oscillator.reset();
            self.svf.reset();
            self.ladder.reset();
        }
        self.oscillator.set_frequency(midi_to_frequency(self.pitch));
        self.filter_env.trigger();
        self.envelope.note_on();
    }

    fn release(&mut self) {
        self.released = true;
        self.envelope.note_off();
    }

    fn kill(&mut self) {
        self.released = true;
        self.envelope.force_off();
        self.filter_env.reset();
        self.svf.reset();
        self.ladder.reset();
    }

    fn is_active(&self) -> bool {
        self.envelope.is_active()
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn pitch(&self) -> u8 {
        self.pitch
    }

    fn tag(&self) -> VoiceTag {
        self.tag
    }

    fn age(&self) -> u64 {
        self.age
    }

    fn level(&self) -> f32 {
        self.envelope.level()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48000.0;

    #[test]
    fn test_voice_sounds_and_releases() {
        let settings = SubtractiveSettings {
            amp_envelope: AdsrParams::new(0.001, 0.01, 0.8, 0.01),
            ..Default::default()
        };
        let mut voice = SubtractiveVoice::new(&settings, SAMPLE_RATE, 0);
        voice.start(60, 127, 1, 1);
        voice.apply_settings(&settings);
        assert!(voice.is_active());

        let peak = (0..2048)
            .map(|_| voice.next_sample(&settings).abs())
            .fold(0.0f32, f32::max);
        assert!(peak > 0.05);

        voice.release();
        assert!(voice.is_released());
        for _ in 0..(SAMPLE_RATE as usize / 50) {
            voice.next_sample(&settings);
        }
        assert!(!voice.is_active());
    }

    #[test]
    fn test_kill_is_immediate() {
        let settings = SubtractiveSettings::default();
        let mut voice = SubtractiveVoice::new(&settings, SAMPLE_RATE, 0);
        voice.start(64, 100, 7, 1);
        voice.apply_settings(&settings);
        for _ in 0..1000 {
            voice.next_sample(&settings);
        }
        voice.kill();
        assert!(!voice.is_active());
        assert_eq!(voice.next_sample(&settings), 0.0);
    }

    #[test]
    fn test_tune_shifts_frequency() {
        let settings = SubtractiveSettings {
            tune: 12.0,
            ..Default::default()
        };
        let mut voice = SubtractiveVoice::new(&settings, SAMPLE_RATE, 0);
        voice.start(57, 100, 1, 1);
        voice.apply_settings(&settings);
        assert!((voice.frequency(&settings) - 440.0).abs() < 0.01);
    }

    #[test]
    fn test_filter_envelope_opens_the_filter() {
        let closed = SubtractiveSettings {
            waveform: WaveformType::SawBlep,
            cutoff: 200.0,
            amp_envelope: AdsrParams::new(0.001, 1.0, 1.0, 0.1),
            ..Default::default()
        };
        let swept = SubtractiveSettings {
            filter_env_amount: 1.0,
            filter_env_decay: 2.0,
            ..closed
        };

        let energy = |settings: &SubtractiveSettings| {
            let mut voice = SubtractiveVoice::new(settings, SAMPLE_RATE, 0);
            voice.start(48, 127, 1, 1);
            voice.apply_settings(settings);
            (0..4800).map(|_| voice.next_sample(settings).powi(2)).sum::<f32>()
        };
        assert!(energy(&swept) > energy(&closed));
    }

    #[test]
    fn test_filter_envelope_modulates_resonance() {
        let settings = SubtractiveSettings {
            resonance: 0.2,
            filter_env_amount: 1.0,
            filter_env_decay: 0.1,
            ..Default::default()
        };
        let mut voice = SubtractiveVoice::new(&settings, SAMPLE_RATE, 0);
        voice.start(48, 127, 1, 1);
        voice.apply_settings(&settings);

        voice.next_sample(&settings);
        let (_, peak) = voice.filter_state();
        assert!((peak - 0.7).abs() < 1e-4);

        for _ in 0..(SAMPLE_RATE as usize / 2) {
            voice.next_sample(&settings);
        }
        let (_, settled) = voice.filter_state();
        assert!(settled < peak);
        assert!((settled - 0.2).abs() < 0.01);

        // Large amounts stay inside 0..1
        let hot = SubtractiveSettings {
            resonance: 0.9,
            ..settings
        };
        voice.start(48, 127, 2, 2);
        voice.next_sample(&hot);
        assert_eq!(voice.filter_state().1, 1.0);
    }

    #[test]
    fn test_bend_retunes_sounding_voice() {
        let settings = SubtractiveSettings::default();
        let mut voice = SubtractiveVoice::new(&settings, SAMPLE_RATE, 0);
        voice.start(69, 100, 1, 1);
        voice.apply_settings(&settings);
        voice.set_performance(semitones_to_ratio(2.0), 0.0, &settings);
        assert!((voice.frequency(&settings) - 493.88).abs() < 0.05);

        voice.set_performance(1.0, 1.0, &settings);
        voice.start(69, 100, 2, 2);
        voice.next_sample(&settings);
        let (cutoff, _) = voice.filter_state();
        assert!((cutoff - settings.cutoff * 4.0).abs() < 1.0);
    }

    #[test]
    fn test_ladder_slope_renders() {
        let settings = SubtractiveSettings {
            slope: FilterSlope::Db24,
            resonance: 0.9,
            ..Default::default()
        };
        let mut voice = SubtractiveVoice::new(&settings, SAMPLE_RATE, 0);
        voice.start(45, 127, 1, 1);
        voice.apply_settings(&settings);
        for _ in 0..10_000 {
            let s = voice.next_sample(&settings);
            assert!(s.is_finite() && s.abs() < 2.0);
        }
    }
}
