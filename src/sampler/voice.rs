use crate::audio::dsp_utils::semitones_to_ratio;
use crate::synth::envelope::{AdsrEnvelope, AdsrParams};
use crate::synth::voice::{PolyVoice, VoiceTag};

use super::sample::SampleBuffer;

/// Playback settings shared by the voices of one sampler
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SamplerSettings {
    /// Pitch at which the sample plays unshifted
    pub root_note: u8,
    pub loop_enabled: bool,
    /// Semitones
    pub tune: f32,
    pub attack: f32,
    pub release: f32,
    pub gain: f32,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            root_note: 60, // C4
            loop_enabled: false,
            tune: 0.0,
            attack: 0.001,
            release: 0.1,
            gain: 0.8,
        }
    }
}

impl SamplerSettings {
    pub fn envelope(&self) -> AdsrParams {
        AdsrParams::new(self.attack, 0.001, 1.0, self.release)
    }
}

pub struct SamplerVoice {
    position: f64,
    pitch_step: f64,
    pitch: u8,
    tag: VoiceTag,
    velocity: f32,
    released: bool,
    age: u64,
    envelope: AdsrEnvelope,
    sample_rate: f32,
}

impl SamplerVoice {
    pub fn new(settings: &SamplerSettings, sample_rate: f32) -> Self {
        Self {
            position: 0.0,
            pitch_step: 1.0,
            pitch: 0,
            tag: 0,
            velocity: 0.0,
            released: false,
            age: 0,
            envelope: AdsrEnvelope::new(settings.envelope(), sample_rate),
            sample_rate,
        }
    }

    /// Playhead increment for the current pitch plus `bend` semitones,
    /// relative to the root note and corrected for the sample's own rate
    pub fn retune(&mut self, settings: &SamplerSettings, sample: &SampleBuffer, bend: f32) {
        let semitones = self.pitch as f32 - settings.root_note as f32 + settings.tune + bend;
        let rate_ratio = sample.sample_rate() as f64 / self.sample_rate as f64;
        self.pitch_step = semitones_to_ratio(semitones) as f64 * rate_ratio;
    }

    pub fn apply_settings(&mut self, settings: &SamplerSettings) {
        self.envelope.set_params(settings.envelope());
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    #[inline]
    pub fn next_sample(&mut self, sample: &SampleBuffer, settings: &SamplerSettings) -> f32 {
        if !self.envelope.is_active() {
            return 0.0;
        }

        let len = sample.len() as f64;
        if self.position >= len {
            if settings.loop_enabled && len > 0.0 {
                self.position %= len;
            } else {
                // One shot ran out of frames
                self.envelope.force_off();
                return 0.0;
            }
        }

        let value = sample.read_linear(self.position, settings.loop_enabled);
        self.position += self.pitch_step;

        value * self.envelope.process() * self.velocity * settings.gain
    }
}

impl PolyVoice for SamplerVoice {
    fn start(&mut self, pitch: u8, velocity: u8, tag: VoiceTag, age: u64) {
        self.pitch = pitch.min(127);
        self.velocity = velocity.min(127) as f32 / 127.0;
        self.tag = tag;
        self.age = age;
        self.released = false;
        self.position = 0.0;
        self.envelope.note_on();
    }

    fn release(&mut self) {
        self.released = true;
        self.envelope.note_off();
    }

    fn kill(&mut self) {
        self.released = true;
        self.envelope.force_off();
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
