// Instruments - what a track plays through
//
// Every instrument kind implements `Synthesize`; the render engine only ever
// holds the `Instrument` enum.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::envelope::AdsrParams;
use super::filter::FilterSlope;
use super::oscillator::WaveformType;
use super::parameters::ParamId;
use super::voice::{PolyVoice, SubtractiveSettings, SubtractiveVoice, VoiceTag};
use super::voice_manager::VoicePool;
use crate::audio::dsp_utils::semitones_to_ratio;
use crate::sampler::{Sampler, SampleBuffer};

/// Semitones at full pitch-bend deflection
pub const PITCH_BEND_RANGE: f32 = 2.0;

/// 14-bit MIDI pitch-bend value (0..16383, centre 8192) to -1..1
pub fn bend_from_midi(value: u16) -> f32 {
    ((value.min(16383) as f32 - 8192.0) / 8192.0).max(-1.0)
}

/// MIDI controllers the instruments respond to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Controller {
    ModWheel,
    Volume,
    Resonance,
    Cutoff,
    AllNotesOff,
}

impl Controller {
    pub fn from_number(cc: u8) -> Option<Self> {
        match cc {
            1 => Some(Controller::ModWheel),
            7 => Some(Controller::Volume),
            71 => Some(Controller::Resonance),
            74 => Some(Controller::Cutoff),
            123 => Some(Controller::AllNotesOff),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Controller::ModWheel => 1,
            Controller::Volume => 7,
            Controller::Resonance => 71,
            Controller::Cutoff => 74,
            Controller::AllNotesOff => 123,
        }
    }

    /// Instrument parameter a 0..127 controller value stands for, if any
    pub fn param_value(self, value: u8) -> Option<(ParamId, f32)> {
        let amount = value.min(127) as f32 / 127.0;
        match self {
            Controller::Cutoff => Some((ParamId::Cutoff, 20.0 + amount * 19980.0)),
            Controller::Resonance => Some((ParamId::Resonance, amount)),
            _ => None,
        }
    }
}

/// Live controller state of one instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Performance {
    /// -1..1
    pub bend: f32,
    /// 0..1
    pub mod_wheel: f32,
    /// 0..1, channel volume
    pub volume: f32,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            bend: 0.0,
            mod_wheel: 0.0,
            volume: 1.0,
        }
    }
}

impl Performance {
    pub fn bend_semitones(&self) -> f32 {
        self.bend * PITCH_BEND_RANGE
    }

    pub fn bend_ratio(&self) -> f32 {
        semitones_to_ratio(self.bend_semitones())
    }

    pub fn set_bend(&mut self, bend: f32) {
        self.bend = if bend.is_finite() { bend.clamp(-1.0, 1.0) } else { 0.0 };
    }
}

/// Real-time instrument surface. Every method must stay allocation-free.
pub trait Synthesize: Send {
    /// Velocity 0 releases `pitch` instead of starting a voice
    fn note_on(&mut self, pitch: u8, velocity: u8, tag: VoiceTag);
    fn note_off(&mut self, tag: VoiceTag);
    /// Silence every voice immediately (no release)
    fn all_notes_off(&mut self);
    /// `value` is already clamped by the control side
    fn set_param(&mut self, param: ParamId, value: f32);
    /// `bend` -1..1, applied to every voice, sounding or not
    fn pitch_bend(&mut self, bend: f32);
    /// MIDI control change, `value` 0..127. Unknown controllers are ignored.
    fn control_change(&mut self, controller: u8, value: u8);
    /// Add this block's mono output into `out`
    fn render_add(&mut self, out: &mut [f32]);
    fn active_voices(&self) -> usize;
    fn polyphony(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Subtractive,
    Sampler,
}

/// Oscillator → filter → amp envelope, per voice
pub struct SubtractiveSynth {
    pool: VoicePool<SubtractiveVoice>,
    settings: SubtractiveSettings,
    performance: Performance,
}

impl SubtractiveSynth {
    pub fn new(sample_rate: f32, polyphony: usize) -> Self {
        let settings = SubtractiveSettings::default();
        Self {
            pool: VoicePool::new(polyphony, |i| SubtractiveVoice::new(&settings, sample_rate, i as u32)),
            settings,
            performance: Performance::default(),
        }
    }

    pub fn settings(&self) -> &SubtractiveSettings {
        &self.settings
    }

    pub fn performance(&self) -> &Performance {
        &self.performance
    }

    fn apply_performance(&mut self) {
        let ratio = self.performance.bend_ratio();
        let mod_wheel = self.performance.mod_wheel;
        for voice in self.pool.voices_mut() {
            voice.set_performance(ratio, mod_wheel, &self.settings);
        }
    }
}

impl Synthesize for SubtractiveSynth {
    fn note_on(&mut self, pitch: u8, velocity: u8, tag: VoiceTag) {
        let Some(index) = self.pool.note_on(pitch, velocity, tag) else {
            return;
        };
        if let Some(voice) = self.pool.voice_mut(index) {
            voice.set_performance(self.performance.bend_ratio(), self.performance.mod_wheel, &self.settings);
            voice.apply_settings(&self.settings);
        }
    }

    fn note_off(&mut self, tag: VoiceTag) {
        self.pool.note_off(tag);
    }

    fn all_notes_off(&mut self) {
        self.pool.kill_all();
    }

    fn set_param(&mut self, param: ParamId, value: f32) {
        let s = &mut self.settings;
        let env = s.amp_envelope;
        match param {
            ParamId::Waveform => s.waveform = WaveformType::from_index(value),
            ParamId::Attack => s.amp_envelope = AdsrParams::new(value, env.decay, env.sustain, env.release),
            ParamId::Decay => s.amp_envelope = AdsrParams::new(env.attack, value, env.sustain, env.release),
            ParamId::Sustain => s.amp_envelope = AdsrParams::new(env.attack, env.decay, value, env.release),
            ParamId::Release => s.amp_envelope = AdsrParams::new(env.attack, env.decay, env.sustain, value),
            ParamId::Cutoff => s.cutoff = value.clamp(20.0, 20000.0),
            ParamId::Resonance => s.resonance = value.clamp(0.0, 1.0),
            ParamId::FilterSlope => s.slope = FilterSlope::from_index(value),
            ParamId::FilterEnvAmount => s.filter_env_amount = value.clamp(-1.0, 1.0),
            ParamId::FilterEnvDecay => s.filter_env_decay = value.clamp(0.001, 10.0),
            ParamId::Gain => s.gain = value.clamp(0.0, 1.0),
            ParamId::Tune => s.tune = value.clamp(-24.0, 24.0),
            ParamId::RootNote | ParamId::LoopEnabled => return,
        }
        for voice in self.pool.voices_mut() {
            voice.apply_settings(&self.settings);
        }
    }

    fn pitch_bend(&mut self, bend: f32) {
        self.performance.set_bend(bend);
        self.apply_performance();
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        let Some(controller) = Controller::from_number(controller) else {
            return;
        };
        let amount = value.min(127) as f32 / 127.0;
        match controller {
            Controller::ModWheel => {
                self.performance.mod_wheel = amount;
                self.apply_performance();
            }
            Controller::Volume => self.performance.volume = amount,
            Controller::AllNotesOff => self.all_notes_off(),
            Controller::Cutoff | Controller::Resonance => {
                if let Some((param, value)) = controller.param_value(value) {
                    self.set_param(param, value);
                }
            }
        }
    }

    fn render_add(&mut self, out: &mut [f32]) {
        let settings = &self.settings;
        let volume = self.performance.volume;
        for voice in self.pool.voices_mut().iter_mut().filter(|v| v.is_active()) {
            for sample in out.iter_mut() {
                *sample += voice.next_sample(settings) * volume;
            }
        }
    }

    fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    fn polyphony(&self) -> usize {
        self.pool.polyphony()
    }
}

pub enum Instrument {
    Subtractive(SubtractiveSynth),
    Sampler(Sampler),
}

impl Instrument {
    pub fn new(kind: InstrumentType, sample_rate: f32, polyphony: usize) -> Self {
        match kind {
            InstrumentType::Subtractive => Instrument::Subtractive(SubtractiveSynth::new(sample_rate, polyphony)),
            InstrumentType::Sampler => Instrument::Sampler(Sampler::new(sample_rate, polyphony)),
        }
    }

    pub fn kind(&self) -> InstrumentType {
        match self {
            Instrument::Subtractive(_) => InstrumentType::Subtractive,
            Instrument::Sampler(_) => InstrumentType::Sampler,
        }
    }

    /// Swap the sample data. The previous buffer is handed back so the
    /// caller can release it off the render thread.
    pub fn set_sample(&mut self, sample: Option<Arc<SampleBuffer>>) -> Option<Arc<SampleBuffer>> {
        match self {
            Instrument::Sampler(sampler) => sampler.set_sample(sample),
            Instrument::Subtractive(_) => sample,
        }
    }

    fn synth(&mut self) -> &mut dyn Synthesize {
        match self {
            Instrument::Subtractive(synth) => synth,
            Instrument::Sampler(sampler) => sampler,
        }
    }

    fn synth_ref(&self) -> &dyn Synthesize {
        match self {
            Instrument::Subtractive(synth) => synth,
            Instrument::Sampler(sampler) => sampler,
        }
    }
}

impl Synthesize for Instrument {
    #[inline]
    fn note_on(&mut self, pitch: u8, velocity: u8, tag: VoiceTag) {
        self.synth().note_on(pitch, velocity, tag);
    }

    #[inline]
    fn note_off(&mut self, tag: VoiceTag) {
        self.synth().note_off(tag);
    }

    fn all_notes_off(&mut self) {
        self.synth().all_notes_off();
    }

    fn set_param(&mut self, param: ParamId, value: f32) {
        self.synth().set_param(param, value);
    }

    fn pitch_bend(&mut self, bend: f32) {
        self.synth().pitch_bend(bend);
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        self.synth().control_change(controller, value);
    }

    #[inline]
    fn render_add(&mut self, out: &mut [f32]) {
        self.synth().render_add(out);
    }

    fn active_voices(&self) -> usize {
        self.synth_ref().active_voices()
    }

    fn polyphony(&self) -> usize {
        self.synth_ref().polyphony()
    }
}
