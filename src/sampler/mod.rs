// Sampler - plays an in-memory sample, pitched from a root note

pub mod sample;
pub mod voice;

pub use sample::SampleBuffer;
pub use voice::{SamplerSettings, SamplerVoice};

use std::sync::Arc;

use crate::synth::instrument::{Controller, Performance, Synthesize};
use crate::synth::parameters::ParamId;
use crate::synth::voice::{PolyVoice, VoiceTag};
use crate::synth::voice_manager::VoicePool;

pub struct Sampler {
    pool: VoicePool<SamplerVoice>,
    sample: Option<Arc<SampleBuffer>>,
    settings: SamplerSettings,
    performance: Performance,
}

impl Sampler {
    pub fn new(sample_rate: f32, polyphony: usize) -> Self {
        let settings = SamplerSettings::default();
        Self {
            pool: VoicePool::new(polyphony, |_| SamplerVoice::new(&settings, sample_rate)),
            sample: None,
            settings,
            performance: Performance::default(),
        }
    }

    /// Replace the sample. Sounding voices are cut since their playheads
    /// point into the old data.
    pub fn set_sample(&mut self, sample: Option<Arc<SampleBuffer>>) -> Option<Arc<SampleBuffer>> {
        self.pool.kill_all();
        std::mem::replace(&mut self.sample, sample)
    }

    pub fn has_sample(&self) -> bool {
        self.sample.is_some()
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn performance(&self) -> &Performance {
        &self.performance
    }

    fn retune_active(&mut self) {
        let Some(sample) = &self.sample else {
            return;
        };
        let bend = self.performance.bend_semitones();
        for voice in self.pool.voices_mut().iter_mut().filter(|v| v.is_active()) {
            voice.retune(&self.settings, sample, bend);
        }
    }
}

impl Synthesize for Sampler {
    fn note_on(&mut self, pitch: u8, velocity: u8, tag: VoiceTag) {
        let Some(sample) = &self.sample else {
            return;
        };
        let Some(index) = self.pool.note_on(pitch, velocity, tag) else {
            return;
        };
        if let Some(voice) = self.pool.voice_mut(index) {
            voice.retune(&self.settings, sample, self.performance.bend_semitones());
        }
    }

    fn note_off(&mut self, tag: VoiceTag) {
        self.pool.note_off(tag);
    }

    fn all_notes_off(&mut self) {
        self.pool.kill_all();
    }

    fn set_param(&mut self, param: ParamId, value: f32) {
        match param {
            ParamId::RootNote => {
                self.settings.root_note = value.round().clamp(0.0, 127.0) as u8;
                self.retune_active();
            }
            ParamId::Tune => {
                self.settings.tune = value.clamp(-24.0, 24.0);
                self.retune_active();
            }
            ParamId::LoopEnabled => self.settings.loop_enabled = value >= 0.5,
            ParamId::Gain => self.settings.gain = value.clamp(0.0, 1.0),
            ParamId::Attack | ParamId::Release => {
                if param == ParamId::Attack {
                    self.settings.attack = value;
                } else {
                    self.settings.release = value;
                }
                for voice in self.pool.voices_mut() {
                    voice.apply_settings(&self.settings);
                }
            }
            _ => {}
        }
    }

    fn pitch_bend(&mut self, bend: f32) {
        self.performance.set_bend(bend);
        self.retune_active();
    }

    /// No filter here: cutoff and resonance controllers are ignored
    fn control_change(&mut self, controller: u8, value: u8) {
        let amount = value.min(127) as f32 / 127.0;
        match Controller::from_number(controller) {
            Some(Controller::ModWheel) => self.performance.mod_wheel = amount,
            Some(Controller::Volume) => self.performance.volume = amount,
            Some(Controller::AllNotesOff) => self.pool.kill_all(),
            _ => {}
        }
    }

    fn render_add(&mut self, out: &mut [f32]) {
        let Some(sample) = &self.sample else {
            return;
        };
        let settings = &self.settings;
        let volume = self.performance.volume;
        for voice in self.pool.voices_mut().iter_mut().filter(|v| v.is_active()) {
            for frame in out.iter_mut() {
                *frame += voice.next_sample(sample, settings) * volume;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacing_sample_cuts_voices() {
        let mut sampler = Sampler::new(48000.0, 4);
        sampler.set_sample(Some(Arc::new(SampleBuffer::from_mono("a", vec![0.5; 1000], 48000))));
        sampler.note_on(60, 100, 1);
        sampler.note_on(62, 100, 2);
        assert_eq!(sampler.active_voices(), 2);

        let old = sampler.set_sample(Some(Arc::new(SampleBuffer::from_mono("b", vec![0.5; 10], 48000))));
        assert_eq!(old.map(|s| s.name().to_string()), Some("a".to_string()));
        assert_eq!(sampler.active_voices(), 0);
    }

    #[test]
    fn test_bend_moves_the_playhead_faster() {
        let mut sampler = Sampler::new(48000.0, 4);
        sampler.set_sample(Some(Arc::new(SampleBuffer::from_mono("a", vec![0.5; 48000], 48000))));
        sampler.note_on(60, 100, 1);
        sampler.pitch_bend(1.0);

        let mut out = vec![0.0; 1000];
        sampler.render_add(&mut out);
        let position = sampler.pool.voices().iter().find(|v| v.is_active()).map(|v| v.position());
        let expected = 1000.0 * 2.0f64.powf(2.0 / 12.0);
        assert!(position.is_some_and(|p| (p - expected).abs() < 0.5));
    }

    #[test]
    fn test_zero_velocity_and_all_notes_off_controller() {
        let mut sampler = Sampler::new(48000.0, 4);
        sampler.set_sample(Some(Arc::new(SampleBuffer::from_mono("a", vec![0.5; 48000], 48000))));
        sampler.note_on(60, 0, 1);
        assert_eq!(sampler.active_voices(), 0);

        sampler.note_on(60, 100, 2);
        sampler.note_on(62, 100, 3);
        sampler.control_change(123, 0);
        assert_eq!(sampler.active_voices(), 0);
    }

    #[test]
    fn test_root_note_param() {
        let mut sampler = Sampler::new(48000.0, 4);
        sampler.set_param(ParamId::RootNote, 69.4);
        sampler.set_param(ParamId::LoopEnabled, 1.0);
        assert_eq!(sampler.settings().root_note, 69);
        assert!(sampler.settings().loop_enabled);
        assert!(!sampler.has_sample());
    }
}
