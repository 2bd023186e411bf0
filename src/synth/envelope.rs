// ADSR Envelope implementation
//
// Attack-Decay-Sustain-Release generator shaping a voice's amplitude.
// All stages are linear per-sample ramps.

/// Level under which a releasing voice is considered silent
pub const SILENCE_THRESHOLD: f32 = 0.001;

/// ADSR Envelope parameters
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AdsrParams {
    /// Attack time in seconds (0.001 to 5.0)
    pub attack: f32,
    /// Decay time in seconds (0.001 to 5.0)
    pub decay: f32,
    /// Sustain level (0.0 to 1.0)
    pub sustain: f32,
    /// Release time in seconds (0.001 to 5.0)
    pub release: f32,
}

impl AdsrParams {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.clamp(0.001, 5.0),
            decay: decay.clamp(0.001, 5.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.clamp(0.001, 5.0),
        }
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self {
            attack: 0.01, // 10ms attack
            decay: 0.1,   // 100ms decay
            sustain: 0.7, // 70% sustain level
            release: 0.2, // 200ms release
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Off,
    /// Rising to 1.0
    Attack,
    /// Falling to the sustain level
    Decay,
    /// Holding until note off
    Sustain,
    /// Falling from the captured level to 0.0
    Release,
}

#[derive(Debug, Clone)]
pub struct AdsrEnvelope {
    params: AdsrParams,
    stage: EnvelopeStage,
    level: f32,
    sample_rate: f32,

    // Per-sample increments, recomputed when params change
    attack_step: f32,
    decay_step: f32,
    release_step: f32,
}

impl AdsrEnvelope {
    pub fn new(params: AdsrParams, sample_rate: f32) -> Self {
        let mut envelope = Self {
            params,
            stage: EnvelopeStage::Off,
            level: 0.0,
            sample_rate,
            attack_step: 0.0,
            decay_step: 0.0,
            release_step: 0.0,
        };
        envelope.update_steps();
        envelope
    }

    fn update_steps(&mut self) {
        let samples = |seconds: f32| (seconds * self.sample_rate).max(1.0);
        self.attack_step = 1.0 / samples(self.params.attack);
        self.decay_step = (1.0 - self.params.sustain) / samples(self.params.decay);
        self.release_step = self.params.sustain.max(SILENCE_THRESHOLD) / samples(self.params.release);
    }

    pub fn set_params(&mut self, params: AdsrParams) {
        self.params = params;
        self.update_steps();
        if self.stage == EnvelopeStage::Release {
            // Keep the remaining release time consistent with the new setting
            self.release_step = self.level / (params.release * self.sample_rate).max(1.0);
        }
    }

    pub fn params(&self) -> AdsrParams {
        self.params
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Start the attack from the current level (a retrigger does not click)
    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    /// Release from wherever the envelope currently is
    pub fn note_off(&mut self) {
        if self.stage != EnvelopeStage::Off && self.stage != EnvelopeStage::Release {
            self.stage = EnvelopeStage::Release;
            self.release_step = self.level / (self.params.release * self.sample_rate).max(1.0);
        }
    }

    /// Straight to silence, no release
    pub fn force_off(&mut self) {
        self.stage = EnvelopeStage::Off;
        self.level = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Off
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeStage::Release
    }

    /// Advance one sample and return the level (0.0 to 1.0)
    #[inline]
    pub fn process(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Off => {
                self.level = 0.0;
            }
            EnvelopeStage::Attack => {
                self.level += self.attack_step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= self.decay_step;
                if self.level <= self.params.sustain {
                    self.level = self.params.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {
                self.level = self.params.sustain;
            }
            EnvelopeStage::Release => {
                self.level -= self.release_step;
                if self.level <= SILENCE_THRESHOLD {
                    self.force_off();
                }
            }
        }

        self.level
    }
}

/// Exponentially decaying modulation envelope (filter sweep).
/// Jumps to 1.0 on trigger and falls by 60 dB over `decay` seconds.
#[derive(Debug, Clone)]
pub struct DecayEnvelope {
    level: f32,
    coefficient: f32,
    sample_rate: f32,
}

impl DecayEnvelope {
    pub fn new(decay_seconds: f32, sample_rate: f32) -> Self {
        let mut env = Self {
            level: 0.0,
            coefficient: 0.0,
            sample_rate,
        };
        env.set_decay(decay_seconds);
        env
    }

    pub fn set_decay(&mut self, decay_seconds: f32) {
        let samples = (decay_seconds.clamp(0.001, 10.0) * self.sample_rate).max(1.0);
        // 0.001 = -60 dB
        self.coefficient = (0.001f32.ln() / samples).exp();
    }

    pub fn trigger(&mut self) {
        self.level = 1.0;
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Advance `samples` at once
    #[inline]
    pub fn advance(&mut self, samples: usize) -> f32 {
        self.level *= self.coefficient.powi(samples as i32);
        self.level
    }
}
