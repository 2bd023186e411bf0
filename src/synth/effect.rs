// Effect - Insert effects for mixer channels
//
// - Effect trait: stereo frame in, wet stereo frame out
// - EffectSlot: an effect plus its bypass flag and equal-power wet/dry mix
// - EffectChain: slots in series, capacity reserved up front
//
// Real-time constraints:
// - No allocations in processing or in insert/remove within capacity
// - Removed slots are returned to the caller, never dropped here

use serde::{Deserialize, Serialize};

use super::delay::{Delay, DelayParams};
use super::filter::{FilterParams, FilterType, StateVariableFilter};
use crate::audio::dsp_utils::{OnePoleSmoother, equal_power_gains};

/// Generic effect trait
///
/// Implementations must be real-time safe: no allocation, no blocking.
pub trait Effect: Send {
    /// Process one stereo frame, returning the wet signal
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32);

    /// Clear internal state (delay lines, filter states)
    fn reset(&mut self);

    /// `index` follows the kind's descriptor table; values arrive clamped
    fn set_param(&mut self, index: usize, value: f32);

    /// Default: 0 samples
    fn latency_samples(&self) -> usize {
        0
    }

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Filter,
    Delay,
    Drive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectParameter {
    pub key: &'static str,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub unit: &'static str,
}

const fn effect_param(
    key: &'static str,
    name: &'static str,
    min: f32,
    max: f32,
    default: f32,
    unit: &'static str,
) -> EffectParameter {
    EffectParameter {
        key,
        name,
        min,
        max,
        default,
        unit,
    }
}

static FILTER_PARAMS: [EffectParameter; 3] = [
    effect_param("cutoff", "Cutoff", 20.0, 20000.0, 1000.0, "Hz"),
    effect_param("resonance", "Resonance", 0.5, 20.0, 0.707, "Q"),
    effect_param("mode", "Mode", 0.0, 3.0, 0.0, ""),
];

static DELAY_PARAMS: [EffectParameter; 2] = [
    effect_param("time", "Time", 1.0, 2000.0, 250.0, "ms"),
    effect_param("feedback", "Feedback", 0.0, 0.95, 0.5, ""),
];

static DRIVE_PARAMS: [EffectParameter; 2] = [
    effect_param("drive", "Drive", 1.0, 20.0, 2.0, "x"),
    effect_param("output", "Output", 0.0, 1.0, 0.7, ""),
];

impl EffectKind {
    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Filter => "Filter",
            EffectKind::Delay => "Delay",
            EffectKind::Drive => "Drive",
        }
    }

    pub fn parameters(self) -> &'static [EffectParameter] {
        match self {
            EffectKind::Filter => &FILTER_PARAMS,
            EffectKind::Delay => &DELAY_PARAMS,
            EffectKind::Drive => &DRIVE_PARAMS,
        }
    }

    /// Index and clamped value for a parameter key
    pub fn resolve_param(self, key: &str, value: f32) -> Option<(usize, f32)> {
        let (index, param) = self
            .parameters()
            .iter()
            .enumerate()
            .find(|(_, p)| p.key == key)?;
        let value = if value.is_finite() {
            value.clamp(param.min, param.max)
        } else {
            param.default
        };
        Some((index, value))
    }

    /// Wet/dry mix a freshly inserted effect starts with
    pub fn default_mix(self) -> f32 {
        match self {
            EffectKind::Delay => 0.3,
            EffectKind::Filter | EffectKind::Drive => 1.0,
        }
    }

    /// Build the effect. Allocates: call from the control side.
    pub fn create(self, sample_rate: f32) -> Box<dyn Effect> {
        match self {
            EffectKind::Filter => Box::new(FilterEffect::new(sample_rate)),
            EffectKind::Delay => Box::new(DelayEffect::new(sample_rate)),
            EffectKind::Drive => Box::new(DriveEffect::new()),
        }
    }
}

/// Effect plus bypass and wet/dry mix
pub struct EffectSlot {
    effect: Box<dyn Effect>,
    kind: EffectKind,
    bypassed: bool,
    mix: f32,
    mix_smoother: OnePoleSmoother,
}

impl EffectSlot {
    pub fn new(kind: EffectKind, sample_rate: f32) -> Self {
        let mix = kind.default_mix();
        Self {
            effect: kind.create(sample_rate),
            kind,
            bypassed: false,
            mix,
            mix_smoother: OnePoleSmoother::new(mix, 10.0, sample_rate),
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn set_bypassed(&mut self, bypassed: bool) {
        if self.bypassed && !bypassed {
            self.effect.reset();
        }
        self.bypassed = bypassed;
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn set_mix(&mut self, mix: f32) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub fn set_param(&mut self, index: usize, value: f32) {
        self.effect.set_param(index, value);
    }

    pub fn effect_mut(&mut self) -> &mut dyn Effect {
        self.effect.as_mut()
    }

    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        if self.bypassed {
            return (left, right);
        }
        let (wet_l, wet_r) = self.effect.process_frame(left, right);
        let (dry, wet) = equal_power_gains(self.mix_smoother.process(self.mix));
        (left * dry + wet_l * wet, right * dry + wet_r * wet)
    }
}

/// Effect chain - slots processed in series
pub struct EffectChain {
    slots: Vec<EffectSlot>,
}

impl EffectChain {
    /// Reserves room for `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Insert at `position` (clamped to the end). When the chain is full the
    /// slot is handed back instead of growing the vector.
    pub fn insert(&mut self, position: usize, slot: EffectSlot) -> Result<(), EffectSlot> {
        if self.slots.len() >= self.slots.capacity() {
            return Err(slot);
        }
        let position = position.min(self.slots.len());
        self.slots.insert(position, slot);
        Ok(())
    }

    pub fn remove(&mut self, position: usize) -> Option<EffectSlot> {
        if position < self.slots.len() {
            Some(self.slots.remove(position))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut EffectSlot> {
        self.slots.get_mut(position)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mut frame = (left, right);
        for slot in &mut self.slots {
            frame = slot.process_frame(frame.0, frame.1);
        }
        frame
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.effect.reset();
        }
    }

    /// Sum of the latencies of the active slots
    pub fn total_latency_samples(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !s.bypassed)
            .map(|s| s.effect.latency_samples())
            .sum()
    }

    /// Move every slot out (for retiring a channel's effects)
    pub fn drain(&mut self) -> std::vec::Drain<'_, EffectSlot> {
        self.slots.drain(..)
    }
}

/// State variable filter, one per side
pub struct FilterEffect {
    left: StateVariableFilter,
    right: StateVariableFilter,
}

impl FilterEffect {
    pub fn new(sample_rate: f32) -> Self {
        let params = FilterParams::default();
        Self {
            left: StateVariableFilter::new(params, sample_rate),
            right: StateVariableFilter::new(params, sample_rate),
        }
    }

    pub fn params(&self) -> FilterParams {
        self.left.params()
    }

    fn update(&mut self, f: impl Fn(&mut FilterParams)) {
        let mut params = self.left.params();
        f(&mut params);
        self.left.set_params(params);
        self.right.set_params(params);
    }
}

impl Effect for FilterEffect {
    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        (self.left.process(left), self.right.process(right))
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn set_param(&mut self, index: usize, value: f32) {
        match index {
            0 => self.update(|p| p.cutoff = value),
            1 => self.update(|p| p.resonance = value),
            2 => self.update(|p| p.filter_type = FilterType::from_index(value)),
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "Filter"
    }
}

/// Stereo feedback delay
pub struct DelayEffect {
    left: Delay,
    right: Delay,
}

impl DelayEffect {
    /// Longest delay time, in milliseconds
    pub const MAX_TIME_MS: f32 = 2000.0;

    pub fn new(sample_rate: f32) -> Self {
        let params = DelayParams::default();
        Self {
            left: Delay::new(params, sample_rate, Self::MAX_TIME_MS),
            right: Delay::new(params, sample_rate, Self::MAX_TIME_MS),
        }
    }

    pub fn params(&self) -> DelayParams {
        self.left.params()
    }

    fn update(&mut self, f: impl Fn(&mut DelayParams)) {
        let mut params = self.left.params();
        f(&mut params);
        self.left.set_params(params);
        self.right.set_params(params);
    }
}

impl Effect for DelayEffect {
    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        (self.left.process(left), self.right.process(right))
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn set_param(&mut self, index: usize, value: f32) {
        match index {
            0 => self.update(|p| p.time_ms = value),
            1 => self.update(|p| p.feedback = value),
            _ => {}
        }
    }

    fn latency_samples(&self) -> usize {
        self.left.latency_samples()
    }

    fn name(&self) -> &str {
        "Delay"
    }
}

/// tanh saturation
pub struct DriveEffect {
    drive: f32,
    output: f32,
}

impl DriveEffect {
    pub fn new() -> Self {
        Self {
            drive: DRIVE_PARAMS[0].default,
            output: DRIVE_PARAMS[1].default,
        }
    }
}

impl Default for DriveEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for DriveEffect {
    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            (left * self.drive).tanh() * self.output,
            (right * self.drive).tanh() * self.output,
        )
    }

    fn reset(&mut self) {}

    fn set_param(&mut self, index: usize, value: f32) {
        match index {
            0 => self.drive = value,
            1 => self.output = value,
            _ => {}
        }
    }

    fn name(&self) -> &str {
        "Drive"
    }
}
