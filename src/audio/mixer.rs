// Mixer - channel strips, sends and the master bus (render side)
//
// Strip path: trim → high-pass → pre gain → effects → post gain → pan →
// fader → meter. Sends tap the strip output post-fader into other strips'
// inputs; every strip output also sums into master. Strips run in the order
// the control side computed from the send graph.

use serde::{Deserialize, Serialize};

use super::dsp_utils::{OnePoleSmoother, equal_power_pan, soft_clip};
use super::metering::{Meter, MeterHandle};
use crate::synth::effect::{EffectChain, EffectSlot};
use crate::synth::filter::{FilterParams, FilterType, StateVariableFilter};

/// Gain smoothing time constant
const GAIN_SMOOTHING_MS: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

/// One strip parameter change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelParam {
    Trim(f32),
    HighPassEnabled(bool),
    HighPassFrequency(f32),
    PreGain(f32),
    PostGain(f32),
    Pan(f32),
    Volume(f32),
    Mute(bool),
    Solo(bool),
    /// Stays audible while other channels are soloed (send targets)
    SoloSafe(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendSlot {
    /// Render index of the target strip
    pub target: usize,
    pub amount: f32,
}

pub struct ChannelStrip {
    input_l: Vec<f32>,
    input_r: Vec<f32>,
    trim: f32,
    high_pass_enabled: bool,
    high_pass_l: StateVariableFilter,
    high_pass_r: StateVariableFilter,
    pre_gain: f32,
    effects: EffectChain,
    post_gain: f32,
    pan: f32,
    volume: f32,
    mute: bool,
    solo: bool,
    solo_safe: bool,
    sends: Vec<SendSlot>,
    pre_smoother: OnePoleSmoother,
    post_smoother: OnePoleSmoother,
    out_l_smoother: OnePoleSmoother,
    out_r_smoother: OnePoleSmoother,
    meter: Meter,
}

impl ChannelStrip {
    pub const DEFAULT_HIGH_PASS_HZ: f32 = 80.0;

    pub fn new(
        max_block: usize,
        max_effects: usize,
        max_sends: usize,
        sample_rate: f32,
        meter: MeterHandle,
    ) -> Self {
        let hp_params = FilterParams {
            cutoff: Self::DEFAULT_HIGH_PASS_HZ,
            resonance: 0.707,
            filter_type: FilterType::HighPass,
            enabled: true,
        };
        let (left, right) = equal_power_pan(0.0);
        Self {
            input_l: vec![0.0; max_block],
            input_r: vec![0.0; max_block],
            trim: 1.0,
            high_pass_enabled: false,
            high_pass_l: StateVariableFilter::new(hp_params, sample_rate),
            high_pass_r: StateVariableFilter::new(hp_params, sample_rate),
            pre_gain: 1.0,
            effects: EffectChain::with_capacity(max_effects),
            post_gain: 1.0,
            pan: 0.0,
            volume: 1.0,
            mute: false,
            solo: false,
            solo_safe: false,
            sends: Vec::with_capacity(max_sends),
            pre_smoother: OnePoleSmoother::new(1.0, GAIN_SMOOTHING_MS, sample_rate),
            post_smoother: OnePoleSmoother::new(1.0, GAIN_SMOOTHING_MS, sample_rate),
            out_l_smoother: OnePoleSmoother::new(left, GAIN_SMOOTHING_MS, sample_rate),
            out_r_smoother: OnePoleSmoother::new(right, GAIN_SMOOTHING_MS, sample_rate),
            meter: Meter::new(meter),
        }
    }

    pub fn set_param(&mut self, param: ChannelParam) {
        match param {
            ChannelParam::Trim(v) => self.trim = v,
            ChannelParam::HighPassEnabled(on) => {
                if on && !self.high_pass_enabled {
                    self.high_pass_l.reset();
                    self.high_pass_r.reset();
                }
                self.high_pass_enabled = on;
            }
            ChannelParam::HighPassFrequency(hz) => {
                for filter in [&mut self.high_pass_l, &mut self.high_pass_r] {
                    let mut params = filter.params();
                    params.cutoff = hz;
                    filter.set_params(params);
                }
            }
            ChannelParam::PreGain(v) => self.pre_gain = v,
            ChannelParam::PostGain(v) => self.post_gain = v,
            ChannelParam::Pan(v) => self.pan = v.clamp(-1.0, 1.0),
            ChannelParam::Volume(v) => self.volume = v.max(0.0),
            ChannelParam::Mute(on) => self.mute = on,
            ChannelParam::Solo(on) => self.solo = on,
            ChannelParam::SoloSafe(on) => self.solo_safe = on,
        }
    }

    pub fn is_soloed(&self) -> bool {
        self.solo
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn effects_mut(&mut self) -> &mut EffectChain {
        &mut self.effects
    }

    pub fn insert_effect(&mut self, position: usize, slot: EffectSlot) -> Result<(), EffectSlot> {
        self.effects.insert(position, slot)
    }

    pub fn remove_effect(&mut self, position: usize) -> Option<EffectSlot> {
        self.effects.remove(position)
    }

    /// Add or update a send. False when the send list is full.
    pub fn set_send(&mut self, target: usize, amount: f32) -> bool {
        if let Some(send) = self.sends.iter_mut().find(|s| s.target == target) {
            send.amount = amount;
            return true;
        }
        if self.sends.len() >= self.sends.capacity() {
            return false;
        }
        self.sends.push(SendSlot { target, amount });
        true
    }

    pub fn remove_send(&mut self, target: usize) {
        self.sends.retain(|s| s.target != target);
    }

    pub fn sends(&self) -> &[SendSlot] {
        &self.sends
    }

    /// Accumulate into the strip input
    #[inline]
    pub fn add_input(&mut self, offset: usize, left: &[f32], right: &[f32]) {
        let end = (offset + left.len()).min(self.input_l.len());
        if offset >= end {
            return;
        }
        let n = end - offset;
        for (dst, src) in self.input_l[offset..end].iter_mut().zip(&left[..n]) {
            *dst += src;
        }
        for (dst, src) in self.input_r[offset..end].iter_mut().zip(&right[..n]) {
            *dst += src;
        }
    }

    /// Run the strip in place over the first `frames` input frames
    pub fn process(&mut self, frames: usize, audible: bool) {
        let frames = frames.min(self.input_l.len());
        let fader = if self.mute || !audible { 0.0 } else { self.volume };
        let (pan_l, pan_r) = equal_power_pan(self.pan);
        let pre_target = self.trim * self.pre_gain;

        for i in 0..frames {
            let pre = self.pre_smoother.process(pre_target);
            let mut l = self.input_l[i] * pre;
            let mut r = self.input_r[i] * pre;

            if self.high_pass_enabled {
                l = self.high_pass_l.process(l);
                r = self.high_pass_r.process(r);
            }

            (l, r) = self.effects.process_frame(l, r);

            let post = self.post_smoother.process(self.post_gain);
            let gain_l = self.out_l_smoother.process(fader * pan_l);
            let gain_r = self.out_r_smoother.process(fader * pan_r);
            self.input_l[i] = l * post * gain_l;
            self.input_r[i] = r * post * gain_r;
        }

        self.meter
            .update(&self.input_l[..frames], &self.input_r[..frames]);
    }

    pub fn output(&self, frames: usize) -> (&[f32], &[f32]) {
        let frames = frames.min(self.input_l.len());
        (&self.input_l[..frames], &self.input_r[..frames])
    }

    pub fn clear(&mut self) {
        self.input_l.fill(0.0);
        self.input_r.fill(0.0);
    }

    /// Flush filter and effect state (transport stop)
    pub fn reset(&mut self) {
        self.clear();
        self.high_pass_l.reset();
        self.high_pass_r.reset();
        self.effects.reset();
        self.meter.reset();
    }
}

pub struct Mixer {
    strips: Vec<Option<Box<ChannelStrip>>>,
    order: Vec<usize>,
    master_l: Vec<f32>,
    master_r: Vec<f32>,
    master_volume: f32,
    master_smoother: OnePoleSmoother,
    master_meter: Meter,
}

impl Mixer {
    pub fn new(max_channels: usize, max_block: usize, sample_rate: f32, master_meter: MeterHandle) -> Self {
        Self {
            strips: (0..max_channels).map(|_| None).collect(),
            order: Vec::with_capacity(max_channels),
            master_l: vec![0.0; max_block],
            master_r: vec![0.0; max_block],
            master_volume: 1.0,
            master_smoother: OnePoleSmoother::new(1.0, GAIN_SMOOTHING_MS, sample_rate),
            master_meter: Meter::new(master_meter),
        }
    }

    pub fn max_block(&self) -> usize {
        self.master_l.len()
    }

    pub fn capacity(&self) -> usize {
        self.strips.len()
    }

    /// Put a strip at `index`, returning whatever was there
    pub fn install(
        &mut self,
        index: usize,
        strip: Box<ChannelStrip>,
    ) -> Result<Option<Box<ChannelStrip>>, Box<ChannelStrip>> {
        match self.strips.get_mut(index) {
            Some(slot) => Ok(slot.replace(strip)),
            None => Err(strip),
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<ChannelStrip>> {
        let strip = self.strips.get_mut(index)?.take();
        // Sends into a removed strip are dropped on the floor
        for other in self.strips.iter_mut().flatten() {
            other.remove_send(index);
        }
        strip
    }

    pub fn strip_mut(&mut self, index: usize) -> Option<&mut ChannelStrip> {
        self.strips.get_mut(index)?.as_deref_mut()
    }

    /// Swap in a new processing order, returning the old one
    pub fn set_order(&mut self, order: Vec<usize>) -> Vec<usize> {
        std::mem::replace(&mut self.order, order)
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.max(0.0);
    }

    /// Add a mono signal to a strip input, or straight to master when the
    /// route is `None` or points at an empty slot
    #[inline]
    pub fn add_mono(&mut self, route: Option<usize>, offset: usize, mono: &[f32]) {
        if let Some(strip) = route.and_then(|i| self.strips.get_mut(i)).and_then(|s| s.as_mut()) {
            strip.add_input(offset, mono, mono);
            return;
        }
        let end = (offset + mono.len()).min(self.master_l.len());
        if offset >= end {
            return;
        }
        for (i, sample) in mono[..end - offset].iter().enumerate() {
            self.master_l[offset + i] += sample;
            self.master_r[offset + i] += sample;
        }
    }

    /// Render `out_l.len()` frames (at most the max block) of master output
    pub fn process(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let frames = out_l.len().min(out_r.len()).min(self.master_l.len());
        let any_solo = self.strips.iter().flatten().any(|s| s.solo);

        for position in 0..self.order.len() {
            let index = self.order[position];
            let Some(mut strip) = self.strips.get_mut(index).and_then(|s| s.take()) else {
                continue;
            };

            let audible = !any_solo || strip.solo || strip.solo_safe;
            strip.process(frames, audible);

            let (left, right) = strip.output(frames);
            for send in &strip.sends {
                if let Some(Some(target)) = self.strips.get_mut(send.target) {
                    for i in 0..frames {
                        target.input_l[i] += left[i] * send.amount;
                        target.input_r[i] += right[i] * send.amount;
                    }
                }
            }
            for i in 0..frames {
                self.master_l[i] += left[i];
                self.master_r[i] += right[i];
            }

            strip.clear();
            self.strips[index] = Some(strip);
        }

        for i in 0..frames {
            let gain = self.master_smoother.process(self.master_volume);
            out_l[i] = soft_clip(self.master_l[i] * gain);
            out_r[i] = soft_clip(self.master_r[i] * gain);
        }
        self.master_meter.update(&out_l[..frames], &out_r[..frames]);

        self.master_l.fill(0.0);
        self.master_r.fill(0.0);
    }

    /// Flush every strip (transport stop)
    pub fn reset(&mut self) {
        for strip in self.strips.iter_mut().flatten() {
            strip.reset();
        }
        self.master_l.fill(0.0);
        self.master_r.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::effect::EffectKind;

    const SR: f32 = 48000.0;
    const BLOCK: usize = 256;

    fn strip() -> (ChannelStrip, MeterHandle) {
        let handle = MeterHandle::new();
        (ChannelStrip::new(BLOCK, 4, 4, SR, handle.clone()), handle)
    }

    fn mixer_with(strips: usize) -> (Mixer, Vec<MeterHandle>) {
        let mut mixer = Mixer::new(8, BLOCK, SR, MeterHandle::new());
        let mut handles = Vec::new();
        for i in 0..strips {
            let (s, h) = strip();
            assert!(mixer.install(i, Box::new(s)).is_ok());
            handles.push(h);
        }
        mixer.set_order((0..strips).collect());
        (mixer, handles)
    }

    fn run(mixer: &mut Mixer, feed: &[(Option<usize>, f32)], blocks: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; BLOCK];
        let mut right = vec![0.0; BLOCK];
        for _ in 0..blocks {
            for (route, value) in feed {
                mixer.add_mono(*route, 0, &[*value; BLOCK]);
            }
            mixer.process(&mut left, &mut right);
        }
        (left, right)
    }

    #[test]
    fn test_center_pan_is_equal_power() {
        let (mut mixer, meters) = mixer_with(1);
        let (left, right) = run(&mut mixer, &[(Some(0), 0.1)], 20);
        let expected = (0.1 * std::f32::consts::FRAC_1_SQRT_2).tanh();
        assert!((left[BLOCK - 1] - expected).abs() < 1e-4);
        assert!((left[BLOCK - 1] - right[BLOCK - 1]).abs() < 1e-6);
        assert!(meters[0].read().peak > 0.07);
    }

    #[test]
    fn test_mute_silences_without_touching_volume() {
        let (mut mixer, _) = mixer_with(1);
        if let Some(s) = mixer.strip_mut(0) {
            s.set_param(ChannelParam::Volume(0.8));
            s.set_param(ChannelParam::Mute(true));
        }
        let (left, _) = run(&mut mixer, &[(Some(0), 0.5)], 20);
        assert!(left[BLOCK - 1].abs() < 1e-4);
        assert_eq!(mixer.strip_mut(0).map(|s| s.volume()), Some(0.8));
    }

    #[test]
    fn test_solo_silences_other_channels() {
        let (mut mixer, _) = mixer_with(2);
        if let Some(s) = mixer.strip_mut(1) {
            s.set_param(ChannelParam::Solo(true));
            s.set_param(ChannelParam::Pan(1.0));
        }
        if let Some(s) = mixer.strip_mut(0) {
            s.set_param(ChannelParam::Pan(-1.0));
        }
        let (left, right) = run(&mut mixer, &[(Some(0), 0.3), (Some(1), 0.3)], 20);
        // Channel 0 is hard left and not soloed
        assert!(left[BLOCK - 1].abs() < 1e-4);
        assert!(right[BLOCK - 1] > 0.25);
    }

    #[test]
    fn test_send_feeds_target_post_fader() {
        let (mut mixer, meters) = mixer_with(2);
        if let Some(s) = mixer.strip_mut(0) {
            s.set_param(ChannelParam::Volume(0.5));
            assert!(s.set_send(1, 1.0));
        }
        run(&mut mixer, &[(Some(0), 0.4)], 20);

        let source = meters[0].read().rms;
        let aux = meters[1].read().rms;
        assert!(source > 0.0);
        assert!((aux - source * std::f32::consts::FRAC_1_SQRT_2).abs() < 0.01);
    }

    #[test]
    fn test_unrouted_input_goes_to_master() {
        let (mut mixer, _) = mixer_with(0);
        let (left, _) = run(&mut mixer, &[(None, 0.2), (Some(5), 0.1)], 1);
        assert!((left[10] - 0.3f32.tanh()).abs() < 1e-5);
    }

    #[test]
    fn test_master_soft_clips() {
        let (mut mixer, _) = mixer_with(0);
        let (left, _) = run(&mut mixer, &[(None, 5.0)], 1);
        assert!(left.iter().all(|s| *s <= 1.0));
    }

    #[test]
    fn test_strip_effect_chain_capacity() {
        let (mut s, _) = strip();
        for _ in 0..4 {
            assert!(s.insert_effect(0, EffectSlot::new(EffectKind::Drive, SR)).is_ok());
        }
        assert!(s.insert_effect(0, EffectSlot::new(EffectKind::Drive, SR)).is_err());
        assert!(s.remove_effect(3).is_some());
    }

    #[test]
    fn test_remove_strip_drops_sends_into_it() {
        let (mut mixer, _) = mixer_with(2);
        if let Some(s) = mixer.strip_mut(0) {
            s.set_send(1, 0.5);
        }
        assert!(mixer.remove(1).is_some());
        assert_eq!(mixer.strip_mut(0).map(|s| s.sends().len()), Some(0));
    }
}
