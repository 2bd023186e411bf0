// Mixer state - control-side mirror of the render mixer
//
// Owns channel ids, settings, effect parameters and the send graph. Every
// change is validated here and then forwarded as a render command addressed
// by render index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::sink::CommandSink;
use super::tracks::TrackId;
use crate::audio::metering::{MeterHandle, MeterReading};
use crate::audio::mixer::{ChannelId, ChannelParam, ChannelStrip};
use crate::audio::routing::SendGraph;
use crate::error::{EngineError, EngineResult};
use crate::messaging::command::RenderCommand;
use crate::synth::effect::{EffectKind, EffectSlot};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub trim: f32,
    pub high_pass_enabled: bool,
    pub high_pass_hz: f32,
    pub pre_gain: f32,
    pub post_gain: f32,
    pub pan: f32,
    pub volume: f32,
    pub mute: bool,
    pub solo: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            trim: 1.0,
            high_pass_enabled: false,
            high_pass_hz: ChannelStrip::DEFAULT_HIGH_PASS_HZ,
            pre_gain: 1.0,
            post_gain: 1.0,
            pan: 0.0,
            volume: 1.0,
            mute: false,
            solo: false,
        }
    }
}

impl ChannelSettings {
    /// Clamp a parameter to its range. Non-finite values keep the current
    /// setting.
    fn clamp(&self, param: ChannelParam) -> ChannelParam {
        fn finite(value: f32, current: f32, min: f32, max: f32) -> f32 {
            if value.is_finite() {
                value.clamp(min, max)
            } else {
                current
            }
        }
        match param {
            ChannelParam::Trim(v) => ChannelParam::Trim(finite(v, self.trim, 0.0, 4.0)),
            ChannelParam::HighPassFrequency(v) => {
                ChannelParam::HighPassFrequency(finite(v, self.high_pass_hz, 20.0, 2000.0))
            }
            ChannelParam::PreGain(v) => ChannelParam::PreGain(finite(v, self.pre_gain, 0.0, 4.0)),
            ChannelParam::PostGain(v) => ChannelParam::PostGain(finite(v, self.post_gain, 0.0, 4.0)),
            ChannelParam::Pan(v) => ChannelParam::Pan(finite(v, self.pan, -1.0, 1.0)),
            ChannelParam::Volume(v) => ChannelParam::Volume(finite(v, self.volume, 0.0, 2.0)),
            other => other,
        }
    }

    fn apply(&mut self, param: ChannelParam) {
        match param {
            ChannelParam::Trim(v) => self.trim = v,
            ChannelParam::HighPassEnabled(on) => self.high_pass_enabled = on,
            ChannelParam::HighPassFrequency(v) => self.high_pass_hz = v,
            ChannelParam::PreGain(v) => self.pre_gain = v,
            ChannelParam::PostGain(v) => self.post_gain = v,
            ChannelParam::Pan(v) => self.pan = v,
            ChannelParam::Volume(v) => self.volume = v,
            ChannelParam::Mute(on) => self.mute = on,
            ChannelParam::Solo(on) => self.solo = on,
            ChannelParam::SoloSafe(_) => {}
        }
    }

    fn params(&self) -> [ChannelParam; 9] {
        [
            ChannelParam::Trim(self.trim),
            ChannelParam::HighPassEnabled(self.high_pass_enabled),
            ChannelParam::HighPassFrequency(self.high_pass_hz),
            ChannelParam::PreGain(self.pre_gain),
            ChannelParam::PostGain(self.post_gain),
            ChannelParam::Pan(self.pan),
            ChannelParam::Volume(self.volume),
            ChannelParam::Mute(self.mute),
            ChannelParam::Solo(self.solo),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectState {
    pub kind: EffectKind,
    pub bypassed: bool,
    pub mix: f32,
    /// In the order of `kind.parameters()`
    pub params: Vec<f32>,
}

impl EffectState {
    fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            bypassed: false,
            mix: kind.default_mix(),
            params: kind.parameters().iter().map(|p| p.default).collect(),
        }
    }

    pub fn param(&self, key: &str) -> Option<f32> {
        let index = self.kind.parameters().iter().position(|p| p.key == key)?;
        self.params.get(index).copied()
    }
}

#[derive(Debug, Clone)]
pub struct ChannelState {
    pub id: ChannelId,
    pub name: String,
    /// Owning track; None for aux channels
    pub track: Option<TrackId>,
    pub settings: ChannelSettings,
    pub effects: Vec<EffectState>,
    index: usize,
    solo_safe: bool,
    meter: MeterHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub name: String,
    pub track: Option<TrackId>,
    pub settings: ChannelSettings,
    pub effects: Vec<EffectState>,
    pub sends: Vec<(ChannelId, f32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerSnapshot {
    pub channels: Vec<ChannelSnapshot>,
    pub master_volume: f32,
}

pub struct MixerState {
    channels: BTreeMap<ChannelId, ChannelState>,
    graph: SendGraph,
    /// Render index -> channel
    indices: Vec<Option<ChannelId>>,
    next_id: u32,
    master_volume: f32,
    master_meter: MeterHandle,
    sample_rate: f32,
    max_block: usize,
    max_effects: usize,
    max_sends: usize,
}

impl MixerState {
    pub fn new(
        max_channels: usize,
        max_block: usize,
        max_effects: usize,
        max_sends: usize,
        sample_rate: f32,
        master_meter: MeterHandle,
    ) -> Self {
        Self {
            channels: BTreeMap::new(),
            graph: SendGraph::new(),
            indices: vec![None; max_channels],
            next_id: 0,
            master_volume: 1.0,
            master_meter,
            sample_rate,
            max_block,
            max_effects,
            max_sends,
        }
    }

    pub fn channel(&self, id: ChannelId) -> EngineResult<&ChannelState> {
        self.channels.get(&id).ok_or(EngineError::UnknownChannel(id))
    }

    fn channel_mut(&mut self, id: ChannelId) -> EngineResult<&mut ChannelState> {
        self.channels
            .get_mut(&id)
            .ok_or(EngineError::UnknownChannel(id))
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelState> {
        self.channels.values()
    }

    pub fn index_of(&self, id: ChannelId) -> EngineResult<usize> {
        Ok(self.channel(id)?.index)
    }

    pub fn graph(&self) -> &SendGraph {
        &self.graph
    }

    pub fn create_channel(
        &mut self,
        name: impl Into<String>,
        track: Option<TrackId>,
        sink: &mut CommandSink,
    ) -> EngineResult<ChannelId> {
        let index = self
            .indices
            .iter()
            .position(Option::is_none)
            .ok_or(EngineError::CapacityExceeded("mixer channels"))?;

        let meter = MeterHandle::new();
        let strip = ChannelStrip::new(
            self.max_block,
            self.max_effects,
            self.max_sends,
            self.sample_rate,
            meter.clone(),
        );
        sink.push_required(RenderCommand::InstallChannel {
            index,
            strip: Box::new(strip),
        })?;

        self.next_id += 1;
        let id = ChannelId(self.next_id);
        self.indices[index] = Some(id);
        self.channels.insert(
            id,
            ChannelState {
                id,
                name: name.into(),
                track,
                settings: ChannelSettings::default(),
                effects: Vec::new(),
                index,
                solo_safe: false,
                meter,
            },
        );
        self.graph.add_channel(id);
        self.sync_order(sink)?;

        debug!(channel = ?id, index, "mixer channel created");
        Ok(id)
    }

    pub fn remove_channel(&mut self, id: ChannelId, sink: &mut CommandSink) -> EngineResult<ChannelState> {
        let index = self.index_of(id)?;
        sink.push_required(RenderCommand::RemoveChannel { index })?;

        self.graph.remove_channel(id);
        self.indices[index] = None;
        let state = self
            .channels
            .remove(&id)
            .ok_or(EngineError::UnknownChannel(id))?;
        self.sync_order(sink)?;
        self.sync_solo_safe(sink);

        debug!(channel = ?id, "mixer channel removed");
        Ok(state)
    }

    pub fn rename_channel(&mut self, id: ChannelId, name: impl Into<String>) -> EngineResult<()> {
        self.channel_mut(id)?.name = name.into();
        Ok(())
    }

    /// Returns the value actually applied
    pub fn set_param(
        &mut self,
        id: ChannelId,
        param: ChannelParam,
        sink: &mut CommandSink,
    ) -> EngineResult<ChannelParam> {
        let channel = self.channel_mut(id)?;
        let param = channel.settings.clamp(param);
        channel.settings.apply(param);
        let index = channel.index;
        sink.push(RenderCommand::SetChannelParam { index, param });
        Ok(param)
    }

    /// Insert an effect (appended when `position` is None). Returns its position.
    pub fn add_effect(
        &mut self,
        id: ChannelId,
        kind: EffectKind,
        position: Option<usize>,
        sink: &mut CommandSink,
    ) -> EngineResult<usize> {
        let max_effects = self.max_effects;
        let sample_rate = self.sample_rate;
        let channel = self.channel_mut(id)?;
        if channel.effects.len() >= max_effects {
            return Err(EngineError::CapacityExceeded("effects per channel"));
        }
        let position = position
            .unwrap_or(channel.effects.len())
            .min(channel.effects.len());

        sink.push_required(RenderCommand::InsertEffect {
            channel: channel.index,
            position,
            slot: EffectSlot::new(kind, sample_rate),
        })?;
        channel.effects.insert(position, EffectState::new(kind));
        Ok(position)
    }

    pub fn remove_effect(&mut self, id: ChannelId, position: usize, sink: &mut CommandSink) -> EngineResult<EffectState> {
        let channel = self.channel_mut(id)?;
        if position >= channel.effects.len() {
            return Err(EngineError::UnknownEffect { channel: id, position });
        }
        sink.push_required(RenderCommand::RemoveEffect {
            channel: channel.index,
            position,
        })?;
        Ok(channel.effects.remove(position))
    }

    fn effect_mut(&mut self, id: ChannelId, position: usize) -> EngineResult<(usize, &mut EffectState)> {
        let channel = self.channel_mut(id)?;
        let index = channel.index;
        channel
            .effects
            .get_mut(position)
            .map(|effect| (index, effect))
            .ok_or(EngineError::UnknownEffect { channel: id, position })
    }

    pub fn set_effect_bypass(
        &mut self,
        id: ChannelId,
        position: usize,
        bypassed: bool,
        sink: &mut CommandSink,
    ) -> EngineResult<()> {
        let (channel, effect) = self.effect_mut(id, position)?;
        effect.bypassed = bypassed;
        sink.push(RenderCommand::SetEffectBypass {
            channel,
            position,
            bypassed,
        });
        Ok(())
    }

    pub fn set_effect_mix(
        &mut self,
        id: ChannelId,
        position: usize,
        mix: f32,
        sink: &mut CommandSink,
    ) -> EngineResult<f32> {
        let (channel, effect) = self.effect_mut(id, position)?;
        let mix = if mix.is_finite() { mix.clamp(0.0, 1.0) } else { effect.mix };
        effect.mix = mix;
        sink.push(RenderCommand::SetEffectMix {
            channel,
            position,
            mix,
        });
        Ok(mix)
    }

    pub fn set_effect_param(
        &mut self,
        id: ChannelId,
        position: usize,
        key: &str,
        value: f32,
        sink: &mut CommandSink,
    ) -> EngineResult<f32> {
        let (channel, effect) = self.effect_mut(id, position)?;
        let (index, value) = effect
            .kind
            .resolve_param(key, value)
            .ok_or_else(|| EngineError::UnknownParameter(key.to_string()))?;
        effect.params[index] = value;
        sink.push(RenderCommand::SetEffectParam {
            channel,
            position,
            index,
            value,
        });
        Ok(value)
    }

    pub fn set_send(&mut self, from: ChannelId, to: ChannelId, amount: f32, sink: &mut CommandSink) -> EngineResult<()> {
        let existing = self.graph.sends_from(from);
        if existing.len() >= self.max_sends && !existing.iter().any(|(target, _)| *target == to) {
            return Err(EngineError::CapacityExceeded("sends per channel"));
        }
        let amount = if amount.is_finite() { amount } else { 0.0 };
        self.graph.set_send(from, to, amount)?;

        let channel = self.index_of(from)?;
        let target = self.index_of(to)?;
        let amount = amount.clamp(0.0, 1.0);
        sink.push_required(RenderCommand::SetSend {
            channel,
            target,
            amount,
        })?;
        self.sync_order(sink)?;
        self.sync_solo_safe(sink);
        Ok(())
    }

    pub fn remove_send(&mut self, from: ChannelId, to: ChannelId, sink: &mut CommandSink) -> EngineResult<bool> {
        let channel = self.index_of(from)?;
        let target = self.index_of(to)?;
        if !self.graph.remove_send(from, to) {
            return Ok(false);
        }
        sink.push_required(RenderCommand::RemoveSend { channel, target })?;
        self.sync_order(sink)?;
        self.sync_solo_safe(sink);
        Ok(true)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32, sink: &mut CommandSink) -> f32 {
        if volume.is_finite() {
            self.master_volume = volume.clamp(0.0, 2.0);
        }
        sink.push(RenderCommand::SetMasterVolume(self.master_volume));
        self.master_volume
    }

    pub fn meter(&self, id: ChannelId) -> EngineResult<MeterReading> {
        Ok(self.channel(id)?.meter.read())
    }

    pub fn master_meter(&self) -> MeterReading {
        self.master_meter.read()
    }

    pub fn snapshot(&self) -> MixerSnapshot {
        MixerSnapshot {
            channels: self
                .channels
                .values()
                .map(|c| ChannelSnapshot {
                    id: c.id,
                    name: c.name.clone(),
                    track: c.track,
                    settings: c.settings,
                    effects: c.effects.clone(),
                    sends: self.graph.sends_from(c.id),
                })
                .collect(),
            master_volume: self.master_volume,
        }
    }

    /// Apply settings, effects and sends to the channels that exist under
    /// the same ids. Channels missing on either side are skipped.
    pub fn restore(&mut self, snapshot: &MixerSnapshot, sink: &mut CommandSink) -> EngineResult<()> {
        for saved in &snapshot.channels {
            if !self.channels.contains_key(&saved.id) {
                debug!(channel = ?saved.id, "snapshot channel not present, skipped");
                continue;
            }
            self.rename_channel(saved.id, saved.name.clone())?;
            for param in saved.settings.params() {
                self.set_param(saved.id, param, sink)?;
            }

            while !self.channel(saved.id)?.effects.is_empty() {
                self.remove_effect(saved.id, 0, sink)?;
            }
            for effect in saved.effects.iter().take(self.max_effects) {
                let position = self.add_effect(saved.id, effect.kind, None, sink)?;
                self.set_effect_bypass(saved.id, position, effect.bypassed, sink)?;
                self.set_effect_mix(saved.id, position, effect.mix, sink)?;
                for (descriptor, value) in effect.kind.parameters().iter().zip(&effect.params) {
                    self.set_effect_param(saved.id, position, descriptor.key, *value, sink)?;
                }
            }
        }

        for saved in &snapshot.channels {
            if !self.channels.contains_key(&saved.id) {
                continue;
            }
            for (target, _) in self.graph.sends_from(saved.id) {
                self.remove_send(saved.id, target, sink)?;
            }
        }
        for saved in &snapshot.channels {
            for (target, amount) in &saved.sends {
                if self.channels.contains_key(&saved.id) && self.channels.contains_key(target) {
                    self.set_send(saved.id, *target, *amount, sink)?;
                }
            }
        }

        self.set_master_volume(snapshot.master_volume, sink);
        Ok(())
    }

    fn sync_order(&mut self, sink: &mut CommandSink) -> EngineResult<()> {
        let order: Vec<usize> = self
            .graph
            .topological_order()
            .into_iter()
            .filter_map(|id| self.channels.get(&id).map(|c| c.index))
            .collect();
        sink.push_required(RenderCommand::SetProcessOrder(order))
    }

    /// Send targets stay audible while something else is soloed
    fn sync_solo_safe(&mut self, sink: &mut CommandSink) {
        for channel in self.channels.values_mut() {
            let safe = self.graph.is_send_target(channel.id);
            if channel.solo_safe != safe {
                channel.solo_safe = safe;
                sink.push(RenderCommand::SetChannelParam {
                    index: channel.index,
                    param: ChannelParam::SoloSafe(safe),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::AudioTiming;
    use crate::messaging::channels::{CommandConsumer, create_command_channel};
    use ringbuf::traits::Consumer;

    fn setup() -> (MixerState, CommandSink, CommandConsumer) {
        let (tx, rx) = create_command_channel(256);
        let sink = CommandSink::new(tx, AudioTiming::new(48000.0));
        let state = MixerState::new(4, 256, 2, 2, 48000.0, MeterHandle::new());
        (state, sink, rx)
    }

    fn drain(rx: &mut CommandConsumer) -> Vec<RenderCommand> {
        std::iter::from_fn(|| rx.try_pop()).collect()
    }

    #[test]
    fn test_create_channel_installs_strip_and_order() {
        let (mut mixer, mut sink, mut rx) = setup();
        let id = mixer.create_channel("Drums", Some(TrackId(1)), &mut sink).unwrap();
        assert_eq!(mixer.index_of(id).unwrap(), 0);

        let commands = drain(&mut rx);
        assert!(matches!(commands[0], RenderCommand::InstallChannel { index: 0, .. }));
        assert!(matches!(&commands[1], RenderCommand::SetProcessOrder(order) if order == &vec![0]));
    }

    #[test]
    fn test_capacity_limits() {
        let (mut mixer, mut sink, _rx) = setup();
        for i in 0..4 {
            mixer.create_channel(format!("Ch {i}"), None, &mut sink).unwrap();
        }
        assert!(matches!(
            mixer.create_channel("Too many", None, &mut sink),
            Err(EngineError::CapacityExceeded(_))
        ));

        let id = ChannelId(1);
        mixer.add_effect(id, EffectKind::Drive, None, &mut sink).unwrap();
        mixer.add_effect(id, EffectKind::Delay, Some(0), &mut sink).unwrap();
        assert!(matches!(
            mixer.add_effect(id, EffectKind::Filter, None, &mut sink),
            Err(EngineError::CapacityExceeded(_))
        ));
        let kinds: Vec<_> = mixer.channel(id).unwrap().effects.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EffectKind::Delay, EffectKind::Drive]);
    }

    #[test]
    fn test_param_clamping() {
        let (mut mixer, mut sink, _rx) = setup();
        let id = mixer.create_channel("Lead", None, &mut sink).unwrap();
        assert_eq!(
            mixer.set_param(id, ChannelParam::Pan(3.0), &mut sink).unwrap(),
            ChannelParam::Pan(1.0)
        );
        assert_eq!(
            mixer.set_param(id, ChannelParam::Volume(f32::NAN), &mut sink).unwrap(),
            ChannelParam::Volume(1.0)
        );
        mixer.set_param(id, ChannelParam::Mute(true), &mut sink).unwrap();
        let settings = mixer.channel(id).unwrap().settings;
        assert!(settings.mute);
        assert_eq!(settings.volume, 1.0);
    }

    #[test]
    fn test_effect_param_by_key() {
        let (mut mixer, mut sink, _rx) = setup();
        let id = mixer.create_channel("Keys", None, &mut sink).unwrap();
        mixer.add_effect(id, EffectKind::Delay, None, &mut sink).unwrap();

        let applied = mixer.set_effect_param(id, 0, "feedback", 2.0, &mut sink).unwrap();
        assert_eq!(applied, 0.95);
        assert_eq!(mixer.channel(id).unwrap().effects[0].param("feedback"), Some(0.95));
        assert!(matches!(
            mixer.set_effect_param(id, 0, "wobble", 1.0, &mut sink),
            Err(EngineError::UnknownParameter(_))
        ));
        assert!(matches!(
            mixer.set_effect_mix(id, 3, 0.5, &mut sink),
            Err(EngineError::UnknownEffect { position: 3, .. })
        ));
    }

    #[test]
    fn test_send_cycle_rejected_and_order_follows_graph() {
        let (mut mixer, mut sink, mut rx) = setup();
        let a = mixer.create_channel("A", None, &mut sink).unwrap();
        let b = mixer.create_channel("B", None, &mut sink).unwrap();
        let aux = mixer.create_channel("Aux", None, &mut sink).unwrap();
        drain(&mut rx);

        mixer.set_send(aux, a, 0.5, &mut sink).unwrap();
        mixer.set_send(a, b, 0.5, &mut sink).unwrap();
        assert!(matches!(
            mixer.set_send(b, aux, 0.5, &mut sink),
            Err(EngineError::RoutingCycle { .. })
        ));

        let last_order = drain(&mut rx)
            .into_iter()
            .filter_map(|c| match c {
                RenderCommand::SetProcessOrder(order) => Some(order),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_order, vec![2, 0, 1]);
        assert!(mixer.channel(b).unwrap().solo_safe);
    }

    #[test]
    fn test_snapshot_restore() {
        let (mut mixer, mut sink, _rx) = setup();
        let a = mixer.create_channel("A", None, &mut sink).unwrap();
        let aux = mixer.create_channel("Aux", None, &mut sink).unwrap();
        mixer.set_param(a, ChannelParam::Pan(-0.5), &mut sink).unwrap();
        mixer.add_effect(a, EffectKind::Filter, None, &mut sink).unwrap();
        mixer.set_effect_param(a, 0, "cutoff", 500.0, &mut sink).unwrap();
        mixer.set_send(a, aux, 0.25, &mut sink).unwrap();

        let snapshot = mixer.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: MixerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);

        mixer.set_param(a, ChannelParam::Pan(0.9), &mut sink).unwrap();
        mixer.remove_effect(a, 0, &mut sink).unwrap();
        mixer.remove_send(a, aux, &mut sink).unwrap();

        mixer.restore(&parsed, &mut sink).unwrap();
        assert_eq!(mixer.snapshot(), snapshot);
    }
}
