// Render engine - everything that runs inside the audio callback
//
// ========== SACRED ZONE ==========
// `RenderEngine::process` must stay lock-free, allocation-free and bounded:
// - commands come in through a ring buffer and are applied in order
// - timed commands wait in a pre-allocated queue sorted by frame and are
//   applied at their exact offset by splitting the block
// - anything leaving the graph goes back through the retire ring buffer
// - no logging; problems are counted in `EngineStats`

use std::collections::VecDeque;
use std::sync::Arc;

use ringbuf::traits::{Consumer, Producer};

use super::metering::MeterHandle;
use super::mixer::Mixer;
use super::parameters::EngineStats;
use super::timing::AudioTiming;
use crate::config::EngineConfig;
use crate::messaging::channels::{
    CommandConsumer, CommandProducer, RetireConsumer, RetireProducer, create_command_channel,
    create_retire_channel,
};
use crate::messaging::command::{RenderCommand, Retired};
use crate::sequencer::metronome::ClickPlayer;
use crate::synth::{Instrument, Synthesize};

/// Control-side ends of a render engine
pub struct EngineLink {
    pub commands: CommandProducer,
    pub retired: RetireConsumer,
    pub timing: AudioTiming,
    pub stats: Arc<EngineStats>,
    pub master_meter: MeterHandle,
    pub sample_rate: f32,
}

pub struct RenderEngine {
    commands: CommandConsumer,
    retire: RetireProducer,
    /// Timed commands, ascending by frame, insertion order kept for ties
    pending: VecDeque<RenderCommand>,
    instruments: Vec<Option<Box<Instrument>>>,
    /// Channel render index per instrument slot, None = master
    routes: Vec<Option<usize>>,
    mixer: Mixer,
    click: ClickPlayer,
    scratch: Vec<f32>,
    click_l: Vec<f32>,
    click_r: Vec<f32>,
    timing: AudioTiming,
    stats: Arc<EngineStats>,
    max_block: usize,
}

impl RenderEngine {
    /// Build an engine and the link the session drives it through.
    /// Every buffer the render path needs is allocated here.
    pub fn create(config: &EngineConfig, sample_rate: f32) -> (RenderEngine, EngineLink) {
        let (command_tx, command_rx) = create_command_channel(config.command_capacity);
        let (retire_tx, retire_rx) = create_retire_channel(config.retire_capacity);
        let timing = AudioTiming::new(sample_rate);
        let stats = EngineStats::new();
        let master_meter = MeterHandle::new();
        let max_block = config.block_size.max(1);

        let engine = RenderEngine {
            commands: command_rx,
            retire: retire_tx,
            pending: VecDeque::with_capacity(config.timed_queue_capacity.max(1)),
            instruments: (0..config.max_tracks).map(|_| None).collect(),
            routes: vec![None; config.max_tracks],
            mixer: Mixer::new(config.max_channels, max_block, sample_rate, master_meter.clone()),
            click: ClickPlayer::new(sample_rate, config.metronome_volume),
            scratch: vec![0.0; max_block],
            click_l: vec![0.0; max_block],
            click_r: vec![0.0; max_block],
            timing: timing.clone(),
            stats: Arc::clone(&stats),
            max_block,
        };

        let link = EngineLink {
            commands: command_tx,
            retired: retire_rx,
            timing,
            stats,
            master_meter,
            sample_rate,
        };

        (engine, link)
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Render `left.len()` frames. Longer buffers are split into
    /// `max_block` pieces.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(self.max_block);
            self.render_block(&mut left[done..done + n], &mut right[done..done + n]);
            done += n;
        }
    }

    fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len();
        let block_start = self.timing.current_sample();
        let block_end = block_start + frames as u64;

        self.drain_commands(block_start);

        let mut offset = 0;
        loop {
            let next = self
                .pending
                .front()
                .and_then(RenderCommand::due_frame)
                .unwrap_or(block_end);
            let split = (next.clamp(block_start, block_end) - block_start) as usize;

            if split > offset {
                self.render_span(offset, split);
                offset = split;
            }
            if next >= block_end {
                break;
            }

            let due = block_start + split as u64;
            while self
                .pending
                .front()
                .and_then(RenderCommand::due_frame)
                .is_some_and(|at| at <= due)
            {
                if let Some(command) = self.pending.pop_front() {
                    self.apply(command);
                }
            }
        }

        self.mixer.process(left, right);
        for i in 0..frames {
            left[i] += self.click_l[i];
            right[i] += self.click_r[i];
        }
        self.click_l[..frames].fill(0.0);
        self.click_r[..frames].fill(0.0);

        let voices = self
            .instruments
            .iter()
            .flatten()
            .map(|instrument| instrument.active_voices())
            .sum();
        self.stats.set_active_voices(voices);
        self.stats.block_rendered();
        self.timing.advance(frames);
    }

    /// Voices for frames [start, end) of the current block
    fn render_span(&mut self, start: usize, end: usize) {
        let len = end - start;
        for (slot, instrument) in self.instruments.iter_mut().enumerate() {
            let Some(instrument) = instrument else {
                continue;
            };
            if instrument.active_voices() == 0 {
                continue;
            }
            let scratch = &mut self.scratch[..len];
            scratch.fill(0.0);
            instrument.render_add(scratch);
            self.mixer.add_mono(self.routes[slot], start, scratch);
        }
        self.click
            .render_add(&mut self.click_l[start..end], &mut self.click_r[start..end]);
    }

    fn drain_commands(&mut self, block_start: u64) {
        while let Some(command) = self.commands.try_pop() {
            let Some(at) = command.due_frame() else {
                self.apply(command);
                continue;
            };
            // Note-offs are released once their time has passed; only
            // onsets count as late
            if at < block_start && !matches!(command, RenderCommand::NoteOff { .. }) {
                self.stats.late_event();
            }
            if self.pending.len() >= self.pending.capacity() {
                self.stats.pending_overflow();
                self.apply(command);
                continue;
            }
            let position = self
                .pending
                .partition_point(|queued| queued.due_frame().is_some_and(|q| q <= at));
            self.pending.insert(position, command);
        }
    }

    fn instrument_mut(&mut self, slot: usize) -> Option<&mut Instrument> {
        self.instruments.get_mut(slot)?.as_deref_mut()
    }

    fn retire(&mut self, object: Retired) {
        if let Err(object) = self.retire.try_push(object) {
            // Dropping here may free memory on the render thread
            self.stats.retire_overflow();
            drop(object);
        }
    }

    fn reject(&self) {
        self.stats.rejected_command();
    }

    fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::NoteOn {
                slot,
                pitch,
                velocity,
                tag,
                ..
            } => match self.instrument_mut(slot) {
                Some(instrument) => instrument.note_on(pitch, velocity, tag),
                None => self.reject(),
            },
            RenderCommand::NoteOff { slot, tag, .. } => {
                // The instrument may already be gone (track removed)
                if let Some(instrument) = self.instrument_mut(slot) {
                    instrument.note_off(tag);
                }
            }
            RenderCommand::PitchBend { slot, bend, .. } => match self.instrument_mut(slot) {
                Some(instrument) => instrument.pitch_bend(bend),
                None => self.reject(),
            },
            RenderCommand::ControlChange {
                slot,
                controller,
                value,
                ..
            } => match self.instrument_mut(slot) {
                Some(instrument) => instrument.control_change(controller, value),
                None => self.reject(),
            },
            RenderCommand::Click { click, .. } => self.click.trigger(click),
            RenderCommand::AllVoicesOff => {
                for instrument in self.instruments.iter_mut().flatten() {
                    instrument.all_notes_off();
                }
                self.pending.clear();
                self.click.reset();
            }

            RenderCommand::InstallInstrument { slot, instrument } => {
                match self.instruments.get_mut(slot) {
                    Some(entry) => {
                        if let Some(old) = entry.replace(instrument) {
                            self.retire(Retired::Instrument(old));
                        }
                    }
                    None => {
                        self.reject();
                        self.retire(Retired::Instrument(instrument));
                    }
                }
            }
            RenderCommand::RemoveInstrument { slot } => {
                if let Some(old) = self.instruments.get_mut(slot).and_then(Option::take) {
                    self.retire(Retired::Instrument(old));
                }
                // A reused slot must not inherit the old track's queued notes
                self.pending.retain(|queued| queued.instrument_slot() != Some(slot));
                if let Some(route) = self.routes.get_mut(slot) {
                    *route = None;
                }
            }
            RenderCommand::RouteInstrument { slot, channel } => match self.routes.get_mut(slot) {
                Some(route) => *route = channel,
                None => self.reject(),
            },
            RenderCommand::SetInstrumentParam { slot, param, value } => {
                match self.instrument_mut(slot) {
                    Some(instrument) => instrument.set_param(param, value),
                    None => self.reject(),
                }
            }
            RenderCommand::SetSample { slot, sample } => {
                let leftover = match self.instrument_mut(slot) {
                    Some(instrument) => instrument.set_sample(sample),
                    None => {
                        self.reject();
                        sample
                    }
                };
                if let Some(old) = leftover {
                    self.retire(Retired::Sample(old));
                }
            }

            RenderCommand::InstallChannel { index, strip } => match self.mixer.install(index, strip) {
                Ok(Some(old)) => self.retire(Retired::Channel(old)),
                Ok(None) => {}
                Err(strip) => {
                    self.reject();
                    self.retire(Retired::Channel(strip));
                }
            },
            RenderCommand::RemoveChannel { index } => {
                if let Some(strip) = self.mixer.remove(index) {
                    self.retire(Retired::Channel(strip));
                }
            }
            RenderCommand::SetChannelParam { index, param } => match self.mixer.strip_mut(index) {
                Some(strip) => strip.set_param(param),
                None => self.reject(),
            },
            RenderCommand::InsertEffect {
                channel,
                position,
                slot,
            } => {
                let refused = match self.mixer.strip_mut(channel) {
                    Some(strip) => strip.insert_effect(position, slot).err(),
                    None => Some(slot),
                };
                if let Some(slot) = refused {
                    self.reject();
                    self.retire(Retired::Effect(slot));
                }
            }
            RenderCommand::RemoveEffect { channel, position } => {
                let removed = self
                    .mixer
                    .strip_mut(channel)
                    .and_then(|strip| strip.remove_effect(position));
                match removed {
                    Some(slot) => self.retire(Retired::Effect(slot)),
                    None => self.reject(),
                }
            }
            RenderCommand::SetEffectBypass {
                channel,
                position,
                bypassed,
            } => match self.effect_slot(channel, position) {
                Some(slot) => slot.set_bypassed(bypassed),
                None => self.reject(),
            },
            RenderCommand::SetEffectMix {
                channel,
                position,
                mix,
            } => match self.effect_slot(channel, position) {
                Some(slot) => slot.set_mix(mix),
                None => self.reject(),
            },
            RenderCommand::SetEffectParam {
                channel,
                position,
                index,
                value,
            } => match self.effect_slot(channel, position) {
                Some(slot) => slot.set_param(index, value),
                None => self.reject(),
            },
            RenderCommand::SetSend {
                channel,
                target,
                amount,
            } => {
                let accepted = self
                    .mixer
                    .strip_mut(channel)
                    .is_some_and(|strip| strip.set_send(target, amount));
                if !accepted {
                    self.reject();
                }
            }
            RenderCommand::RemoveSend { channel, target } => {
                if let Some(strip) = self.mixer.strip_mut(channel) {
                    strip.remove_send(target);
                }
            }
            RenderCommand::SetProcessOrder(order) => {
                let old = self.mixer.set_order(order);
                self.retire(Retired::Order(old));
            }

            RenderCommand::SetMasterVolume(volume) => self.mixer.set_master_volume(volume),
            RenderCommand::SetMetronomeVolume(volume) => self.click.set_volume(volume),
        }
    }

    fn effect_slot(
        &mut self,
        channel: usize,
        position: usize,
    ) -> Option<&mut crate::synth::effect::EffectSlot> {
        self.mixer
            .strip_mut(channel)?
            .effects_mut()
            .get_mut(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mixer::{ChannelParam, ChannelStrip};
    use crate::sequencer::metronome::ClickType;
    use crate::synth::InstrumentType;

    const SR: f32 = 48000.0;

    fn engine() -> (RenderEngine, EngineLink) {
        let config = EngineConfig {
            block_size: 256,
            max_tracks: 4,
            max_channels: 4,
            timed_queue_capacity: 8,
            ..EngineConfig::default()
        };
        RenderEngine::create(&config, SR)
    }

    fn send(link: &mut EngineLink, command: RenderCommand) {
        assert!(link.commands.try_push(command).is_ok());
    }

    fn render(engine: &mut RenderEngine, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        engine.process(&mut left, &mut right);
        (left, right)
    }

    fn install_synth(link: &mut EngineLink, slot: usize) {
        send(
            link,
            RenderCommand::InstallInstrument {
                slot,
                instrument: Box::new(Instrument::new(InstrumentType::Subtractive, SR, 16)),
            },
        );
    }

    #[test]
    fn test_note_on_lands_on_its_frame() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        send(
            &mut link,
            RenderCommand::NoteOn {
                slot: 0,
                pitch: 69,
                velocity: 127,
                tag: 1,
                at: 100,
            },
        );

        let (left, _) = render(&mut engine, 256);
        assert!(left[..100].iter().all(|s| *s == 0.0));
        assert!(left[100..].iter().any(|s| *s != 0.0));
        assert_eq!(link.stats.active_voices(), 1);
        assert_eq!(link.timing.current_sample(), 256);
    }

    #[test]
    fn test_future_command_waits_for_its_block() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        send(
            &mut link,
            RenderCommand::NoteOn {
                slot: 0,
                pitch: 60,
                velocity: 100,
                tag: 1,
                at: 600,
            },
        );

        let (left, _) = render(&mut engine, 512);
        assert!(left.iter().all(|s| *s == 0.0));
        assert_eq!(engine.pending_len(), 1);

        let (left, _) = render(&mut engine, 256);
        assert!(left[..88].iter().all(|s| *s == 0.0));
        assert!(left[88..].iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_all_voices_off_discards_pending_and_silences() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        for (tag, pitch) in [(1, 60), (2, 64), (3, 67)] {
            send(
                &mut link,
                RenderCommand::NoteOn {
                    slot: 0,
                    pitch,
                    velocity: 100,
                    tag,
                    at: 0,
                },
            );
        }
        send(
            &mut link,
            RenderCommand::NoteOn {
                slot: 0,
                pitch: 72,
                velocity: 100,
                tag: 4,
                at: 10_000,
            },
        );
        render(&mut engine, 256);
        assert_eq!(link.stats.active_voices(), 3);

        send(&mut link, RenderCommand::AllVoicesOff);
        let (left, right) = render(&mut engine, 256);
        assert_eq!(link.stats.active_voices(), 0);
        assert_eq!(engine.pending_len(), 0);
        assert!(left.iter().chain(&right).all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_remove_instrument_drops_its_pending_notes() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        install_synth(&mut link, 1);
        for slot in [0, 1] {
            send(
                &mut link,
                RenderCommand::NoteOn {
                    slot,
                    pitch: 60,
                    velocity: 100,
                    tag: slot as u64,
                    at: 1_000,
                },
            );
        }
        render(&mut engine, 256);
        assert_eq!(engine.pending_len(), 2);

        send(&mut link, RenderCommand::RemoveInstrument { slot: 0 });
        install_synth(&mut link, 0);
        render(&mut engine, 256);
        assert_eq!(engine.pending_len(), 1);

        render(&mut engine, 1024);
        assert_eq!(engine.pending_len(), 0);
        assert_eq!(engine.instruments[0].as_ref().map(|i| i.active_voices()), Some(0));
        assert_eq!(engine.instruments[1].as_ref().map(|i| i.active_voices()), Some(1));
    }

    #[test]
    fn test_controllers_land_on_their_frame() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        send(
            &mut link,
            RenderCommand::NoteOn {
                slot: 0,
                pitch: 60,
                velocity: 127,
                tag: 1,
                at: 0,
            },
        );
        send(
            &mut link,
            RenderCommand::ControlChange {
                slot: 0,
                controller: 7,
                value: 0,
                at: 128,
            },
        );
        send(
            &mut link,
            RenderCommand::PitchBend {
                slot: 3,
                bend: 0.5,
                at: 10,
            },
        );

        let (left, _) = render(&mut engine, 256);
        assert!(left[..128].iter().any(|s| *s != 0.0));
        assert!(left[128..].iter().all(|s| *s == 0.0));
        assert_eq!(link.stats.active_voices(), 1);
        assert_eq!(link.stats.snapshot().rejected_commands, 1);
    }

    #[test]
    fn test_late_command_applies_at_block_start() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        render(&mut engine, 256);
        send(
            &mut link,
            RenderCommand::NoteOn {
                slot: 0,
                pitch: 60,
                velocity: 100,
                tag: 1,
                at: 10,
            },
        );
        render(&mut engine, 256);
        assert_eq!(link.stats.snapshot().late_events, 1);
        assert_eq!(link.stats.active_voices(), 1);
    }

    #[test]
    fn test_full_timed_queue_applies_early() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        for tag in 0..20u64 {
            send(
                &mut link,
                RenderCommand::NoteOff {
                    slot: 0,
                    tag,
                    at: 100_000,
                },
            );
        }
        render(&mut engine, 64);
        assert!(link.stats.snapshot().pending_overflows > 0);
        assert!(engine.pending_len() <= engine.pending.capacity());
    }

    #[test]
    fn test_removed_objects_are_retired() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 1);
        send(
            &mut link,
            RenderCommand::InstallChannel {
                index: 0,
                strip: Box::new(ChannelStrip::new(256, 2, 2, SR, MeterHandle::new())),
            },
        );
        send(&mut link, RenderCommand::SetProcessOrder(vec![0]));
        render(&mut engine, 64);

        send(&mut link, RenderCommand::RemoveInstrument { slot: 1 });
        send(&mut link, RenderCommand::RemoveChannel { index: 0 });
        render(&mut engine, 64);

        let mut instruments = 0;
        let mut channels = 0;
        while let Some(retired) = link.retired.try_pop() {
            match retired {
                Retired::Instrument(_) => instruments += 1,
                Retired::Channel(_) => channels += 1,
                _ => {}
            }
        }
        assert_eq!((instruments, channels), (1, 1));
    }

    #[test]
    fn test_routed_instrument_goes_through_channel() {
        let (mut engine, mut link) = engine();
        install_synth(&mut link, 0);
        send(
            &mut link,
            RenderCommand::InstallChannel {
                index: 2,
                strip: Box::new(ChannelStrip::new(256, 2, 2, SR, MeterHandle::new())),
            },
        );
        send(&mut link, RenderCommand::SetProcessOrder(vec![2]));
        send(
            &mut link,
            RenderCommand::RouteInstrument {
                slot: 0,
                channel: Some(2),
            },
        );
        send(
            &mut link,
            RenderCommand::SetChannelParam {
                index: 2,
                param: ChannelParam::Mute(true),
            },
        );
        send(
            &mut link,
            RenderCommand::NoteOn {
                slot: 0,
                pitch: 60,
                velocity: 100,
                tag: 1,
                at: 0,
            },
        );
        let mut last = (Vec::new(), Vec::new());
        for _ in 0..8 {
            last = render(&mut engine, 256);
        }
        assert!(last.0.iter().all(|s| s.abs() < 1e-4));
        assert_eq!(link.stats.active_voices(), 1);
    }

    #[test]
    fn test_click_renders_at_offset() {
        let (mut engine, mut link) = engine();
        send(
            &mut link,
            RenderCommand::Click {
                click: ClickType::Accent,
                at: 32,
            },
        );
        let (left, _) = render(&mut engine, 256);
        assert!(left[..32].iter().all(|s| *s == 0.0));
        assert!(left[32..].iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_long_buffer_is_split() {
        let (mut engine, _link) = engine();
        render(&mut engine, 1000);
        assert_eq!(engine.timing.current_sample(), 1000);
    }
}
