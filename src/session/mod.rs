// Session - the control-side context
//
// Owns the transport, the pattern bank, the schedulers, the track registry
// and the mixer mirror. It is the only writer of that bookkeeping and the
// only producer of render commands. `tick` runs on the scheduler thread; UI
// calls reach the same object through a mutex.

pub mod mixer;
pub mod sink;
pub mod thread;
pub mod tracks;

pub use mixer::{ChannelSettings, ChannelSnapshot, ChannelState, EffectState, MixerSnapshot, MixerState};
pub use sink::CommandSink;
pub use thread::SchedulerThread;
pub use tracks::{Track, TrackId, TrackRegistry};

use std::sync::Arc;

use ringbuf::traits::{Consumer, Producer};
use tracing::{debug, info, trace, warn};

use crate::audio::engine::EngineLink;
use crate::audio::metering::MeterReading;
use crate::audio::mixer::{ChannelId, ChannelParam};
use crate::audio::parameters::{EngineStats, EngineStatsSnapshot};
use crate::audio::timing::Clock;
use crate::config::EngineConfig;
use crate::connection::status::AtomicDeviceStatus;
use crate::error::{EngineError, EngineResult};
use crate::messaging::channels::{
    NotificationConsumer, NotificationProducer, RetireConsumer, create_notification_channel,
};
use crate::messaging::command::RenderCommand;
use crate::messaging::notification::{Message, Notification, NotificationCategory};
use crate::sampler::SampleBuffer;
use crate::sequencer::metronome::MetronomeScheduler;
use crate::sequencer::note::{NoteData, NoteId};
use crate::sequencer::pattern::{PatternBank, PatternExport, PatternId};
use crate::sequencer::scheduler::{Dispatch, LookaheadScheduler};
use crate::sequencer::timeline::{Tempo, Tick, TimeSignature};
use crate::sequencer::transport::{Transport, TransportEvent, TransportSnapshot};
use crate::synth::effect::EffectKind;
use crate::synth::parameters::{ParameterDescriptor, PresetRef, descriptors, find_preset, presets};
use crate::synth::{Controller, Instrument, InstrumentType, VoiceTag};

/// Live notes use the upper half of the tag space so they never collide with
/// scheduler tags
const LIVE_TAG_BASE: VoiceTag = 1 << 63;

pub struct Session {
    config: EngineConfig,
    sample_rate: f32,
    status: AtomicDeviceStatus,
    transport: Transport,
    patterns: PatternBank,
    scheduler: LookaheadScheduler,
    metronome: MetronomeScheduler,
    tracks: TrackRegistry,
    mixer: MixerState,
    sink: CommandSink,
    retired: RetireConsumer,
    stats: Arc<EngineStats>,
    last_stats: EngineStatsSnapshot,
    last_dropped: u64,
    notifications: NotificationProducer,
    notification_rx: Option<NotificationConsumer>,
    next_live_tag: VoiceTag,
}

impl Session {
    /// Build a session around a started backend's engine link. Fails when
    /// the backend is not ready.
    pub fn new(config: EngineConfig, link: EngineLink, status: AtomicDeviceStatus) -> EngineResult<Self> {
        if !status.is_ready() {
            return Err(EngineError::BackendUnavailable(format!(
                "backend status is {}",
                status.get()
            )));
        }

        let config = config.validated();
        let EngineLink {
            commands,
            retired,
            timing,
            stats,
            master_meter,
            sample_rate,
        } = link;

        let clock: Arc<dyn Clock> = Arc::new(timing.clone());
        let transport = Transport::new(clock, Tempo::new(config.tempo_bpm), config.time_signature);
        let mut metronome =
            MetronomeScheduler::new(config.lookahead_seconds(), config.fire_tolerance_seconds());
        metronome.set_enabled(config.metronome_enabled);
        let (notifications, notification_rx) = create_notification_channel(config.notification_capacity);

        info!(
            sample_rate,
            tempo = config.tempo_bpm,
            lookahead_ms = config.lookahead_ms,
            "Session created"
        );

        Ok(Self {
            sample_rate,
            status,
            transport,
            patterns: PatternBank::new(),
            scheduler: LookaheadScheduler::new(config.lookahead_seconds(), config.fire_tolerance_seconds()),
            metronome,
            tracks: TrackRegistry::new(config.max_tracks),
            mixer: MixerState::new(
                config.max_channels,
                config.block_size,
                config.max_effects_per_channel,
                config.max_sends_per_channel,
                sample_rate,
                master_meter,
            ),
            sink: CommandSink::new(commands, timing),
            retired,
            stats,
            last_stats: EngineStatsSnapshot::default(),
            last_dropped: 0,
            notifications,
            notification_rx: Some(notification_rx),
            next_live_tag: LIVE_TAG_BASE,
            config,
        })
    }

    // ===== Scheduling loop =====

    /// One scheduler pass: release retired objects, advance the transport,
    /// commit notes and clicks entering the look-ahead window and send the
    /// ones that are due. A no-op while the backend is not ready.
    pub fn tick(&mut self) {
        self.collect_retired();
        if !self.status.is_ready() {
            trace!(status = %self.status.get(), "tick skipped, backend not ready");
            return;
        }

        let now = self.transport.now();
        for event in self.transport.poll() {
            if let TransportEvent::LoopWrapped { cycle } = event {
                self.metronome.on_loop_wrap(cycle);
            }
            self.notify(event);
        }

        let report = self
            .scheduler
            .schedule(&self.transport, &mut self.patterns, &self.tracks, now);
        if report.unrouted > 0 {
            debug!(unrouted = report.unrouted, "notes without a target");
        }
        if let Some(pattern) = report.switched_to {
            info!(pattern = ?pattern, "queued pattern took over");
            self.notify(Notification::PatternChanged { pattern: Some(pattern) });
        }
        self.metronome.schedule(&self.transport, now);

        for dispatch in self.scheduler.resolve(now) {
            let command = match dispatch {
                Dispatch::NoteOn {
                    target,
                    pitch,
                    velocity,
                    tag,
                    at,
                } => RenderCommand::NoteOn {
                    slot: target.slot,
                    pitch,
                    velocity,
                    tag,
                    at: self.sink.frame_at(at),
                },
                Dispatch::NoteOff { target, tag, at } => RenderCommand::NoteOff {
                    slot: target.slot,
                    tag,
                    at: self.sink.frame_at(at),
                },
            };
            self.sink.push(command);
        }
        for click in self.metronome.resolve(now) {
            let at = self.sink.frame_at(click.time);
            self.sink.push(RenderCommand::Click { click: click.click, at });
        }

        self.report_stats();
    }

    /// Drop everything the render engine handed back. Runs on every tick;
    /// call it directly when no scheduler thread is running.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while let Some(retired) = self.retired.try_pop() {
            drop(retired);
            count += 1;
        }
        if count > 0 {
            trace!(count, "retired render objects released");
        }
        count
    }

    fn report_stats(&mut self) {
        let stats = self.stats.snapshot();
        let last = self.last_stats;
        self.last_stats = stats;

        let late = stats.late_events - last.late_events;
        if late > 0 {
            warn!(late, "timed commands reached the render engine late");
            self.notify(Message::warning(
                NotificationCategory::Sequencer,
                format!("{late} event(s) played late"),
            ));
        }
        let overflows = stats.pending_overflows - last.pending_overflows;
        if overflows > 0 {
            warn!(overflows, "render timed queue full, events applied early");
            self.notify(Message::warning(
                NotificationCategory::Audio,
                format!("{overflows} event(s) applied early, timed queue full"),
            ));
        }
        let rejected = stats.rejected_commands - last.rejected_commands;
        if rejected > 0 {
            warn!(rejected, "render engine rejected commands");
        }
        let retire_overflows = stats.retire_overflows - last.retire_overflows;
        if retire_overflows > 0 {
            warn!(retire_overflows, "retire queue full, objects freed on the render thread");
        }
        let dropped = self.sink.dropped() - self.last_dropped;
        self.last_dropped = self.sink.dropped();
        if dropped > 0 {
            self.notify(Message::error(
                NotificationCategory::Audio,
                format!("{dropped} render command(s) dropped, queue full"),
            ));
        }
    }

    fn notify(&mut self, notification: impl Into<Notification>) {
        if self.notifications.try_push(notification.into()).is_err() {
            trace!("notification queue full, notification dropped");
        }
    }

    /// Voices straight to Off and every pending timed command discarded
    fn silence(&mut self) {
        self.sink.halt();
    }

    // ===== Transport =====

    pub fn play(&mut self) {
        if let Some(event) = self.transport.play() {
            info!(position = self.transport.position(), "Playback started");
            self.notify(event);
        }
    }

    pub fn pause(&mut self) {
        if let Some(event) = self.transport.pause() {
            self.silence();
            self.scheduler.reset();
            self.metronome.reset();
            info!(position = self.transport.position(), "Playback paused");
            self.notify(event);
        }
    }

    pub fn stop(&mut self) {
        let event = self.transport.stop();
        self.silence();
        self.scheduler.reset_to_start();
        self.metronome.reset();
        info!("Playback stopped");
        self.notify(event);
    }

    /// Jump to `ticks`. Sounding notes are cut.
    pub fn seek(&mut self, ticks: f64) {
        let event = self.transport.set_position(ticks);
        self.silence();
        self.scheduler.reset();
        self.metronome.reset();
        debug!(position = self.transport.position(), "Seek");
        self.notify(event);
    }

    /// Returns the tempo actually applied
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        let now = self.transport.now();
        let (previous, event) = self.transport.set_tempo(bpm);
        let applied = self.transport.tempo().bpm();
        let ratio = previous.bpm() / applied;
        self.scheduler.retime(now, ratio);
        self.metronome.retime(now, ratio);
        debug!(from = previous.bpm(), to = applied, "Tempo changed");
        self.notify(event);
        applied
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.transport.set_time_signature(time_signature);
        self.metronome.reset();
    }

    pub fn set_loop(&mut self, enabled: bool, start: Tick, end: Tick) {
        self.transport.set_loop(enabled, start, end);
        self.scheduler.rewind();
        self.metronome.reset();
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.transport.set_loop_enabled(enabled);
        self.scheduler.rewind();
        self.metronome.reset();
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.metronome.set_enabled(enabled);
    }

    pub fn set_metronome_volume(&mut self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.5 };
        self.sink.push(RenderCommand::SetMetronomeVolume(volume));
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_snapshot(&self) -> TransportSnapshot {
        self.transport.snapshot()
    }

    pub fn restore_transport(&mut self, snapshot: &TransportSnapshot) {
        let event = self.transport.restore(snapshot);
        self.silence();
        self.scheduler.reset();
        self.metronome.reset();
        self.notify(event);
    }

    // ===== Patterns =====

    pub fn patterns(&self) -> &PatternBank {
        &self.patterns
    }

    pub fn create_pattern(&mut self, name: impl Into<String>, length: Tick) -> PatternId {
        let had_current = self.patterns.current_id().is_some();
        let id = self.patterns.create(name, length);
        if !had_current {
            self.notify(Notification::PatternChanged { pattern: Some(id) });
        }
        id
    }

    pub fn rename_pattern(&mut self, id: PatternId, name: impl Into<String>) -> EngineResult<()> {
        self.patterns.rename(id, name)
    }

    pub fn delete_pattern(&mut self, id: PatternId) -> EngineResult<()> {
        let was_current = self.patterns.current_id() == Some(id);
        self.patterns.delete(id)?;
        self.tracks.clear_pattern(id);
        if was_current {
            self.scheduler.realign();
            self.notify(Notification::PatternChanged { pattern: None });
        }
        Ok(())
    }

    pub fn clone_pattern(&mut self, id: PatternId, name: Option<String>) -> EngineResult<PatternId> {
        self.patterns.clone_pattern(id, name)
    }

    pub fn import_pattern(&mut self, export: PatternExport) -> PatternId {
        let had_current = self.patterns.current_id().is_some();
        let id = self.patterns.import(export);
        if !had_current {
            self.notify(Notification::PatternChanged { pattern: Some(id) });
        }
        id
    }

    pub fn export_pattern(&self, id: PatternId) -> EngineResult<PatternExport> {
        self.patterns.export(id)
    }

    pub fn add_note(&mut self, pattern: PatternId, note: NoteData) -> EngineResult<NoteId> {
        self.patterns.add_note(pattern, note)
    }

    pub fn remove_note(&mut self, pattern: PatternId, note: NoteId) -> EngineResult<()> {
        self.patterns.remove_note(pattern, note).map(|_| ())
    }

    pub fn update_note(&mut self, pattern: PatternId, note: NoteId, data: NoteData) -> EngineResult<()> {
        self.patterns.update_note(pattern, note, data)
    }

    /// Switch now. Unfired notes of the old pattern are dropped, sounding
    /// ones end normally.
    pub fn set_current_pattern(&mut self, id: PatternId) -> EngineResult<()> {
        self.patterns.set_current(id)?;
        self.scheduler.realign();
        self.notify(Notification::PatternChanged { pattern: Some(id) });
        Ok(())
    }

    /// Switch at the next boundary of the current pattern
    pub fn queue_pattern(&mut self, id: PatternId) -> EngineResult<()> {
        let had_current = self.patterns.current_id().is_some();
        self.patterns.queue_next(id)?;
        if !had_current {
            self.notify(Notification::PatternChanged { pattern: Some(id) });
        }
        Ok(())
    }

    pub fn cancel_queued_pattern(&mut self) {
        self.patterns.cancel_queued();
    }

    /// 0 disables output quantization
    pub fn set_quantize_grid(&mut self, grid: Tick) {
        self.scheduler.set_quantize_grid(grid);
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    // ===== Tracks =====

    pub fn tracks(&self) -> &TrackRegistry {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> EngineResult<&Track> {
        self.tracks.get(id)
    }

    /// New track with its instrument at default parameters and its own
    /// mixer channel
    pub fn create_track(&mut self, name: impl Into<String>, kind: InstrumentType) -> EngineResult<TrackId> {
        let name = name.into();
        let (id, slot) = {
            let track = self.tracks.create(name.clone(), kind)?;
            (track.id, track.slot)
        };

        let instrument = Box::new(Instrument::new(kind, self.sample_rate, self.config.polyphony));
        if let Err(e) = self
            .sink
            .push_required(RenderCommand::InstallInstrument { slot, instrument })
        {
            self.tracks.remove(id)?;
            return Err(e);
        }

        let routed = self
            .mixer
            .create_channel(name.clone(), Some(id), &mut self.sink)
            .and_then(|channel| {
                let index = self.mixer.index_of(channel)?;
                self.sink.push_required(RenderCommand::RouteInstrument {
                    slot,
                    channel: Some(index),
                })?;
                Ok(channel)
            });

        match routed {
            Ok(channel) => {
                self.tracks.get_mut(id)?.channel = Some(channel);
                info!(track = ?id, name = %name, kind = ?kind, "Track created");
                Ok(id)
            }
            Err(e) => {
                warn!(error = %e, "track creation rolled back");
                self.sink.push(RenderCommand::RemoveInstrument { slot });
                self.tracks.remove(id)?;
                Err(e)
            }
        }
    }

    /// Remove a track, its instrument and the channel it owns
    pub fn remove_track(&mut self, id: TrackId) -> EngineResult<()> {
        let (slot, channel) = {
            let track = self.tracks.get(id)?;
            (track.slot, track.channel)
        };
        self.sink
            .push_required(RenderCommand::RemoveInstrument { slot })?;
        self.scheduler.drop_track(id);

        if let Some(channel) = channel {
            let owned = self
                .mixer
                .channel(channel)
                .is_ok_and(|c| c.track == Some(id));
            if owned {
                self.remove_channel(channel)?;
            }
        }
        self.tracks.remove(id)?;
        info!(track = ?id, "Track removed");
        Ok(())
    }

    pub fn attach_channel(&mut self, track: TrackId, channel: ChannelId) -> EngineResult<()> {
        let index = self.mixer.index_of(channel)?;
        let slot = self.tracks.get(track)?.slot;
        self.sink.push_required(RenderCommand::RouteInstrument {
            slot,
            channel: Some(index),
        })?;
        self.tracks.get_mut(track)?.channel = Some(channel);
        Ok(())
    }

    /// Route the track straight to master
    pub fn detach_channel(&mut self, track: TrackId) -> EngineResult<()> {
        let slot = self.tracks.get(track)?.slot;
        self.sink
            .push_required(RenderCommand::RouteInstrument { slot, channel: None })?;
        self.tracks.get_mut(track)?.channel = None;
        Ok(())
    }

    /// Bind a track to a pattern; its pattern notes without an explicit
    /// track play on it
    pub fn bind_pattern(&mut self, track: TrackId, pattern: Option<PatternId>) -> EngineResult<()> {
        if let Some(pattern) = pattern {
            self.patterns.get(pattern)?;
        }
        self.tracks.get_mut(track)?.pattern = pattern;
        Ok(())
    }

    /// Play a note now, outside the sequencer. Returns the tag to release it with.
    pub fn note_on(&mut self, track: TrackId, pitch: u8, velocity: u8) -> EngineResult<VoiceTag> {
        if !self.status.is_ready() {
            return Err(EngineError::BackendNotReady);
        }
        let slot = self.tracks.get(track)?.slot;
        let tag = self.next_live_tag;
        self.next_live_tag = self.next_live_tag.wrapping_add(1).max(LIVE_TAG_BASE);
        let at = self.sink.current_frame();
        self.sink.push(RenderCommand::NoteOn {
            slot,
            pitch: pitch.min(127),
            velocity: velocity.min(127),
            tag,
            at,
        });
        Ok(tag)
    }

    pub fn note_off(&mut self, track: TrackId, tag: VoiceTag) -> EngineResult<()> {
        if !self.status.is_ready() {
            return Err(EngineError::BackendNotReady);
        }
        let slot = self.tracks.get(track)?.slot;
        let at = self.sink.current_frame();
        self.sink.push(RenderCommand::NoteOff { slot, tag, at });
        Ok(())
    }

    /// Bend every voice of the track now; `bend` -1..1 spans the bend range
    pub fn pitch_bend(&mut self, track: TrackId, bend: f32) -> EngineResult<()> {
        if !self.status.is_ready() {
            return Err(EngineError::BackendNotReady);
        }
        let slot = self.tracks.get(track)?.slot;
        let bend = if bend.is_finite() { bend.clamp(-1.0, 1.0) } else { 0.0 };
        let at = self.sink.current_frame();
        self.sink.push(RenderCommand::PitchBend { slot, bend, at });
        Ok(())
    }

    /// MIDI control change on the track's instrument. Cutoff and resonance
    /// controllers also update the stored parameter values.
    pub fn control_change(&mut self, track: TrackId, controller: u8, value: u8) -> EngineResult<()> {
        if !self.status.is_ready() {
            return Err(EngineError::BackendNotReady);
        }
        let track = self.tracks.get_mut(track)?;
        let value = value.min(127);
        if let Some((param, mapped)) = Controller::from_number(controller).and_then(|c| c.param_value(value)) {
            track.params.set_id(param, mapped);
        }
        let slot = track.slot;
        let at = self.sink.current_frame();
        self.sink.push(RenderCommand::ControlChange {
            slot,
            controller,
            value,
            at,
        });
        Ok(())
    }

    // ===== Instrument parameters =====

    /// Returns the clamped value actually applied
    pub fn set_instrument_param(&mut self, track: TrackId, key: &str, value: f32) -> EngineResult<f32> {
        let track = self.tracks.get_mut(track)?;
        let (param, value) = track
            .params
            .set(key, value)
            .ok_or_else(|| EngineError::UnknownParameter(key.to_string()))?;
        let slot = track.slot;
        self.sink
            .push(RenderCommand::SetInstrumentParam { slot, param, value });
        Ok(value)
    }

    pub fn instrument_param(&self, track: TrackId, key: &str) -> EngineResult<f32> {
        self.tracks
            .get(track)?
            .params
            .get(key)
            .ok_or_else(|| EngineError::UnknownParameter(key.to_string()))
    }

    pub fn parameter_descriptors(&self, track: TrackId) -> EngineResult<&'static [ParameterDescriptor]> {
        Ok(descriptors(self.tracks.get(track)?.instrument))
    }

    pub fn preset_names(&self, track: TrackId) -> EngineResult<Vec<&'static str>> {
        let kind = self.tracks.get(track)?.instrument;
        Ok(presets(kind).iter().map(|p| p.name).collect())
    }

    /// Load a preset. Parameters it does not list go back to their default.
    pub fn apply_preset(&mut self, track: TrackId, preset: PresetRef<'_>) -> EngineResult<&'static str> {
        let track = self.tracks.get_mut(track)?;
        let found = find_preset(track.instrument, preset).ok_or_else(|| {
            EngineError::UnknownPreset(match preset {
                PresetRef::Index(index) => format!("#{index}"),
                PresetRef::Name(name) => name.to_string(),
            })
        })?;

        let slot = track.slot;
        for (param, value) in track.params.apply_preset(found) {
            self.sink
                .push(RenderCommand::SetInstrumentParam { slot, param, value });
        }
        debug!(preset = found.name, slot, "Preset applied");
        Ok(found.name)
    }

    /// Hand sample data to a sampler track (None unloads it)
    pub fn set_sample(&mut self, track: TrackId, sample: Option<Arc<SampleBuffer>>) -> EngineResult<()> {
        let track = self.tracks.get_mut(track)?;
        if track.instrument != InstrumentType::Sampler && sample.is_some() {
            warn!(track = ?track.id, "sample data set on a non-sampler track, it will stay silent");
        }
        track.sample = sample.clone();
        let slot = track.slot;
        self.sink
            .push_required(RenderCommand::SetSample { slot, sample })
    }

    // ===== Mixer =====

    pub fn mixer(&self) -> &MixerState {
        &self.mixer
    }

    pub fn create_aux_channel(&mut self, name: impl Into<String>) -> EngineResult<ChannelId> {
        self.mixer.create_channel(name, None, &mut self.sink)
    }

    /// Tracks routed to the channel fall back to master
    pub fn remove_channel(&mut self, channel: ChannelId) -> EngineResult<()> {
        self.mixer.channel(channel)?;
        for slot in self.tracks.clear_channel(channel) {
            self.sink
                .push(RenderCommand::RouteInstrument { slot, channel: None });
        }
        self.mixer.remove_channel(channel, &mut self.sink)?;
        Ok(())
    }

    pub fn rename_channel(&mut self, channel: ChannelId, name: impl Into<String>) -> EngineResult<()> {
        self.mixer.rename_channel(channel, name)
    }

    pub fn set_channel_param(&mut self, channel: ChannelId, param: ChannelParam) -> EngineResult<ChannelParam> {
        self.mixer.set_param(channel, param, &mut self.sink)
    }

    pub fn add_effect(&mut self, channel: ChannelId, kind: EffectKind, position: Option<usize>) -> EngineResult<usize> {
        self.mixer.add_effect(channel, kind, position, &mut self.sink)
    }

    pub fn remove_effect(&mut self, channel: ChannelId, position: usize) -> EngineResult<EffectState> {
        self.mixer.remove_effect(channel, position, &mut self.sink)
    }

    pub fn set_effect_bypass(&mut self, channel: ChannelId, position: usize, bypassed: bool) -> EngineResult<()> {
        self.mixer
            .set_effect_bypass(channel, position, bypassed, &mut self.sink)
    }

    pub fn set_effect_mix(&mut self, channel: ChannelId, position: usize, mix: f32) -> EngineResult<f32> {
        self.mixer
            .set_effect_mix(channel, position, mix, &mut self.sink)
    }

    pub fn set_effect_param(&mut self, channel: ChannelId, position: usize, key: &str, value: f32) -> EngineResult<f32> {
        self.mixer
            .set_effect_param(channel, position, key, value, &mut self.sink)
    }

    pub fn set_send(&mut self, from: ChannelId, to: ChannelId, amount: f32) -> EngineResult<()> {
        self.mixer.set_send(from, to, amount, &mut self.sink)
    }

    pub fn remove_send(&mut self, from: ChannelId, to: ChannelId) -> EngineResult<bool> {
        self.mixer.remove_send(from, to, &mut self.sink)
    }

    pub fn set_master_volume(&mut self, volume: f32) -> f32 {
        self.mixer.set_master_volume(volume, &mut self.sink)
    }

    pub fn channel_meter(&self, channel: ChannelId) -> EngineResult<MeterReading> {
        self.mixer.meter(channel)
    }

    pub fn master_meter(&self) -> MeterReading {
        self.mixer.master_meter()
    }

    pub fn mixer_snapshot(&self) -> MixerSnapshot {
        self.mixer.snapshot()
    }

    pub fn restore_mixer(&mut self, snapshot: &MixerSnapshot) -> EngineResult<()> {
        self.mixer.restore(snapshot, &mut self.sink)
    }

    // ===== Status =====

    /// The receiving end of the notification queue; there is only one
    pub fn take_notifications(&mut self) -> Option<NotificationConsumer> {
        self.notification_rx.take()
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn active_voices(&self) -> usize {
        self.stats.active_voices()
    }

    pub fn dropped_commands(&self) -> u64 {
        self.sink.dropped()
    }
}
