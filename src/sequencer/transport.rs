// Transport - Playback control and state management
// Derives the playhead from the clock: while playing, position is the anchor
// tick plus the ticks elapsed since the anchor time at the current tempo.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::timeline::{ClockMapper, PPQ, Tempo, Tick, TimeSignature};
use crate::audio::timing::Clock;

/// Spans produced per lookup are capped so a tiny loop at a high tempo
/// cannot turn one scheduling pass into thousands of iterations.
const MAX_SPANS: usize = 16;

/// Transport state (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }
}

/// Loop region, `[start, end)` in ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoopRegion {
    pub enabled: bool,
    pub start: Tick,
    pub end: Tick,
}

impl LoopRegion {
    pub fn length(&self) -> Tick {
        self.end - self.start
    }
}

/// Things the transport reports to whoever polls it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportEvent {
    Started { position: f64 },
    Paused { position: f64 },
    Stopped,
    Seeked { position: f64 },
    TempoChanged { bpm: f64 },
    /// 1-based bar and beat-in-bar
    Beat { bar: u64, beat: u64 },
    Bar { bar: u64 },
    LoopWrapped { cycle: u64 },
}

/// A playhead location that stays unique across loop iterations.
/// `cycle` counts loop wraps since the last stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
    pub cycle: u64,
    pub tick: i64,
}

/// Ticks `(after, through]` of one loop cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub cycle: u64,
    pub after: i64,
    pub through: i64,
}

/// Serializable transport state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSnapshot {
    pub state: TransportState,
    pub position: f64,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub loop_region: LoopRegion,
}

/// Transport controller
/// Owns the musical time context (tempo, time signature, loop)
pub struct Transport {
    clock: Arc<dyn Clock>,
    state: TransportState,
    mapper: ClockMapper,
    time_signature: TimeSignature,
    loop_region: LoopRegion,
    // position = anchor_tick + ticks elapsed since anchor_time (while playing)
    anchor_tick: f64,
    anchor_time: f64,
    cycle: u64,
    last_beat: Option<u64>,
}

impl Transport {
    pub fn new(clock: Arc<dyn Clock>, tempo: Tempo, time_signature: TimeSignature) -> Self {
        Self {
            clock,
            state: TransportState::Stopped,
            mapper: ClockMapper::new(tempo),
            time_signature,
            loop_region: LoopRegion {
                enabled: false,
                start: 0,
                end: time_signature.ticks_per_bar() * 4,
            },
            anchor_tick: 0.0,
            anchor_time: 0.0,
            cycle: 0,
            last_beat: None,
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn tempo(&self) -> Tempo {
        self.mapper.tempo()
    }

    pub fn mapper(&self) -> &ClockMapper {
        &self.mapper
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Loop wraps since the last stop
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Current position in ticks, already wrapped into the loop
    pub fn position(&self) -> f64 {
        self.locate(self.clock.now()).1
    }

    pub fn position_ticks(&self) -> Tick {
        self.position().floor() as Tick
    }

    /// Cursor of the tick playing right now
    pub fn cursor(&self) -> Cursor {
        self.cursor_at(self.clock.now())
    }

    pub fn cursor_at(&self, time: f64) -> Cursor {
        let (cycle, tick) = self.locate(time);
        Cursor {
            cycle,
            tick: tick.floor() as i64,
        }
    }

    /// Start or resume. Returns None when already playing.
    pub fn play(&mut self) -> Option<TransportEvent> {
        if self.is_playing() {
            return None;
        }
        self.anchor_time = self.clock.now();
        self.state = TransportState::Playing;
        self.last_beat = None;
        Some(TransportEvent::Started {
            position: self.anchor_tick,
        })
    }

    /// Freeze the playhead where it is. Only meaningful while playing.
    pub fn pause(&mut self) -> Option<TransportEvent> {
        if !self.is_playing() {
            return None;
        }
        self.commit_position(self.clock.now());
        self.state = TransportState::Paused;
        Some(TransportEvent::Paused {
            position: self.anchor_tick,
        })
    }

    /// Back to zero. The caller is responsible for silencing instruments.
    pub fn stop(&mut self) -> TransportEvent {
        self.state = TransportState::Stopped;
        self.anchor_tick = 0.0;
        self.anchor_time = self.clock.now();
        self.cycle = 0;
        self.last_beat = None;
        TransportEvent::Stopped
    }

    /// Move the playhead. Negative (or NaN) input lands on zero.
    pub fn set_position(&mut self, ticks: f64) -> TransportEvent {
        let ticks = if ticks.is_nan() { 0.0 } else { ticks.max(0.0) };
        self.anchor_tick = ticks;
        self.anchor_time = self.clock.now();
        self.last_beat = None;
        TransportEvent::Seeked { position: ticks }
    }

    /// Change tempo without moving the playhead; only the rate of future
    /// advancement changes. Returns the previous tempo.
    pub fn set_tempo(&mut self, bpm: f64) -> (Tempo, TransportEvent) {
        let previous = self.mapper.tempo();
        if self.is_playing() {
            self.commit_position(self.clock.now());
        }
        let tempo = Tempo::new(bpm);
        self.mapper.set_tempo(tempo);
        (previous, TransportEvent::TempoChanged { bpm: tempo.bpm() })
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        self.last_beat = None;
    }

    /// Set the loop region. An end at or before the start becomes start + 1.
    pub fn set_loop(&mut self, enabled: bool, start: Tick, end: Tick) {
        if self.is_playing() {
            self.commit_position(self.clock.now());
        }
        self.loop_region = LoopRegion {
            enabled,
            start,
            end: end.max(start.saturating_add(1)),
        };
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        let region = self.loop_region;
        self.set_loop(enabled, region.start, region.end);
    }

    /// Advance bookkeeping to "now": wrap at the loop end and report beat,
    /// bar and wrap crossings.
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if !self.is_playing() {
            return events;
        }

        let now = self.clock.now();
        let wraps = self.commit_position(now);
        if wraps > 0 {
            events.push(TransportEvent::LoopWrapped { cycle: self.cycle });
        }

        let position = self.position_at_anchor(now);
        let beat_index = (position / PPQ as f64).floor() as u64;
        if self.last_beat != Some(beat_index) {
            let beats_per_bar = self.time_signature.beats_per_bar();
            let bar = beat_index / beats_per_bar + 1;
            let beat_in_bar = beat_index % beats_per_bar;
            if beat_in_bar == 0 {
                events.push(TransportEvent::Bar { bar });
            }
            events.push(TransportEvent::Beat {
                bar,
                beat: beat_in_bar + 1,
            });
            self.last_beat = Some(beat_index);
        }

        events
    }

    /// Clock time at which `tick` of loop cycle `cycle` plays, assuming the
    /// tempo does not change in between
    pub fn time_of(&self, cycle: u64, tick: f64) -> f64 {
        match self.active_loop() {
            Some((start, end)) if cycle > self.cycle => {
                let len = end - start;
                let to_end = self.mapper.ticks_to_seconds(end - self.anchor_tick);
                let full_cycles = (cycle - self.cycle - 1) as f64;
                self.anchor_time
                    + to_end
                    + full_cycles * self.mapper.ticks_to_seconds(len)
                    + self.mapper.ticks_to_seconds(tick - start)
            }
            _ => self.anchor_time + self.mapper.ticks_to_seconds(tick - self.anchor_tick),
        }
    }

    /// Split the path from `from` (exclusive) to `to` (inclusive) into
    /// per-cycle tick spans, following the loop.
    pub fn spans_between(&self, from: Cursor, to: Cursor) -> Vec<Span> {
        let mut spans = Vec::new();
        if to <= from {
            return spans;
        }
        if from.cycle == to.cycle {
            spans.push(Span {
                cycle: from.cycle,
                after: from.tick,
                through: to.tick,
            });
            return spans;
        }

        let region = self.loop_region;
        let start = region.start as i64;
        let last = region.end as i64 - 1;

        if from.tick < last {
            spans.push(Span {
                cycle: from.cycle,
                after: from.tick,
                through: last,
            });
        }
        let mut cycle = from.cycle + 1;
        while cycle < to.cycle && spans.len() < MAX_SPANS - 1 {
            spans.push(Span {
                cycle,
                after: start - 1,
                through: last,
            });
            cycle += 1;
        }
        if cycle == to.cycle {
            spans.push(Span {
                cycle,
                after: start - 1,
                through: to.tick,
            });
        }
        spans
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            state: self.state,
            position: self.position(),
            tempo_bpm: self.tempo().bpm(),
            time_signature: self.time_signature,
            loop_region: self.loop_region,
        }
    }

    /// Apply tempo, meter, loop and position from a snapshot. Play state is
    /// left alone; starting and stopping stays with the caller.
    pub fn restore(&mut self, snapshot: &TransportSnapshot) -> TransportEvent {
        self.set_tempo(snapshot.tempo_bpm);
        self.set_time_signature(snapshot.time_signature);
        let region = snapshot.loop_region;
        self.set_loop(region.enabled, region.start, region.end);
        self.set_position(snapshot.position)
    }

    /// Loop bounds when the playhead is heading into an enabled loop
    fn active_loop(&self) -> Option<(f64, f64)> {
        let region = self.loop_region;
        if region.enabled && self.anchor_tick < region.end as f64 {
            Some((region.start as f64, region.end as f64))
        } else {
            None
        }
    }

    fn position_at_anchor(&self, time: f64) -> f64 {
        if self.is_playing() {
            self.anchor_tick + self.mapper.seconds_to_ticks((time - self.anchor_time).max(0.0))
        } else {
            self.anchor_tick
        }
    }

    /// (cycle, wrapped tick) at `time`
    fn locate(&self, time: f64) -> (u64, f64) {
        let raw = self.position_at_anchor(time);
        match self.active_loop() {
            Some((start, end)) if raw >= end => {
                let len = end - start;
                let overflow = raw - end;
                let extra = (overflow / len).floor();
                (
                    self.cycle + 1 + extra as u64,
                    start + (overflow - extra * len),
                )
            }
            _ => (self.cycle, raw),
        }
    }

    /// Re-anchor at `time`, applying any pending loop wrap. Returns the
    /// number of wraps applied.
    fn commit_position(&mut self, time: f64) -> u64 {
        let (cycle, tick) = self.locate(time);
        let wraps = cycle - self.cycle;
        self.anchor_tick = tick;
        self.anchor_time = time;
        self.cycle = cycle;
        wraps
    }
}
