// Look-ahead scheduler - turns upcoming pattern notes into timed triggers
//
// Each pass looks `lookahead` seconds past the playhead. Every tick is visited
// at most once per playback pass: the cursor only moves forward, and it is
// the only thing preventing a note from being scheduled twice. Scheduled
// events are then resolved against the clock: a note-on fires once its time
// is within `tolerance`, its note-off once the clock has passed the end.

use tracing::{debug, trace};

use super::note::Note;
use super::pattern::{PatternBank, PatternId, notes_starting_in};
use super::timeline::{Tick, quantize};
use super::transport::{Cursor, Span, Transport};
use crate::session::TrackId;

/// Where a note should be played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteTarget {
    pub track: TrackId,
    /// Render-side instrument slot
    pub slot: usize,
}

/// Resolves the instruments a pattern note plays on
pub trait NoteRouting {
    /// Push every target for `note`; pushing nothing drops it
    fn route(&self, note: &Note, pattern: PatternId, out: &mut Vec<NoteTarget>);
}

/// One note instance between scheduling and its note-off
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    /// Copy taken at schedule time; later pattern edits do not affect it
    pub note: Note,
    pub target: NoteTarget,
    pub tag: u64,
    pub on_time: f64,
    pub off_time: f64,
    pub on_fired: bool,
    pub off_fired: bool,
}

/// Triggers ready to be sent to the render engine. `at` is the exact clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    NoteOn {
        target: NoteTarget,
        pitch: u8,
        velocity: u8,
        tag: u64,
        at: f64,
    },
    NoteOff {
        target: NoteTarget,
        tag: u64,
        at: f64,
    },
}

/// What happened during one scheduling pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    pub scheduled: usize,
    pub unrouted: usize,
    /// Set when a queued pattern took over during the pass
    pub switched_to: Option<PatternId>,
}

pub struct LookaheadScheduler {
    lookahead: f64,
    tolerance: f64,
    quantize_grid: Tick,
    /// Last visited tick; None means "start from the playhead on the next pass"
    cursor: Option<Cursor>,
    /// Timeline tick where tick 0 of the current pattern sits
    origin: i64,
    events: Vec<ScheduledEvent>,
    next_tag: u64,
    targets: Vec<NoteTarget>,
}

impl LookaheadScheduler {
    pub fn new(lookahead_seconds: f64, tolerance_seconds: f64) -> Self {
        Self {
            lookahead: lookahead_seconds.max(0.0),
            tolerance: tolerance_seconds.max(0.0),
            quantize_grid: 0,
            cursor: None,
            origin: 0,
            events: Vec::with_capacity(256),
            next_tag: 1,
            targets: Vec::with_capacity(8),
        }
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Output quantization grid in ticks, 0 disables it
    pub fn set_quantize_grid(&mut self, grid: Tick) {
        self.quantize_grid = grid;
    }

    pub fn quantize_grid(&self) -> Tick {
        self.quantize_grid
    }

    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    /// Events whose note-on went out but whose note-off did not
    pub fn sounding(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.iter().filter(|e| e.on_fired && !e.off_fired)
    }

    /// Commit every note entering the look-ahead window
    pub fn schedule(
        &mut self,
        transport: &Transport,
        bank: &mut PatternBank,
        router: &impl NoteRouting,
        now: f64,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        if !transport.is_playing() {
            return report;
        }

        let playhead = transport.cursor_at(now);
        let just_before = Cursor {
            cycle: playhead.cycle,
            tick: playhead.tick - 1,
        };
        let cursor = match self.cursor {
            Some(cursor) if cursor >= just_before => cursor,
            Some(cursor) => {
                debug!(?cursor, ?playhead, "scheduler fell behind, skipping ahead");
                just_before
            }
            None => just_before,
        };

        let target = transport.cursor_at(now + self.lookahead);
        let spans = transport.spans_between(cursor, target);
        let mut reached = cursor;
        for span in spans {
            self.schedule_span(span, transport, bank, router, &mut report);
            reached = Cursor {
                cycle: span.cycle,
                tick: span.through,
            };
        }
        self.cursor = Some(reached.max(cursor));

        if report.scheduled > 0 {
            trace!(scheduled = report.scheduled, cursor = ?self.cursor, "scheduling pass");
        }
        report
    }

    fn schedule_span(
        &mut self,
        span: Span,
        transport: &Transport,
        bank: &mut PatternBank,
        router: &impl NoteRouting,
        report: &mut ScheduleReport,
    ) {
        let mut after = span.after;
        while after < span.through {
            let Some(pattern) = bank.current() else {
                return;
            };
            let pattern_id = pattern.id;
            let length = pattern.length() as i64;
            let notes = pattern.snapshot();

            // A queued pattern takes over at the next boundary of this one
            let mut through = span.through;
            let mut boundary = None;
            if bank.queued_id().is_some() {
                let next = self.origin + (after + 1 - self.origin).div_euclid(length) * length;
                let next = if next < after + 1 { next + length } else { next };
                if next <= span.through {
                    through = next - 1;
                    boundary = Some(next);
                }
            }

            self.collect(&notes, pattern_id, length, span.cycle, after, through, transport, router, report);
            after = through;

            if let Some(next) = boundary {
                if let Some(id) = bank.commit_queued() {
                    debug!(pattern = ?id, at_tick = next, "queued pattern takes over");
                    report.switched_to = Some(id);
                }
                self.origin = next;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn collect(
        &mut self,
        notes: &[Note],
        pattern_id: PatternId,
        length: i64,
        cycle: u64,
        after: i64,
        through: i64,
        transport: &Transport,
        router: &impl NoteRouting,
        report: &mut ScheduleReport,
    ) {
        let first = after + 1;
        if through < first {
            return;
        }
        let seconds_per_tick = transport.mapper().seconds_per_tick();

        let mut repeat = (first - self.origin).div_euclid(length);
        loop {
            let base = self.origin + repeat * length;
            if base > through {
                break;
            }
            let lo = (first - base).max(0) as Tick;
            let hi = ((through - base + 1).min(length)).max(0) as Tick;

            for note in notes_starting_in(notes, lo, hi) {
                self.targets.clear();
                router.route(note, pattern_id, &mut self.targets);
                if self.targets.is_empty() {
                    report.unrouted += 1;
                    continue;
                }

                let start = base + quantize(note.start, self.quantize_grid) as i64;
                let on_time = transport.time_of(cycle, start as f64);
                let off_time = on_time + note.duration as f64 * seconds_per_tick;

                for i in 0..self.targets.len() {
                    let target = self.targets[i];
                    let tag = self.next_tag;
                    self.next_tag += 1;
                    self.events.push(ScheduledEvent {
                        note: *note,
                        target,
                        tag,
                        on_time,
                        off_time,
                        on_fired: false,
                        off_fired: false,
                    });
                    report.scheduled += 1;
                }
            }
            repeat += 1;
        }
    }

    /// Fire every trigger whose time has come. Same-tick events come out in
    /// pattern order, and a note-off never precedes its note-on.
    pub fn resolve(&mut self, now: f64) -> Vec<Dispatch> {
        let mut out = Vec::new();
        for event in &mut self.events {
            if !event.on_fired && event.on_time <= now + self.tolerance {
                event.on_fired = true;
                out.push(Dispatch::NoteOn {
                    target: event.target,
                    pitch: event.note.pitch,
                    velocity: event.note.velocity,
                    tag: event.tag,
                    at: event.on_time,
                });
            }
            if event.on_fired && !event.off_fired && now >= event.off_time {
                event.off_fired = true;
                out.push(Dispatch::NoteOff {
                    target: event.target,
                    tag: event.tag,
                    at: event.off_time,
                });
            }
        }
        self.events.retain(|e| !(e.on_fired && e.off_fired));
        out
    }

    /// Stop, pause or seek: forget everything. The next pass starts at the
    /// playhead. Sounding notes must be silenced by the caller.
    pub fn reset(&mut self) {
        self.events.clear();
        self.cursor = None;
    }

    /// Stop also restarts the pattern phase
    pub fn reset_to_start(&mut self) {
        self.reset();
        self.origin = 0;
    }

    /// Drop unfired notes and rescan from the playhead, letting sounding notes
    /// end normally. Used when the loop region changes under a running pass.
    pub fn rewind(&mut self) {
        self.events.retain(|e| e.on_fired);
        self.cursor = None;
    }

    /// Pattern switched directly: realign phase so the new pattern plays
    /// against the timeline
    pub fn realign(&mut self) {
        self.origin = 0;
        self.rewind();
    }

    /// Rescale pending times after a tempo change. `ratio` is old_bpm / new_bpm.
    pub fn retime(&mut self, now: f64, ratio: f64) {
        for event in &mut self.events {
            if !event.on_fired && event.on_time > now {
                event.on_time = now + (event.on_time - now) * ratio;
            }
            if !event.off_fired && event.off_time > now {
                event.off_time = now + (event.off_time - now) * ratio;
            }
        }
    }

    /// Forget events routed to a removed track
    pub fn drop_track(&mut self, track: TrackId) {
        self.events.retain(|e| e.target.track != track);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::{Clock, ManualClock};
    use crate::sequencer::note::NoteData;
    use crate::sequencer::timeline::{Tempo, TimeSignature};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct SingleTrack;

    impl NoteRouting for SingleTrack {
        fn route(&self, _note: &Note, _pattern: PatternId, out: &mut Vec<NoteTarget>) {
            out.push(NoteTarget {
                track: TrackId(1),
                slot: 0,
            });
        }
    }

    struct Unbound;

    impl NoteRouting for Unbound {
        fn route(&self, _note: &Note, _pattern: PatternId, _out: &mut Vec<NoteTarget>) {}
    }

    struct Rig {
        clock: ManualClock,
        transport: Transport,
        bank: PatternBank,
        scheduler: LookaheadScheduler,
    }

    impl Rig {
        fn new() -> Self {
            let clock = ManualClock::new();
            let transport = Transport::new(
                Arc::new(clock.clone()),
                Tempo::new(120.0),
                TimeSignature::four_four(),
            );
            Self {
                clock,
                transport,
                bank: PatternBank::new(),
                scheduler: LookaheadScheduler::new(0.1, 0.01),
            }
        }

        /// Drive the loop every 25 ms up to `until` seconds
        fn run(&mut self, until: f64, router: &impl NoteRouting) -> Vec<Dispatch> {
            let mut out = Vec::new();
            let mut t = self.clock.now();
            while t <= until + 1e-9 {
                self.clock.set(t);
                self.transport.poll();
                self.scheduler
                    .schedule(&self.transport, &mut self.bank, router, t);
                out.extend(self.scheduler.resolve(t));
                t += 0.025;
            }
            out
        }
    }

    fn note_on_times(dispatches: &[Dispatch]) -> Vec<f64> {
        dispatches
            .iter()
            .filter_map(|d| match d {
                Dispatch::NoteOn { at, .. } => Some(*at),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_looped_note_fires_once_per_cycle() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Loop", 1920);
        rig.bank
            .add_note(pattern, NoteData::new(60, 100, 0, 480))
            .unwrap();
        rig.transport.set_loop(true, 0, 1920);
        rig.transport.play();

        let dispatches = rig.run(4.9, &SingleTrack);
        let ons = note_on_times(&dispatches);

        assert_eq!(ons.len(), 5, "on times: {ons:?}");
        for (cycle, at) in ons.iter().enumerate() {
            assert!((at - cycle as f64).abs() < 1e-9, "cycle {cycle} fired at {at}");
        }
    }

    #[test]
    fn test_no_double_fire_and_off_after_on() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Busy", 1920);
        for i in 0..16 {
            rig.bank
                .add_note(pattern, NoteData::new(60 + i as u8, 100, i * 120, 90))
                .unwrap();
        }
        rig.transport.set_loop(true, 0, 1920);
        rig.transport.play();

        let dispatches = rig.run(6.0, &SingleTrack);

        let mut state: HashMap<u64, (u32, u32)> = HashMap::new();
        for dispatch in &dispatches {
            match dispatch {
                Dispatch::NoteOn { tag, .. } => {
                    let entry = state.entry(*tag).or_default();
                    assert_eq!(entry.0, 0, "tag {tag} fired note-on twice");
                    entry.0 += 1;
                }
                Dispatch::NoteOff { tag, .. } => {
                    let entry = state.entry(*tag).or_default();
                    assert_eq!(entry.0, 1, "tag {tag} note-off before note-on");
                    assert_eq!(entry.1, 0, "tag {tag} fired note-off twice");
                    entry.1 += 1;
                }
            }
        }
        // 16 notes per 1 s cycle, six cycles started
        let ons = state.values().filter(|(on, _)| *on == 1).count();
        assert!(ons >= 16 * 6, "only {ons} note-ons");
    }

    #[test]
    fn test_same_tick_keeps_pattern_order() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Chord", 1920);
        for pitch in [64, 60, 67] {
            rig.bank
                .add_note(pattern, NoteData::new(pitch, 100, 0, 480))
                .unwrap();
        }
        rig.transport.play();

        let dispatches = rig.run(0.0, &SingleTrack);
        let pitches: Vec<u8> = dispatches
            .iter()
            .filter_map(|d| match d {
                Dispatch::NoteOn { pitch, .. } => Some(*pitch),
                _ => None,
            })
            .collect();
        assert_eq!(pitches, vec![64, 60, 67]);
    }

    #[test]
    fn test_note_on_waits_for_tolerance() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Late", 1920);
        // tick 90 plays at 0.09375 s
        rig.bank
            .add_note(pattern, NoteData::new(60, 100, 90, 480))
            .unwrap();
        rig.transport.play();

        rig.scheduler
            .schedule(&rig.transport, &mut rig.bank, &SingleTrack, 0.0);
        assert_eq!(rig.scheduler.events().len(), 1);
        assert!(rig.scheduler.resolve(0.05).is_empty());
        assert_eq!(rig.scheduler.resolve(0.092).len(), 1);
    }

    #[test]
    fn test_note_off_after_duration() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Short", 1920);
        rig.bank
            .add_note(pattern, NoteData::new(60, 100, 0, 240))
            .unwrap();
        rig.transport.play();

        rig.scheduler
            .schedule(&rig.transport, &mut rig.bank, &SingleTrack, 0.0);
        assert_eq!(rig.scheduler.resolve(0.0).len(), 1);
        assert!(rig.scheduler.resolve(0.2).is_empty());
        assert_eq!(rig.scheduler.sounding().count(), 1);

        let offs = rig.scheduler.resolve(0.26);
        assert!(matches!(offs[..], [Dispatch::NoteOff { at, .. }] if (at - 0.25).abs() < 1e-9));
        assert!(rig.scheduler.events().is_empty());
    }

    #[test]
    fn test_reset_restarts_from_playhead() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Seek", 1920);
        rig.bank
            .add_note(pattern, NoteData::new(60, 100, 0, 480))
            .unwrap();
        rig.transport.play();
        rig.run(0.5, &SingleTrack);

        // Seek back to the note and scan again: it fires again in the new pass
        rig.transport.set_position(0.0);
        rig.scheduler.reset();
        assert_eq!(rig.scheduler.cursor(), None);
        let later = rig.run(0.6, &SingleTrack);
        assert_eq!(note_on_times(&later).len(), 1);
    }

    #[test]
    fn test_quantize_moves_start() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Swing", 1920);
        rig.bank
            .add_note(pattern, NoteData::new(60, 100, 500, 100))
            .unwrap();
        rig.scheduler.set_quantize_grid(480);
        rig.transport.play();

        let dispatches = rig.run(0.6, &SingleTrack);
        let ons = note_on_times(&dispatches);
        assert_eq!(ons.len(), 1);
        assert!((ons[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_pattern_repeats_without_loop() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Beat", 480);
        rig.bank
            .add_note(pattern, NoteData::new(36, 120, 0, 100))
            .unwrap();
        rig.transport.play();

        let ons = note_on_times(&rig.run(1.9, &SingleTrack));
        assert_eq!(ons.len(), 4);
        assert!((ons[3] - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_queued_pattern_switches_at_boundary() {
        let mut rig = Rig::new();
        let a = rig.bank.create("A", 960);
        let b = rig.bank.create("B", 960);
        rig.bank.add_note(a, NoteData::new(60, 100, 0, 100)).unwrap();
        rig.bank.add_note(b, NoteData::new(72, 100, 480, 100)).unwrap();
        rig.transport.play();
        rig.run(0.2, &SingleTrack);

        rig.bank.queue_next(b).unwrap();
        let dispatches = rig.run(1.9, &SingleTrack);

        let ons: Vec<(u8, f64)> = dispatches
            .iter()
            .filter_map(|d| match d {
                Dispatch::NoteOn { pitch, at, .. } => Some((*pitch, *at)),
                _ => None,
            })
            .collect();
        // B takes over at tick 960 (1.0 s); its note is 480 ticks in
        assert_eq!(ons.len(), 1, "{ons:?}");
        assert_eq!(ons[0].0, 72);
        assert!((ons[0].1 - 1.5).abs() < 1e-9);
        assert_eq!(rig.bank.current_id(), Some(b));
    }

    #[test]
    fn test_unrouted_notes_are_dropped() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Orphan", 1920);
        rig.bank
            .add_note(pattern, NoteData::new(60, 100, 0, 480))
            .unwrap();
        rig.transport.play();

        let report = rig
            .scheduler
            .schedule(&rig.transport, &mut rig.bank, &Unbound, 0.0);
        assert_eq!(report.unrouted, 1);
        assert_eq!(report.scheduled, 0);
        assert!(rig.scheduler.resolve(0.0).is_empty());
    }

    #[test]
    fn test_retime_scales_pending_events() {
        let mut rig = Rig::new();
        let pattern = rig.bank.create("Tempo", 1920);
        rig.bank
            .add_note(pattern, NoteData::new(60, 100, 90, 480))
            .unwrap();
        rig.transport.play();
        rig.scheduler
            .schedule(&rig.transport, &mut rig.bank, &SingleTrack, 0.0);

        // 120 -> 240 BPM at t = 0: everything arrives twice as fast
        rig.scheduler.retime(0.0, 0.5);
        let event = rig.scheduler.events()[0];
        assert!((event.on_time - 0.046875).abs() < 1e-9);
        assert!((event.off_time - 0.296875).abs() < 1e-9);
    }
}
