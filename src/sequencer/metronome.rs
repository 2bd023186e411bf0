// Metronome - Click track
// The scheduler side decides which beats click and when; the click player
// renders pre-generated click samples inside the render callback.

use std::collections::BTreeSet;
use std::f32::consts::PI;

use super::timeline::PPQ;
use super::transport::{Cursor, Transport};

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// First beat of the bar
    Accent,
    Regular,
}

/// A click that has to reach the render engine at `time`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledClick {
    pub cycle: u64,
    pub beat: i64,
    pub time: f64,
    pub click: ClickType,
}

/// Decides which beats click. Beats entering the look-ahead window are
/// remembered in a rolling set keyed by (loop cycle, beat index), so the
/// overlapping windows of consecutive passes never click a beat twice.
#[derive(Debug, Clone)]
pub struct MetronomeScheduler {
    enabled: bool,
    lookahead: f64,
    tolerance: f64,
    scheduled_beats: BTreeSet<(u64, i64)>,
    pending: Vec<ScheduledClick>,
}

impl MetronomeScheduler {
    pub fn new(lookahead_seconds: f64, tolerance_seconds: f64) -> Self {
        Self {
            enabled: false,
            lookahead: lookahead_seconds,
            tolerance: tolerance_seconds,
            scheduled_beats: BTreeSet::new(),
            pending: Vec::with_capacity(16),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    /// Queue clicks for beats entering the look-ahead window
    pub fn schedule(&mut self, transport: &Transport, now: f64) {
        if !self.enabled || !transport.is_playing() {
            return;
        }

        let playhead = transport.cursor_at(now);
        let from = Cursor {
            cycle: playhead.cycle,
            tick: playhead.tick - 1,
        };
        let to = transport.cursor_at(now + self.lookahead);
        let beats_per_bar = transport.time_signature().beats_per_bar() as i64;
        let ppq = PPQ as i64;

        // Beats behind the playhead can never be scheduled again
        let current_beat = playhead.tick.div_euclid(ppq);
        self.scheduled_beats
            .retain(|&(cycle, beat)| cycle > playhead.cycle || (cycle == playhead.cycle && beat >= current_beat));

        for span in transport.spans_between(from, to) {
            let mut beat = span.after.div_euclid(ppq) + 1;
            while beat * ppq <= span.through {
                if self.scheduled_beats.insert((span.cycle, beat)) {
                    let click = if beat.rem_euclid(beats_per_bar) == 0 {
                        ClickType::Accent
                    } else {
                        ClickType::Regular
                    };
                    self.pending.push(ScheduledClick {
                        cycle: span.cycle,
                        beat,
                        time: transport.time_of(span.cycle, (beat * ppq) as f64),
                        click,
                    });
                }
                beat += 1;
            }
        }
    }

    /// Loop wrapped into `cycle`: bookkeeping for older cycles goes away
    pub fn on_loop_wrap(&mut self, cycle: u64) {
        self.scheduled_beats.retain(|&(c, _)| c >= cycle);
    }

    /// Clicks due now (within tolerance), in time order
    pub fn resolve(&mut self, now: f64) -> Vec<ScheduledClick> {
        let horizon = now + self.tolerance;
        let mut due: Vec<ScheduledClick> = self
            .pending
            .iter()
            .filter(|c| c.time <= horizon)
            .copied()
            .collect();
        self.pending.retain(|c| c.time > horizon);
        due.sort_by(|a, b| a.time.total_cmp(&b.time));
        due
    }

    /// Rescale pending click times after a tempo change (`ratio` = old / new BPM)
    pub fn retime(&mut self, now: f64, ratio: f64) {
        for click in &mut self.pending {
            if click.time > now {
                click.time = now + (click.time - now) * ratio;
            }
        }
    }

    pub fn reset(&mut self) {
        self.scheduled_beats.clear();
        self.pending.clear();
    }
}

/// Pre-generated click samples
#[derive(Debug, Clone)]
pub struct MetronomeSound {
    accent_samples: Vec<f32>,
    regular_samples: Vec<f32>,
}

impl MetronomeSound {
    const CLICK_DURATION_MS: f32 = 10.0;

    pub fn new(sample_rate: f32) -> Self {
        let click_samples = ((Self::CLICK_DURATION_MS / 1000.0) * sample_rate) as usize;

        Self {
            accent_samples: Self::generate_click(sample_rate, click_samples, 1200.0, 0.6),
            regular_samples: Self::generate_click(sample_rate, click_samples, 800.0, 0.4),
        }
    }

    /// Short sine burst with a fast exponential decay
    fn generate_click(
        sample_rate: f32,
        num_samples: usize,
        frequency: f32,
        amplitude: f32,
    ) -> Vec<f32> {
        let phase_increment = 2.0 * PI * frequency / sample_rate;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / num_samples as f32;
                let envelope = (-t * 8.0).exp();
                (i as f32 * phase_increment).sin() * envelope * amplitude
            })
            .collect()
    }

    pub fn get_click(&self, click_type: ClickType) -> &[f32] {
        match click_type {
            ClickType::Accent => &self.accent_samples,
            ClickType::Regular => &self.regular_samples,
        }
    }

    pub fn click_duration(&self) -> usize {
        self.accent_samples.len()
    }
}

/// Render-side click voice. A new click cuts the previous one.
#[derive(Debug, Clone)]
pub struct ClickPlayer {
    sound: MetronomeSound,
    volume: f32,
    current: Option<(ClickType, usize)>,
}

impl ClickPlayer {
    pub fn new(sample_rate: f32, volume: f32) -> Self {
        Self {
            sound: MetronomeSound::new(sample_rate),
            volume: volume.clamp(0.0, 1.0),
            current: None,
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn trigger(&mut self, click: ClickType) {
        self.current = Some((click, 0));
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    /// Add the click into both channels
    #[inline]
    pub fn render_add(&mut self, left: &mut [f32], right: &mut [f32]) {
        let Some((click, mut position)) = self.current else {
            return;
        };
        let samples = self.sound.get_click(click);
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let Some(&sample) = samples.get(position) else {
                break;
            };
            let sample = sample * self.volume;
            *l += sample;
            *r += sample;
            position += 1;
        }
        self.current = if position < samples.len() {
            Some((click, position))
        } else {
            None
        };
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::timing::ManualClock;
    use crate::sequencer::timeline::{Tempo, TimeSignature};
    use std::sync::Arc;

    fn playing_transport() -> (ManualClock, Transport) {
        let clock = ManualClock::new();
        let mut transport = Transport::new(
            Arc::new(clock.clone()),
            Tempo::new(120.0),
            TimeSignature::four_four(),
        );
        transport.play();
        (clock, transport)
    }

    #[test]
    fn test_click_generation() {
        let sound = MetronomeSound::new(48000.0);
        assert_eq!(sound.click_duration(), 480);
        assert!(sound.get_click(ClickType::Accent).iter().all(|s| s.abs() <= 0.6));
    }

    #[test]
    fn test_overlapping_windows_click_each_beat_once() {
        let (clock, mut transport) = playing_transport();
        let mut metronome = MetronomeScheduler::new(0.1, 0.01);
        metronome.set_enabled(true);

        let mut clicks = Vec::new();
        let mut t = 0.0;
        while t <= 2.0 + 1e-9 {
            clock.set(t);
            transport.poll();
            metronome.schedule(&transport, t);
            clicks.extend(metronome.resolve(t));
            t += 0.025;
        }

        let beats: Vec<i64> = clicks.iter().map(|c| c.beat).collect();
        assert_eq!(beats, vec![0, 1, 2, 3, 4]);
        assert_eq!(clicks[0].click, ClickType::Accent);
        assert_eq!(clicks[1].click, ClickType::Regular);
        assert_eq!(clicks[4].click, ClickType::Accent);
        assert!((clicks[3].time - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_loop_cycles_click_again() {
        let (clock, mut transport) = playing_transport();
        transport.set_loop(true, 0, 960);
        let mut metronome = MetronomeScheduler::new(0.1, 0.01);
        metronome.set_enabled(true);

        let mut clicks = Vec::new();
        let mut t = 0.0;
        while t <= 1.9 + 1e-9 {
            clock.set(t);
            for event in transport.poll() {
                if let crate::sequencer::transport::TransportEvent::LoopWrapped { cycle } = event {
                    metronome.on_loop_wrap(cycle);
                }
            }
            metronome.schedule(&transport, t);
            clicks.extend(metronome.resolve(t));
            t += 0.025;
        }

        let keys: Vec<(u64, i64)> = clicks.iter().map(|c| (c.cycle, c.beat)).collect();
        // 960-tick loop at 120 BPM: two beats per half-second cycle
        assert_eq!(
            keys,
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1), (3, 0), (3, 1)]
        );
    }

    #[test]
    fn test_disabled_metronome_is_silent() {
        let (_clock, transport) = playing_transport();
        let mut metronome = MetronomeScheduler::new(0.1, 0.01);
        metronome.schedule(&transport, 0.0);
        assert!(metronome.resolve(1.0).is_empty());
    }

    #[test]
    fn test_click_player_renders_across_blocks() {
        let mut player = ClickPlayer::new(48000.0, 1.0);
        player.trigger(ClickType::Accent);

        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        player.render_add(&mut left, &mut right);
        assert!(player.is_playing());
        assert!(left.iter().any(|s| *s != 0.0));
        assert_eq!(left, right);

        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        player.render_add(&mut left, &mut right);
        assert!(!player.is_playing());
        // 480-sample click: the tail ends 224 samples into the second block
        assert!(left[224..].iter().all(|s| *s == 0.0));
    }
}
