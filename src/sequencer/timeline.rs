// Timeline - Musical time representation
// Conversion between ticks, beats, bars and clock seconds

use std::fmt;

/// Musical position in ticks. Patterns and notes never go below zero.
pub type Tick = u64;

/// Pulses per quarter note
pub const PPQ: u32 = 480;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a time signature, snapping invalid input to the closest valid one
    pub fn new(numerator: u8, denominator: u8) -> Self {
        let denominator = match denominator {
            0 | 1 => 1,
            d if d >= 32 => 32,
            d if d.is_power_of_two() => d,
            d => {
                let up = d.next_power_of_two();
                let down = up / 2;
                if d - down <= up - d { down } else { up }
            }
        };
        Self {
            numerator: numerator.max(1),
            denominator,
        }
    }

    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    pub fn three_four() -> Self {
        Self::new(3, 4)
    }

    /// A beat is always one quarter note, so a bar holds `numerator` of them
    pub fn ticks_per_bar(&self) -> Tick {
        PPQ as Tick * self.numerator as Tick
    }

    pub fn beats_per_bar(&self) -> u64 {
        self.numerator as u64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo in BPM (Beats Per Minute), always within [MIN_BPM, MAX_BPM]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;
    pub const DEFAULT_BPM: f64 = 120.0;

    /// Out-of-range values are clamped; NaN falls back to the default tempo
    pub fn new(bpm: f64) -> Self {
        let bpm = if bpm.is_nan() {
            Self::DEFAULT_BPM
        } else {
            bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)
        };
        Self { bpm }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BPM)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Tick <-> seconds conversion for one tempo.
///
/// Everything is f64: at 20 BPM a tick lasts 6.25 ms, and 2^31 ticks is about
/// 155 days, well inside f64's exact integer range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockMapper {
    tempo: Tempo,
}

impl ClockMapper {
    pub fn new(tempo: Tempo) -> Self {
        Self { tempo }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: Tempo) {
        self.tempo = tempo;
    }

    #[inline]
    pub fn seconds_per_tick(&self) -> f64 {
        self.tempo.beat_duration_seconds() / PPQ as f64
    }

    /// `ticks × (60 / bpm) / PPQ`
    #[inline]
    pub fn ticks_to_seconds(&self, ticks: f64) -> f64 {
        ticks * (60.0 / self.tempo.bpm) / PPQ as f64
    }

    #[inline]
    pub fn seconds_to_ticks(&self, seconds: f64) -> f64 {
        seconds * PPQ as f64 * self.tempo.bpm / 60.0
    }
}

/// Snap `tick` to the nearest multiple of `grid`. A zero grid leaves the tick alone.
pub fn quantize(tick: Tick, grid: Tick) -> Tick {
    if grid == 0 {
        return tick;
    }
    tick.saturating_add(grid / 2) / grid * grid
}

/// Bar/beat/tick view of a tick position, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MusicalTime {
    pub bar: u32,  // 1-based
    pub beat: u8,  // 1-based
    pub tick: u16, // 0-based, within the beat
}

impl MusicalTime {
    pub fn new(bar: u32, beat: u8, tick: u16) -> Self {
        Self { bar, beat, tick }
    }

    pub fn from_ticks(total_ticks: Tick, time_signature: &TimeSignature) -> Self {
        let ticks_per_beat = PPQ as u64;
        let ticks_per_bar = time_signature.ticks_per_bar();

        let bar = total_ticks / ticks_per_bar + 1;
        let remaining = total_ticks % ticks_per_bar;
        let beat = remaining / ticks_per_beat + 1;
        let tick = remaining % ticks_per_beat;

        Self::new(bar as u32, beat as u8, tick as u16)
    }

    pub fn to_ticks(&self, time_signature: &TimeSignature) -> Tick {
        let bar_0 = self.bar.saturating_sub(1) as u64;
        let beat_0 = self.beat.saturating_sub(1) as u64;
        bar_0 * time_signature.ticks_per_bar() + beat_0 * PPQ as u64 + self.tick as u64
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{:03}", self.bar, self.beat, self.tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_quarter_note_at_120_bpm_is_half_a_second() {
        let mapper = ClockMapper::new(Tempo::new(120.0));
        assert!((mapper.ticks_to_seconds(480.0) - 0.5).abs() < 1e-12);
        assert!((mapper.seconds_to_ticks(0.5) - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_within_one_tick() {
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let bpm = rng.gen_range(20.0..=999.0);
            let tick: u64 = rng.gen_range(0..=(1u64 << 31));
            let mapper = ClockMapper::new(Tempo::new(bpm));

            let back = mapper.seconds_to_ticks(mapper.ticks_to_seconds(tick as f64));
            assert!(
                (back.round() - tick as f64).abs() <= 1.0,
                "bpm {bpm} tick {tick} came back as {back}"
            );
        }
    }

    #[test]
    fn test_round_trip_at_extreme_tempos() {
        for bpm in [20.0, 999.0] {
            let mapper = ClockMapper::new(Tempo::new(bpm));
            let tick = (1u64 << 31) as f64;
            let back = mapper.seconds_to_ticks(mapper.ticks_to_seconds(tick));
            assert!((back - tick).abs() < 1.0);
        }
    }

    #[test]
    fn test_tempo_is_clamped() {
        assert_eq!(Tempo::new(5.0).bpm(), 20.0);
        assert_eq!(Tempo::new(4000.0).bpm(), 999.0);
        assert_eq!(Tempo::new(f64::NAN).bpm(), 120.0);
        assert_eq!(Tempo::new(f64::INFINITY).bpm(), 999.0);
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let mut rng = rand::thread_rng();
        for _ in 0..2000 {
            let tick: u64 = rng.gen_range(0..1_000_000);
            let grid: u64 = rng.gen_range(1..2000);
            let once = quantize(tick, grid);
            assert_eq!(quantize(once, grid), once);
            assert_eq!(once % grid, 0);
        }
    }

    #[test]
    fn test_quantize_rounds_to_nearest() {
        assert_eq!(quantize(100, 120), 120);
        assert_eq!(quantize(59, 120), 0);
        assert_eq!(quantize(60, 120), 120);
        assert_eq!(quantize(1000, 0), 1000);
    }

    #[test]
    fn test_time_signature_ticks_per_bar() {
        assert_eq!(TimeSignature::four_four().ticks_per_bar(), 1920);
        assert_eq!(TimeSignature::three_four().ticks_per_bar(), 1440);
    }

    #[test]
    fn test_time_signature_snaps_invalid_values() {
        assert_eq!(TimeSignature::new(0, 4), TimeSignature::new(1, 4));
        assert_eq!(TimeSignature::new(4, 6).denominator, 4);
        assert_eq!(TimeSignature::new(4, 7).denominator, 8);
        assert_eq!(TimeSignature::new(4, 200).denominator, 32);
    }

    #[test]
    fn test_time_signature_large_denominators_never_panic() {
        for d in 0..=u8::MAX {
            let sig = TimeSignature::new(4, d);
            assert!(sig.denominator.is_power_of_two() && sig.denominator <= 32, "{d}");
        }
        assert_eq!(TimeSignature::new(7, 255).denominator, 32);
    }

    #[test]
    fn test_musical_time_display() {
        let sig = TimeSignature::four_four();
        let time = MusicalTime::from_ticks(1920 + 480 + 12, &sig);
        assert_eq!(time, MusicalTime::new(2, 2, 12));
        assert_eq!(time.to_string(), "2.2.012");
        assert_eq!(time.to_ticks(&sig), 1920 + 480 + 12);
    }
}
