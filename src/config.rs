// Engine configuration
//
// Loaded from RON (preferred) or JSON. Every field has a default, so a
// config file only needs the values it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::sequencer::timeline::{Tempo, TimeSignature};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Requested sample rate. The cpal backend uses the device rate instead.
    pub sample_rate: u32,
    /// Largest block the render engine will be asked for, in frames
    pub block_size: usize,
    /// Voices per instrument
    pub polyphony: usize,
    /// How far ahead the scheduler commits notes
    pub lookahead_ms: f64,
    /// Scheduler thread wake-up interval
    pub poll_interval_ms: u64,
    /// How early a scheduled event may fire
    pub fire_tolerance_ms: f64,
    /// Control -> render ring buffer size
    pub command_capacity: usize,
    /// Pre-allocated size of the render-side timed command queue
    pub timed_queue_capacity: usize,
    /// Render -> control ring buffer for objects to free off the audio thread
    pub retire_capacity: usize,
    /// Session -> UI event ring buffer size
    pub notification_capacity: usize,
    pub max_tracks: usize,
    pub max_channels: usize,
    pub max_effects_per_channel: usize,
    pub max_sends_per_channel: usize,
    pub tempo_bpm: f64,
    pub time_signature: TimeSignature,
    pub metronome_enabled: bool,
    pub metronome_volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 512,
            polyphony: 16,
            lookahead_ms: 100.0,
            poll_interval_ms: 25,
            fire_tolerance_ms: 10.0,
            command_capacity: 4096,
            timed_queue_capacity: 1024,
            retire_capacity: 256,
            notification_capacity: 512,
            max_tracks: 64,
            max_channels: 96,
            max_effects_per_channel: 8,
            max_sends_per_channel: 8,
            tempo_bpm: 120.0,
            time_signature: TimeSignature::default(),
            metronome_enabled: false,
            metronome_volume: 0.5,
        }
    }
}

impl EngineConfig {
    /// Load a configuration file. `.json` files are parsed as JSON, anything
    /// else as RON.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config: Self = if is_json {
            serde_json::from_str(&text).map_err(|e| EngineError::Config(e.to_string()))?
        } else {
            ron::from_str(&text).map_err(|e| EngineError::Config(e.to_string()))?
        };

        Ok(config.validated())
    }

    /// Write the configuration as pretty RON
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Clamp every field into a usable range
    pub fn validated(mut self) -> Self {
        self.sample_rate = self.sample_rate.clamp(8_000, 384_000);
        self.block_size = self.block_size.clamp(16, 8192);
        self.polyphony = self.polyphony.clamp(1, 256);
        self.lookahead_ms = clamp_finite(self.lookahead_ms, 5.0, 2000.0, 100.0);
        self.poll_interval_ms = self.poll_interval_ms.clamp(1, 1000);
        self.fire_tolerance_ms = clamp_finite(self.fire_tolerance_ms, 0.0, 1000.0, 10.0);
        self.command_capacity = self.command_capacity.max(64);
        self.timed_queue_capacity = self.timed_queue_capacity.max(64);
        self.retire_capacity = self.retire_capacity.max(16);
        self.notification_capacity = self.notification_capacity.max(16);
        self.max_tracks = self.max_tracks.clamp(1, 1024);
        self.max_channels = self.max_channels.clamp(self.max_tracks, 2048);
        self.max_effects_per_channel = self.max_effects_per_channel.clamp(1, 64);
        self.max_sends_per_channel = self.max_sends_per_channel.clamp(1, 64);
        self.tempo_bpm = Tempo::new(self.tempo_bpm).bpm();
        self.time_signature = TimeSignature::new(
            self.time_signature.numerator,
            self.time_signature.denominator,
        );
        self.metronome_volume = self.metronome_volume.clamp(0.0, 1.0);
        self
    }

    pub fn lookahead_seconds(&self) -> f64 {
        self.lookahead_ms / 1000.0
    }

    pub fn fire_tolerance_seconds(&self) -> f64 {
        self.fire_tolerance_ms / 1000.0
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}
