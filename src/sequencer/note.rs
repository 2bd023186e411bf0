// Note representation for the sequencer
// A note is a pitch with a start tick, a duration and a velocity

use serde::{Deserialize, Serialize};

use crate::sequencer::timeline::Tick;
use crate::session::TrackId;

/// Identifier of a note, unique within its pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(pub u64);

/// Plain note content, used for import/export and for building notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteData {
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,
    /// MIDI velocity (0-127)
    pub velocity: u8,
    pub start: Tick,
    /// Length in ticks, at least 1
    pub duration: Tick,
    /// MIDI channel (0-15)
    #[serde(default)]
    pub channel: u8,
    /// Owning track. Notes without one play on every track bound to the pattern.
    #[serde(default)]
    pub track: Option<TrackId>,
}

impl NoteData {
    pub fn new(pitch: u8, velocity: u8, start: Tick, duration: Tick) -> Self {
        Self {
            pitch,
            velocity,
            start,
            duration,
            channel: 0,
            track: None,
        }
        .clamped()
    }

    pub fn on_track(mut self, track: TrackId) -> Self {
        self.track = Some(track);
        self
    }

    /// Out-of-range values are clamped rather than rejected
    pub fn clamped(mut self) -> Self {
        self.pitch = self.pitch.min(127);
        self.velocity = self.velocity.min(127);
        self.duration = self.duration.max(1);
        self.channel = self.channel.min(15);
        self
    }
}

/// A musical note in a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub pitch: u8,
    pub velocity: u8,
    pub start: Tick,
    pub duration: Tick,
    pub channel: u8,
    pub track: Option<TrackId>,
}

impl Note {
    pub fn new(id: NoteId, data: NoteData) -> Self {
        let data = data.clamped();
        Self {
            id,
            pitch: data.pitch,
            velocity: data.velocity,
            start: data.start,
            duration: data.duration,
            channel: data.channel,
            track: data.track,
        }
    }

    pub fn data(&self) -> NoteData {
        NoteData {
            pitch: self.pitch,
            velocity: self.velocity,
            start: self.start,
            duration: self.duration,
            channel: self.channel,
            track: self.track,
        }
    }

    /// First tick after the note
    pub fn end(&self) -> Tick {
        self.start.saturating_add(self.duration)
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> String {
        const NOTE_NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];

        let octave = (self.pitch / 12) as i32 - 1;
        let note_index = (self.pitch % 12) as usize;

        format!("{}{}", NOTE_NAMES[note_index], octave)
    }
}
