// Tracks - instrument bindings and note routing
//
// A track owns one render-side instrument slot and, usually, one mixer
// channel. Pattern notes find their instruments through this registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::mixer::ChannelId;
use crate::error::{EngineError, EngineResult};
use crate::sampler::SampleBuffer;
use crate::sequencer::note::Note;
use crate::sequencer::pattern::PatternId;
use crate::sequencer::scheduler::{NoteRouting, NoteTarget};
use crate::synth::InstrumentType;
use crate::synth::parameters::ParameterValues;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u32);

#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub instrument: InstrumentType,
    /// Render-side instrument slot
    pub slot: usize,
    /// None = straight to master
    pub channel: Option<ChannelId>,
    pub pattern: Option<PatternId>,
    pub params: ParameterValues,
    /// Control-side reference to the sampler data, if any
    pub sample: Option<Arc<SampleBuffer>>,
}

#[derive(Debug)]
pub struct TrackRegistry {
    tracks: BTreeMap<TrackId, Track>,
    slots: Vec<Option<TrackId>>,
    next_id: u32,
}

impl TrackRegistry {
    pub fn new(max_tracks: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            slots: vec![None; max_tracks],
            next_id: 0,
        }
    }

    pub fn create(&mut self, name: impl Into<String>, instrument: InstrumentType) -> EngineResult<&mut Track> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(EngineError::CapacityExceeded("tracks"))?;

        self.next_id += 1;
        let id = TrackId(self.next_id);
        self.slots[slot] = Some(id);

        let track = Track {
            id,
            name: name.into(),
            instrument,
            slot,
            channel: None,
            pattern: None,
            params: ParameterValues::new(instrument),
            sample: None,
        };
        Ok(self.tracks.entry(id).or_insert(track))
    }

    pub fn remove(&mut self, id: TrackId) -> EngineResult<Track> {
        let track = self.tracks.remove(&id).ok_or(EngineError::UnknownTrack(id))?;
        if let Some(slot) = self.slots.get_mut(track.slot) {
            *slot = None;
        }
        Ok(track)
    }

    pub fn get(&self, id: TrackId) -> EngineResult<&Track> {
        self.tracks.get(&id).ok_or(EngineError::UnknownTrack(id))
    }

    pub fn get_mut(&mut self, id: TrackId) -> EngineResult<&mut Track> {
        self.tracks.get_mut(&id).ok_or(EngineError::UnknownTrack(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drop every binding to a deleted pattern
    pub fn clear_pattern(&mut self, pattern: PatternId) {
        for track in self.tracks.values_mut() {
            if track.pattern == Some(pattern) {
                track.pattern = None;
            }
        }
    }

    /// Detach every track routed to a removed channel
    pub fn clear_channel(&mut self, channel: ChannelId) -> Vec<usize> {
        let mut slots = Vec::new();
        for track in self.tracks.values_mut() {
            if track.channel == Some(channel) {
                track.channel = None;
                slots.push(track.slot);
            }
        }
        slots
    }
}

impl NoteRouting for TrackRegistry {
    fn route(&self, note: &Note, pattern: PatternId, out: &mut Vec<NoteTarget>) {
        match note.track {
            Some(id) => match self.tracks.get(&id) {
                Some(track) => out.push(NoteTarget {
                    track: id,
                    slot: track.slot,
                }),
                None => warn!(track = ?id, note = ?note.id, "note routed to a missing track, dropped"),
            },
            None => out.extend(
                self.tracks
                    .values()
                    .filter(|t| t.pattern == Some(pattern))
                    .map(|t| NoteTarget {
                        track: t.id,
                        slot: t.slot,
                    }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::note::{NoteData, NoteId};

    fn note(track: Option<TrackId>) -> Note {
        let mut data = NoteData::new(60, 100, 0, 480);
        data.track = track;
        Note::new(NoteId(1), data)
    }

    #[test]
    fn test_slots_are_reused() {
        let mut registry = TrackRegistry::new(2);
        let a = registry.create("A", InstrumentType::Subtractive).unwrap().id;
        let b_slot = registry.create("B", InstrumentType::Sampler).unwrap().slot;
        assert_eq!(b_slot, 1);
        assert!(matches!(
            registry.create("C", InstrumentType::Subtractive),
            Err(EngineError::CapacityExceeded(_))
        ));

        registry.remove(a).unwrap();
        let c = registry.create("C", InstrumentType::Subtractive).unwrap();
        assert_eq!(c.slot, 0);
        assert_ne!(c.id, a);
    }

    #[test]
    fn test_routing_by_pattern_binding() {
        let mut registry = TrackRegistry::new(4);
        let bound = registry.create("Bass", InstrumentType::Subtractive).unwrap().id;
        registry.create("Unbound", InstrumentType::Subtractive).unwrap();
        registry.get_mut(bound).unwrap().pattern = Some(PatternId(7));

        let mut out = Vec::new();
        registry.route(&note(None), PatternId(7), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].track, bound);

        out.clear();
        registry.route(&note(None), PatternId(8), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_routing_by_note_track() {
        let mut registry = TrackRegistry::new(4);
        let lead = registry.create("Lead", InstrumentType::Subtractive).unwrap().id;

        let mut out = Vec::new();
        registry.route(&note(Some(lead)), PatternId(1), &mut out);
        assert_eq!(out.len(), 1);

        out.clear();
        registry.route(&note(Some(TrackId(99))), PatternId(1), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_clear_pattern() {
        let mut registry = TrackRegistry::new(4);
        let id = registry.create("Keys", InstrumentType::Subtractive).unwrap().id;
        registry.get_mut(id).unwrap().pattern = Some(PatternId(3));
        registry.clear_pattern(PatternId(3));
        assert_eq!(registry.get(id).unwrap().pattern, None);
    }
}
