// Voice Manager - Polyphony handling
//
// Fixed pool allocated up front. note_on never allocates: it retriggers a
// voice already playing the pitch, takes a free one, or steals.

use super::voice::{PolyVoice, VoiceTag};

pub const DEFAULT_POLYPHONY: usize = 16;

pub struct VoicePool<V> {
    voices: Vec<V>,
    /// Incremented on each note_on, for stealing ties
    age_counter: u64,
}

impl<V: PolyVoice> VoicePool<V> {
    /// Build `polyphony` voices with `make(index)`
    pub fn new(polyphony: usize, mut make: impl FnMut(usize) -> V) -> Self {
        let polyphony = polyphony.max(1);
        Self {
            voices: (0..polyphony).map(&mut make).collect(),
            age_counter: 0,
        }
    }

    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Start a note and return the index of the voice that plays it.
    /// Velocity 0 is a note-off for `pitch` and starts nothing.
    pub fn note_on(&mut self, pitch: u8, velocity: u8, tag: VoiceTag) -> Option<usize> {
        if velocity == 0 {
            self.release_pitch(pitch);
            return None;
        }
        self.age_counter = self.age_counter.wrapping_add(1);

        let index = self
            .voices
            .iter()
            .position(|v| v.is_active() && v.pitch() == pitch)
            .or_else(|| self.voices.iter().position(|v| !v.is_active()))
            .unwrap_or_else(|| self.find_voice_to_steal());

        self.voices[index].start(pitch, velocity, tag, self.age_counter);
        Some(index)
    }

    /// Lowest envelope level wins; ties go to the earliest triggered voice
    fn find_voice_to_steal(&self) -> usize {
        let mut best_index = 0;
        let mut best = (f32::INFINITY, u64::MAX);

        for (i, voice) in self.voices.iter().enumerate() {
            let candidate = (voice.level(), voice.age());
            let quieter = candidate.0 < best.0;
            let same_level_older = candidate.0 == best.0 && candidate.1 < best.1;
            if quieter || same_level_older {
                best = candidate;
                best_index = i;
            }
        }

        best_index
    }

    /// Release the voice playing `tag`. Unknown tags (stolen or retriggered
    /// voices) are ignored.
    pub fn note_off(&mut self, tag: VoiceTag) {
        if let Some(voice) = self
            .voices
            .iter_mut()
            .find(|v| v.is_active() && !v.is_released() && v.tag() == tag)
        {
            voice.release();
        }
    }

    /// Release every held voice playing `pitch`
    pub fn release_pitch(&mut self, pitch: u8) {
        for voice in self
            .voices
            .iter_mut()
            .filter(|v| v.is_active() && !v.is_released() && v.pitch() == pitch)
        {
            voice.release();
        }
    }

    /// Silence everything at once
    pub fn kill_all(&mut self) {
        for voice in &mut self.voices {
            voice.kill();
        }
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn voices(&self) -> &[V] {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut [V] {
        &mut self.voices
    }

    pub fn voice_mut(&mut self, index: usize) -> Option<&mut V> {
        self.voices.get_mut(index)
    }
}
