// Pattern - Ordered collection of notes forming a sequence
// A pattern is like a "clip" in other DAWs; it repeats every `length` ticks.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::sequencer::note::{Note, NoteData, NoteId};
use crate::sequencer::timeline::{Tick, quantize};

/// Unique identifier for patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub u32);

/// Plain-data form of a pattern (import/export, snapshots)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternExport {
    pub name: String,
    pub length: Tick,
    /// Ordered by start tick
    pub notes: Vec<NoteData>,
}

/// A pattern containing notes, always sorted by start tick.
///
/// The note list sits behind an `Arc`: the scheduler takes a cheap snapshot at
/// the start of each pass and edits clone-on-write, so an edit can never be
/// observed half-way through a scheduling pass.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    length: Tick,
    notes: Arc<Vec<Note>>,
    next_note_id: u64,
}

impl Pattern {
    pub fn new(id: PatternId, name: impl Into<String>, length: Tick) -> Self {
        Self {
            id,
            name: name.into(),
            length: length.max(1),
            notes: Arc::new(Vec::new()),
            next_note_id: 1,
        }
    }

    pub fn length(&self) -> Tick {
        self.length
    }

    pub fn set_length(&mut self, length: Tick) {
        self.length = length.max(1);
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Immutable view of the notes as they are right now
    pub fn snapshot(&self) -> Arc<Vec<Note>> {
        Arc::clone(&self.notes)
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Insert a note after any note with the same start tick
    pub fn add_note(&mut self, data: NoteData) -> NoteId {
        let id = NoteId(self.next_note_id);
        self.next_note_id += 1;

        let note = Note::new(id, data);
        let notes = Arc::make_mut(&mut self.notes);
        let insert_pos = notes.partition_point(|n| n.start <= note.start);
        notes.insert(insert_pos, note);
        id
    }

    pub fn remove_note(&mut self, id: NoteId) -> Option<Note> {
        let index = self.notes.iter().position(|n| n.id == id)?;
        Some(Arc::make_mut(&mut self.notes).remove(index))
    }

    /// Replace a note's content, keeping its id. Returns false for unknown ids.
    pub fn update_note(&mut self, id: NoteId, data: NoteData) -> bool {
        let Some(index) = self.notes.iter().position(|n| n.id == id) else {
            return false;
        };
        let notes = Arc::make_mut(&mut self.notes);
        notes[index] = Note::new(id, data);
        // stable sort keeps the relative order of equal start ticks
        notes.sort_by_key(|n| n.start);
        true
    }

    pub fn clear(&mut self) {
        Arc::make_mut(&mut self.notes).clear();
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Snap every note start to `grid`
    pub fn quantize_all(&mut self, grid: Tick) {
        if grid == 0 {
            return;
        }
        let notes = Arc::make_mut(&mut self.notes);
        for note in notes.iter_mut() {
            note.start = quantize(note.start, grid);
        }
        notes.sort_by_key(|n| n.start);
    }

    pub fn export(&self) -> PatternExport {
        PatternExport {
            name: self.name.clone(),
            length: self.length,
            notes: self.notes.iter().map(Note::data).collect(),
        }
    }

    fn from_export(id: PatternId, export: PatternExport) -> Self {
        let mut pattern = Self::new(id, export.name, export.length);
        let mut notes: Vec<Note> = export
            .notes
            .into_iter()
            .enumerate()
            .map(|(i, data)| Note::new(NoteId(i as u64 + 1), data))
            .collect();
        notes.sort_by_key(|n| n.start);
        pattern.next_note_id = notes.len() as u64 + 1;
        pattern.notes = Arc::new(notes);
        pattern
    }
}

/// Notes of `notes` whose start lies in `[from, to)`. `notes` must be sorted.
pub fn notes_starting_in(notes: &[Note], from: Tick, to: Tick) -> &[Note] {
    let lo = notes.partition_point(|n| n.start < from);
    let hi = notes.partition_point(|n| n.start < to);
    &notes[lo..hi.max(lo)]
}

/// All patterns, plus the one currently playing and an optional queued successor
#[derive(Debug, Default)]
pub struct PatternBank {
    patterns: BTreeMap<PatternId, Pattern>,
    current: Option<PatternId>,
    queued: Option<PatternId>,
    next_id: u32,
}

impl PatternBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> PatternId {
        self.next_id += 1;
        PatternId(self.next_id)
    }

    fn insert(&mut self, pattern: Pattern) -> PatternId {
        let id = pattern.id;
        self.patterns.insert(id, pattern);
        if self.current.is_none() {
            self.current = Some(id);
        }
        id
    }

    /// Create an empty pattern. The first pattern created becomes current.
    pub fn create(&mut self, name: impl Into<String>, length: Tick) -> PatternId {
        let id = self.allocate_id();
        self.insert(Pattern::new(id, name, length))
    }

    pub fn get(&self, id: PatternId) -> EngineResult<&Pattern> {
        self.patterns.get(&id).ok_or(EngineError::UnknownPattern(id))
    }

    pub fn get_mut(&mut self, id: PatternId) -> EngineResult<&mut Pattern> {
        self.patterns
            .get_mut(&id)
            .ok_or(EngineError::UnknownPattern(id))
    }

    pub fn contains(&self, id: PatternId) -> bool {
        self.patterns.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn rename(&mut self, id: PatternId, name: impl Into<String>) -> EngineResult<()> {
        self.get_mut(id)?.name = name.into();
        Ok(())
    }

    /// Remove a pattern. Clears the current/queued pointers that named it.
    pub fn delete(&mut self, id: PatternId) -> EngineResult<Pattern> {
        let pattern = self
            .patterns
            .remove(&id)
            .ok_or(EngineError::UnknownPattern(id))?;
        if self.current == Some(id) {
            self.current = None;
        }
        if self.queued == Some(id) {
            self.queued = None;
        }
        Ok(pattern)
    }

    /// Copy a pattern under a new id. The copy is named "<name> copy" unless a name is given.
    pub fn clone_pattern(&mut self, id: PatternId, name: Option<String>) -> EngineResult<PatternId> {
        let source = self.get(id)?.clone();
        let new_id = self.allocate_id();
        let mut copy = source;
        copy.id = new_id;
        copy.name = name.unwrap_or_else(|| format!("{} copy", copy.name));
        Ok(self.insert(copy))
    }

    pub fn import(&mut self, export: PatternExport) -> PatternId {
        let id = self.allocate_id();
        self.insert(Pattern::from_export(id, export))
    }

    pub fn export(&self, id: PatternId) -> EngineResult<PatternExport> {
        Ok(self.get(id)?.export())
    }

    pub fn current_id(&self) -> Option<PatternId> {
        self.current
    }

    pub fn current(&self) -> Option<&Pattern> {
        self.current.and_then(|id| self.patterns.get(&id))
    }

    /// Switch immediately. Clears any queued switch.
    pub fn set_current(&mut self, id: PatternId) -> EngineResult<()> {
        self.get(id)?;
        self.current = Some(id);
        self.queued = None;
        Ok(())
    }

    /// Queue a pattern to take over at the next boundary of the current one
    pub fn queue_next(&mut self, id: PatternId) -> EngineResult<()> {
        self.get(id)?;
        if self.current.is_none() {
            self.current = Some(id);
        } else {
            self.queued = Some(id);
        }
        Ok(())
    }

    pub fn queued_id(&self) -> Option<PatternId> {
        self.queued
    }

    pub fn cancel_queued(&mut self) {
        self.queued = None;
    }

    /// Make the queued pattern current. Returns the new current id.
    pub fn commit_queued(&mut self) -> Option<PatternId> {
        let next = self.queued.take()?;
        self.current = Some(next);
        Some(next)
    }

    pub fn add_note(&mut self, pattern: PatternId, data: NoteData) -> EngineResult<NoteId> {
        Ok(self.get_mut(pattern)?.add_note(data))
    }

    pub fn remove_note(&mut self, pattern: PatternId, note: NoteId) -> EngineResult<Note> {
        self.get_mut(pattern)?
            .remove_note(note)
            .ok_or(EngineError::UnknownNote { pattern, note })
    }

    pub fn update_note(
        &mut self,
        pattern: PatternId,
        note: NoteId,
        data: NoteData,
    ) -> EngineResult<()> {
        if self.get_mut(pattern)?.update_note(note, data) {
            Ok(())
        } else {
            Err(EngineError::UnknownNote { pattern, note })
        }
    }
}
