use std::collections::HashMap;

use crate::note::{NoteKey, NoteRef, SynthesisData};

/// The note sequence a task was created with, frozen at construction.
///
/// Neighbor indices in the request and note indices in the response are
/// positions in this snapshot and mean nothing outside it.
pub struct NoteSnapshot {
    notes: Vec<NoteRef>,
    index: HashMap<NoteKey, usize>,
    start_time: f64,
    end_time: f64,
}

impl NoteSnapshot {
    pub fn capture(data: &dyn SynthesisData) -> Self {
        Self::from_notes(data.notes())
    }

    pub fn from_notes(notes: Vec<NoteRef>) -> Self {
        let index = notes
            .iter()
            .enumerate()
            .map(|(i, note)| (NoteKey::of(note), i))
            .collect();
        let (start_time, end_time) = match (notes.first(), notes.last()) {
            (Some(first), Some(last)) => (first.start_time(), last.end_time()),
            _ => (0.0, 0.0),
        };
        Self {
            notes,
            index,
            start_time,
            end_time,
        }
    }

    pub fn notes(&self) -> &[NoteRef] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NoteRef> {
        self.notes.get(index)
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn index_of(&self, note: &NoteRef) -> Option<usize> {
        self.index.get(&NoteKey::of(note)).copied()
    }

    /// Maps a neighbor link to its position, or `None` when there is no
    /// neighbor or it lies outside this snapshot.
    pub fn resolve_neighbor(&self, neighbor: Option<NoteRef>) -> Option<usize> {
        neighbor.and_then(|note| self.index_of(&note))
    }
}
