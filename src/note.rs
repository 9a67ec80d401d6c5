//! Host-side data model seen by a synthesis task.
//!
//! Notes are shared as [`NoteRef`] and compared by pointer identity through
//! [`NoteKey`]: two structurally equal notes are still different notes.

use std::sync::Arc;

use crate::property::PropertyObject;

#[derive(Debug, Clone, PartialEq)]
pub struct Phoneme {
    pub symbol: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl Phoneme {
    pub fn new(symbol: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            symbol: symbol.into(),
            start_time,
            end_time,
        }
    }
}

pub trait SynthesisNote: Send + Sync {
    fn start_time(&self) -> f64;
    fn end_time(&self) -> f64;
    fn pitch(&self) -> i32;
    fn lyric(&self) -> &str;
    fn phonemes(&self) -> &[Phoneme];
    fn properties(&self) -> &PropertyObject;
    fn last(&self) -> Option<NoteRef>;
    fn next(&self) -> Option<NoteRef>;
}

pub type NoteRef = Arc<dyn SynthesisNote>;

/// Evaluates the part's pitch curve at arbitrary times. Times with no pitch
/// yield a non-finite value.
pub trait PitchSource: Send + Sync {
    fn values_at(&self, times: &[f64]) -> Vec<f64>;
}

/// One synthesis segment as provided by the host.
pub trait SynthesisData: Send + Sync {
    fn notes(&self) -> Vec<NoteRef>;
    fn pitch(&self) -> &dyn PitchSource;
    fn part_properties(&self) -> &PropertyObject;
}

/// Identity of a note: the address of its shared allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteKey(usize);

impl NoteKey {
    pub fn of(note: &NoteRef) -> Self {
        NoteKey(Arc::as_ptr(note) as *const () as usize)
    }
}
