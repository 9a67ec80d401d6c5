//! In-memory implementation of the host data model.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::note::{NoteRef, Phoneme, PitchSource, SynthesisData, SynthesisNote};
use crate::property::PropertyObject;

pub struct SegmentNote {
    pub start_time: f64,
    pub end_time: f64,
    pub pitch: i32,
    pub lyric: String,
    pub phonemes: Vec<Phoneme>,
    pub properties: PropertyObject,
    last: Mutex<Weak<SegmentNote>>,
    next: Mutex<Weak<SegmentNote>>,
}

impl SegmentNote {
    pub fn new(start_time: f64, end_time: f64, pitch: i32, lyric: impl Into<String>) -> Arc<Self> {
        Self::build(start_time, end_time, pitch, lyric, Vec::new(), PropertyObject::new())
    }

    pub fn build(
        start_time: f64,
        end_time: f64,
        pitch: i32,
        lyric: impl Into<String>,
        phonemes: Vec<Phoneme>,
        properties: PropertyObject,
    ) -> Arc<Self> {
        Arc::new(Self {
            start_time,
            end_time,
            pitch,
            lyric: lyric.into(),
            phonemes,
            properties,
            last: Mutex::new(Weak::new()),
            next: Mutex::new(Weak::new()),
        })
    }

    /// Links consecutive notes to each other and returns them as shared refs.
    pub fn chain(notes: Vec<Arc<SegmentNote>>) -> Vec<NoteRef> {
        for pair in notes.windows(2) {
            pair[0].set_next(&pair[1]);
            pair[1].set_last(&pair[0]);
        }
        notes.into_iter().map(|note| note as NoteRef).collect()
    }

    pub fn set_last(&self, note: &Arc<SegmentNote>) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(note);
    }

    pub fn set_next(&self, note: &Arc<SegmentNote>) {
        *self.next.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(note);
    }

    fn upgrade(link: &Mutex<Weak<SegmentNote>>) -> Option<NoteRef> {
        link.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
            .map(|note| note as NoteRef)
    }
}

impl SynthesisNote for SegmentNote {
    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn end_time(&self) -> f64 {
        self.end_time
    }

    fn pitch(&self) -> i32 {
        self.pitch
    }

    fn lyric(&self) -> &str {
        &self.lyric
    }

    fn phonemes(&self) -> &[Phoneme] {
        &self.phonemes
    }

    fn properties(&self) -> &PropertyObject {
        &self.properties
    }

    fn last(&self) -> Option<NoteRef> {
        Self::upgrade(&self.last)
    }

    fn next(&self) -> Option<NoteRef> {
        Self::upgrade(&self.next)
    }
}

/// Piecewise-linear pitch curve in MIDI note units. Outside the first and
/// last point there is no pitch (NaN).
#[derive(Debug, Clone, Default)]
pub struct PitchCurve {
    points: Vec<(f64, f64)>,
}

impl PitchCurve {
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        points.retain(|(t, _)| t.is_finite());
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { points }
    }

    pub fn value_at(&self, time: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return f64::NAN;
        };
        if !time.is_finite() || time < first.0 || time > last.0 {
            return f64::NAN;
        }
        let upper = self.points.partition_point(|(t, _)| *t < time);
        if upper == 0 {
            return first.1;
        }
        let (t1, v1) = self.points[upper.min(self.points.len() - 1)];
        let (t0, v0) = self.points[upper - 1];
        if t1 <= t0 {
            return v1;
        }
        v0 + (v1 - v0) * (time - t0) / (t1 - t0)
    }
}

impl PitchSource for PitchCurve {
    fn values_at(&self, times: &[f64]) -> Vec<f64> {
        times.iter().map(|t| self.value_at(*t)).collect()
    }
}

pub struct Segment {
    pub notes: Vec<NoteRef>,
    pub pitch: PitchCurve,
    pub part_properties: PropertyObject,
}

impl Segment {
    pub fn new(notes: Vec<NoteRef>) -> Self {
        Self {
            notes,
            pitch: PitchCurve::default(),
            part_properties: PropertyObject::new(),
        }
    }

    pub fn with_pitch(mut self, pitch: PitchCurve) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_part_properties(mut self, properties: PropertyObject) -> Self {
        self.part_properties = properties;
        self
    }
}

impl SynthesisData for Segment {
    fn notes(&self) -> Vec<NoteRef> {
        self.notes.clone()
    }

    fn pitch(&self) -> &dyn PitchSource {
        &self.pitch
    }

    fn part_properties(&self) -> &PropertyObject {
        &self.part_properties
    }
}
