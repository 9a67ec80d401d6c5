//! Rebuilds a [`SynthesisResult`] from a decoded response, re-attaching
//! note indices to the snapshot's notes.

use std::collections::HashMap;

use crate::note::{NoteKey, NoteRef};
use crate::response::{LooseF64, NotePhonemes, SynthesisResponse};
use crate::snapshot::NoteSnapshot;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedPhoneme {
    pub symbol: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// Synthesized phonemes keyed by note identity.
#[derive(Clone, Default)]
pub struct NotePhonemeMap {
    entries: HashMap<NoteKey, (NoteRef, Vec<SynthesizedPhoneme>)>,
}

impl NotePhonemeMap {
    pub fn get(&self, note: &NoteRef) -> Option<&[SynthesizedPhoneme]> {
        self.entries
            .get(&NoteKey::of(note))
            .map(|(_, phonemes)| phonemes.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NoteRef, &[SynthesizedPhoneme])> {
        self.entries
            .values()
            .map(|(note, phonemes)| (note, phonemes.as_slice()))
    }

    fn insert(&mut self, note: &NoteRef, phonemes: Vec<SynthesizedPhoneme>) {
        self.entries
            .insert(NoteKey::of(note), (NoteRef::clone(note), phonemes));
    }
}

impl std::fmt::Debug for NotePhonemeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, (_, phonemes))| (key, phonemes)))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub start_time: f64,
    pub sample_rate: i32,
    pub samples: Vec<f32>,
    /// Either empty or a single ordered line.
    pub synthesized_pitch: Vec<Vec<Point>>,
    pub synthesized_phonemes: NotePhonemeMap,
}

pub fn reconcile(snapshot: &NoteSnapshot, response: SynthesisResponse) -> SynthesisResult {
    let synthesized_pitch = build_synthesized_pitch(&response.pitch_times, &response.pitch_values);
    let synthesized_phonemes = build_synthesized_phonemes(snapshot, &response.note_phonemes);
    let samples = if response.samples.is_empty() {
        vec![0.0; response.sample_count.max(0) as usize]
    } else {
        response.samples
    };

    SynthesisResult {
        start_time: response.start_time,
        sample_rate: response.sample_rate,
        samples,
        synthesized_pitch,
        synthesized_phonemes,
    }
}

pub fn build_synthesized_pitch(times: &[LooseF64], values: &[LooseF64]) -> Vec<Vec<Point>> {
    let line: Vec<Point> = times
        .iter()
        .zip(values)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| Point::new(x.get(), y.get()))
        .collect();

    if line.is_empty() {
        Vec::new()
    } else {
        vec![line]
    }
}

pub fn build_synthesized_phonemes(
    snapshot: &NoteSnapshot,
    note_phonemes: &[NotePhonemes],
) -> NotePhonemeMap {
    let mut map = NotePhonemeMap::default();

    for entry in note_phonemes {
        let Some(note) = usize::try_from(entry.note_index)
            .ok()
            .and_then(|index| snapshot.get(index))
        else {
            continue;
        };

        let phonemes: Vec<SynthesizedPhoneme> = entry
            .phonemes
            .iter()
            .filter(|p| {
                !p.symbol.trim().is_empty()
                    && p.start_time.is_finite()
                    && p.end_time.is_finite()
                    && p.end_time.get() > p.start_time.get()
            })
            .map(|p| SynthesizedPhoneme {
                symbol: p.symbol.clone(),
                start_time: p.start_time.get(),
                end_time: p.end_time.get(),
            })
            .collect();

        if !phonemes.is_empty() {
            map.insert(note, phonemes);
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::decode_response;
    use crate::segment::SegmentNote;

    fn loose(values: &[f64]) -> Vec<LooseF64> {
        values.iter().copied().map(LooseF64).collect()
    }

    #[test]
    fn pitch_drops_non_finite_pairs() {
        let line = build_synthesized_pitch(&loose(&[0.0, 1.0, 2.0]), &loose(&[100.0, f64::NAN, 102.0]));
        assert_eq!(line, vec![vec![Point::new(0.0, 100.0), Point::new(2.0, 102.0)]]);
    }

    #[test]
    fn pitch_pairs_up_to_shorter_array() {
        let line = build_synthesized_pitch(&loose(&[0.0, 1.0, 2.0]), &loose(&[50.0]));
        assert_eq!(line, vec![vec![Point::new(0.0, 50.0)]]);
    }

    #[test]
    fn pitch_with_nothing_left_is_empty() {
        assert!(build_synthesized_pitch(&loose(&[0.0]), &loose(&[f64::INFINITY])).is_empty());
        assert!(build_synthesized_pitch(&[], &[]).is_empty());
    }

    #[test]
    fn empty_symbol_phoneme_is_dropped() {
        let note = SegmentNote::new(0.0, 0.2, 60, "a") as NoteRef;
        let snapshot = NoteSnapshot::from_notes(vec![note.clone()]);
        let response = decode_response(
            r#"{"notePhonemes":[{"noteIndex":0,"phonemes":[
                {"symbol":"a","startTime":0,"endTime":0.1},
                {"symbol":"","startTime":0.1,"endTime":0.2}]}]}"#,
        )
        .unwrap();

        let map = build_synthesized_phonemes(&snapshot, &response.note_phonemes);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get(&note).unwrap(),
            &[SynthesizedPhoneme {
                symbol: "a".into(),
                start_time: 0.0,
                end_time: 0.1
            }]
        );
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let note = SegmentNote::new(0.0, 0.2, 60, "a") as NoteRef;
        let snapshot = NoteSnapshot::from_notes(vec![note]);
        let response = decode_response(
            r#"{"notePhonemes":[
                {"noteIndex":1,"phonemes":[{"symbol":"a","startTime":0,"endTime":0.1}]},
                {"noteIndex":-1,"phonemes":[{"symbol":"a","startTime":0,"endTime":0.1}]}]}"#,
        )
        .unwrap();
        assert!(build_synthesized_phonemes(&snapshot, &response.note_phonemes).is_empty());
    }

    #[test]
    fn invalid_timings_are_filtered_and_empty_notes_omitted() {
        let notes = SegmentNote::chain(vec![
            SegmentNote::new(0.0, 0.2, 60, "a"),
            SegmentNote::new(0.0, 0.2, 60, "a"),
        ]);
        let snapshot = NoteSnapshot::from_notes(notes.clone());
        let response = decode_response(
            r#"{"notePhonemes":[
                {"noteIndex":0,"phonemes":[
                    {"symbol":"a","startTime":0.2,"endTime":0.2},
                    {"symbol":"a","startTime":null,"endTime":0.2}]},
                {"noteIndex":1,"phonemes":[{"symbol":"i","startTime":0,"endTime":0.1}]}]}"#,
        )
        .unwrap();

        let map = build_synthesized_phonemes(&snapshot, &response.note_phonemes);
        assert!(map.get(&notes[0]).is_none());
        assert_eq!(map.get(&notes[1]).map(|p| p[0].symbol.as_str()), Some("i"));
    }

    #[test]
    fn silent_buffer_when_samples_missing() {
        let snapshot = NoteSnapshot::from_notes(Vec::new());
        let response = decode_response(r#"{"startTime":1.5,"sampleRate":44100,"sampleCount":4}"#).unwrap();
        let result = reconcile(&snapshot, response);
        assert_eq!(result.start_time, 1.5);
        assert_eq!(result.samples, vec![0.0; 4]);
        assert!(result.synthesized_pitch.is_empty());
    }
}
