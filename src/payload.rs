//! The request document sent to the native engine, and its builder.

use crate::note::{NoteRef, SynthesisData};
use crate::pitch;
use crate::property::{convert_property_object, resolve_numeric_property};
use crate::snapshot::NoteSnapshot;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisTaskPayload {
    pub voice_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub style_shift: f64,
    #[serde(default)]
    pub waveform_style_shift: f64,
    pub part_properties: serde_json::Map<String, serde_json::Value>,
    pub notes: Vec<SynthesisNotePayload>,
    pub pitch: PitchPayload,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisNotePayload {
    pub start_time: f64,
    pub end_time: f64,
    pub pitch: i32,
    pub lyric: String,
    pub last_index: Option<usize>,
    pub next_index: Option<usize>,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub phonemes: Vec<SynthesisPhonemePayload>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisPhonemePayload {
    pub symbol: String,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchPayload {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

/// Assembles a [`SynthesisTaskPayload`] from a note snapshot and the
/// segment it was taken from. Only the pitch source and part properties are
/// read from `data`; notes always come from the snapshot.
pub struct PayloadBuilder<'a> {
    snapshot: &'a NoteSnapshot,
    data: &'a dyn SynthesisData,
    voice_id: &'a str,
}

impl<'a> PayloadBuilder<'a> {
    pub fn new(snapshot: &'a NoteSnapshot, data: &'a dyn SynthesisData, voice_id: &'a str) -> Self {
        Self {
            snapshot,
            data,
            voice_id,
        }
    }

    pub fn build(&self) -> SynthesisTaskPayload {
        let start_time = self.snapshot.start_time();
        let end_time = self.snapshot.end_time();
        let part_properties = self.data.part_properties();

        let notes = self
            .snapshot
            .notes()
            .iter()
            .map(|note| self.note_payload(note))
            .collect();

        let times = pitch::collect_pitch_times(start_time, end_time);
        let values = pitch::sample_pitch(self.data.pitch(), &times);

        SynthesisTaskPayload {
            voice_id: self.voice_id.to_string(),
            start_time,
            end_time,
            duration: (end_time - start_time).max(0.0),
            style_shift: resolve_numeric_property(part_properties, "styleshift"),
            waveform_style_shift: resolve_numeric_property(part_properties, "waveformstyleshift"),
            part_properties: convert_property_object(part_properties),
            notes,
            pitch: PitchPayload { times, values },
        }
    }

    fn note_payload(&self, note: &NoteRef) -> SynthesisNotePayload {
        SynthesisNotePayload {
            start_time: note.start_time(),
            end_time: note.end_time(),
            pitch: note.pitch(),
            lyric: note.lyric().to_string(),
            last_index: self.snapshot.resolve_neighbor(note.last()),
            next_index: self.snapshot.resolve_neighbor(note.next()),
            properties: convert_property_object(note.properties()),
            phonemes: note
                .phonemes()
                .iter()
                .map(|phoneme| SynthesisPhonemePayload {
                    symbol: phoneme.symbol.clone(),
                    start_time: phoneme.start_time,
                    end_time: phoneme.end_time,
                })
                .collect(),
        }
    }
}
