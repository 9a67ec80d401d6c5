//! The response document returned by the native engine.

use crate::error::SynthesisError;
use crate::pitch::NO_PITCH;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesisResponse {
    pub start_time: f64,
    pub sample_rate: i32,
    pub sample_count: i32,
    pub samples: Vec<f32>,
    pub pitch_times: Vec<LooseF64>,
    pub pitch_values: Vec<LooseF64>,
    pub note_phonemes: Vec<NotePhonemes>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotePhonemes {
    pub note_index: i64,
    pub phonemes: Vec<ResponsePhoneme>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponsePhoneme {
    pub symbol: String,
    pub start_time: LooseF64,
    pub end_time: LooseF64,
}

/// Decodes response text. Blank text and malformed JSON are protocol
/// failures.
pub fn decode_response(json: &str) -> Result<SynthesisResponse, SynthesisError> {
    if json.trim().is_empty() {
        return Err(SynthesisError::EmptyResponse);
    }
    serde_json::from_str(json).map_err(SynthesisError::InvalidResponse)
}

/// A float that tolerates the ways JSON writers spell "not a number":
/// `null`, `"NaN"`, `"Infinity"`, and the [`NO_PITCH`] sentinel all decode
/// as non-finite.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LooseF64(pub f64);

impl LooseF64 {
    pub fn get(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl<'de> serde::Deserialize<'de> for LooseF64 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(normalize_loose_f64)
                .map(LooseF64)
                .ok_or_else(|| serde::de::Error::custom("invalid float value")),
            serde_json::Value::String(s) => match s.as_str() {
                "NaN" => Ok(LooseF64(f64::NAN)),
                "Infinity" | "+Infinity" => Ok(LooseF64(f64::INFINITY)),
                "-Infinity" => Ok(LooseF64(f64::NEG_INFINITY)),
                _ => s
                    .parse::<f64>()
                    .map(normalize_loose_f64)
                    .map(LooseF64)
                    .map_err(|_| serde::de::Error::custom("invalid float string")),
            },
            serde_json::Value::Null => Ok(LooseF64(f64::NAN)),
            _ => Err(serde::de::Error::custom("invalid float type")),
        }
    }
}

impl serde::Serialize for LooseF64 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_f64(NO_PITCH)
        }
    }
}

fn normalize_loose_f64(value: f64) -> f64 {
    if value == NO_PITCH {
        f64::NAN
    } else {
        value
    }
}
