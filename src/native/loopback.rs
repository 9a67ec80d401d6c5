//! In-process engine that speaks the native contract without the native
//! library. It renders plain sine tones per note, echoes the pitch curve and
//! the note phonemes, and keeps a registry of everything it hands out so that
//! leaks and foreign frees can be counted.

use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{CEngine, CancelToken, NativeApi};
use crate::payload::{SynthesisNotePayload, SynthesisTaskPayload};
use crate::pitch::NO_PITCH;
use crate::response::{LooseF64, NotePhonemes, ResponsePhoneme, SynthesisResponse};

const DEFAULT_SAMPLE_RATE: i32 = 44_100;
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(1);
const DEFAULT_VOICE_CATALOG: &str =
    r#"[{"id":"loopback","name":"Loopback","description":"In-process sine renderer"}]"#;

/// What [`LoopbackNative::synthesize`] does with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopbackBehavior {
    Render,
    /// Fail with this error text.
    Fail(String),
    /// Fail without writing an error string.
    FailSilently,
    /// Return this text verbatim as the result.
    Respond(String),
    /// Block until the call's cancel token is cancelled, then fail.
    HoldUntilCancelled,
    /// Block until the call's cancel token is cancelled, then render and
    /// succeed anyway.
    RenderAfterCancel,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopbackStats {
    pub engines_created: usize,
    pub engines_destroyed: usize,
    pub tokens_created: Vec<u64>,
    pub tokens_cancelled: Vec<u64>,
    pub tokens_destroyed: Vec<u64>,
    pub strings_allocated: usize,
    pub strings_freed: usize,
    /// Frees, cancels or destroys of pointers the engine does not own (any
    /// more).
    pub invalid_releases: usize,
    pub synthesize_calls: usize,
}

impl LoopbackStats {
    pub fn leaked_strings(&self) -> usize {
        self.strings_allocated.saturating_sub(self.strings_freed)
    }

    pub fn live_tokens(&self) -> usize {
        self.tokens_created.len().saturating_sub(self.tokens_destroyed.len())
    }
}

struct LoopbackEngine {
    _engine_path: String,
}

struct LoopbackToken {
    id: u64,
    cancelled: AtomicBool,
}

#[derive(Default)]
struct Registry {
    engines: HashSet<usize>,
    tokens: HashSet<usize>,
    strings: HashSet<usize>,
    stats: LoopbackStats,
}

pub struct LoopbackNative {
    behavior: Mutex<LoopbackBehavior>,
    voice_catalog: String,
    engine_error: Option<String>,
    registry: Mutex<Registry>,
    next_token_id: AtomicU64,
    refuse_tokens: AtomicBool,
}

impl Default for LoopbackNative {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNative {
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(LoopbackBehavior::Render),
            voice_catalog: DEFAULT_VOICE_CATALOG.to_string(),
            engine_error: None,
            registry: Mutex::new(Registry::default()),
            next_token_id: AtomicU64::new(1),
            refuse_tokens: AtomicBool::new(false),
        }
    }

    pub fn with_behavior(self, behavior: LoopbackBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    /// Raw JSON returned by `load_voice_sources_json`.
    pub fn with_voice_catalog(mut self, json: impl Into<String>) -> Self {
        self.voice_catalog = json.into();
        self
    }

    /// Makes `create_engine` fail with this message.
    pub fn with_engine_error(mut self, message: impl Into<String>) -> Self {
        self.engine_error = Some(message.into());
        self
    }

    pub fn set_behavior(&self, behavior: LoopbackBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// While set, `create_cancel_token` returns null.
    pub fn set_refuse_tokens(&self, refuse: bool) {
        self.refuse_tokens.store(refuse, Ordering::SeqCst);
    }

    pub fn stats(&self) -> LoopbackStats {
        self.registry().stats.clone()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn behavior(&self) -> LoopbackBehavior {
        self.behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn create_c_string(&self, s: &str) -> *mut c_char {
        let cstring = CString::new(s.replace('\0', "")).unwrap_or_default();
        let ptr = cstring.into_raw();
        let mut registry = self.registry();
        registry.strings.insert(ptr as usize);
        registry.stats.strings_allocated += 1;
        ptr
    }

    unsafe fn write_error(&self, err: *mut *mut c_char, message: &str) {
        if !err.is_null() {
            unsafe {
                *err = self.create_c_string(message);
            }
        }
    }

    fn token_is_live(&self, token: *const CancelToken) -> bool {
        self.registry().tokens.contains(&(token as usize))
    }

    unsafe fn render(&self, payload_json: &str, err: *mut *mut c_char) -> *mut c_char {
        match render_task_json(payload_json) {
            Ok(json) => self.create_c_string(&json),
            Err(e) => {
                unsafe { self.write_error(err, &format!("{e:#}")) };
                std::ptr::null_mut()
            }
        }
    }

    fn hold_until_cancelled(token: &LoopbackToken) {
        while !token.cancelled.load(Ordering::SeqCst) {
            std::thread::sleep(CANCEL_POLL_INTERVAL);
        }
    }
}

impl NativeApi for LoopbackNative {
    unsafe fn create_engine(
        &self,
        engine_path: *const c_char,
        err: *mut *mut c_char,
    ) -> *mut CEngine {
        if engine_path.is_null() {
            unsafe { self.write_error(err, "Engine path is null") };
            return std::ptr::null_mut();
        }
        let engine_path = match unsafe { CStr::from_ptr(engine_path) }.to_str() {
            Ok(s) => s.to_string(),
            Err(_) => {
                unsafe { self.write_error(err, "Invalid engine path string") };
                return std::ptr::null_mut();
            }
        };
        if let Some(message) = &self.engine_error {
            unsafe { self.write_error(err, &format!("Failed to create engine: {message}")) };
            return std::ptr::null_mut();
        }

        let ptr = Box::into_raw(Box::new(LoopbackEngine {
            _engine_path: engine_path,
        }));
        let mut registry = self.registry();
        registry.engines.insert(ptr as usize);
        registry.stats.engines_created += 1;
        ptr.cast()
    }

    unsafe fn load_voice_sources_json(
        &self,
        engine: *mut CEngine,
        err: *mut *mut c_char,
    ) -> *mut c_char {
        if !self.registry().engines.contains(&(engine as usize)) {
            unsafe { self.write_error(err, "Engine is null") };
            return std::ptr::null_mut();
        }
        self.create_c_string(&self.voice_catalog)
    }

    unsafe fn destroy_engine(&self, engine: *mut CEngine) {
        let mut registry = self.registry();
        if registry.engines.remove(&(engine as usize)) {
            registry.stats.engines_destroyed += 1;
            drop(unsafe { Box::from_raw(engine.cast::<LoopbackEngine>()) });
        } else {
            registry.stats.invalid_releases += 1;
        }
    }

    fn create_cancel_token(&self) -> *mut CancelToken {
        if self.refuse_tokens.load(Ordering::SeqCst) {
            return std::ptr::null_mut();
        }
        let id = self.next_token_id.fetch_add(1, Ordering::SeqCst);
        let ptr = Box::into_raw(Box::new(LoopbackToken {
            id,
            cancelled: AtomicBool::new(false),
        }));
        let mut registry = self.registry();
        registry.tokens.insert(ptr as usize);
        registry.stats.tokens_created.push(id);
        ptr.cast()
    }

    unsafe fn cancel_token_cancel(&self, token: *mut CancelToken) {
        let mut registry = self.registry();
        if !registry.tokens.contains(&(token as usize)) {
            registry.stats.invalid_releases += 1;
            return;
        }
        let token = unsafe { &*token.cast::<LoopbackToken>() };
        token.cancelled.store(true, Ordering::SeqCst);
        registry.stats.tokens_cancelled.push(token.id);
    }

    unsafe fn destroy_cancel_token(&self, token: *mut CancelToken) {
        let mut registry = self.registry();
        if registry.tokens.remove(&(token as usize)) {
            let token = unsafe { Box::from_raw(token.cast::<LoopbackToken>()) };
            registry.stats.tokens_destroyed.push(token.id);
        } else {
            registry.stats.invalid_releases += 1;
        }
    }

    unsafe fn synthesize(
        &self,
        engine: *mut CEngine,
        synthesis_task_json: *const c_char,
        cancel_token: *const CancelToken,
        err: *mut *mut c_char,
    ) -> *mut c_char {
        self.registry().stats.synthesize_calls += 1;

        if !self.registry().engines.contains(&(engine as usize)) {
            unsafe { self.write_error(err, "Engine is null") };
            return std::ptr::null_mut();
        }
        if synthesis_task_json.is_null() {
            unsafe { self.write_error(err, "Synthesis task payload is null") };
            return std::ptr::null_mut();
        }
        let payload_json = match unsafe { CStr::from_ptr(synthesis_task_json) }.to_str() {
            Ok(s) => s,
            Err(_) => {
                unsafe { self.write_error(err, "Synthesis task payload is not valid UTF-8") };
                return std::ptr::null_mut();
            }
        };
        if !self.token_is_live(cancel_token) {
            unsafe { self.write_error(err, "Cancel token is not live") };
            return std::ptr::null_mut();
        }
        let token = unsafe { &*cancel_token.cast::<LoopbackToken>() };
        if token.cancelled.load(Ordering::SeqCst) {
            unsafe { self.write_error(err, "Synthesis cancelled") };
            return std::ptr::null_mut();
        }

        match self.behavior() {
            LoopbackBehavior::Render => unsafe { self.render(payload_json, err) },
            LoopbackBehavior::Fail(message) => {
                unsafe { self.write_error(err, &message) };
                std::ptr::null_mut()
            }
            LoopbackBehavior::FailSilently => std::ptr::null_mut(),
            LoopbackBehavior::Respond(text) => self.create_c_string(&text),
            LoopbackBehavior::HoldUntilCancelled => {
                Self::hold_until_cancelled(token);
                unsafe { self.write_error(err, "Synthesis cancelled") };
                std::ptr::null_mut()
            }
            LoopbackBehavior::RenderAfterCancel => {
                Self::hold_until_cancelled(token);
                unsafe { self.render(payload_json, err) }
            }
        }
    }

    unsafe fn free_c_string(&self, cstr: *mut c_char) {
        if cstr.is_null() {
            return;
        }
        let mut registry = self.registry();
        if registry.strings.remove(&(cstr as usize)) {
            registry.stats.strings_freed += 1;
            drop(unsafe { CString::from_raw(cstr) });
        } else {
            registry.stats.invalid_releases += 1;
        }
    }
}

impl Drop for LoopbackNative {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for ptr in registry.strings.drain() {
            drop(unsafe { CString::from_raw(ptr as *mut c_char) });
        }
        for ptr in registry.tokens.drain() {
            drop(unsafe { Box::from_raw(ptr as *mut LoopbackToken) });
        }
        for ptr in registry.engines.drain() {
            drop(unsafe { Box::from_raw(ptr as *mut LoopbackEngine) });
        }
    }
}

/// Renders a request document into a response document.
pub fn render_task_json(payload_json: &str) -> anyhow::Result<String> {
    let payload: SynthesisTaskPayload = serde_json::from_str(payload_json)
        .map_err(|e| anyhow::anyhow!("Failed to parse synthesis task payload: {}", e))?;

    let sample_rate = DEFAULT_SAMPLE_RATE;
    let duration = if payload.duration.is_finite() {
        payload.duration
    } else {
        payload.end_time - payload.start_time
    };
    let sample_count = sample_count_for(duration.max(0.0), sample_rate);
    let samples = render_sine_tones(
        &payload.notes,
        sample_count as usize,
        sample_rate,
        payload.start_time,
    );

    let (pitch_times, pitch_values): (Vec<LooseF64>, Vec<LooseF64>) = payload
        .pitch
        .times
        .iter()
        .zip(&payload.pitch.values)
        .filter(|(time, value)| time.is_finite() && value.is_finite() && **value != NO_PITCH)
        .map(|(time, value)| (LooseF64(*time), LooseF64(*value)))
        .unzip();

    let response = SynthesisResponse {
        start_time: payload.start_time,
        sample_rate,
        sample_count,
        samples,
        pitch_times,
        pitch_values,
        note_phonemes: echo_note_phonemes(&payload.notes),
    };

    serde_json::to_string(&response)
        .map_err(|e| anyhow::anyhow!("Failed to serialize synthesis response: {}", e))
}

fn echo_note_phonemes(notes: &[SynthesisNotePayload]) -> Vec<NotePhonemes> {
    notes
        .iter()
        .enumerate()
        .filter_map(|(index, note)| {
            let phonemes: Vec<ResponsePhoneme> = if note.phonemes.is_empty() {
                if note.lyric.trim().is_empty() {
                    return None;
                }
                vec![ResponsePhoneme {
                    symbol: note.lyric.clone(),
                    start_time: LooseF64(note.start_time),
                    end_time: LooseF64(note.end_time),
                }]
            } else {
                note.phonemes
                    .iter()
                    .map(|p| ResponsePhoneme {
                        symbol: p.symbol.clone(),
                        start_time: LooseF64(p.start_time),
                        end_time: LooseF64(p.end_time),
                    })
                    .collect()
            };
            Some(NotePhonemes {
                note_index: index as i64,
                phonemes,
            })
        })
        .collect()
}

const TONE_AMPLITUDE: f32 = 0.12;
const MAX_FADE_SAMPLES: usize = 32;

/// One note rendered as a plain sine with short linear fades at both ends.
struct SineTone {
    frequency: f32,
    first: usize,
    end: usize,
}

impl SineTone {
    /// `None` for notes that are empty, non-finite or outside the buffer.
    fn for_note(note: &SynthesisNotePayload, origin: f64, sample_rate: i32, len: usize) -> Option<Self> {
        if !(note.start_time.is_finite() && note.end_time.is_finite()) || note.end_time <= note.start_time {
            return None;
        }
        let rate = f64::from(sample_rate);
        let first = ((note.start_time - origin) * rate).floor().max(0.0) as usize;
        let end = (((note.end_time - origin) * rate).ceil().max(0.0) as usize).min(len);
        let frequency = 440.0 * 2.0_f32.powf((note.pitch - 69) as f32 / 12.0);
        (first < end && frequency.is_finite() && frequency > 0.0).then_some(Self {
            frequency,
            first,
            end,
        })
    }

    fn gain_at(&self, index: usize) -> f32 {
        let fade = ((self.end - self.first) / 2).min(MAX_FADE_SAMPLES);
        let edge = (index - self.first).min(self.end - index - 1);
        if fade == 0 || edge >= fade {
            TONE_AMPLITUDE
        } else {
            TONE_AMPLITUDE * edge as f32 / fade as f32
        }
    }

    fn mix_into(&self, buffer: &mut [f32], note_start: f64, origin: f64, sample_rate: i32) {
        let phase_step = std::f32::consts::TAU * self.frequency / sample_rate as f32;
        let offset = ((origin - note_start) * f64::from(sample_rate)) as f32;
        for (index, sample) in buffer.iter_mut().enumerate().take(self.end).skip(self.first) {
            let phase = phase_step * (index as f32 + offset);
            *sample += phase.sin() * self.gain_at(index);
        }
    }
}

fn render_sine_tones(
    notes: &[SynthesisNotePayload],
    len: usize,
    sample_rate: i32,
    origin: f64,
) -> Vec<f32> {
    let mut buffer = vec![0.0_f32; len];
    if sample_rate <= 0 {
        return buffer;
    }
    for note in notes {
        if let Some(tone) = SineTone::for_note(note, origin, sample_rate, len) {
            tone.mix_into(&mut buffer, note.start_time, origin, sample_rate);
        }
    }
    buffer.iter_mut().for_each(|sample| *sample = sample.clamp(-1.0, 1.0));
    buffer
}

/// Samples covering `duration` seconds, saturating at `i32::MAX`.
fn sample_count_for(duration: f64, sample_rate: i32) -> i32 {
    let count = (duration * f64::from(sample_rate)).round();
    if count.is_nan() || count <= 0.0 {
        0
    } else {
        count.min(f64::from(i32::MAX)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::decode_response;

    #[test]
    fn render_echoes_pitch_without_sentinels() {
        let payload = r#"{
            "voiceId": "loopback",
            "startTime": 0.0,
            "endTime": 0.02,
            "duration": 0.02,
            "partProperties": {},
            "notes": [],
            "pitch": { "times": [0.0, 0.01, 0.02], "values": [60.0, -1.7976931348623157e308, 61.0] }
        }"#;

        let response = decode_response(&render_task_json(payload).expect("must render")).unwrap();
        assert_eq!(response.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(response.sample_count, 882);
        assert_eq!(response.pitch_times, vec![LooseF64(0.0), LooseF64(0.02)]);
        assert_eq!(response.pitch_values, vec![LooseF64(60.0), LooseF64(61.0)]);
    }

    #[test]
    fn note_based_sine_samples_are_generated() {
        let notes = vec![SynthesisNotePayload {
            start_time: 0.0,
            end_time: 0.5,
            pitch: 69,
            lyric: "a".into(),
            last_index: None,
            next_index: Some(1),
            properties: serde_json::Map::new(),
            phonemes: vec![],
        }];
        let samples = render_sine_tones(&notes, 128, 44_100, 0.0);
        assert_eq!(samples.len(), 128);
        assert!(samples.iter().any(|x| x.abs() > 0.0));

        let echoed = echo_note_phonemes(&notes);
        assert_eq!(echoed.len(), 1);
        assert_eq!(echoed[0].phonemes[0].symbol, "a");
    }

    #[test]
    fn tones_fade_in_and_skip_notes_outside_the_buffer() {
        let note = |start_time, end_time| SynthesisNotePayload {
            start_time,
            end_time,
            pitch: 69,
            lyric: "a".into(),
            last_index: None,
            next_index: None,
            properties: serde_json::Map::new(),
            phonemes: vec![],
        };
        let samples = render_sine_tones(&[note(0.0, 1.0)], 64, 44_100, 0.0);
        assert_eq!(samples[0], 0.0);
        assert!(samples.iter().all(|x| x.abs() <= TONE_AMPLITUDE));

        let silent = render_sine_tones(&[note(2.0, 3.0), note(0.5, 0.5)], 64, 44_100, 0.0);
        assert!(silent.iter().all(|x| *x == 0.0));

        assert_eq!(sample_count_for(1e12, 44_100), i32::MAX);
        assert_eq!(sample_count_for(f64::NAN, 44_100), 0);
    }

    #[test]
    fn freeing_foreign_pointer_is_counted_not_performed() {
        let native = LoopbackNative::new();
        let mut foreign = CString::new("x").unwrap().into_bytes_with_nul();
        unsafe { native.free_c_string(foreign.as_mut_ptr().cast()) };
        assert_eq!(native.stats().invalid_releases, 1);
        assert_eq!(native.stats().strings_freed, 0);
    }
}
