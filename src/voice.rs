use std::sync::Arc;

use crate::engine::NativeEngine;
use crate::native::NativeApi;
use crate::note::SynthesisData;
use crate::task::SynthesisTask;

const DEFAULT_VOICE_NAME: &str = "Neutrino Tau";
const DEFAULT_VOICE_DESCRIPTION: &str = "Neutrino Tau voice source for extension development.";
const DEFAULT_LYRIC: &str = "a";

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VoiceSourceInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, serde::Deserialize)]
struct NativeVoiceSource {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

/// Parses the engine's voice catalog, skipping entries without an id or name.
pub fn parse_voice_catalog(json: &str) -> serde_json::Result<Vec<VoiceSourceInfo>> {
    let voices: Option<Vec<NativeVoiceSource>> = serde_json::from_str(json)?;
    Ok(voices
        .unwrap_or_default()
        .into_iter()
        .filter_map(|voice| {
            let id = voice.id.filter(|id| !id.trim().is_empty())?;
            let name = voice.name.filter(|name| !name.trim().is_empty())?;
            Some(VoiceSourceInfo {
                id,
                name,
                description: voice.description.unwrap_or_default(),
            })
        })
        .collect())
}

/// Editor-facing description of a numeric knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberConfig {
    pub default_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub is_integer: bool,
}

const STYLE_SHIFT_CONFIG: NumberConfig = NumberConfig {
    default_value: 0.0,
    min_value: -24.0,
    max_value: 24.0,
    is_integer: true,
};

/// Editor-facing description of an automation lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationConfig {
    pub name: &'static str,
    pub default_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub color: &'static str,
}

static PART_PROPERTIES: &[(&str, NumberConfig)] = &[
    ("styleShift", STYLE_SHIFT_CONFIG),
    ("waveformStyleShift", STYLE_SHIFT_CONFIG),
];

/// One voice of the engine, able to create synthesis tasks for it.
pub struct VoiceSource {
    id: String,
    description: String,
    api: Arc<dyn NativeApi>,
    engine: Option<Arc<NativeEngine>>,
}

impl VoiceSource {
    pub(crate) fn new(
        id: &str,
        description: &str,
        api: Arc<dyn NativeApi>,
        engine: Option<Arc<NativeEngine>>,
    ) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            api,
            engine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        if self.id.is_empty() {
            DEFAULT_VOICE_NAME
        } else {
            &self.id
        }
    }

    pub fn description(&self) -> &str {
        if self.id.is_empty() {
            DEFAULT_VOICE_DESCRIPTION
        } else {
            &self.description
        }
    }

    pub fn default_lyric(&self) -> &str {
        DEFAULT_LYRIC
    }

    pub fn part_properties(&self) -> &'static [(&'static str, NumberConfig)] {
        PART_PROPERTIES
    }

    pub fn note_properties(&self) -> &'static [(&'static str, NumberConfig)] {
        &[]
    }

    /// The engine has no automation lanes.
    pub fn automation_configs(&self) -> &'static [(&'static str, AutomationConfig)] {
        &[]
    }

    /// The engine renders a whole segment in one call, so segments are
    /// never split.
    pub fn segment<S>(&self, segment: S) -> Vec<S> {
        vec![segment]
    }

    /// Binds a new task to `data`. The note list is snapshotted now.
    pub fn create_synthesis_task(&self, data: Arc<dyn SynthesisData>) -> SynthesisTask {
        SynthesisTask::new(data, Arc::clone(&self.api), self.engine.clone(), &self.id)
    }
}
