use std::ffi::{c_char, CString};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::bridge::{native_error_message, NativeString};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::logging::init_logging;
use crate::native::{CEngine, NativeApi};
use crate::voice::{parse_voice_catalog, VoiceSource, VoiceSourceInfo};

/// A live native engine instance, destroyed when the last reference drops.
///
/// Tasks hold an `Arc<NativeEngine>` so the engine outlives every call made
/// through it.
pub struct NativeEngine {
    api: Arc<dyn NativeApi>,
    ptr: NonNull<CEngine>,
}

// The engine serializes access internally; the pointer is only passed back
// to it.
unsafe impl Send for NativeEngine {}
unsafe impl Sync for NativeEngine {}

impl NativeEngine {
    pub fn create(api: Arc<dyn NativeApi>, engine_path: &Path) -> Result<Self, EngineError> {
        let path = CString::new(engine_path.to_string_lossy().into_owned())
            .map_err(|e| EngineError::Init(format!("Invalid engine path: {e}")))?;

        let mut error_ptr: *mut c_char = std::ptr::null_mut();
        let ptr = unsafe { api.create_engine(path.as_ptr(), &mut error_ptr) };
        let error = unsafe { NativeString::from_raw(api.as_ref(), error_ptr) };

        match NonNull::new(ptr) {
            Some(ptr) => {
                drop(error);
                Ok(Self { api, ptr })
            }
            None => Err(EngineError::Init(native_error_message(error.as_ref()))),
        }
    }

    pub fn api(&self) -> &dyn NativeApi {
        self.api.as_ref()
    }

    pub fn as_ptr(&self) -> *mut CEngine {
        self.ptr.as_ptr()
    }

    pub fn load_voice_sources(&self) -> Result<Vec<VoiceSourceInfo>, EngineError> {
        let api = self.api();
        let mut error_ptr: *mut c_char = std::ptr::null_mut();
        let voices_ptr = unsafe { api.load_voice_sources_json(self.as_ptr(), &mut error_ptr) };
        let error = unsafe { NativeString::from_raw(api, error_ptr) };
        let voices = unsafe { NativeString::from_raw(api, voices_ptr) };

        match voices {
            Some(voices) => parse_voice_catalog(&voices.to_string_lossy())
                .map_err(|e| EngineError::VoiceCatalog(format!("Failed to parse voice source payload: {e}"))),
            None => Err(EngineError::VoiceCatalog(native_error_message(error.as_ref()))),
        }
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        tracing::debug!("Destroying native engine");
        unsafe { self.api.destroy_engine(self.ptr.as_ptr()) }
    }
}

/// Owns the process-wide engine instance and the voice catalog it reports.
pub struct VoiceEngine {
    api: Arc<dyn NativeApi>,
    engine: Option<Arc<NativeEngine>>,
    voices: Vec<VoiceSourceInfo>,
    default_voice: Option<String>,
}

impl VoiceEngine {
    pub fn new(api: Arc<dyn NativeApi>) -> Self {
        Self {
            api,
            engine: None,
            voices: Vec::new(),
            default_voice: None,
        }
    }

    /// Installs logging with the configured filter, then creates and
    /// initializes an engine for the configured path. A logging setup that
    /// cannot be applied is reported and does not stop initialization.
    pub fn from_config(api: Arc<dyn NativeApi>, config: &EngineConfig) -> Result<Self, EngineError> {
        if let Err(e) = init_logging(&config.log_filter) {
            tracing::warn!(error = %e, "Keeping existing logging setup");
        }

        let mut engine = Self::new(api);
        engine.default_voice = config.default_voice.clone();
        engine.init(&config.engine_path)?;
        Ok(engine)
    }

    pub fn init(&mut self, engine_path: &Path) -> Result<(), EngineError> {
        tracing::info!(path = %engine_path.display(), "Initializing Neutrino Tau voice engine");
        self.destroy();

        let engine = Arc::new(NativeEngine::create(Arc::clone(&self.api), engine_path)?);
        let voices = match engine.load_voice_sources() {
            Ok(voices) => voices,
            Err(e) => {
                tracing::warn!(error = %e, "Voice catalog unavailable, releasing engine");
                return Err(e);
            }
        };

        tracing::info!(count = voices.len(), "Loaded voice sources");
        self.engine = Some(engine);
        self.voices = voices;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Releases this engine's reference and clears the catalog. Tasks still
    /// running keep the native engine alive until they finish.
    pub fn destroy(&mut self) {
        self.engine = None;
        self.voices.clear();
    }

    pub fn voice_infos(&self) -> &[VoiceSourceInfo] {
        &self.voices
    }

    pub fn voice_info(&self, id: &str) -> Option<&VoiceSourceInfo> {
        self.voices.iter().find(|voice| voice.id == id)
    }

    pub fn create_voice_source(&self, id: &str) -> VoiceSource {
        let description = self
            .voice_info(id)
            .map(|voice| voice.description.as_str())
            .unwrap_or_default();
        VoiceSource::new(id, description, Arc::clone(&self.api), self.engine.clone())
    }

    /// The configured default voice when the catalog has it, otherwise the
    /// first catalog entry. `None` for an empty catalog.
    pub fn default_voice_source(&self) -> Option<VoiceSource> {
        let id = self
            .default_voice
            .as_deref()
            .and_then(|id| self.voice_info(id))
            .or_else(|| self.voices.first())
            .map(|voice| voice.id.clone())?;
        Some(self.create_voice_source(&id))
    }
}
