/// Errors raised while running a single synthesis task.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Native engine is not initialized.")]
    EngineNotInitialized,

    #[error("Failed to create native cancel token.")]
    CancelTokenUnavailable,

    /// Error text reported by the native engine, passed through verbatim.
    #[error("{0}")]
    Native(String),

    #[error("Native synthesis response is empty.")]
    EmptyResponse,

    #[error("Failed to parse native synthesis response: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("Failed to encode synthesis payload: {0}")]
    Encode(String),

    #[error("Synthesis cancelled")]
    Cancelled,

    #[error("Synthesis worker panicked: {0}")]
    Panicked(String),
}

/// Errors raised while bringing up the native engine and its voice catalog.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to initialize native engine: {0}")]
    Init(String),

    #[error("Failed to load voice sources: {0}")]
    VoiceCatalog(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter `{filter}`: {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("logging already initialized with filter `{current}`; refusing to switch to `{requested}`")]
    Conflicting { current: String, requested: String },

    #[error("Failed to install log subscriber: {0}")]
    Install(String),
}
