//! Error types for the engine and its configuration

/// Errors returned by the engine's fallible entry points
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("session adapter failed: {0}")]
    Adapter(String),

    #[error("invalid command pattern table: {0}")]
    InvalidPatterns(String),

    #[error("engine has been shut down")]
    ShutDown,
}

/// Errors from loading the daemon configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("HOME is not set and VOICECMD_DATA_DIR was not provided")]
    MissingHome,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
