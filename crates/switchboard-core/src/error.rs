use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("not initialized: run 'switchboard init'")]
    NotInitialized,

    #[error("unknown signal type: {0}")]
    UnknownSignalType(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("duplicate channel id: {0}")]
    DuplicateChannel(String),

    #[error("invalid channel id '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidChannelId(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    #[error("event store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("handler for '{signal_type}' failed: {message}")]
    HandlerExecution {
        signal_type: String,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
