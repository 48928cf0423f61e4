use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Progress {value} is out of range (last recorded {last})")]
    OutOfRange { value: f64, last: f64 },

    #[error("Invalid run mode: {0}")]
    InvalidMode(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PluginError {
    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
