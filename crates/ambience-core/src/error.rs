//! Error types for the ambient effect engine.

use thiserror::Error;

use crate::catalog::CatalogKind;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no generator registered for {catalog} `{id}`")]
    UnknownEffect { catalog: CatalogKind, id: String },

    #[error("mounting surface unavailable: {0}")]
    MissingMountSurface(String),

    #[error("generator for `{id}` failed: {reason}")]
    GeneratorFault { id: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn fault(id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::GeneratorFault {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
