//! Error types for the ranging and localization engines.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid identity scope '{0}'")]
    InvalidIdentity(String),

    #[error("no active ranging session")]
    NotRanging,

    #[error("capture window must be at least one second, got {0}s")]
    InvalidWindow(u32),

    #[error("no training samples for plan '{plan_id}'")]
    NoTrainingData { plan_id: String },

    #[error("no window medians available to save")]
    NoMedians,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("beacon scanner error: {0}")]
    Scanner(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
