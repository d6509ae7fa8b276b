//! Crate error type
//!
//! Only setup paths (loading configuration or save data) can fail. Runtime
//! anomalies inside the simulation are logged and recovered, never returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration parsed but describes an unusable simulation
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// JSON could not be parsed
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
