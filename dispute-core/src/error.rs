use thiserror::Error;

use crate::generation::GenerationError;
use crate::inference::InferenceError;

/// Startup failures: any of these stops the process before work begins.
#[derive(Error, Debug)]
pub enum DisputeError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Generation client error: {0}")]
    Generation(#[from] GenerationError),
}
