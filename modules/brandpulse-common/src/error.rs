use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BrandPulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A stage was asked to run without the inputs it depends on.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Unparseable model reply: {0}")]
    Parse(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
