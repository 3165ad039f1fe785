pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, LlmProvider};
pub use error::BrandPulseError;
pub use types::*;
