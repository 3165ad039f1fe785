use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::BrandPulseError;

/// Which provider backs the text oracles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    Claude,
}

impl LlmProvider {
    fn parse(raw: &str) -> Result<Self, BrandPulseError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(LlmProvider::Gemini),
            "claude" | "anthropic" => Ok(LlmProvider::Claude),
            other => Err(BrandPulseError::Config(format!(
                "LLM_PROVIDER must be 'gemini' or 'claude', got '{other}'"
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Scraping
    pub apify_api_token: String,
    pub scraping_timeout: Duration,

    // AI providers
    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    /// Model for query expansion and taxonomy generation.
    pub llm_model: String,
    /// Cheaper model for per-post verification and labeling.
    pub llm_lite_model: String,

    // Limits
    /// How many posts a scraping run aims to collect.
    pub max_results: usize,
    /// Ceiling for the per-source limit in the widening loop.
    pub max_actor_results: u32,
    pub verify_relevance: bool,

    // Runtime
    pub data_dir: PathBuf,
    pub job_workers: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, BrandPulseError> {
        let llm_provider = LlmProvider::parse(&optional_env("LLM_PROVIDER", "gemini"))?;
        let (key_var, default_model, default_lite) = match llm_provider {
            LlmProvider::Gemini => ("GEMINI_API_KEY", "gemini-2.5-flash", "gemini-2.5-flash-lite"),
            LlmProvider::Claude => (
                "ANTHROPIC_API_KEY",
                "claude-sonnet-4-20250514",
                "claude-3-5-haiku-20241022",
            ),
        };

        Ok(Self {
            apify_api_token: required_env("APIFY_API_TOKEN")?,
            scraping_timeout: Duration::from_secs(parsed_env("SCRAPING_TIMEOUT", 300)?),
            llm_provider,
            llm_api_key: required_env(key_var)?,
            llm_model: optional_env("LLM_MODEL", default_model),
            llm_lite_model: optional_env("LLM_LITE_MODEL", default_lite),
            max_results: parsed_env("MAX_RESULTS", 20)?,
            max_actor_results: parsed_env("MAX_ACTOR_RESULTS", 100)?,
            verify_relevance: parsed_env("VERIFY_RELEVANCE", true)?,
            data_dir: Self::data_dir_from_env(),
            job_workers: parsed_env("JOB_WORKERS", 2)?,
        })
    }

    /// Job storage directory. Needs no credentials, so read-only tooling can
    /// use it without a full configuration.
    pub fn data_dir_from_env() -> PathBuf {
        PathBuf::from(optional_env("DATA_DIR", "data"))
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            llm_provider = ?self.llm_provider,
            llm_model = %self.llm_model,
            llm_lite_model = %self.llm_lite_model,
            apify_token = %redact(&self.apify_api_token),
            llm_api_key = %redact(&self.llm_api_key),
            max_results = self.max_results,
            max_actor_results = self.max_actor_results,
            scraping_timeout_secs = self.scraping_timeout.as_secs(),
            verify_relevance = self.verify_relevance,
            data_dir = %self.data_dir.display(),
            job_workers = self.job_workers,
            "Loaded configuration"
        );
    }
}

fn required_env(key: &str) -> Result<String, BrandPulseError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BrandPulseError::Config(format!(
            "{key} environment variable is required"
        ))),
    }
}

fn optional_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, BrandPulseError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BrandPulseError::Config(format!("{key} has an invalid value: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn redact(secret: &str) -> String {
    if secret.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing_accepts_aliases() {
        assert_eq!(LlmProvider::parse("Gemini").unwrap(), LlmProvider::Gemini);
        assert_eq!(LlmProvider::parse("anthropic").unwrap(), LlmProvider::Claude);
        assert!(LlmProvider::parse("gpt").is_err());
    }

    #[test]
    fn redact_keeps_only_tail() {
        assert_eq!(redact("abcdefgh"), "****efgh");
        assert_eq!(redact("abc"), "****");
    }

    #[test]
    fn parsed_env_falls_back_to_default() {
        let value: u32 = parsed_env("BRANDPULSE_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
