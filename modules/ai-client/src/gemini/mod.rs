mod client;
pub(crate) mod types;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::TextModel;

use client::GeminiClient;
use types::*;

// =============================================================================
// Gemini Model
// =============================================================================

#[derive(Clone)]
pub struct Gemini {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    temperature: Option<f32>,
}

impl Gemini {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            temperature: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn client(&self) -> GeminiClient {
        let client = GeminiClient::new(&self.api_key);
        match &self.base_url {
            Some(url) => client.with_base_url(url),
            None => client,
        }
    }

    pub async fn generate_content(&self, prompt: &str) -> Result<String> {
        let mut request = GenerateRequest::user_text(prompt);
        if let Some(temperature) = self.temperature {
            request = request.temperature(temperature);
        }

        let response = self.client().generate(&self.model, &request).await?;

        response
            .text()
            .ok_or_else(|| anyhow!(AiError::EmptyResponse(self.model.clone())))
    }
}

#[async_trait]
impl TextModel for Gemini {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_new() {
        let ai = Gemini::new("key", "gemini-2.5-flash");
        assert_eq!(ai.model, "gemini-2.5-flash");
        assert!(ai.temperature.is_none());
    }

    #[test]
    fn test_gemini_builder() {
        let ai = Gemini::new("key", "gemini-2.5-flash-lite")
            .with_base_url("http://localhost:9000")
            .with_temperature(0.2);
        assert_eq!(ai.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(ai.temperature, Some(0.2));
    }
}
