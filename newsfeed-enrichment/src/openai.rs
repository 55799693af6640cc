use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::EnrichmentError;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Text generation backend used for summaries
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn summarize(&self, system_prompt: &str, text: &str) -> Result<String, EnrichmentError>;
}

#[derive(Debug, Clone)]
pub struct OpenAIGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAIGenerator {
    pub fn new() -> Self {
        // async-openai reads OPENAI_API_KEY from env automatically
        let config = OpenAIConfig::default();
        Self {
            client: Client::with_config(config),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Explicit key, optionally against an OpenAI-compatible server
    pub fn with_credentials(api_key: &str, api_base: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for OpenAIGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    #[instrument(skip(self, system_prompt, text), fields(model = %self.model, len = text.len()))]
    async fn summarize(&self, system_prompt: &str, text: &str) -> Result<String, EnrichmentError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| EnrichmentError::generation(e.to_string()))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(format!("Summarize the following:\n{}", text))
                    .build()
                    .map_err(|e| EnrichmentError::generation(e.to_string()))?
                    .into(),
            ])
            .build()
            .map_err(|e| EnrichmentError::generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| EnrichmentError::generation(format!("OpenAI API error: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(EnrichmentError::EmptyResponse)?;

        debug!("Generated summary of {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let generator =
            OpenAIGenerator::with_credentials("sk-test", Some("http://localhost:8080/v1"))
                .with_model("gpt-4o");
        assert_eq!(generator.model(), "gpt-4o");
        assert_eq!(OpenAIGenerator::default().model(), DEFAULT_MODEL);
    }
}
