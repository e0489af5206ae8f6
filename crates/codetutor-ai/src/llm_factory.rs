use crate::gemini_provider::{GeminiConfig, GeminiProvider};
use crate::llm_provider::*;
use crate::openai_provider::{OpenAIConfig, OpenAIProvider};
use anyhow::{anyhow, Result};
use codetutor_core::config_manager::{LLMConfig, ProviderKind};
use std::sync::Arc;

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration
    pub fn create_from_config(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        match config.provider_kind()? {
            ProviderKind::Primary => Self::create_gemini_provider(config),
            ProviderKind::Secondary => Self::create_openai_provider(config),
        }
    }

    /// Create a Google Gemini provider
    fn create_gemini_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config
            .gemini_api_key
            .clone()
            .ok_or_else(|| {
                anyhow!(
                    "Gemini API key not found. Set 'gemini_api_key' in config \
                     or GEMINI_API_KEY before loading it"
                )
            })?;

        let defaults = GeminiConfig::default();
        let gemini_config = GeminiConfig {
            api_key,
            base_url: config.gemini_base_url.clone(),
            model: config.model.clone().unwrap_or(defaults.model),
            timeout_secs: config.timeout_secs,
        };

        Ok(Arc::new(GeminiProvider::new(gemini_config)?))
    }

    /// Create an OpenAI provider
    fn create_openai_provider(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| {
                anyhow!(
                    "OpenAI API key not found. Set 'openai_api_key' in config \
                     or OPENAI_API_KEY before loading it"
                )
            })?;

        let defaults = OpenAIConfig::default();
        let openai_config = OpenAIConfig {
            api_key,
            base_url: config.openai_base_url.clone(),
            model: config.model.clone().unwrap_or(defaults.model),
            timeout_secs: config.timeout_secs,
        };

        Ok(Arc::new(OpenAIProvider::new(openai_config)?))
    }
}
