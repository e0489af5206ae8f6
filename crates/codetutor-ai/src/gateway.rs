use crate::audit_log::AuditLog;
use crate::compression::{char_len, PromptCompressor};
use crate::llm_factory::LLMProviderFactory;
use crate::llm_provider::*;
use crate::response_cache::ResponseCache;
use anyhow::Result;
use async_trait::async_trait;
use codetutor_core::config_manager::{ProviderLimits, TutorConfig};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The one operation every pipeline stage needs: prompt in, text out.
#[async_trait]
pub trait TextGateway: Send + Sync {
    async fn invoke(&self, prompt: &str, use_cache: bool) -> LLMResult<String>;

    /// Largest prompt, in chars, that is sent without compression.
    fn prompt_ceiling(&self) -> Option<usize> {
        None
    }
}

/// Caching, size-aware front door to an [`LLMProvider`].
pub struct LlmGateway {
    provider: Arc<dyn LLMProvider>,
    cache: ResponseCache,
    audit: AuditLog,
    limits: ProviderLimits,
    compressor: PromptCompressor,
    generation: GenerationConfig,
}

impl LlmGateway {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        cache: ResponseCache,
        audit: AuditLog,
        limits: ProviderLimits,
        max_compression_rounds: usize,
        generation: GenerationConfig,
    ) -> Self {
        let compressor =
            PromptCompressor::new(provider.clone(), generation.clone(), max_compression_rounds);
        Self {
            provider,
            cache,
            audit,
            limits,
            compressor,
            generation,
        }
    }

    /// Build provider, cache and audit log from the loaded configuration.
    pub fn from_config(config: &TutorConfig) -> Result<Self> {
        let kind = config.llm.provider_kind()?;
        let provider = LLMProviderFactory::create_from_config(&config.llm)?;
        let limits = config.gateway.limits_for(kind);

        info!(
            "LLM gateway: {} ({}), ceiling {} chars, chunk {} chars",
            provider.provider_name(),
            provider.model_name(),
            limits.max_prompt_chars,
            limits.chunk_size_chars
        );

        let generation = GenerationConfig {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            stop: None,
        };

        Ok(Self::new(
            provider,
            ResponseCache::new(&config.gateway.cache_file),
            AuditLog::new(&config.gateway.log_dir),
            limits,
            config.gateway.max_compression_rounds,
            generation,
        ))
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    /// Send `prompt`, compressing first if it is over the ceiling and once
    /// more at half the ceiling if the provider still rejects it as too long.
    async fn call_provider(&self, prompt: &str) -> LLMResult<String> {
        let ceiling = self.limits.max_prompt_chars;
        let chunk = self.limits.chunk_size_chars;

        let outbound = if char_len(prompt) > ceiling {
            info!(
                "Prompt of {} chars exceeds ceiling {}, compressing",
                char_len(prompt),
                ceiling
            );
            self.compressor.compress(prompt, ceiling, chunk).await?
        } else {
            prompt.to_string()
        };

        debug!("Sending prompt of {} chars", char_len(&outbound));
        match self
            .provider
            .generate_with_config(&outbound, &self.generation)
            .await
        {
            Ok(response) => {
                debug!(
                    "Reply from {}: {} chars",
                    response.model,
                    char_len(&response.content)
                );
                Ok(response.content)
            }
            Err(e) if is_context_window_exceeded(&e) => {
                let reduced = (ceiling / 2).max(1);
                warn!(
                    "Provider rejected prompt as too long ({}), retrying at {} chars",
                    e, reduced
                );
                let smaller = self
                    .compressor
                    .compress(&outbound, reduced, chunk.min(reduced))
                    .await?;
                let response = self
                    .provider
                    .generate_with_config(&smaller, &self.generation)
                    .await?;
                Ok(response.content)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl TextGateway for LlmGateway {
    async fn invoke(&self, prompt: &str, use_cache: bool) -> LLMResult<String> {
        self.audit.record_prompt(prompt);

        if use_cache {
            if let Some(cached) = self.cache.get(prompt).await {
                self.audit.record_response(&cached);
                return Ok(cached);
            }
        }

        let response = self.call_provider(prompt).await?;
        self.audit.record_response(&response);

        if use_cache {
            self.cache.insert(prompt, &response).await;
        }
        Ok(response)
    }

    fn prompt_ceiling(&self) -> Option<usize> {
        Some(self.limits.max_prompt_chars)
    }
}

