use crate::llm_provider::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for Google Gemini provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// AI Studio API key
    pub api_key: String,
    /// REST base URL
    pub base_url: String,
    /// Model to use (e.g., "gemini-2.5-flash", "gemini-2.5-pro")
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: GEMINI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 300,
        }
    }
}

/// Google Gemini LLM provider (primary slot)
pub struct GeminiProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(anyhow!(
                "Gemini API key is required. Set GEMINI_API_KEY environment variable."
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    async fn try_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<GenerateContentResponse> {
        let request = GenerateContentRequest {
            contents: messages
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(|m| Content {
                    role: Some(match m.role {
                        MessageRole::Assistant => "model".to_string(),
                        _ => "user".to_string(),
                    }),
                    parts: vec![Part {
                        text: Some(m.content.clone()),
                    }],
                })
                .collect(),
            system_instruction: messages
                .iter()
                .find(|m| m.role == MessageRole::System)
                .map(|m| Content {
                    role: None,
                    parts: vec![Part {
                        text: Some(m.content.clone()),
                    }],
                }),
            generation_config: Some(GeminiGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
                stop_sequences: config.stop.clone(),
            }),
        };

        debug!("Sending request to Gemini model {}", self.config.model);

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.config.base_url.trim_end_matches('/'),
                self.config.model
            ))
            .header("x-goog-api-key", &self.config.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if is_token_limit_error(status, &error_text) {
                return Err(ContextWindowExceeded {
                    provider: "gemini".to_string(),
                    detail: error_text,
                }
                .into());
            }

            return Err(anyhow!("Gemini API error ({}): {}", status, error_text));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .context("Failed to parse Gemini API response")
    }
}

/// Gemini answers oversized prompts with a 400 naming the input token count.
fn is_token_limit_error(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::BAD_REQUEST {
        return false;
    }
    let body = body.to_lowercase();
    body.contains("exceeds the maximum number of tokens")
        || body.contains("input token count")
        || body.contains("context length")
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let response = self.try_request(messages, config).await?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No candidates in Gemini response"))?;

        let content = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if let Some(usage) = &response.usage_metadata {
            debug!(
                "Gemini usage: {:?} prompt + {:?} candidates = {:?} tokens",
                usage.prompt_token_count, usage.candidates_token_count, usage.total_token_count
            );
        }
        if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
            warn!("Gemini reply was cut off at the output token limit");
        }

        Ok(LLMResponse {
            content,
            model: response
                .model_version
                .unwrap_or_else(|| self.config.model.clone()),
        })
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Gemini API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<usize>,
    candidates_token_count: Option<usize>,
    total_token_count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation_requires_api_key() {
        assert!(GeminiProvider::new(GeminiConfig::default()).is_err());
    }

    #[test]
    fn test_token_limit_error_detection() {
        let body = r#"{"error":{"code":400,"message":"The input token count (1200000) exceeds the maximum number of tokens allowed (1048576)."}}"#;
        assert!(is_token_limit_error(StatusCode::BAD_REQUEST, body));
        assert!(!is_token_limit_error(StatusCode::INTERNAL_SERVER_ERROR, body));
    }

    #[test]
    fn test_request_uses_system_instruction() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some("hello".to_string()),
                }],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: Some("be brief".to_string()),
                }],
            }),
            generation_config: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " world"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        let parts = &parsed.candidates[0].content.as_ref().unwrap().parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parsed.usage_metadata.unwrap().total_token_count, Some(5));
    }
}
