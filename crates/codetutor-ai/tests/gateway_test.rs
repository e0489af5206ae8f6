use anyhow::anyhow;
use async_trait::async_trait;
use codetutor_ai::*;
use codetutor_core::config_manager::ProviderLimits;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Records every outbound request; compression requests answer with a short
/// summary, everything else echoes a fixed reply.
#[derive(Default)]
struct RecordingProvider {
    calls: AtomicUsize,
    final_prompt_lengths: Mutex<Vec<usize>>,
    reject_first_over: Option<usize>,
}

impl RecordingProvider {
    fn rejecting_over(limit: usize) -> Self {
        Self {
            reject_first_over: Some(limit),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for RecordingProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let is_compression = messages.iter().any(|m| m.role == MessageRole::System);

        let content = if is_compression {
            "summary".to_string()
        } else {
            let len = char_len(&messages[0].content);
            if let Some(limit) = self.reject_first_over {
                if len > limit {
                    return Err(ContextWindowExceeded {
                        provider: "fake".to_string(),
                        detail: format!("{} chars", len),
                    }
                    .into());
                }
            }
            self.final_prompt_lengths.lock().push(len);
            "answer".to_string()
        };

        Ok(LLMResponse {
            content,
            model: "fake".to_string(),
        })
    }

    fn provider_name(&self) -> &str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}

struct FailingProvider;

#[async_trait]
impl LLMProvider for FailingProvider {
    async fn generate_chat(
        &self,
        _messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        Err(anyhow!("service unavailable"))
    }

    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

/// Compression replies that never get shorter than `reply_chars`.
struct VerboseProvider {
    reply_chars: usize,
    compression_calls: AtomicUsize,
    final_prompt_lengths: Mutex<Vec<usize>>,
}

impl VerboseProvider {
    fn new(reply_chars: usize) -> Self {
        Self {
            reply_chars,
            compression_calls: AtomicUsize::new(0),
            final_prompt_lengths: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LLMProvider for VerboseProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let content = if messages.iter().any(|m| m.role == MessageRole::System) {
            self.compression_calls.fetch_add(1, Ordering::SeqCst);
            "v".repeat(self.reply_chars)
        } else {
            self.final_prompt_lengths
                .lock()
                .push(char_len(&messages[0].content));
            "answer".to_string()
        };
        Ok(LLMResponse {
            content,
            model: "verbose".to_string(),
        })
    }

    fn provider_name(&self) -> &str {
        "verbose"
    }

    fn model_name(&self) -> &str {
        "verbose-model"
    }
}

fn gateway(
    provider: Arc<dyn LLMProvider>,
    dir: &TempDir,
    max_prompt_chars: usize,
    chunk_size_chars: usize,
) -> LlmGateway {
    LlmGateway::new(
        provider,
        ResponseCache::new(dir.path().join("llm_cache.json")),
        AuditLog::new(&dir.path().join("logs")),
        ProviderLimits {
            max_prompt_chars,
            chunk_size_chars,
        },
        3,
        GenerationConfig::default(),
    )
}

#[tokio::test]
async fn test_cache_hit_skips_provider() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let gw = gateway(provider.clone(), &dir, 1000, 100);

    let first = gw.invoke("explain the parser", true).await.unwrap();
    let second = gw.invoke("explain the parser", true).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_cache_disabled_always_calls_provider() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let gw = gateway(provider.clone(), &dir, 1000, 100);

    gw.invoke("p", false).await.unwrap();
    gw.invoke("p", false).await.unwrap();

    assert_eq!(provider.calls(), 2);
    assert!(!dir.path().join("llm_cache.json").exists());
}

#[tokio::test]
async fn test_corrupt_cache_behaves_as_cold_cache() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("llm_cache.json"), "{ not json").unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let gw = gateway(provider.clone(), &dir, 1000, 100);

    let response = gw.invoke("hello", true).await.unwrap();
    assert_eq!(response, "answer");
    assert_eq!(provider.calls(), 1);

    // the rewrite replaced the corrupt file with a valid one
    let cache = ResponseCache::new(dir.path().join("llm_cache.json"));
    assert_eq!(cache.get("hello").await.as_deref(), Some("answer"));
}

#[tokio::test]
async fn test_oversized_prompt_is_compressed_under_ceiling() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let ceiling = 200;
    let gw = gateway(provider.clone(), &dir, ceiling, 50);

    let prompt = "x".repeat(ceiling + 1);
    gw.invoke(&prompt, true).await.unwrap();

    let lengths = provider.final_prompt_lengths.lock().clone();
    assert_eq!(lengths.len(), 1);
    assert!(lengths[0] <= ceiling, "sent {} chars", lengths[0]);

    // cache key is the original prompt, not the compressed one
    let cache = ResponseCache::new(dir.path().join("llm_cache.json"));
    assert!(cache.get(&prompt).await.is_some());
}

#[tokio::test]
async fn test_prompt_at_ceiling_is_sent_verbatim() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let gw = gateway(provider.clone(), &dir, 100, 50);

    gw.invoke(&"y".repeat(100), false).await.unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(provider.final_prompt_lengths.lock().as_slice(), &[100]);
}

#[tokio::test]
async fn test_context_window_rejection_retries_once_compressed() {
    let dir = TempDir::new().unwrap();
    // accepts nothing longer than 40 chars even though the ceiling is 100
    let provider = Arc::new(RecordingProvider::rejecting_over(40));
    let gw = gateway(provider.clone(), &dir, 100, 50);

    let response = gw.invoke(&"z".repeat(80), false).await.unwrap();

    assert_eq!(response, "answer");
    let lengths = provider.final_prompt_lengths.lock().clone();
    assert_eq!(lengths.len(), 1);
    assert!(lengths[0] <= 50);
}

#[tokio::test]
async fn test_generic_failure_propagates_and_is_not_cached() {
    let dir = TempDir::new().unwrap();
    let gw = gateway(Arc::new(FailingProvider), &dir, 100, 50);

    let err = gw.invoke("p", true).await.unwrap_err();
    assert!(err.to_string().contains("service unavailable"));
    assert!(!is_context_window_exceeded(&err));
    assert!(ResponseCache::new(dir.path().join("llm_cache.json"))
        .get("p")
        .await
        .is_none());
}

#[tokio::test]
async fn test_audit_log_records_cache_hits() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(RecordingProvider::default());
    let gw = gateway(provider, &dir, 1000, 100);

    gw.invoke("first", true).await.unwrap();
    gw.invoke("first", true).await.unwrap();

    let log_file = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let text = std::fs::read_to_string(log_file).unwrap();
    assert_eq!(text.matches("PROMPT: first").count(), 2);
    assert_eq!(text.matches("RESPONSE: answer").count(), 2);
}

#[tokio::test]
async fn test_recompression_stops_after_round_limit_and_truncates() {
    let provider = Arc::new(VerboseProvider::new(500));
    let compressor = PromptCompressor::new(provider.clone(), GenerationConfig::default(), 3);

    // 201 chars in chunks of 50: five chunk calls, then three whole-text rounds
    let compressed = compressor
        .compress(&"a".repeat(201), 200, 50)
        .await
        .unwrap();

    assert_eq!(provider.compression_calls.load(Ordering::SeqCst), 5 + 3);
    assert_eq!(char_len(&compressed), 200);
}

#[tokio::test]
async fn test_gateway_never_sends_over_ceiling_when_compression_stalls() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(VerboseProvider::new(500));
    let gw = gateway(provider.clone(), &dir, 200, 50);

    gw.invoke(&"b".repeat(201), false).await.unwrap();

    assert_eq!(provider.compression_calls.load(Ordering::SeqCst), 8);
    assert_eq!(provider.final_prompt_lengths.lock().as_slice(), &[200]);
}
