use codetutor_core::{ConfigManager, DegradationPolicy, ProviderKind, TutorConfig};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::sync::Arc;
use tempfile::TempDir;

/// Collects formatted log output so tests can inspect it.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_config_file_sections() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("codetutor.toml");
    fs::write(
        &config_path,
        r#"
[llm]
provider = "secondary"
model = "gpt-4o-mini"

[gateway]
cache_file = "cache/llm.json"
max_prompt_chars = 50000
chunk_size_chars = 10000

[pipeline]
batch_char_budget = 20000
degradation = "abort"
identify = { max_retries = 2, wait_secs = 0 }

[crawl]
max_file_size = 2048
fail_on_error = true
"#,
    )
    .unwrap();

    let config = ConfigManager::read_toml_file(&config_path).unwrap();
    assert_eq!(config.llm.provider_kind().unwrap(), ProviderKind::Secondary);
    assert_eq!(config.llm.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(config.gateway.cache_file.to_str(), Some("cache/llm.json"));
    let limits = config.gateway.limits_for(ProviderKind::Secondary);
    assert_eq!(limits.max_prompt_chars, 50_000);
    assert_eq!(limits.chunk_size_chars, 10_000);
    assert_eq!(config.pipeline.identify.max_retries, 2);
    assert_eq!(config.pipeline.reduce.max_retries, 5);
    assert_eq!(config.pipeline.degradation, DegradationPolicy::Abort);
    assert_eq!(config.crawl.max_file_size, 2048);
    assert!(config.crawl.fail_on_error);
    // Untouched sections keep their defaults
    assert_eq!(config.pipeline.language, "english");
    assert!(!config.crawl.include_patterns.is_empty());
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = ConfigManager::load_from(&temp_dir.path().join("absent.toml"));
    assert!(result.is_err());
}

#[test]
fn test_invalid_toml_is_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "[llm\nprovider = ").unwrap();

    let err = ConfigManager::read_toml_file(&config_path).unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse config"));
}

#[test]
fn test_config_serialization_roundtrip() {
    let config = TutorConfig::default();
    let toml = toml::to_string(&config).unwrap();
    let from_toml: TutorConfig = toml::from_str(&toml).unwrap();
    assert_eq!(config.pipeline.max_abstractions, from_toml.pipeline.max_abstractions);
    assert_eq!(config.gateway.primary, from_toml.gateway.primary);
}

#[test]
fn test_from_config_rejects_unknown_provider() {
    let mut config = TutorConfig::default();
    config.llm.provider = "mystery".to_string();
    assert!(ConfigManager::from_config(config).is_err());
}

#[test]
fn test_summary_is_logged_only_on_request() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("codetutor.toml");
    fs::write(&config_path, "[llm]\nprovider = \"primary\"\n").unwrap();

    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let manager = ConfigManager::load_from(&config_path).unwrap();
        assert!(!logs.text().contains("Configuration loaded"));
        assert_eq!(manager.config_path(), Some(config_path.as_path()));

        manager.log_summary();
    });

    let text = logs.text();
    assert!(text.contains("Configuration loaded"));
    assert!(text.contains("codetutor.toml"));
}
