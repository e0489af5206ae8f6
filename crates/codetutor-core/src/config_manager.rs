use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for codetutor
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TutorConfig {
    /// LLM provider selection and credentials
    #[serde(default)]
    pub llm: LLMConfig,

    /// Invocation gateway: cache, audit log, prompt ceilings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Repository crawling
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Stage retry budgets, batching, output
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The two supported provider slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini
    Primary,
    /// OpenAI chat completions
    Secondary,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Primary => "primary",
            ProviderKind::Secondary => "secondary",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "google" | "gemini" => Ok(ProviderKind::Primary),
            "secondary" | "openai" => Ok(ProviderKind::Secondary),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid LLM provider: {}. Must be one of: primary (google, gemini), secondary (openai)",
                other
            ))),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Provider: "primary"/"google"/"gemini" or "secondary"/"openai"
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model identifier; provider default when unset
    #[serde(default)]
    pub model: Option<String>,

    /// Gemini API key
    #[serde(default)]
    pub gemini_api_key: Option<String>,

    /// Gemini REST base URL
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,

    /// OpenAI API key
    #[serde(default)]
    pub openai_api_key: Option<String>,

    /// OpenAI base URL (also used for OpenAI-compatible endpoints)
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Sampling temperature; omitted from requests when unset
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate; provider default when unset
    #[serde(default)]
    pub max_tokens: Option<usize>,

    /// Per-call network timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            gemini_api_key: None,
            gemini_base_url: default_gemini_base_url(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            temperature: None,
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LLMConfig {
    pub fn provider_kind(&self) -> Result<ProviderKind, ConfigError> {
        self.provider.parse()
    }
}

/// Prompt-size limits for one provider, in characters (~4 chars per token)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLimits {
    /// Prompts longer than this are compressed before sending
    pub max_prompt_chars: usize,
    /// Chunk size used while compressing
    pub chunk_size_chars: usize,
}

/// Invocation gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// JSON file mapping prompt -> response
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Directory for the daily-rotated LLM audit log
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Global ceiling override, applies to whichever provider is active
    #[serde(default)]
    pub max_prompt_chars: Option<usize>,

    /// Global chunk size override
    #[serde(default)]
    pub chunk_size_chars: Option<usize>,

    /// Re-compression rounds after the chunk pass
    #[serde(default = "default_compression_rounds")]
    pub max_compression_rounds: usize,

    #[serde(default = "default_primary_limits")]
    pub primary: ProviderLimits,

    #[serde(default = "default_secondary_limits")]
    pub secondary: ProviderLimits,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_file: default_cache_file(),
            log_dir: default_log_dir(),
            max_prompt_chars: None,
            chunk_size_chars: None,
            max_compression_rounds: default_compression_rounds(),
            primary: default_primary_limits(),
            secondary: default_secondary_limits(),
        }
    }
}

impl GatewayConfig {
    /// Effective limits for `kind`, with global overrides applied.
    pub fn limits_for(&self, kind: ProviderKind) -> ProviderLimits {
        let base = match kind {
            ProviderKind::Primary => self.primary,
            ProviderKind::Secondary => self.secondary,
        };
        ProviderLimits {
            max_prompt_chars: self.max_prompt_chars.unwrap_or(base.max_prompt_chars),
            chunk_size_chars: self.chunk_size_chars.unwrap_or(base.chunk_size_chars),
        }
    }
}

/// Repository crawling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Files larger than this (bytes) are skipped, never truncated
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Include globs used when the CLI gives none
    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<String>,

    /// Exclude globs used when the CLI gives none
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Abort the run when the crawler records an auth/not-found error
    #[serde(default)]
    pub fail_on_error: bool,

    #[serde(default)]
    pub github_token: Option<String>,

    #[serde(default)]
    pub gitlab_token: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            include_patterns: default_include_patterns(),
            exclude_patterns: default_exclude_patterns(),
            fail_on_error: false,
            github_token: None,
            gitlab_token: None,
        }
    }
}

/// Attempt budget for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts (at least one)
    pub max_retries: u32,
    /// Constant wait between attempts
    pub wait_secs: u64,
}

impl RetrySettings {
    pub const fn new(max_retries: u32, wait_secs: u64) -> Self {
        Self {
            max_retries,
            wait_secs,
        }
    }
}

/// What to do when map batches exhaust their retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DegradationPolicy {
    /// Log, record, and keep going with the surviving batches
    #[default]
    Tolerate,
    /// Fail the run
    Abort,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Character budget per identification batch
    #[serde(default = "default_batch_char_budget")]
    pub batch_char_budget: usize,

    /// Identification batches in flight at once
    #[serde(default = "default_map_concurrency")]
    pub map_concurrency: usize,

    #[serde(default)]
    pub degradation: DegradationPolicy,

    /// Upper bound on abstractions (and therefore chapters)
    #[serde(default = "default_max_abstractions")]
    pub max_abstractions: usize,

    /// Tutorial language
    #[serde(default = "default_language")]
    pub language: String,

    /// Root directory for generated tutorials
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_identify_retry")]
    pub identify: RetrySettings,

    #[serde(default = "default_stage_retry")]
    pub reduce: RetrySettings,

    #[serde(default = "default_stage_retry")]
    pub relationships: RetrySettings,

    #[serde(default = "default_stage_retry")]
    pub order: RetrySettings,

    #[serde(default = "default_stage_retry")]
    pub write: RetrySettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identify: default_identify_retry(),
            reduce: default_stage_retry(),
            relationships: default_stage_retry(),
            order: default_stage_retry(),
            write: default_stage_retry(),
            batch_char_budget: default_batch_char_budget(),
            map_concurrency: default_map_concurrency(),
            degradation: DegradationPolicy::default(),
            max_abstractions: default_max_abstractions(),
            language: default_language(),
            output_dir: default_output_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_llm_provider() -> String {
    "google".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}
fn default_cache_file() -> PathBuf {
    PathBuf::from("llm_cache.json")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_compression_rounds() -> usize {
    3
}
fn default_primary_limits() -> ProviderLimits {
    // Gemini handles very large contexts; keep a high cap
    ProviderLimits {
        max_prompt_chars: 1_200_000,
        chunk_size_chars: 300_000,
    }
}
fn default_secondary_limits() -> ProviderLimits {
    // 128k tokens is ~512k chars, keep headroom
    ProviderLimits {
        max_prompt_chars: 350_000,
        chunk_size_chars: 120_000,
    }
}
fn default_max_file_size() -> u64 {
    100_000
}
fn default_include_patterns() -> Vec<String> {
    [
        "*.py", "*.js", "*.jsx", "*.ts", "*.tsx", "*.go", "*.java", "*.pyi", "*.pyx", "*.c",
        "*.cc", "*.cpp", "*.h", "*.rs", "*.md", "*.rst", "Dockerfile", "Makefile", "*.yaml",
        "*.yml",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}
fn default_exclude_patterns() -> Vec<String> {
    [
        "assets/*",
        "data/*",
        "examples/*",
        "images/*",
        "public/*",
        "static/*",
        "temp/*",
        "docs/*",
        "venv/*",
        ".venv/*",
        "*test*",
        "tests/*",
        "dist/*",
        "build/*",
        "target/*",
        "experimental/*",
        "deprecated/*",
        "legacy/*",
        ".git/*",
        ".github/*",
        ".next/*",
        ".vscode/*",
        "obj/*",
        "bin/*",
        "node_modules/*",
        "*.log",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}
fn default_identify_retry() -> RetrySettings {
    RetrySettings::new(3, 10)
}
fn default_stage_retry() -> RetrySettings {
    RetrySettings::new(5, 20)
}
fn default_batch_char_budget() -> usize {
    80_000
}
fn default_map_concurrency() -> usize {
    4
}
fn default_max_abstractions() -> usize {
    10
}
fn default_language() -> String {
    "english".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with smart defaults
pub struct ConfigManager {
    config: TutorConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.codetutor.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();
        let (config, config_path) = Self::load_config_file()?;
        Self::finish(config, config_path)
    }

    /// Load from an explicit config file instead of searching for one
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_dotenv();
        let config = Self::read_toml_file(path)?;
        Self::finish(config, Some(path.to_path_buf()))
    }

    /// Wrap an already-built configuration (validated, no env overrides)
    pub fn from_config(config: TutorConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn finish(config: TutorConfig, config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".codetutor.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .codetutor.env: {}", e);
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.codetutor.toml (current directory)
    /// 2. ~/.codetutor/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(TutorConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".codetutor.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".codetutor").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((TutorConfig::default(), None))
    }

    /// Read TOML config file
    pub fn read_toml_file(path: &Path) -> Result<TutorConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: TutorConfig) -> TutorConfig {
        // LLM configuration
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.llm.gemini_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.llm.openai_base_url = url;
        }
        let model_var = match config.llm.provider_kind() {
            Ok(ProviderKind::Secondary) => "OPENAI_MODEL",
            _ => "GEMINI_MODEL",
        };
        if let Ok(model) = std::env::var(model_var) {
            config.llm.model = Some(model);
        }

        // Gateway
        if let Some(chars) = parse_env("LLM_MAX_PROMPT_CHARS") {
            config.gateway.max_prompt_chars = Some(chars);
        }
        if let Some(chars) = parse_env("LLM_CHUNK_SIZE_CHARS") {
            config.gateway.chunk_size_chars = Some(chars);
        }
        if let Ok(path) = std::env::var("LLM_CACHE_FILE") {
            config.gateway.cache_file = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            config.gateway.log_dir = PathBuf::from(dir);
        }

        // Crawl tokens
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            config.crawl.github_token = Some(token);
        }
        if let Ok(token) = std::env::var("GITLAB_TOKEN") {
            config.crawl.gitlab_token = Some(token);
        }

        // Logging
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.logging.level = level;
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &TutorConfig) -> Result<(), ConfigError> {
        let kind = config.llm.provider_kind()?;

        let limits = config.gateway.limits_for(kind);
        if limits.max_prompt_chars == 0 || limits.chunk_size_chars == 0 {
            return Err(ConfigError::ValidationError(
                "Prompt ceiling and chunk size must be greater than zero".to_string(),
            ));
        }
        if limits.chunk_size_chars > limits.max_prompt_chars {
            return Err(ConfigError::ValidationError(format!(
                "Chunk size {} exceeds prompt ceiling {}",
                limits.chunk_size_chars, limits.max_prompt_chars
            )));
        }

        let stages = [
            ("identify", config.pipeline.identify),
            ("reduce", config.pipeline.reduce),
            ("relationships", config.pipeline.relationships),
            ("order", config.pipeline.order),
            ("write", config.pipeline.write),
        ];
        for (name, retry) in stages {
            if retry.max_retries == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Stage '{}' needs at least one attempt",
                    name
                )));
            }
        }

        if config.pipeline.batch_char_budget == 0 || config.pipeline.map_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "batch_char_budget and map_concurrency must be greater than zero".to_string(),
            ));
        }

        // RUST_LOG may carry a full directive list; only bare levels are checked
        let level = config.logging.level.as_str();
        if !level.contains('=') && !level.contains(',') {
            match level {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        other
                    )))
                }
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    /// Mutable access for command-line overrides
    pub fn config_mut(&mut self) -> &mut TutorConfig {
        &mut self.config
    }

    /// Log where the configuration came from. Call once a subscriber is installed.
    pub fn log_summary(&self) {
        info!("Configuration loaded");
        match self.config_path() {
            Some(path) => info!("   Config file: {}", path.display()),
            None => info!("   Config file: NONE (using defaults)"),
        }
        info!("   LLM provider: {}", self.config.llm.provider);
        info!("   LLM cache: {}", self.config.gateway.cache_file.display());
    }

    pub fn into_config(self) -> TutorConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring unparsable {}={}", name, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_aliases() {
        assert_eq!("google".parse::<ProviderKind>().unwrap(), ProviderKind::Primary);
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Primary);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::Secondary);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_limits_override() {
        let mut gateway = GatewayConfig::default();
        assert_eq!(
            gateway.limits_for(ProviderKind::Secondary).max_prompt_chars,
            350_000
        );

        gateway.max_prompt_chars = Some(1_000);
        let limits = gateway.limits_for(ProviderKind::Primary);
        assert_eq!(limits.max_prompt_chars, 1_000);
        assert_eq!(limits.chunk_size_chars, 300_000);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(ConfigManager::validate_config(&TutorConfig::default()).is_ok());
    }

    #[test]
    fn test_chunk_larger_than_ceiling_rejected() {
        let mut config = TutorConfig::default();
        config.gateway.max_prompt_chars = Some(100);
        config.gateway.chunk_size_chars = Some(200);
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = TutorConfig::default();
        config.pipeline.order = RetrySettings::new(0, 0);
        let err = ConfigManager::validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("order"));
    }
}
