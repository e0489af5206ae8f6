use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage asked for a shared-state slot that no earlier stage filled.
    #[error("Shared state slot not populated: {0}")]
    MissingState(&'static str),

    /// The LLM answered, but not in the shape the stage requires.
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl TutorError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        TutorError::MalformedResponse(detail.into())
    }

    pub fn is_malformed_response(&self) -> bool {
        matches!(self, TutorError::MalformedResponse(_))
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
