pub mod audit_log;
pub mod compression;
pub mod gateway;
pub mod gemini_provider;
pub mod llm_factory;
pub mod llm_provider;
pub mod openai_provider;
pub mod response_cache;

pub use audit_log::AuditLog;
pub use compression::{char_len, PromptCompressor, COMPRESSION_INSTRUCTION};
pub use gateway::{LlmGateway, TextGateway};
pub use llm_factory::LLMProviderFactory;
pub use llm_provider::*;
pub use response_cache::ResponseCache;
