use crate::llm_provider::{GenerationConfig, LLMProvider, LLMResult, Message};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// System instruction sent with every compression request.
pub const COMPRESSION_INSTRUCTION: &str = "You compress source material for another model. \
Preserve every identifier, file path, type and function signature, and the key lines of logic. \
Drop boilerplate, license headers, repeated imports and commentary. \
Reply with the compressed text only.";

/// Character count (Unicode scalar values), the unit every ceiling uses.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into pieces of at most `chunk_chars` characters.
pub fn split_chars(text: &str, chunk_chars: usize) -> Vec<&str> {
    let chunk_chars = chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (offset, _) in text.char_indices() {
        if count == chunk_chars {
            chunks.push(&text[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

/// Shrinks an oversized prompt by summarizing fixed-size chunks through the
/// same provider that will receive the final prompt.
pub struct PromptCompressor {
    provider: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
    max_rounds: usize,
}

impl PromptCompressor {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        generation: GenerationConfig,
        max_rounds: usize,
    ) -> Self {
        Self {
            provider,
            generation,
            max_rounds,
        }
    }

    /// Compress `prompt` to at most `target_chars` characters.
    ///
    /// Chunks of `chunk_chars` are compressed independently and joined with a
    /// blank line. While the joined text is still over the target it is
    /// re-compressed as a whole, for at most `max_rounds` rounds; whatever is
    /// left over after that is cut at the target.
    pub async fn compress(
        &self,
        prompt: &str,
        target_chars: usize,
        chunk_chars: usize,
    ) -> LLMResult<String> {
        let chunks = split_chars(prompt, chunk_chars.min(target_chars).max(1));
        info!(
            "Compressing prompt of {} chars in {} chunks (target {})",
            char_len(prompt),
            chunks.len(),
            target_chars
        );

        let mut summaries = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let summary = self
                .ask(format!("Compress this chunk:\n{}", chunk))
                .await?;
            debug!(
                "Chunk {}/{}: {} -> {} chars",
                i + 1,
                chunks.len(),
                char_len(chunk),
                char_len(&summary)
            );
            summaries.push(summary);
        }

        let mut combined = summaries.join("\n\n");
        let mut round = 0;
        while char_len(&combined) > target_chars && round < self.max_rounds {
            round += 1;
            debug!(
                "Re-compression round {}: {} chars",
                round,
                char_len(&combined)
            );
            combined = self
                .ask(format!(
                    "Further compress while preserving technical fidelity:\n{}",
                    combined
                ))
                .await?;
        }

        if char_len(&combined) > target_chars {
            warn!(
                "Compressed prompt still {} chars after {} rounds, truncating to {}",
                char_len(&combined),
                round,
                target_chars
            );
            combined = truncate_chars(&combined, target_chars).to_string();
        }

        Ok(combined)
    }

    async fn ask(&self, content: String) -> LLMResult<String> {
        let messages = [
            Message::system(COMPRESSION_INSTRUCTION),
            Message::user(content),
        ];
        let response = self
            .provider
            .generate_chat(&messages, &self.generation)
            .await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_chars_respects_boundaries() {
        let chunks = split_chars("abcdefg", 3);
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_split_chars_multibyte() {
        let text = "héllo wörld ünïcode";
        let chunks = split_chars(text, 4);
        assert!(chunks.iter().all(|c| char_len(c) <= 4));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_empty() {
        assert!(split_chars("", 10).is_empty());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 5), "ab");
    }
}
