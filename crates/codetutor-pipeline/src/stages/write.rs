use crate::prompts::{self, ChapterContext};
use crate::retry::RetryPolicy;
use crate::stage::Stage;
use crate::state::SharedState;
use anyhow::anyhow;
use async_trait::async_trait;
use codetutor_ai::TextGateway;
use codetutor_core::{AbstractionRecord, ChapterDraft, ChapterOrder, Result, SourceFile, TutorError};
use std::sync::Arc;
use tracing::info;

pub struct WriteInput {
    project: String,
    abstractions: Vec<AbstractionRecord>,
    order: ChapterOrder,
    files: Vec<SourceFile>,
    language: String,
    use_cache: bool,
}

/// Writes one chapter per abstraction, strictly in reading order, each
/// prompt carrying the chapters already written. Each chapter has its own
/// attempt budget; a chapter that runs out fails the stage.
pub struct WriteChapters {
    gateway: Arc<dyn TextGateway>,
    chapter_policy: RetryPolicy,
}

impl WriteChapters {
    pub fn new(gateway: Arc<dyn TextGateway>, chapter_policy: RetryPolicy) -> Self {
        Self {
            gateway,
            chapter_policy,
        }
    }
}

/// Make sure a chapter opens with its heading.
fn with_heading(content: &str, position: usize, name: &str) -> String {
    let content = content.trim();
    let heading = format!("# Chapter {}: {}", position + 1, name);
    if content.starts_with("# ") {
        content.to_string()
    } else {
        format!("{}\n\n{}", heading, content)
    }
}

#[async_trait]
impl Stage for WriteChapters {
    type Prepared = WriteInput;
    type Output = Vec<ChapterDraft>;

    fn name(&self) -> &'static str {
        "write-chapters"
    }

    fn prepare(&self, state: &SharedState) -> Result<WriteInput> {
        let abstractions = state.require_abstractions()?;
        let order = state.require_chapter_order()?;
        if order.len() != abstractions.len() {
            return Err(TutorError::InvalidOperation(format!(
                "chapter order covers {} abstractions but {} exist",
                order.len(),
                abstractions.len()
            )));
        }

        Ok(WriteInput {
            project: state.require_project_name()?.to_string(),
            abstractions: abstractions.to_vec(),
            order: order.clone(),
            files: state.require_repository()?.files.clone(),
            language: state.request.language.clone(),
            use_cache: state.request.use_cache,
        })
    }

    async fn execute(&self, input: &WriteInput, _attempt: u32) -> anyhow::Result<Vec<ChapterDraft>> {
        let chapters: Vec<(usize, &AbstractionRecord)> = input
            .order
            .iter()
            .enumerate()
            .filter_map(|(pos, idx)| input.abstractions.get(idx).map(|a| (pos, a)))
            .collect();

        let mut drafts: Vec<ChapterDraft> = Vec::with_capacity(chapters.len());
        for &(position, abstraction) in &chapters {
            let abstraction_index = input.order.as_slice()[position];
            info!(
                "Writing chapter {}/{}: {}",
                position + 1,
                chapters.len(),
                abstraction.name
            );

            let prompt = prompts::write_chapter(&ChapterContext {
                project: &input.project,
                position,
                abstraction,
                chapters: &chapters,
                files: &input.files,
                previous: &drafts,
                language: &input.language,
            });

            let label = format!("write-chapters chapter {}", position + 1);
            let (content, _) = self
                .chapter_policy
                .run(&label, |attempt| {
                    let prompt = &prompt;
                    async move {
                        let reply = self
                            .gateway
                            .invoke(prompt, input.use_cache && attempt == 1)
                            .await?;
                        if reply.trim().is_empty() {
                            return Err(TutorError::malformed("empty chapter").into());
                        }
                        Ok::<_, anyhow::Error>(reply)
                    }
                })
                .await
                .map_err(|exhausted| {
                    exhausted.last_error.context(format!(
                        "chapter {} ({}) failed after {} attempt(s)",
                        position + 1,
                        abstraction.name,
                        exhausted.attempts
                    ))
                })?;

            drafts.push(ChapterDraft {
                abstraction_index,
                content: with_heading(&content, position, &abstraction.name),
            });
        }

        if drafts.len() != input.order.len() {
            return Err(anyhow!(
                "wrote {} chapters for {} ordered abstractions",
                drafts.len(),
                input.order.len()
            ));
        }
        Ok(drafts)
    }

    fn merge(&self, state: &mut SharedState, output: Vec<ChapterDraft>) {
        state.chapters = Some(output);
    }
}
