use crate::batching::{partition, BatchSpan};
use crate::prompts;
use crate::response::parse_batch_abstractions;
use crate::retry::RetryPolicy;
use crate::stage::Stage;
use crate::state::{BatchResult, IdentifyPartials, SharedState};
use async_trait::async_trait;
use codetutor_ai::{char_len, TextGateway};
use codetutor_core::{Result, SourceFile};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

pub const IDENTIFY_STAGE: &str = "identify-abstractions";

pub struct IdentifyInput {
    project: String,
    files: Vec<SourceFile>,
    spans: Vec<BatchSpan>,
    max_abstractions: usize,
    language: String,
    use_cache: bool,
}

/// Map phase of abstraction identification.
///
/// The file list is cut into character-budgeted batches; each batch is an
/// independent LLM call with its own attempt budget. A batch that exhausts
/// its attempts is recorded as failed and the stage still succeeds with the
/// remaining batches; the reduce stage reports the loss.
///
/// When the gateway has a prompt ceiling, the batch budget is clamped so a
/// full batch prompt, template included, fits under it.
pub struct IdentifyAbstractions {
    gateway: Arc<dyn TextGateway>,
    batch_policy: RetryPolicy,
    batch_char_budget: usize,
    concurrency: usize,
}

impl IdentifyAbstractions {
    pub fn new(
        gateway: Arc<dyn TextGateway>,
        batch_policy: RetryPolicy,
        batch_char_budget: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            gateway,
            batch_policy,
            batch_char_budget,
            concurrency: concurrency.max(1),
        }
    }

    /// Per-batch file budget: the configured one, or less when the gateway
    /// ceiling minus the prompt template would not hold it.
    fn effective_budget(
        &self,
        project: &str,
        files: &[SourceFile],
        max_abstractions: usize,
        language: &str,
    ) -> usize {
        let Some(ceiling) = self.gateway.prompt_ceiling() else {
            return self.batch_char_budget;
        };

        // widest possible batch numbers, no files
        let total = files.len();
        let template = char_len(&prompts::identify_batch(
            project,
            files,
            BatchSpan {
                start: total,
                end: total,
            },
            total,
            max_abstractions,
            language,
        ));
        let room = ceiling.saturating_sub(template).max(1);

        if room < self.batch_char_budget {
            warn!(
                "Batch budget {} does not fit prompt ceiling {} ({} template chars), using {}",
                self.batch_char_budget, ceiling, template, room
            );
            room
        } else {
            self.batch_char_budget
        }
    }

    async fn run_batch(
        &self,
        input: &IdentifyInput,
        batch: usize,
        span: BatchSpan,
    ) -> std::result::Result<BatchResult, String> {
        let label = format!("{} batch {}", IDENTIFY_STAGE, batch);
        let prompt = prompts::identify_batch(
            &input.project,
            &input.files,
            span,
            input.files.len(),
            input.max_abstractions,
            &input.language,
        );

        let outcome = self
            .batch_policy
            .run(&label, |attempt| {
                let prompt = &prompt;
                async move {
                    let reply = self
                        .gateway
                        .invoke(prompt, input.use_cache && attempt == 1)
                        .await?;
                    Ok::<_, anyhow::Error>(parse_batch_abstractions(&reply, span.len())?)
                }
            })
            .await;

        match outcome {
            Ok((items, _)) => Ok(BatchResult { batch, span, items }),
            Err(exhausted) => Err(format!(
                "batch {} (files {}..{}) failed after {} attempt(s): {:#}",
                batch, span.start, span.end, exhausted.attempts, exhausted.last_error
            )),
        }
    }
}

#[async_trait]
impl Stage for IdentifyAbstractions {
    type Prepared = IdentifyInput;
    type Output = IdentifyPartials;

    fn name(&self) -> &'static str {
        IDENTIFY_STAGE
    }

    fn prepare(&self, state: &SharedState) -> Result<IdentifyInput> {
        let repository = state.require_repository()?;
        let project = state.require_project_name()?.to_string();
        let budget = self.effective_budget(
            &project,
            &repository.files,
            state.request.max_abstractions,
            &state.request.language,
        );
        let spans = partition(&repository.files, budget);
        info!(
            "Identifying abstractions in {} files across {} batches",
            repository.len(),
            spans.len()
        );

        Ok(IdentifyInput {
            project,
            files: repository.files.clone(),
            spans,
            max_abstractions: state.request.max_abstractions,
            language: state.request.language.clone(),
            use_cache: state.request.use_cache,
        })
    }

    async fn execute(&self, input: &IdentifyInput, _attempt: u32) -> anyhow::Result<IdentifyPartials> {
        let mut outcomes: Vec<(usize, std::result::Result<BatchResult, String>)> =
            stream::iter(input.spans.iter().copied().enumerate())
                .map(move |(batch, span)| async move { (batch, self.run_batch(input, batch, span).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(batch, _)| *batch);

        let mut partials = IdentifyPartials::default();
        for (batch, outcome) in outcomes {
            match outcome {
                Ok(result) => partials.batches.push(result),
                Err(error) => {
                    warn!("{}: {}", IDENTIFY_STAGE, error);
                    partials.failed_batches.push(batch);
                    partials.errors.push(error);
                }
            }
        }

        Ok(partials)
    }

    fn merge(&self, state: &mut SharedState, output: IdentifyPartials) {
        state.identify_partials = Some(output);
    }
}
