use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::state::SharedState;
use async_trait::async_trait;
use codetutor_core::Result;
use std::time::{Duration, Instant};
use tracing::info;

/// One unit of pipeline work.
///
/// `prepare` reads what the stage needs out of the shared state, `execute`
/// does the (possibly remote, possibly failing) work and is retried under
/// `retry_policy`, and `merge` writes the result back. Only `execute` is
/// retried; a `prepare` error ends the run. `attempt` starts at 1; retries
/// bypass the response cache so a cached bad reply is not replayed.
#[async_trait]
pub trait Stage: Send + Sync {
    type Prepared: Send + Sync;
    type Output: Send;

    fn name(&self) -> &'static str;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::once()
    }

    fn prepare(&self, state: &SharedState) -> Result<Self::Prepared>;

    async fn execute(&self, prepared: &Self::Prepared, attempt: u32)
        -> anyhow::Result<Self::Output>;

    fn merge(&self, state: &mut SharedState, output: Self::Output);
}

/// Outcome of one completed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Object-safe view of a [`Stage`] so the runner can hold a heterogeneous
/// sequence.
#[async_trait]
pub trait PipelineNode: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, state: &mut SharedState) -> std::result::Result<StageReport, PipelineError>;
}

#[async_trait]
impl<S: Stage> PipelineNode for S {
    fn name(&self) -> &'static str {
        Stage::name(self)
    }

    async fn run(&self, state: &mut SharedState) -> std::result::Result<StageReport, PipelineError> {
        let stage = Stage::name(self);
        let started = Instant::now();

        let prepared = self
            .prepare(state)
            .map_err(|source| PipelineError::Prepare { stage, source })?;

        let (output, attempts) = self
            .retry_policy()
            .run(stage, |attempt| self.execute(&prepared, attempt))
            .await
            .map_err(|exhausted| PipelineError::StageFailed {
                stage,
                attempts: exhausted.attempts,
                source: exhausted.last_error,
            })?;

        self.merge(state, output);

        let report = StageReport {
            stage,
            attempts,
            elapsed: started.elapsed(),
        };
        info!(
            "Stage '{}' finished in {:.1?} ({} attempt(s))",
            stage, report.elapsed, attempts
        );
        Ok(report)
    }
}
