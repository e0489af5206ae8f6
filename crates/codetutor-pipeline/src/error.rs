use codetutor_core::TutorError;
use thiserror::Error;

/// Failures that end a pipeline run. Every variant names the stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("stage '{stage}' could not prepare its input: {source}")]
    Prepare {
        stage: &'static str,
        #[source]
        source: TutorError,
    },

    #[error("stage '{stage}' failed after {attempts} attempt(s): {source:#}")]
    StageFailed {
        stage: &'static str,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("stage '{stage}' degraded: batches {failed_batches:?} exhausted their retries")]
    Degraded {
        stage: &'static str,
        failed_batches: Vec<usize>,
    },
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Prepare { stage, .. }
            | PipelineError::StageFailed { stage, .. }
            | PipelineError::Degraded { stage, .. } => stage,
        }
    }
}
