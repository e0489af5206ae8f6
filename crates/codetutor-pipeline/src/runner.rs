use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use crate::stage::{PipelineNode, Stage, StageReport};
use crate::stages::*;
use crate::state::SharedState;
use codetutor_ai::TextGateway;
use codetutor_core::config_manager::{DegradationPolicy, PipelineConfig};
use codetutor_crawl::RepositoryCrawler;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Hooks for progress display.
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _stage: &'static str, _position: usize, _total: usize) {}
    fn stage_finished(&self, _report: &StageReport) {}
    fn stage_failed(&self, _error: &PipelineError) {}
}

/// Runs a fixed sequence of stages over one [`SharedState`].
pub struct PipelineRunner {
    nodes: Vec<Box<dyn PipelineNode>>,
    degradation: DegradationPolicy,
    observer: Option<Arc<dyn PipelineObserver>>,
}

impl PipelineRunner {
    pub fn new(degradation: DegradationPolicy) -> Self {
        Self {
            nodes: Vec::new(),
            degradation,
            observer: None,
        }
    }

    /// The standard tutorial pipeline:
    /// fetch, identify (map), reduce, relationships, order, write, combine.
    pub fn tutorial(
        gateway: Arc<dyn TextGateway>,
        crawler: Arc<dyn RepositoryCrawler>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(config.degradation)
            .with_stage(FetchRepository::new(crawler))
            .with_stage(IdentifyAbstractions::new(
                gateway.clone(),
                RetryPolicy::from(config.identify),
                config.batch_char_budget,
                config.map_concurrency,
            ))
            .with_stage(ReduceAbstractions::new(RetryPolicy::from(config.reduce)))
            .with_stage(AnalyzeRelationships::new(
                gateway.clone(),
                RetryPolicy::from(config.relationships),
            ))
            .with_stage(OrderChapters::new(
                gateway.clone(),
                RetryPolicy::from(config.order),
            ))
            .with_stage(WriteChapters::new(gateway, RetryPolicy::from(config.write)))
            .with_stage(CombineTutorial)
    }

    pub fn with_stage<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.nodes.push(Box::new(stage));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }

    /// Run every stage in order. The first fatal failure stops the run.
    pub async fn run(&self, state: &mut SharedState) -> Result<Vec<StageReport>, PipelineError> {
        let total = self.nodes.len();
        let mut reports = Vec::with_capacity(total);

        for (position, node) in self.nodes.iter().enumerate() {
            let stage = node.name();
            info!("Stage {}/{}: {}", position + 1, total, stage);
            if let Some(observer) = &self.observer {
                observer.stage_started(stage, position, total);
            }

            let outcome = match node.run(state).await {
                Ok(report) => self.check_degraded(state, report),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(report) => {
                    if let Some(observer) = &self.observer {
                        observer.stage_finished(&report);
                    }
                    reports.push(report);
                }
                Err(e) => {
                    error!("Pipeline aborted: {}", e);
                    if let Some(observer) = &self.observer {
                        observer.stage_failed(&e);
                    }
                    return Err(e);
                }
            }
        }

        Ok(reports)
    }

    fn check_degraded(
        &self,
        state: &SharedState,
        report: StageReport,
    ) -> Result<StageReport, PipelineError> {
        let Some(degraded) = state.degraded_report(report.stage) else {
            return Ok(report);
        };

        match self.degradation {
            DegradationPolicy::Tolerate => {
                warn!(
                    "Stage '{}' continued without batches {:?}",
                    report.stage, degraded.failed_batches
                );
                Ok(report)
            }
            DegradationPolicy::Abort => Err(PipelineError::Degraded {
                stage: report.stage,
                failed_batches: degraded.failed_batches.clone(),
            }),
        }
    }
}
