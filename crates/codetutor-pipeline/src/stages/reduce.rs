use crate::retry::RetryPolicy;
use crate::stage::Stage;
use crate::state::{BatchResult, DegradedReport, SharedState};
use async_trait::async_trait;
use codetutor_core::{AbstractionRecord, Result};
use std::collections::HashMap;
use tracing::{info, warn};

pub const REDUCE_STAGE: &str = "reduce-abstractions";

pub struct ReduceInput {
    batches: Vec<BatchResult>,
    failed_batches: Vec<usize>,
    errors: Vec<String>,
    max_abstractions: usize,
}

pub struct ReduceOutput {
    pub abstractions: Vec<AbstractionRecord>,
    /// Set when some identification batches contributed nothing
    pub degraded: Option<DegradedReport>,
}

/// Merge every batch's abstractions into one globally indexed list.
///
/// Batch-local file indices are mapped back through each batch's span.
/// Entries are merged by case-insensitive name: the first occurrence is
/// canonical and later duplicates contribute only their files. Final indices
/// follow merge order.
pub fn merge_batches(batches: &[BatchResult]) -> Vec<AbstractionRecord> {
    let mut merged: Vec<AbstractionRecord> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for batch in batches {
        for item in &batch.items {
            let files = item
                .local_files
                .iter()
                .filter_map(|&local| batch.span.to_global(local));

            let key = item.name.trim().to_lowercase();
            match by_name.get(&key) {
                Some(&existing) => merged[existing].files.extend(files),
                None => {
                    by_name.insert(key, merged.len());
                    merged.push(AbstractionRecord::new(
                        item.name.trim(),
                        item.description.clone(),
                        files,
                    ));
                }
            }
        }
    }
    merged
}

/// Reduce phase of abstraction identification. Deterministic; makes no LLM
/// calls. Batches lost in the map phase are recorded here as a degraded
/// result.
pub struct ReduceAbstractions {
    policy: RetryPolicy,
}

impl ReduceAbstractions {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for ReduceAbstractions {
    type Prepared = ReduceInput;
    type Output = ReduceOutput;

    fn name(&self) -> &'static str {
        REDUCE_STAGE
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    fn prepare(&self, state: &SharedState) -> Result<ReduceInput> {
        let partials = state.require_identify_partials()?;
        Ok(ReduceInput {
            batches: partials.batches.clone(),
            failed_batches: partials.failed_batches.clone(),
            errors: partials.errors.clone(),
            max_abstractions: state.request.max_abstractions,
        })
    }

    async fn execute(&self, input: &ReduceInput, _attempt: u32) -> anyhow::Result<Self::Output> {
        let mut merged = merge_batches(&input.batches);
        let reported: usize = input.batches.iter().map(|b| b.items.len()).sum();

        if merged.len() > input.max_abstractions {
            warn!(
                "{} abstractions identified, keeping the first {}",
                merged.len(),
                input.max_abstractions
            );
            merged.truncate(input.max_abstractions);
        }

        info!(
            "Reduced {} batch abstractions to {}",
            reported,
            merged.len()
        );

        let degraded = if input.failed_batches.is_empty() {
            None
        } else {
            warn!(
                "Abstractions merged without batches {:?}",
                input.failed_batches
            );
            Some(DegradedReport {
                stage: REDUCE_STAGE,
                failed_batches: input.failed_batches.clone(),
                errors: input.errors.clone(),
            })
        };

        Ok(ReduceOutput {
            abstractions: merged,
            degraded,
        })
    }

    fn merge(&self, state: &mut SharedState, output: Self::Output) {
        state.abstractions = Some(output.abstractions);
        if let Some(report) = output.degraded {
            state.degraded.push(report);
        }
    }
}
