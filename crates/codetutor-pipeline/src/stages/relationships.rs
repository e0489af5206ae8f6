use crate::prompts;
use crate::response::parse_relationships;
use crate::retry::RetryPolicy;
use crate::stage::Stage;
use crate::state::SharedState;
use async_trait::async_trait;
use codetutor_ai::TextGateway;
use codetutor_core::{RelationshipAnalysis, Result};
use std::sync::Arc;
use tracing::info;

pub struct RelationshipsInput {
    /// `None` when there is nothing to relate
    prompt: Option<String>,
    project: String,
    abstraction_count: usize,
    use_cache: bool,
}

/// Asks for a project summary and the relationship graph between the
/// reduced abstractions.
pub struct AnalyzeRelationships {
    gateway: Arc<dyn TextGateway>,
    policy: RetryPolicy,
}

impl AnalyzeRelationships {
    pub fn new(gateway: Arc<dyn TextGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }
}

#[async_trait]
impl Stage for AnalyzeRelationships {
    type Prepared = RelationshipsInput;
    type Output = RelationshipAnalysis;

    fn name(&self) -> &'static str {
        "analyze-relationships"
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    fn prepare(&self, state: &SharedState) -> Result<RelationshipsInput> {
        let abstractions = state.require_abstractions()?;
        let repository = state.require_repository()?;
        let project = state.require_project_name()?;

        let prompt = (!abstractions.is_empty()).then(|| {
            prompts::relationships(
                project,
                abstractions,
                &repository.files,
                &state.request.language,
            )
        });

        Ok(RelationshipsInput {
            prompt,
            project: project.to_string(),
            abstraction_count: abstractions.len(),
            use_cache: state.request.use_cache,
        })
    }

    async fn execute(&self, input: &RelationshipsInput, attempt: u32) -> anyhow::Result<RelationshipAnalysis> {
        let Some(prompt) = &input.prompt else {
            info!("No abstractions identified; skipping relationship analysis");
            return Ok(RelationshipAnalysis {
                summary: format!("No abstractions were identified in `{}`.", input.project),
                edges: Vec::new(),
            });
        };

        let reply = self
            .gateway
            .invoke(prompt, input.use_cache && attempt == 1)
            .await?;
        let analysis = parse_relationships(&reply, input.abstraction_count)?;
        info!("Identified {} relationships", analysis.edges.len());
        Ok(analysis)
    }

    fn merge(&self, state: &mut SharedState, output: RelationshipAnalysis) {
        state.relationships = Some(output);
    }
}
