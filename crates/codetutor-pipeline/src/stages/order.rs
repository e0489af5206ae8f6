use crate::prompts;
use crate::response::parse_order;
use crate::retry::RetryPolicy;
use crate::stage::Stage;
use crate::state::SharedState;
use async_trait::async_trait;
use codetutor_ai::TextGateway;
use codetutor_core::{ChapterOrder, Result};
use std::sync::Arc;
use tracing::info;

pub struct OrderInput {
    prompt: Option<String>,
    abstraction_count: usize,
    use_cache: bool,
}

/// Asks for the reading order. Anything but an exact permutation of the
/// abstraction indices is retried.
pub struct OrderChapters {
    gateway: Arc<dyn TextGateway>,
    policy: RetryPolicy,
}

impl OrderChapters {
    pub fn new(gateway: Arc<dyn TextGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }
}

#[async_trait]
impl Stage for OrderChapters {
    type Prepared = OrderInput;
    type Output = ChapterOrder;

    fn name(&self) -> &'static str {
        "order-chapters"
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    fn prepare(&self, state: &SharedState) -> Result<OrderInput> {
        let abstractions = state.require_abstractions()?;
        let relationships = state.require_relationships()?;
        let project = state.require_project_name()?;

        let prompt = (!abstractions.is_empty())
            .then(|| prompts::order_chapters(project, abstractions, relationships));

        Ok(OrderInput {
            prompt,
            abstraction_count: abstractions.len(),
            use_cache: state.request.use_cache,
        })
    }

    async fn execute(&self, input: &OrderInput, attempt: u32) -> anyhow::Result<ChapterOrder> {
        let Some(prompt) = &input.prompt else {
            return Ok(ChapterOrder::new(Vec::new(), 0)?);
        };

        let reply = self
            .gateway
            .invoke(prompt, input.use_cache && attempt == 1)
            .await?;
        let order = ChapterOrder::new(parse_order(&reply)?, input.abstraction_count)?;
        info!("Chapter order: {:?}", order.as_slice());
        Ok(order)
    }

    fn merge(&self, state: &mut SharedState, output: ChapterOrder) {
        state.chapter_order = Some(output);
    }
}
