use crate::stage::Stage;
use crate::state::SharedState;
use anyhow::bail;
use async_trait::async_trait;
use codetutor_core::{RepositoryContents, Result};
use codetutor_crawl::{CrawlRequest, RepositoryCrawler};
use std::sync::Arc;
use tracing::{info, warn};

pub struct FetchInput {
    request: CrawlRequest,
    project_name: String,
    fail_on_error: bool,
}

/// Crawls the repository named by the request. Remote rate limits are
/// handled by the crawler, so a single attempt is made.
pub struct FetchRepository {
    crawler: Arc<dyn RepositoryCrawler>,
}

impl FetchRepository {
    pub fn new(crawler: Arc<dyn RepositoryCrawler>) -> Self {
        Self { crawler }
    }
}

#[async_trait]
impl Stage for FetchRepository {
    type Prepared = FetchInput;
    type Output = (String, RepositoryContents);

    fn name(&self) -> &'static str {
        "fetch"
    }

    fn prepare(&self, state: &SharedState) -> Result<FetchInput> {
        let req = &state.request;
        let project_name = req
            .project_name
            .clone()
            .unwrap_or_else(|| req.locator.default_project_name());

        Ok(FetchInput {
            request: CrawlRequest {
                locator: req.locator.clone(),
                token: req.token.clone(),
                max_file_size: req.max_file_size,
                include: req.include.clone(),
                exclude: req.exclude.clone(),
                use_relative_paths: true,
            },
            project_name,
            fail_on_error: req.fail_on_error,
        })
    }

    async fn execute(&self, input: &FetchInput, _attempt: u32) -> anyhow::Result<Self::Output> {
        let contents = self.crawler.crawl(&input.request).await?;

        if contents.stats.has_errors() {
            if input.fail_on_error {
                bail!(
                    "crawling {} failed: {}",
                    input.request.locator,
                    contents.stats.errors.join("; ")
                );
            }
            warn!(
                "Crawl of {} reported errors ({}); continuing with {} files",
                input.request.locator,
                contents.stats.errors.join("; "),
                contents.len()
            );
        }
        if contents.is_empty() {
            warn!("No files fetched; the tutorial will be nearly empty");
        }

        info!(
            "Fetched {} files ({} chars) for {}",
            contents.len(),
            contents.total_chars(),
            input.project_name
        );
        Ok((input.project_name.clone(), contents))
    }

    fn merge(&self, state: &mut SharedState, (project_name, contents): Self::Output) {
        state.project_name = Some(project_name);
        state.repository = Some(contents);
    }
}
