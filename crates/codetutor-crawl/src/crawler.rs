use crate::github::GitHubCrawler;
use crate::gitlab::GitLabCrawler;
use crate::local::LocalCrawler;
use crate::locator::RepositoryLocator;
use crate::patterns::FileFilter;
use async_trait::async_trait;
use codetutor_core::{RepositoryContents, Result, TutorError};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::info;

/// Result of a crawl. Authorization and not-found failures are carried in
/// `stats.errors` of an `Ok` value; `Err` is reserved for unusable input and
/// transport failures.
pub type CrawlOutcome = Result<RepositoryContents>;

/// Everything a crawler needs to know about one crawl.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub locator: RepositoryLocator,
    pub token: Option<String>,
    /// Files above this many bytes are skipped, never truncated
    pub max_file_size: u64,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Report remote paths relative to the locator's sub-directory
    pub use_relative_paths: bool,
}

impl CrawlRequest {
    pub fn new(locator: RepositoryLocator) -> Self {
        Self {
            locator,
            token: None,
            max_file_size: 100_000,
            include: Vec::new(),
            exclude: Vec::new(),
            use_relative_paths: true,
        }
    }

    pub fn filter(&self) -> Result<FileFilter> {
        FileFilter::new(&self.include, &self.exclude)
    }
}

#[async_trait]
pub trait RepositoryCrawler: Send + Sync {
    async fn crawl(&self, request: &CrawlRequest) -> CrawlOutcome;
}

/// Dispatches to the local, GitHub or GitLab crawler by locator kind.
pub struct DefaultCrawler {
    local: LocalCrawler,
    github: GitHubCrawler,
    gitlab: GitLabCrawler,
}

impl DefaultCrawler {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = http_client(timeout)?;
        Ok(Self {
            local: LocalCrawler,
            github: GitHubCrawler::new(client.clone()),
            gitlab: GitLabCrawler::new(client),
        })
    }
}

#[async_trait]
impl RepositoryCrawler for DefaultCrawler {
    async fn crawl(&self, request: &CrawlRequest) -> CrawlOutcome {
        info!("Crawling {}", request.locator);
        let contents = match &request.locator {
            RepositoryLocator::Local(_) => self.local.crawl(request).await?,
            RepositoryLocator::GitHub(_) => self.github.crawl(request).await?,
            RepositoryLocator::GitLab(_) => self.gitlab.crawl(request).await?,
        };
        info!(
            "Crawl finished: {} files downloaded, {} skipped, {} errors",
            contents.stats.downloaded_count,
            contents.stats.skipped_count,
            contents.stats.errors.len()
        );
        Ok(contents)
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("codetutor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TutorError::Crawl(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn transport_error(e: reqwest::Error) -> TutorError {
    TutorError::Crawl(e.to_string())
}

/// Statuses that end a remote crawl with a recorded (non-fatal) error.
pub(crate) fn recorded_failure(status: StatusCode) -> Option<&'static str> {
    match status {
        StatusCode::UNAUTHORIZED => Some("Unauthorized"),
        StatusCode::NOT_FOUND => Some("Not found"),
        _ => None,
    }
}

/// Strip `subdir/` from `path` when relative paths were requested.
pub(crate) fn relative_to(path: &str, subdir: Option<&str>, use_relative: bool) -> String {
    match subdir {
        Some(subdir) if use_relative => path
            .strip_prefix(subdir)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .unwrap_or_else(|| path.to_string()),
        _ => path.to_string(),
    }
}

/// True when `path` lies inside `subdir` (or no sub-directory was given).
pub(crate) fn within(path: &str, subdir: Option<&str>) -> bool {
    match subdir {
        None => true,
        Some(subdir) => {
            let subdir = subdir.trim_end_matches('/');
            path == subdir
                || path
                    .strip_prefix(subdir)
                    .is_some_and(|rest| rest.starts_with('/'))
        }
    }
}
