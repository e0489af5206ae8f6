pub mod crawler;
pub mod github;
pub mod gitlab;
pub mod local;
pub mod locator;
pub mod patterns;

pub use crawler::{CrawlOutcome, CrawlRequest, DefaultCrawler, RepositoryCrawler};
pub use github::GitHubCrawler;
pub use gitlab::GitLabCrawler;
pub use local::LocalCrawler;
pub use locator::{GitHubRepo, GitLabRepo, RepositoryLocator};
pub use patterns::FileFilter;
