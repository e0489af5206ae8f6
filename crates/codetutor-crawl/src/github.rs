use crate::crawler::{recorded_failure, relative_to, transport_error, within, CrawlOutcome, CrawlRequest};
use crate::locator::{GitHubRepo, RepositoryLocator};
use chrono::Utc;
use codetutor_core::{CrawlStats, RepositoryContents, SourceFile, TutorError};
use reqwest::{header::HeaderMap, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Crawls a GitHub (or GitHub Enterprise) repository through the REST API.
pub struct GitHubCrawler {
    client: Client,
}

impl GitHubCrawler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn crawl(&self, request: &CrawlRequest) -> CrawlOutcome {
        let RepositoryLocator::GitHub(repo) = &request.locator else {
            return Err(TutorError::InvalidOperation(format!(
                "GitHub crawler given locator {}",
                request.locator
            )));
        };
        let filter = request.filter()?;
        let token = request.token.as_deref();
        let subdir = repo.subdir.as_deref();
        let reference = repo.reference.as_deref().unwrap_or("HEAD");

        let mut stats = CrawlStats {
            base_path: subdir.filter(|_| request.use_relative_paths).map(str::to_string),
            ..Default::default()
        };

        let tree_url = format!(
            "{}/repos/{}/{}/git/trees/{}",
            repo.api_base, repo.owner, repo.repo, reference
        );
        let response = self
            .send_with_rate_limit(|| {
                self.authorized(self.client.get(&tree_url), token)
                    .query(&[("recursive", "1")])
            })
            .await?;

        let status = response.status();
        if let Some(reason) = recorded_failure(status) {
            warn!(
                "GitHub {} for {}/{}. Check the URL and GITHUB_TOKEN.",
                status, repo.owner, repo.repo
            );
            stats.errors.push(reason.to_string());
            return Ok(RepositoryContents::new(Vec::new(), stats));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("GitHub tree API error: {} - {}", status, body);
            stats.errors.push(body.chars().take(200).collect());
            return Ok(RepositoryContents::new(Vec::new(), stats));
        }

        let tree: TreeResponse = response.json().await.map_err(transport_error)?;
        if tree.truncated {
            warn!(
                "GitHub truncated the tree listing for {}/{}; some files are missing",
                repo.owner, repo.repo
            );
        }

        let mut blobs: Vec<(TreeEntry, String)> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && within(&entry.path, subdir))
            .map(|entry| {
                let rel = relative_to(&entry.path, subdir, request.use_relative_paths);
                (entry, rel)
            })
            .filter(|(_, rel)| filter.matches(rel))
            .collect();
        blobs.sort_by(|a, b| a.1.cmp(&b.1));

        let mut files = Vec::with_capacity(blobs.len());
        for (entry, rel) in blobs {
            // listing sizes let us skip large files without downloading them
            if let Some(size) = entry.size.filter(|s| *s > request.max_file_size) {
                debug!(
                    "Skipping {}: size {} exceeds limit {}",
                    rel, size, request.max_file_size
                );
                stats.record_skip(rel, size);
                continue;
            }

            let contents_url = format!(
                "{}/repos/{}/{}/contents/{}",
                repo.api_base, repo.owner, repo.repo, entry.path
            );
            let response = self
                .send_with_rate_limit(|| {
                    self.authorized(self.client.get(&contents_url), token)
                        .header("Accept", "application/vnd.github.raw")
                        .query(&[("ref", reference)])
                })
                .await?;

            if !response.status().is_success() {
                warn!("Skip {}: HTTP {}", rel, response.status());
                stats.record_skip(rel, 0);
                continue;
            }

            let content = response.text().await.map_err(transport_error)?;
            let size = content.len() as u64;
            if size > request.max_file_size {
                stats.record_skip(rel, size);
                continue;
            }
            debug!("Downloaded: {} ({} bytes)", rel, size);
            files.push(SourceFile::new(rel, content));
        }

        Ok(RepositoryContents::new(files, stats))
    }

    fn authorized(&self, builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let builder = builder.header("X-GitHub-Api-Version", "2022-11-28");
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send the request built by `build`, sleeping through primary rate limits.
    async fn send_with_rate_limit<F>(&self, build: F) -> Result<Response, TutorError>
    where
        F: Fn() -> RequestBuilder,
    {
        loop {
            let response = build().send().await.map_err(transport_error)?;
            match rate_limit_wait(response.status(), response.headers(), Utc::now().timestamp()) {
                Some(wait) => {
                    info!("GitHub rate limit. Waiting {}s...", wait.as_secs());
                    tokio::time::sleep(wait).await;
                }
                None => return Ok(response),
            }
        }
    }
}

/// How long to wait before retrying, if the response is a rate-limit refusal.
fn rate_limit_wait(status: StatusCode, headers: &HeaderMap, now: i64) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    match status {
        StatusCode::FORBIDDEN if header("x-ratelimit-remaining") == Some(0) => {
            let reset = header("x-ratelimit-reset").unwrap_or(now + 60);
            Some(Duration::from_secs((reset - now).max(1) as u64))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let wait = header("retry-after").unwrap_or(60);
            Some(Duration::from_secs(wait.max(1) as u64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_rate_limit_wait_uses_reset_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1030"));
        assert_eq!(
            rate_limit_wait(StatusCode::FORBIDDEN, &headers, 1000),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_forbidden_without_exhausted_quota_is_not_rate_limit() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("12"));
        assert_eq!(rate_limit_wait(StatusCode::FORBIDDEN, &headers, 0), None);
        assert_eq!(rate_limit_wait(StatusCode::OK, &HeaderMap::new(), 0), None);
    }

    #[test]
    fn test_tree_parsing() {
        let json = r#"{"sha":"x","tree":[
            {"path":"README.md","type":"blob","size":120},
            {"path":"src","type":"tree"}
        ],"truncated":false}"#;
        let tree: TreeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(tree.tree.len(), 2);
        assert_eq!(tree.tree[0].size, Some(120));
        assert!(tree.tree[1].size.is_none());
    }
}
