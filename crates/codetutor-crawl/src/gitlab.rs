use crate::crawler::{recorded_failure, relative_to, transport_error, within, CrawlOutcome, CrawlRequest};
use crate::locator::{GitLabRepo, RepositoryLocator};
use codetutor_core::{CrawlStats, RepositoryContents, SourceFile, TutorError};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::form_urlencoded::byte_serialize;

const PER_PAGE: usize = 100;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Crawls gitlab.com or a self-hosted GitLab through the v4 REST API.
pub struct GitLabCrawler {
    client: Client,
}

enum Listing {
    Items(Vec<TreeItem>),
    Failed(String),
}

impl GitLabCrawler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn crawl(&self, request: &CrawlRequest) -> CrawlOutcome {
        let RepositoryLocator::GitLab(repo) = &request.locator else {
            return Err(TutorError::InvalidOperation(format!(
                "GitLab crawler given locator {}",
                request.locator
            )));
        };
        let filter = request.filter()?;
        let token = request.token.as_deref();
        let subdir = repo.subdir.as_deref();

        let mut stats = CrawlStats {
            base_path: subdir.filter(|_| request.use_relative_paths).map(str::to_string),
            ..Default::default()
        };

        let items = match self.list_tree(repo, token).await? {
            Listing::Items(items) => items,
            Listing::Failed(reason) => {
                stats.errors.push(reason);
                return Ok(RepositoryContents::new(Vec::new(), stats));
            }
        };

        let mut blobs: Vec<(String, String)> = items
            .into_iter()
            .filter(|item| item.kind == "blob" && within(&item.path, subdir))
            .map(|item| {
                let rel = relative_to(&item.path, subdir, request.use_relative_paths);
                (item.path, rel)
            })
            .filter(|(_, rel)| filter.matches(rel))
            .collect();
        blobs.sort_by(|a, b| a.1.cmp(&b.1));

        let mut files = Vec::with_capacity(blobs.len());
        for (path, rel) in blobs {
            let response = self
                .authorized(self.client.get(raw_file_url(repo, &path)), token)
                .query(&[("ref", repo.reference.as_str())])
                .send()
                .await
                .map_err(transport_error)?;

            if response.status() != StatusCode::OK {
                warn!("Skip {}: HTTP {}", rel, response.status());
                stats.record_skip(rel, 0);
                continue;
            }

            let content = response.text().await.map_err(transport_error)?;
            let size = content.len() as u64;
            if size > request.max_file_size {
                debug!(
                    "Skipping {}: size {} exceeds limit {}",
                    rel, size, request.max_file_size
                );
                stats.record_skip(rel, size);
                continue;
            }
            debug!("Downloaded: {} ({} bytes)", rel, size);
            files.push(SourceFile::new(rel, content));
        }

        Ok(RepositoryContents::new(files, stats))
    }

    fn authorized(&self, builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => builder.header("PRIVATE-TOKEN", token),
            None => builder,
        }
    }

    async fn list_tree(&self, repo: &GitLabRepo, token: Option<&str>) -> Result<Listing, TutorError> {
        let url = format!(
            "{}/projects/{}/repository/tree",
            repo.api_base,
            encode(&repo.project_path)
        );
        let mut all = Vec::new();
        let mut page = 1usize;

        loop {
            let mut query = vec![
                ("recursive", "true".to_string()),
                ("ref", repo.reference.clone()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(subdir) = &repo.subdir {
                query.push(("path", subdir.clone()));
            }

            let response = self
                .authorized(self.client.get(&url), token)
                .query(&query)
                .send()
                .await
                .map_err(transport_error)?;
            let status = response.status();

            if let Some(reason) = recorded_failure(status) {
                warn!(
                    "GitLab {} for {}. Check the URL and GITLAB_TOKEN.",
                    status, repo.project_path
                );
                return Ok(Listing::Failed(reason.to_string()));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                info!("GitLab rate limit. Waiting {}s...", wait);
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!("GitLab tree API error: {} - {}", status, body);
                return Ok(Listing::Failed(body.chars().take(200).collect()));
            }

            let items: Vec<TreeItem> = response.json().await.map_err(transport_error)?;
            let count = items.len();
            all.extend(items);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(Listing::Items(all))
    }
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

fn raw_file_url(repo: &GitLabRepo, path: &str) -> String {
    format!(
        "{}/projects/{}/repository/files/{}/raw",
        repo.api_base,
        encode(&repo.project_path),
        encode(path)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> GitLabRepo {
        GitLabRepo {
            api_base: "https://gitlab.com/api/v4".to_string(),
            project_path: "group/project".to_string(),
            reference: "HEAD".to_string(),
            subdir: None,
        }
    }

    #[test]
    fn test_raw_file_url_encodes_slashes() {
        assert_eq!(
            raw_file_url(&repo(), "src/main.rs"),
            "https://gitlab.com/api/v4/projects/group%2Fproject/repository/files/src%2Fmain.rs/raw"
        );
    }

    #[test]
    fn test_tree_item_parsing() {
        let json = r#"[{"id":"a","name":"main.rs","type":"blob","path":"src/main.rs","mode":"100644"},
                       {"id":"b","name":"src","type":"tree","path":"src","mode":"040000"}]"#;
        let items: Vec<TreeItem> = serde_json::from_str(json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, "blob");
        assert_eq!(items[1].kind, "tree");
    }
}
