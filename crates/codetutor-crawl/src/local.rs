use crate::crawler::{CrawlOutcome, CrawlRequest};
use crate::locator::RepositoryLocator;
use crate::patterns::FileFilter;
use codetutor_core::{CrawlStats, RepositoryContents, SourceFile, TutorError};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Crawls a directory on disk, honouring `.gitignore` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCrawler;

impl LocalCrawler {
    pub async fn crawl(&self, request: &CrawlRequest) -> CrawlOutcome {
        let RepositoryLocator::Local(root) = &request.locator else {
            return Err(TutorError::InvalidOperation(format!(
                "local crawler given remote locator {}",
                request.locator
            )));
        };

        let root = root.clone();
        let filter = request.filter()?;
        let max_file_size = request.max_file_size;

        tokio::task::spawn_blocking(move || Ok(collect(&root, &filter, max_file_size)))
            .await
            .map_err(|e| TutorError::Crawl(format!("local crawl task failed: {}", e)))?
    }
}

fn collect(root: &Path, filter: &FileFilter, max_file_size: u64) -> RepositoryContents {
    let mut stats = CrawlStats::default();

    if !root.is_dir() {
        warn!("Directory not found: {}", root.display());
        stats.errors.push(format!("Not found: {}", root.display()));
        return RepositoryContents::new(Vec::new(), stats);
    }

    let mut candidates: Vec<(String, PathBuf, u64)> = Vec::new();
    let walker = WalkBuilder::new(root)
        .git_ignore(true)
        .git_exclude(true)
        .ignore(true)
        .require_git(false)
        .build();

    for dent in walker {
        let dent = match dent {
            Ok(d) => d,
            Err(e) => {
                warn!("Walker error: {}", e);
                continue;
            }
        };

        if !dent.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = dent.path();
        let Some(relative) = relative_path(root, path) else {
            continue;
        };
        if !filter.matches(&relative) {
            continue;
        }

        let size = dent.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push((relative, path.to_path_buf(), size));
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut files = Vec::with_capacity(candidates.len());
    for (relative, path, size) in candidates {
        if size > max_file_size {
            debug!("Skipping {}: size {} exceeds limit {}", relative, size, max_file_size);
            stats.record_skip(relative, size);
            continue;
        }

        match std::fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(content) => files.push(SourceFile::new(relative, content)),
                Err(_) => {
                    debug!("Skipping {}: not UTF-8 text", relative);
                    stats.record_skip(relative, size);
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                stats.record_skip(relative, 0);
            }
        }
    }

    RepositoryContents::new(files, stats)
}

/// `/`-separated path of `path` below `root`.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
