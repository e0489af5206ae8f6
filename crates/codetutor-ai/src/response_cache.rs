use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Persistent prompt -> response map stored as one JSON object.
///
/// The file is re-read on every lookup and every insert so concurrent writers
/// in other processes are picked up; last writer wins for a given key.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    path: PathBuf,
}

impl ResponseCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cache contents. Missing, empty or unparseable files are an
    /// empty cache.
    pub async fn load(&self) -> HashMap<String, String> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!("Failed to read LLM cache {}: {}", self.path.display(), e);
                return HashMap::new();
            }
        };

        if text.trim().is_empty() {
            return HashMap::new();
        }

        match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "LLM cache {} is corrupt, treating as empty: {}",
                    self.path.display(),
                    e
                );
                HashMap::new()
            }
        }
    }

    pub async fn get(&self, prompt: &str) -> Option<String> {
        let hit = self.load().await.remove(prompt);
        if hit.is_some() {
            debug!("LLM cache hit ({} prompt chars)", prompt.len());
        }
        hit
    }

    /// Store `response` under `prompt`. Write failures are logged, never raised.
    pub async fn insert(&self, prompt: &str, response: &str) {
        let mut entries = self.load().await;
        entries.insert(prompt.to_string(), response.to_string());
        if let Err(e) = self.write(&entries).await {
            warn!("Failed to write LLM cache {}: {}", self.path.display(), e);
        }
    }

    async fn write(&self, entries: &HashMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string(entries)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "llm_cache.json".to_string());
        let tmp = self
            .path
            .with_file_name(format!("{}.{}.tmp", file_name, std::process::id()));

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path().join("cache.json"));
        assert!(cache.get("p").await.is_none());
        cache.insert("p", "r").await;
        assert_eq!(cache.get("p").await.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_empty_file_is_empty_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "").unwrap();
        let cache = ResponseCache::new(&path);
        assert!(cache.load().await.is_empty());
        cache.insert("k", "v").await;
        assert_eq!(cache.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path().join("nested/deeper/cache.json"));
        cache.insert("a", "b").await;
        assert!(cache.path().exists());
        assert!(!dir.path().join("nested/deeper").read_dir().unwrap().any(|e| {
            e.unwrap().file_name().to_string_lossy().ends_with(".tmp")
        }));
    }

    #[tokio::test]
    async fn test_insert_keeps_entries_written_by_others() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let ours = ResponseCache::new(&path);
        let theirs = ResponseCache::new(&path);

        ours.insert("first", "1").await;
        theirs.insert("second", "2").await;

        let entries = ours.load().await;
        assert_eq!(entries.get("first").map(String::as_str), Some("1"));
        assert_eq!(entries.get("second").map(String::as_str), Some("2"));
    }
}
