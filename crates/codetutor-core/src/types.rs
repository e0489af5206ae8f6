use crate::error::{Result, TutorError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// A single crawled file: repository-relative path plus its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Length in characters, the unit every prompt budget is expressed in.
    pub fn char_len(&self) -> usize {
        self.path.chars().count() + self.content.chars().count()
    }
}

/// A file the crawler saw but did not download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    /// Size in bytes, 0 when the fetch itself failed
    pub size: u64,
}

/// Aggregate crawl statistics.
///
/// Authorization and not-found failures are recorded in `errors` instead of
/// being raised, so a run can continue with an empty file set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub downloaded_count: usize,
    pub skipped_count: usize,
    #[serde(default)]
    pub skipped_files: Vec<SkippedFile>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Sub-directory the crawl was rooted at, when paths were made relative to it
    #[serde(default)]
    pub base_path: Option<String>,
}

impl CrawlStats {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn record_skip(&mut self, path: impl Into<String>, size: u64) {
        self.skipped_files.push(SkippedFile {
            path: path.into(),
            size,
        });
        self.skipped_count = self.skipped_files.len();
    }
}

/// Ordered repository contents. Immutable once produced by the crawler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryContents {
    pub files: Vec<SourceFile>,
    pub stats: CrawlStats,
}

impl RepositoryContents {
    pub fn new(files: Vec<SourceFile>, mut stats: CrawlStats) -> Self {
        stats.downloaded_count = files.len();
        Self { files, stats }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SourceFile> {
        self.files.get(index)
    }

    pub fn total_chars(&self) -> usize {
        self.files.iter().map(SourceFile::char_len).sum()
    }
}

/// One identified code-level concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractionRecord {
    pub name: String,
    pub description: String,
    /// Indices into the global `RepositoryContents::files` list
    pub files: BTreeSet<usize>,
}

impl AbstractionRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        files: impl IntoIterator<Item = usize>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            files: files.into_iter().collect(),
        }
    }
}

/// A directed, labelled relationship between two abstractions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub from: usize,
    pub to: usize,
    pub label: String,
}

/// Project summary plus the relationship graph between abstractions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipAnalysis {
    pub summary: String,
    pub edges: Vec<RelationshipEdge>,
}

impl RelationshipAnalysis {
    /// Every edge endpoint must name one of the `abstraction_count` abstractions.
    /// Self-loops and duplicate edges are allowed.
    pub fn validate(&self, abstraction_count: usize) -> Result<()> {
        for edge in &self.edges {
            for index in [edge.from, edge.to] {
                if index >= abstraction_count {
                    return Err(TutorError::malformed(format!(
                        "relationship '{}' references abstraction {} but only {} exist",
                        edge.label, index, abstraction_count
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Reading order: a permutation of `0..K` over the abstraction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterOrder(Vec<usize>);

impl ChapterOrder {
    /// Accepts `indices` only if it is exactly a permutation of
    /// `0..abstraction_count`; never truncates or pads.
    pub fn new(indices: Vec<usize>, abstraction_count: usize) -> Result<Self> {
        if indices.len() != abstraction_count {
            return Err(TutorError::malformed(format!(
                "chapter order has {} entries, expected {}",
                indices.len(),
                abstraction_count
            )));
        }

        let mut seen = HashSet::with_capacity(indices.len());
        for &index in &indices {
            if index >= abstraction_count {
                return Err(TutorError::malformed(format!(
                    "chapter order index {} out of range 0..{}",
                    index, abstraction_count
                )));
            }
            if !seen.insert(index) {
                return Err(TutorError::malformed(format!(
                    "chapter order lists abstraction {} more than once",
                    index
                )));
            }
        }

        Ok(Self(indices))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Chapter position (0-based) of an abstraction.
    pub fn position_of(&self, abstraction_index: usize) -> Option<usize> {
        self.0.iter().position(|&i| i == abstraction_index)
    }
}

/// Rendered text for one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterDraft {
    pub abstraction_index: usize,
    pub content: String,
}
