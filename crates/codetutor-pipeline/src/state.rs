use crate::batching::BatchSpan;
use codetutor_core::{
    AbstractionRecord, ChapterDraft, ChapterOrder, RelationshipAnalysis, RepositoryContents,
    Result, TutorError,
};
use codetutor_crawl::RepositoryLocator;
use std::path::PathBuf;

/// What the user asked for. Fixed for the whole run.
#[derive(Debug, Clone)]
pub struct TutorialRequest {
    pub locator: RepositoryLocator,
    pub token: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_size: u64,
    pub language: String,
    pub max_abstractions: usize,
    pub use_cache: bool,
    pub output_dir: PathBuf,
    pub project_name: Option<String>,
    /// Treat crawl errors (unauthorized, not found) as fatal
    pub fail_on_error: bool,
}

impl TutorialRequest {
    pub fn new(locator: RepositoryLocator) -> Self {
        Self {
            locator,
            token: None,
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_size: 100_000,
            language: "english".to_string(),
            max_abstractions: 10,
            use_cache: true,
            output_dir: PathBuf::from("output"),
            project_name: None,
            fail_on_error: false,
        }
    }

    pub fn is_english(&self) -> bool {
        self.language.trim().eq_ignore_ascii_case("english")
    }
}

/// One abstraction as reported by a single identification batch, with file
/// indices still local to that batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchAbstraction {
    pub name: String,
    pub description: String,
    pub local_files: Vec<usize>,
}

/// Everything one successful identification batch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub batch: usize,
    pub span: BatchSpan,
    pub items: Vec<BatchAbstraction>,
}

/// Map-phase output awaiting the reduce merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyPartials {
    /// Successful batches, ordered by batch number
    pub batches: Vec<BatchResult>,
    pub failed_batches: Vec<usize>,
    /// Last error of each failed batch, same order as `failed_batches`
    pub errors: Vec<String>,
}

/// A stage that completed with reduced output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedReport {
    pub stage: &'static str,
    pub failed_batches: Vec<usize>,
    pub errors: Vec<String>,
}

/// Typed data threaded through the stages. Each slot is written once by the
/// stage that owns it.
#[derive(Debug, Clone)]
pub struct SharedState {
    pub request: TutorialRequest,
    pub project_name: Option<String>,
    pub repository: Option<RepositoryContents>,
    pub identify_partials: Option<IdentifyPartials>,
    pub abstractions: Option<Vec<AbstractionRecord>>,
    pub relationships: Option<RelationshipAnalysis>,
    pub chapter_order: Option<ChapterOrder>,
    pub chapters: Option<Vec<ChapterDraft>>,
    pub output_dir: Option<PathBuf>,
    pub degraded: Vec<DegradedReport>,
}

fn missing(slot: &'static str) -> TutorError {
    TutorError::MissingState(slot)
}

impl SharedState {
    pub fn new(request: TutorialRequest) -> Self {
        Self {
            request,
            project_name: None,
            repository: None,
            identify_partials: None,
            abstractions: None,
            relationships: None,
            chapter_order: None,
            chapters: None,
            output_dir: None,
            degraded: Vec::new(),
        }
    }

    pub fn require_project_name(&self) -> Result<&str> {
        self.project_name.as_deref().ok_or_else(|| missing("project_name"))
    }

    pub fn require_repository(&self) -> Result<&RepositoryContents> {
        self.repository.as_ref().ok_or_else(|| missing("repository"))
    }

    pub fn require_identify_partials(&self) -> Result<&IdentifyPartials> {
        self.identify_partials
            .as_ref()
            .ok_or_else(|| missing("identify_partials"))
    }

    pub fn require_abstractions(&self) -> Result<&[AbstractionRecord]> {
        self.abstractions
            .as_deref()
            .ok_or_else(|| missing("abstractions"))
    }

    pub fn require_relationships(&self) -> Result<&RelationshipAnalysis> {
        self.relationships
            .as_ref()
            .ok_or_else(|| missing("relationships"))
    }

    pub fn require_chapter_order(&self) -> Result<&ChapterOrder> {
        self.chapter_order
            .as_ref()
            .ok_or_else(|| missing("chapter_order"))
    }

    pub fn require_chapters(&self) -> Result<&[ChapterDraft]> {
        self.chapters.as_deref().ok_or_else(|| missing("chapters"))
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn degraded_report(&self, stage: &str) -> Option<&DegradedReport> {
        self.degraded.iter().find(|r| r.stage == stage)
    }
}
