use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use codetutor_ai::LlmGateway;
use codetutor_core::{ConfigManager, TutorConfig};
use codetutor_crawl::{DefaultCrawler, RepositoryLocator};
use codetutor_pipeline::{
    PipelineError, PipelineObserver, PipelineRunner, SharedState, StageReport, TutorialRequest,
};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, Registry};

#[derive(Parser)]
#[command(
    name = "codetutor",
    version,
    author,
    about = "Generate a beginner-friendly tutorial from a code repository",
    long_about = "codetutor crawls a local directory or a GitHub/GitLab repository, asks an LLM to identify its core abstractions and how they relate, and writes an ordered Markdown tutorial."
)]
#[command(group(ArgGroup::new("source").required(true).args(["repo", "dir"])))]
struct Cli {
    /// GitHub or GitLab repository URL
    #[arg(long)]
    repo: Option<String>,

    /// Local directory to analyze
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Project name (derived from the repository when omitted)
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Access token for private repositories
    #[arg(short = 't', long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Root output directory
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Include pattern (repeatable), e.g. '*.rs'
    #[arg(short = 'i', long = "include")]
    include: Vec<String>,

    /// Exclude pattern (repeatable), e.g. 'tests/*'
    #[arg(short = 'e', long = "exclude")]
    exclude: Vec<String>,

    /// Maximum file size in bytes
    #[arg(short = 's', long = "max-size")]
    max_size: Option<u64>,

    /// Tutorial language
    #[arg(long)]
    language: Option<String>,

    /// Bypass the LLM response cache
    #[arg(long)]
    no_cache: bool,

    /// Maximum number of abstractions (chapters)
    #[arg(long)]
    max_abstractions: Option<usize>,

    /// LLM provider: primary (gemini) or secondary (openai)
    #[arg(long)]
    provider: Option<String>,

    /// Configuration file (defaults to ./.codetutor.toml or ~/.codetutor/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn locator(&self) -> Result<RepositoryLocator> {
        match (&self.repo, &self.dir) {
            (Some(url), _) => RepositoryLocator::parse_url(url)
                .with_context(|| format!("Invalid repository URL: {}", url)),
            (None, Some(dir)) => Ok(RepositoryLocator::local(dir.clone())),
            (None, None) => anyhow::bail!("either --repo or --dir is required"),
        }
    }

    /// Fold command-line overrides into the loaded configuration.
    fn apply_overrides(&self, config: &mut TutorConfig) {
        if let Some(provider) = &self.provider {
            config.llm.provider = provider.clone();
        }
        if let Some(size) = self.max_size {
            config.crawl.max_file_size = size;
        }
        if !self.include.is_empty() {
            config.crawl.include_patterns = self.include.clone();
        }
        if !self.exclude.is_empty() {
            config.crawl.exclude_patterns = self.exclude.clone();
        }
        if let Some(language) = &self.language {
            config.pipeline.language = language.clone();
        }
        if let Some(max) = self.max_abstractions {
            config.pipeline.max_abstractions = max;
        }
        if let Some(output) = &self.output {
            config.pipeline.output_dir = output.clone();
        }
    }

    fn request(&self, locator: RepositoryLocator, config: &TutorConfig) -> TutorialRequest {
        let token = self.token.clone().or_else(|| match &locator {
            RepositoryLocator::GitHub(_) => config.crawl.github_token.clone(),
            RepositoryLocator::GitLab(_) => config.crawl.gitlab_token.clone(),
            RepositoryLocator::Local(_) => None,
        });

        let mut request = TutorialRequest::new(locator);
        request.token = token;
        request.include = config.crawl.include_patterns.clone();
        request.exclude = config.crawl.exclude_patterns.clone();
        request.max_file_size = config.crawl.max_file_size;
        request.fail_on_error = config.crawl.fail_on_error;
        request.language = config.pipeline.language.clone();
        request.max_abstractions = config.pipeline.max_abstractions;
        request.output_dir = config.pipeline.output_dir.clone();
        request.use_cache = !self.no_cache;
        request.project_name = self.name.clone();
        request
    }
}

fn init_logging(config: &TutorConfig) {
    let level = config.logging.level.clone();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.logging.format == "compact" {
        let subscriber = Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact().with_target(false));
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = Registry::default()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer());
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

/// One spinner per stage.
struct SpinnerObserver {
    current: Mutex<Option<ProgressBar>>,
}

impl SpinnerObserver {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl PipelineObserver for SpinnerObserver {
    fn stage_started(&self, stage: &'static str, position: usize, total: usize) {
        let style = ProgressStyle::with_template("{spinner:.blue} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");
        let pb = ProgressBar::new_spinner();
        pb.set_style(style);
        pb.set_message(format!("[{}/{}] {}", position + 1, total, stage));
        pb.enable_steady_tick(Duration::from_millis(120));
        *self.current.lock() = Some(pb);
    }

    fn stage_finished(&self, report: &StageReport) {
        if let Some(pb) = self.current.lock().take() {
            pb.finish_with_message(format!(
                "{} {} ({:.1?}, {} attempt(s))",
                "✓".green(),
                report.stage,
                report.elapsed,
                report.attempts
            ));
        }
    }

    fn stage_failed(&self, error: &PipelineError) {
        if let Some(pb) = self.current.lock().take() {
            pb.abandon_with_message(format!("{} {}", "✗".red(), error.stage()));
        }
    }
}

fn print_summary(state: &SharedState, reports: &[StageReport]) {
    let total: Duration = reports.iter().map(|r| r.elapsed).sum();
    let chapters = state.chapters.as_ref().map_or(0, Vec::len);
    let files = state.repository.as_ref().map_or(0, |r| r.len());

    println!();
    println!("{}", "Tutorial complete".green().bold());
    println!(
        "   Project:  {}",
        state.project_name.as_deref().unwrap_or("unknown").cyan()
    );
    println!("   Files:    {}", files);
    println!("   Chapters: {}", chapters);
    if let Some(dir) = &state.output_dir {
        println!("   Output:   {}", dir.display().to_string().cyan());
    }
    println!("   Time:     {:.1?}", total);

    if !state.is_degraded() {
        return;
    }
    println!("{}", "Some batches were skipped:".yellow());
    for report in &state.degraded {
        println!(
            "{} stage '{}' skipped batches {:?}",
            "⚠".yellow(),
            report.stage,
            report.failed_batches
        );
        for error in &report.errors {
            println!("     {}", error.dimmed());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    cli.apply_overrides(manager.config_mut());
    ConfigManager::validate_config(manager.config()).context("Invalid configuration")?;

    init_logging(manager.config());
    manager.log_summary();
    let config = manager.into_config();

    let locator = cli.locator()?;
    let request = cli.request(locator, &config);

    let gateway = Arc::new(LlmGateway::from_config(&config)?);
    let crawler = Arc::new(
        DefaultCrawler::new(Duration::from_secs(config.llm.timeout_secs))
            .context("Failed to build HTTP client")?,
    );

    println!(
        "{} {} ({})",
        "Generating tutorial for".bold(),
        request.locator.to_string().cyan(),
        gateway.provider().model_name()
    );

    let runner = PipelineRunner::tutorial(gateway, crawler, &config.pipeline)
        .with_observer(Arc::new(SpinnerObserver::new()));
    let mut state = SharedState::new(request);

    match runner.run(&mut state).await {
        Ok(reports) => {
            print_summary(&state, &reports);
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{} stage '{}' failed",
                "Error:".red().bold(),
                e.stage().bold()
            );
            eprintln!("   {}", e);
            std::process::exit(1);
        }
    }
}
