use crate::prompts::chapter_filename;
use crate::stage::Stage;
use crate::state::SharedState;
use anyhow::Context;
use async_trait::async_trait;
use codetutor_core::{AbstractionRecord, ChapterDraft, RelationshipAnalysis, Result, TutorError};
use codetutor_crawl::RepositoryLocator;
use std::fmt::Write;
use std::path::PathBuf;
use tracing::info;

const ATTRIBUTION: &str = "Generated by codetutor from the repository source.";

pub struct CombineInput {
    output_dir: PathBuf,
    project: String,
    source: String,
    is_remote: bool,
    abstractions: Vec<AbstractionRecord>,
    relationships: RelationshipAnalysis,
    chapters: Vec<ChapterDraft>,
}

fn mermaid_label(text: &str) -> String {
    text.replace('"', "'").replace('\n', " ")
}

/// Mermaid flowchart of the relationship graph.
pub fn render_flowchart(abstractions: &[AbstractionRecord], relationships: &RelationshipAnalysis) -> String {
    let mut out = String::from("```mermaid\nflowchart TD\n");
    for (i, a) in abstractions.iter().enumerate() {
        let _ = writeln!(out, "    A{}[\"{}\"]", i, mermaid_label(&a.name));
    }
    for edge in &relationships.edges {
        let _ = writeln!(
            out,
            "    A{} -- \"{}\" --> A{}",
            edge.from,
            mermaid_label(&edge.label),
            edge.to
        );
    }
    out.push_str("```\n");
    out
}

/// `index.md`: title, summary, source, flowchart and chapter links in order.
pub fn render_index(input: &CombineInput) -> String {
    let mut out = format!("# Tutorial: {}\n\n{}\n\n", input.project, input.relationships.summary);

    if input.is_remote {
        let _ = writeln!(out, "**Source Repository:** [{0}]({0})\n", input.source);
    } else {
        let _ = writeln!(out, "**Source Directory:** `{}`\n", input.source);
    }

    out.push_str(&render_flowchart(&input.abstractions, &input.relationships));
    out.push_str("\n## Chapters\n\n");

    for (position, draft) in input.chapters.iter().enumerate() {
        let name = input
            .abstractions
            .get(draft.abstraction_index)
            .map(|a| a.name.as_str())
            .unwrap_or("Untitled");
        let _ = writeln!(
            out,
            "{}. [{}]({})",
            position + 1,
            name,
            chapter_filename(position, name)
        );
    }

    let _ = write!(out, "\n\n---\n\n{}\n", ATTRIBUTION);
    out
}

/// Writes the tutorial to `<output_dir>/<project>/`.
pub struct CombineTutorial;

#[async_trait]
impl Stage for CombineTutorial {
    type Prepared = CombineInput;
    type Output = PathBuf;

    fn name(&self) -> &'static str {
        "combine"
    }

    fn prepare(&self, state: &SharedState) -> Result<CombineInput> {
        let project = state.require_project_name()?.to_string();
        let abstractions = state.require_abstractions()?.to_vec();
        let chapters = state.require_chapters()?.to_vec();
        if let Some(bad) = chapters
            .iter()
            .find(|c| c.abstraction_index >= abstractions.len())
        {
            return Err(TutorError::InvalidOperation(format!(
                "chapter refers to abstraction {} of {}",
                bad.abstraction_index,
                abstractions.len()
            )));
        }

        let locator = &state.request.locator;
        Ok(CombineInput {
            output_dir: state.request.output_dir.join(&project),
            is_remote: !matches!(locator, RepositoryLocator::Local(_)),
            source: locator.to_string(),
            project,
            abstractions,
            relationships: state.require_relationships()?.clone(),
            chapters,
        })
    }

    async fn execute(&self, input: &CombineInput, _attempt: u32) -> anyhow::Result<PathBuf> {
        tokio::fs::create_dir_all(&input.output_dir)
            .await
            .with_context(|| format!("creating {}", input.output_dir.display()))?;

        let index_path = input.output_dir.join("index.md");
        tokio::fs::write(&index_path, render_index(input))
            .await
            .with_context(|| format!("writing {}", index_path.display()))?;

        for (position, draft) in input.chapters.iter().enumerate() {
            let name = &input.abstractions[draft.abstraction_index].name;
            let path = input.output_dir.join(chapter_filename(position, name));
            let mut content = draft.content.trim_end().to_string();
            let _ = write!(content, "\n\n---\n\n{}\n", ATTRIBUTION);
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
        }

        info!(
            "Tutorial with {} chapters written to {}",
            input.chapters.len(),
            input.output_dir.display()
        );
        Ok(input.output_dir.clone())
    }

    fn merge(&self, state: &mut SharedState, output: PathBuf) {
        state.output_dir = Some(output);
    }
}
