//! Prompt rendering for every LLM-backed stage.

use crate::batching::BatchSpan;
use codetutor_core::{AbstractionRecord, ChapterDraft, RelationshipAnalysis, SourceFile};
use std::fmt::Write;

/// Title-cased language name, e.g. `spanish` -> `Spanish`.
pub fn display_language(language: &str) -> String {
    let language = language.trim();
    let mut chars = language.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Extra instruction for non-English output; empty for English.
pub fn language_instruction(language: &str, what: &str) -> String {
    if language.trim().is_empty() || language.trim().eq_ignore_ascii_case("english") {
        return String::new();
    }
    let lang = display_language(language);
    format!(
        "IMPORTANT: Write {what} in **{lang}**. Do NOT use English for these. \
         Keep indices, code, identifiers and file paths unchanged.\n\n"
    )
}

fn push_file(out: &mut String, index: usize, file: &SourceFile) {
    let _ = write!(out, "--- File Index {}: {} ---\n{}\n\n", index, file.path, file.content);
}

/// Map-phase prompt for one batch. Files are numbered from 0 within the batch.
pub fn identify_batch(
    project: &str,
    files: &[SourceFile],
    span: BatchSpan,
    total_files: usize,
    max_abstractions: usize,
    language: &str,
) -> String {
    let batch_files = &files[span.start..span.end];
    let mut context = String::new();
    for (local, file) in batch_files.iter().enumerate() {
        push_file(&mut context, local, file);
    }

    let listing = batch_files
        .iter()
        .enumerate()
        .map(|(i, f)| format!("- {} # {}", i, f.path))
        .collect::<Vec<_>>()
        .join("\n");

    let lang = language_instruction(language, "the `name` and `description` of each abstraction");

    format!(
        r#"For the project `{project}`:

Codebase context (files {first}-{last} of {total_files}, numbered locally from 0):
{context}
{lang}Analyze ONLY the files above. Identify up to {max_abstractions} of the most important core abstractions visible in them that would help someone new to the codebase.

For each abstraction, provide:
1. A concise `name`.
2. A beginner-friendly `description` explaining what it is with a simple analogy, in around 100 words.
3. A list of relevant `file_indices` using the local numbers below, formatted as `index # path`.

Files in this batch:
{listing}

Format the output as a YAML list:

```yaml
- name: |
    Query Processing
  description: |
    Explains what the abstraction does.
    It's like a central dispatcher routing requests.
  file_indices:
    - 0 # path/to/file.py
    - 2 # path/to/other.py
```"#,
        first = span.start + 1,
        last = span.end,
    )
}

fn abstraction_listing(abstractions: &[AbstractionRecord]) -> String {
    abstractions
        .iter()
        .enumerate()
        .map(|(i, a)| format!("- {} # {}", i, a.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Contents of every file referenced by `abstractions`, each listed once.
fn referenced_files(abstractions: &[AbstractionRecord], files: &[SourceFile]) -> String {
    let mut indices: Vec<usize> = abstractions.iter().flat_map(|a| a.files.iter().copied()).collect();
    indices.sort_unstable();
    indices.dedup();

    let mut out = String::new();
    for index in indices {
        if let Some(file) = files.get(index) {
            push_file(&mut out, index, file);
        }
    }
    out
}

pub fn relationships(
    project: &str,
    abstractions: &[AbstractionRecord],
    files: &[SourceFile],
    language: &str,
) -> String {
    let mut context = String::from("Identified Abstractions:\n");
    for (i, a) in abstractions.iter().enumerate() {
        let file_list = a
            .files
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            context,
            "- Index {}: {} (Relevant file indices: [{}])\n  Description: {}",
            i, a.name, file_list, a.description
        );
    }
    context.push_str("\nRelevant File Snippets (referenced by index and path):\n");
    context.push_str(&referenced_files(abstractions, files));

    let lang = language_instruction(language, "the `summary` and the relationship `label`s");
    let listing = abstraction_listing(abstractions);

    format!(
        r#"Based on the following abstractions and relevant code snippets from the project `{project}`:

List of Abstraction Indices and Names:
{listing}

Context (Abstractions, Descriptions, Code):
{context}
{lang}Please provide:
1. A high-level `summary` of the project's main purpose and functionality in a few beginner-friendly sentences. Use markdown formatting with **bold** and *italic* text to highlight important concepts.
2. A list (`relationships`) describing the key interactions between these abstractions. For each relationship, specify:
    - `from_abstraction`: Index of the source abstraction (e.g., `0 # AbstractionName1`)
    - `to_abstraction`: Index of the target abstraction (e.g., `1 # AbstractionName2`)
    - `label`: A brief label for the interaction **in just a few words** (e.g., "Manages", "Inherits", "Uses").

Only use the indices listed above.

Format the output as YAML:

```yaml
summary: |
  A brief, simple explanation of the project.
  Can span multiple lines with **bold** and *italic* for emphasis.
relationships:
  - from_abstraction: 0 # AbstractionName1
    to_abstraction: 1 # AbstractionName2
    label: "Manages"
  - from_abstraction: 2 # AbstractionName3
    to_abstraction: 0 # AbstractionName1
    label: "Provides config"
```

Now, provide the YAML output:
"#
    )
}

pub fn order_chapters(
    project: &str,
    abstractions: &[AbstractionRecord],
    relationships: &RelationshipAnalysis,
) -> String {
    let listing = abstraction_listing(abstractions);
    let mut context = format!("Project Summary:\n{}\n\nRelationships (Indices refer to abstractions above):\n", relationships.summary);
    for edge in &relationships.edges {
        let from = abstractions.get(edge.from).map(|a| a.name.as_str()).unwrap_or("?");
        let to = abstractions.get(edge.to).map(|a| a.name.as_str()).unwrap_or("?");
        let _ = writeln!(
            context,
            "- From {} ({}) to {} ({}): {}",
            edge.from, from, edge.to, to, edge.label
        );
    }

    format!(
        r#"Given the following project abstractions and their relationships for the project `{project}`:

Abstractions (Index # Name):
{listing}

Context about relationships and project summary:
{context}
If you are going to make a tutorial for `{project}`, what is the best order to explain these abstractions, from first to last?
Ideally, first explain those that are the most important or foundational, perhaps user-facing concepts or entry points. Then move to more detailed, lower-level implementation details or supporting concepts.

Every index must appear exactly once.

Output the ordered list of abstraction indices, including the name in a comment for clarity. Use the format `idx # AbstractionName`.

```yaml
- 2 # FoundationalConcept
- 0 # CoreClassA
- 1 # CoreClassB
```

Now, provide the YAML output:
"#
    )
}

/// File name for a chapter: `NN_snake_name.md`, NN being the 1-based position.
pub fn chapter_filename(position: usize, name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                '_'
            }
        })
        .collect();
    format!("{:02}_{}.md", position + 1, safe)
}

/// Everything the chapter prompt needs about one chapter.
pub struct ChapterContext<'a> {
    pub project: &'a str,
    pub position: usize,
    pub abstraction: &'a AbstractionRecord,
    /// `(position, abstraction)` for every chapter, in reading order
    pub chapters: &'a [(usize, &'a AbstractionRecord)],
    pub files: &'a [SourceFile],
    pub previous: &'a [ChapterDraft],
    pub language: &'a str,
}

pub fn write_chapter(ctx: &ChapterContext<'_>) -> String {
    let chapter_num = ctx.position + 1;
    let name = &ctx.abstraction.name;

    let listing = ctx
        .chapters
        .iter()
        .map(|(pos, a)| format!("{}. [{}]({})", pos + 1, a.name, chapter_filename(*pos, &a.name)))
        .collect::<Vec<_>>()
        .join("\n");

    let mut snippets = String::new();
    for &index in &ctx.abstraction.files {
        if let Some(file) = ctx.files.get(index) {
            push_file(&mut snippets, index, file);
        }
    }
    if snippets.is_empty() {
        snippets.push_str("No specific code snippets provided for this abstraction.\n");
    }

    let previous = if ctx.previous.is_empty() {
        "This is the first chapter.".to_string()
    } else {
        ctx.previous
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n")
    };

    let neighbour = |offset: isize| {
        let pos = ctx.position as isize + offset;
        ctx.chapters
            .iter()
            .find(|(p, _)| *p as isize == pos)
            .map(|(p, a)| format!("[{}]({})", a.name, chapter_filename(*p, &a.name)))
    };
    let prev_link = neighbour(-1).unwrap_or_else(|| "none".to_string());
    let next_link = neighbour(1).unwrap_or_else(|| "none".to_string());

    let lang = language_instruction(
        ctx.language,
        "the entire chapter, including headings, explanations and code comments",
    );

    format!(
        r#"{lang}Write a very beginner-friendly tutorial chapter (in Markdown format) for the project `{project}` about the concept: "{name}". This is Chapter {chapter_num}.

Concept Details:
- Name: {name}
- Description:
{description}

Complete Tutorial Structure:
{listing}

Context from previous chapters:
{previous}

Relevant Code Snippets (code itself remains unchanged):
{snippets}
Instructions for the chapter:
- Start with a clear heading (e.g., `# Chapter {chapter_num}: {name}`).
- Previous chapter: {prev_link}. Next chapter: {next_link}. Link to them with the Markdown links above when referring to them.
- Begin with a high-level motivation: what problem does this abstraction solve? Use a concrete use case.
- Break complex ideas into small pieces and explain each one step by step.
- Keep every code block under 10 lines; explain it right after.
- Use a simple mermaid sequenceDiagram if it helps, with at most 5 participants.
- End with a brief summary and a transition to the next chapter.

Output *only* the Markdown content for this chapter.

Now, directly provide a super beginner-friendly Markdown output (DON'T need ```markdown``` tags):
"#,
        project = ctx.project,
        description = ctx.abstraction.description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_instruction_only_for_non_english() {
        assert!(language_instruction("english", "x").is_empty());
        assert!(language_instruction("English", "x").is_empty());
        let fr = language_instruction("french", "the summary");
        assert!(fr.contains("**French**"));
        assert!(fr.contains("the summary"));
    }

    #[test]
    fn test_chapter_filename() {
        assert_eq!(chapter_filename(0, "Query Engine"), "01_query_engine.md");
        assert_eq!(chapter_filename(11, "LLM/Gateway"), "12_llm_gateway.md");
    }

    #[test]
    fn test_identify_prompt_uses_local_indices() {
        let files = vec![
            SourceFile::new("a.rs", "fn a() {}"),
            SourceFile::new("b.rs", "fn b() {}"),
            SourceFile::new("c.rs", "fn c() {}"),
        ];
        let prompt = identify_batch("demo", &files, BatchSpan { start: 1, end: 3 }, 3, 5, "english");
        assert!(prompt.contains("--- File Index 0: b.rs ---"));
        assert!(prompt.contains("--- File Index 1: c.rs ---"));
        assert!(!prompt.contains("a.rs"));
        assert!(prompt.contains("files 2-3 of 3"));
    }
}
