use codetutor_core::SourceFile;

/// Characters the batch prompt adds per file beyond its content and two
/// copies of its path: the section header, the listing line and their
/// index numbers.
pub const FILE_HEADER_OVERHEAD: usize = 48;

/// Prompt characters one file costs inside a batch.
pub fn file_cost(file: &SourceFile) -> usize {
    // char_len counts the path once; the listing line repeats it
    file.char_len() + file.path.chars().count() + FILE_HEADER_OVERHEAD
}

/// A contiguous run of files, `start..end` in the global file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchSpan {
    pub start: usize,
    pub end: usize,
}

impl BatchSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Global index of batch-local file `local`, if it lies inside the span.
    pub fn to_global(&self, local: usize) -> Option<usize> {
        if local < self.len() {
            Some(self.start + local)
        } else {
            None
        }
    }
}

/// Split `files` into contiguous batches whose rendered size stays within
/// `char_budget`. A file larger than the budget on its own gets a batch to
/// itself (the gateway compresses it). Every file lands in exactly one batch.
pub fn partition(files: &[SourceFile], char_budget: usize) -> Vec<BatchSpan> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut used = 0;

    for (i, file) in files.iter().enumerate() {
        let cost = file_cost(file);
        if i > start && used + cost > char_budget {
            spans.push(BatchSpan { start, end: i });
            start = i;
            used = 0;
        }
        used += cost;
    }

    if start < files.len() {
        spans.push(BatchSpan {
            start,
            end: files.len(),
        });
    }
    spans
}
