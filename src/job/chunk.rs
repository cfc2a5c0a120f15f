//! Pages, chunks and the partitioner that groups one into the other.

use serde::{Deserialize, Serialize};

/// Joins page texts inside a chunk's source text.
///
/// The translation prompt asks the model to keep this marker so the
/// reassembler can split a chunk's translation back into pages.
pub const PAGE_BREAK: &str = "\n\n=== PAGE BREAK ===\n\n";

/// The marker without its surrounding blank lines, for splitting.
pub const PAGE_BREAK_MARKER: &str = "=== PAGE BREAK ===";

/// One page of extracted source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number in the source document.
    pub page_number: usize,
    pub text: String,
    /// Index of the owning chunk; stamped by [`partition`].
    pub chunk_index: usize,
    /// Position inside the owning chunk; stamped by [`partition`].
    pub position_in_chunk: usize,
}

impl Page {
    /// A page that has not been assigned to a chunk yet.
    pub fn new(page_number: usize, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
            chunk_index: 0,
            position_in_chunk: 0,
        }
    }
}

/// Lifecycle of a chunk.
///
/// `Pending → Running → Completed`, or through any number of
/// `Retrying { attempt }` steps to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Running,
    Retrying { attempt: u32 },
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkStatus::Completed | ChunkStatus::Failed)
    }
}

/// Why a chunk ended up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every attempt hit a rate limit. Does not fail the job.
    RetriesExhausted,
    /// A non-transient error. Fails the job once reassembly has run.
    Fatal,
}

/// A contiguous group of pages sent to the service in one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub pages: Vec<Page>,
    /// Page texts joined with [`PAGE_BREAK`].
    pub source_text: String,
    pub status: ChunkStatus,
    pub translated_text: String,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
}

impl Chunk {
    fn new(index: usize, pages: Vec<Page>) -> Self {
        let source_text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(PAGE_BREAK);
        Self {
            index,
            pages,
            source_text,
            status: ChunkStatus::Pending,
            translated_text: String::new(),
            error: None,
            failure: None,
        }
    }

    /// Page numbers owned by this chunk, in order.
    pub fn page_numbers(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.page_number).collect()
    }
}

/// Group `pages` into chunks of `group_size`, preserving order.
///
/// Chunk `i` holds pages `[i·G, min((i+1)·G, N))`. Every page has its
/// `chunk_index` and `position_in_chunk` stamped. Zero pages give zero
/// chunks. `group_size` must be ≥ 1; it is validated by the caller.
pub fn partition(pages: Vec<Page>, group_size: usize) -> Vec<Chunk> {
    let group_size = group_size.max(1);
    let mut chunks = Vec::with_capacity(pages.len().div_ceil(group_size));
    let mut pages = pages.into_iter().peekable();

    while pages.peek().is_some() {
        let index = chunks.len();
        let group: Vec<Page> = pages
            .by_ref()
            .take(group_size)
            .enumerate()
            .map(|(position, mut page)| {
                page.chunk_index = index;
                page.position_in_chunk = position;
                page
            })
            .collect();
        chunks.push(Chunk::new(index, group));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(n: usize) -> Vec<Page> {
        (1..=n).map(|i| Page::new(i, format!("text of page {i}"))).collect()
    }

    #[test]
    fn twenty_three_pages_in_fives() {
        let chunks = partition(pages(23), 5);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.pages.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 5, 3]);
        assert_eq!(chunks[4].page_numbers(), vec![21, 22, 23]);
    }

    #[test]
    fn every_page_in_exactly_one_chunk() {
        for n in [1, 2, 7, 10, 31] {
            for g in [1, 3, 10, 40] {
                let chunks = partition(pages(n), g);
                assert_eq!(chunks.len(), n.div_ceil(g), "n={n} g={g}");
                let numbers: Vec<usize> = chunks.iter().flat_map(|c| c.page_numbers()).collect();
                assert_eq!(numbers, (1..=n).collect::<Vec<_>>(), "n={n} g={g}");
            }
        }
    }

    #[test]
    fn stamps_page_positions() {
        let chunks = partition(pages(7), 3);
        for chunk in &chunks {
            assert_eq!(chunk.status, ChunkStatus::Pending);
            for (pos, page) in chunk.pages.iter().enumerate() {
                assert_eq!(page.chunk_index, chunk.index);
                assert_eq!(page.position_in_chunk, pos);
            }
        }
        assert_eq!(chunks[2].pages[0].page_number, 7);
    }

    #[test]
    fn source_text_uses_page_break() {
        let chunks = partition(pages(2), 2);
        assert_eq!(
            chunks[0].source_text,
            "text of page 1\n\n=== PAGE BREAK ===\n\ntext of page 2"
        );
    }

    #[test]
    fn zero_pages_zero_chunks() {
        assert!(partition(Vec::new(), 5).is_empty());
    }

    #[test]
    fn status_serialises_in_snake_case() {
        let json = serde_json::to_string(&ChunkStatus::Retrying { attempt: 2 }).unwrap();
        assert_eq!(json, r#"{"retrying":{"attempt":2}}"#);
        assert_eq!(serde_json::to_string(&ChunkStatus::Pending).unwrap(), r#""pending""#);
    }
}
