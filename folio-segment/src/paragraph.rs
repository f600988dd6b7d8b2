use serde_json::json;

use crate::chunk::Chunk;
use crate::segmenter::{Segmenter, SegmenterConfig, count_words, paragraph_spans, word_spans};

/// Blank-line paragraph segmentation.
///
/// Consecutive paragraphs accumulate into one chunk until `min_chunk_words`
/// is reached; a lone paragraph above `max_chunk_words` is split on word
/// boundaries. Chunks are contiguous slices of the source, so merged
/// paragraphs keep the blank lines separating them.
pub struct ParagraphSegmenter {
    config: SegmenterConfig,
}

struct Run {
    start: usize,
    end: usize,
    words: usize,
    paragraphs: usize,
}

impl ParagraphSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    fn push_chunk(
        &self,
        chunks: &mut Vec<Chunk>,
        book_id: u64,
        text: &str,
        start: usize,
        end: usize,
        paragraphs: usize,
    ) {
        let slice = &text[start..end];
        if slice.trim().is_empty() {
            return;
        }
        let index = chunks.len() as u32;
        chunks.push(
            Chunk::new(book_id, index, slice, start, end)
                .with_tag("type", json!("paragraph"))
                .with_tag("paragraphs", json!(paragraphs)),
        );
    }

    /// Word-boundary split for a paragraph above the chunk budget.
    fn split_oversized(
        &self,
        chunks: &mut Vec<Chunk>,
        book_id: u64,
        text: &str,
        start: usize,
        end: usize,
    ) {
        let spans = word_spans(&text[start..end]);
        for group in spans.chunks(self.config.max_chunk_words) {
            let (first, _) = group[0];
            let (_, last) = group[group.len() - 1];
            self.push_chunk(chunks, book_id, text, start + first, start + last, 1);
        }
    }
}

impl Segmenter for ParagraphSegmenter {
    fn segment(&self, book_id: u64, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut run: Option<Run> = None;

        for (start, end) in paragraph_spans(text) {
            let words = count_words(&text[start..end]);
            if words > self.config.max_chunk_words {
                if let Some(r) = run.take() {
                    self.push_chunk(&mut chunks, book_id, text, r.start, r.end, r.paragraphs);
                }
                self.split_oversized(&mut chunks, book_id, text, start, end);
                continue;
            }
            match run.as_mut() {
                Some(r) => {
                    r.end = end;
                    r.words += words;
                    r.paragraphs += 1;
                }
                None => {
                    run = Some(Run {
                        start,
                        end,
                        words,
                        paragraphs: 1,
                    });
                }
            }
            if run.as_ref().is_some_and(|r| r.words >= self.config.min_chunk_words) {
                if let Some(r) = run.take() {
                    self.push_chunk(&mut chunks, book_id, text, r.start, r.end, r.paragraphs);
                }
            }
        }
        // The trailing run may fall below the minimum.
        if let Some(r) = run.take() {
            self.push_chunk(&mut chunks, book_id, text, r.start, r.end, r.paragraphs);
        }
        chunks
    }

    fn name(&self) -> &'static str {
        "paragraph"
    }
}
