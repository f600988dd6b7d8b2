use serde_json::json;

use crate::chunk::Chunk;
use crate::segmenter::{Segmenter, SegmenterConfig, word_spans};

/// Fixed-width word windows with overlap.
///
/// Windows are `window_words` wide and advance by `window_words -
/// overlap_words` positions. The final window may be narrower; a window that
/// would be fully contained in its predecessor is never emitted.
pub struct SlidingWindowSegmenter {
    config: SegmenterConfig,
}

impl SlidingWindowSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }
}

impl Segmenter for SlidingWindowSegmenter {
    fn segment(&self, book_id: u64, text: &str) -> Vec<Chunk> {
        let spans = word_spans(text);
        if spans.is_empty() {
            return Vec::new();
        }
        let window = self.config.window_words;
        // Validated at config build: overlap < window, so step >= 1.
        let step = window - self.config.overlap_words;

        let mut chunks = Vec::new();
        let mut first = 0;
        loop {
            let last = (first + window).min(spans.len());
            let (start, _) = spans[first];
            let (_, end) = spans[last - 1];
            let index = chunks.len() as u32;
            chunks.push(
                Chunk::new(book_id, index, &text[start..end], start, end)
                    .with_tag("type", json!("sliding_window"))
                    .with_tag("overlap_words", json!(self.config.overlap_words)),
            );
            if last == spans.len() {
                break;
            }
            first += step;
        }
        chunks
    }

    fn name(&self) -> &'static str {
        "sliding-window"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::SegmentStrategy;

    fn segmenter(window: usize, overlap: usize) -> SlidingWindowSegmenter {
        SlidingWindowSegmenter::new(
            SegmenterConfig::new(SegmentStrategy::SlidingWindow).with_window(window, overlap),
        )
    }

    #[test]
    fn test_windows_advance_by_step() {
        let text = "w0 w1 w2 w3 w4 w5 w6 w7 w8 w9";
        let chunks = segmenter(4, 1).segment(1, text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "w0 w1 w2 w3");
        assert_eq!(chunks[1].text, "w3 w4 w5 w6");
        assert_eq!(chunks[2].text, "w6 w7 w8 w9");
    }

    #[test]
    fn test_short_final_window() {
        let text = "a b c d e f g";
        let chunks = segmenter(3, 0).segment(1, text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text, "g");
    }

    #[test]
    fn test_single_window_when_text_fits() {
        let text = "one two three";
        let chunks = segmenter(10, 2).segment(1, text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].start_pos, 0);
        assert_eq!(chunks[0].end_pos as usize, text.len());
    }

    #[test]
    fn test_spans_slice_the_source_and_cover_words() {
        let text = "The  quick\nbrown fox jumps over the lazy dog again and again";
        let chunks = segmenter(5, 2).segment(4, text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(
                chunk.text,
                &text[chunk.start_pos as usize..chunk.end_pos as usize]
            );
            assert_eq!(chunk.metadata["type"], json!("sliding_window"));
        }
        // Every non-whitespace byte of the source falls inside some span.
        let covered: Vec<(usize, usize)> = chunks
            .iter()
            .map(|c| (c.start_pos as usize, c.end_pos as usize))
            .collect();
        for (i, ch) in text.char_indices() {
            if !ch.is_whitespace() {
                assert!(
                    covered.iter().any(|&(s, e)| i >= s && i < e),
                    "byte {i} ({ch:?}) not covered"
                );
            }
        }
    }

    #[test]
    fn test_consecutive_windows_share_overlap() {
        let text = (0..20).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ");
        let chunks = segmenter(6, 2).segment(1, &text);
        for pair in chunks.windows(2) {
            let head_words: Vec<&str> = pair[0].text.split_whitespace().collect();
            let tail_words: Vec<&str> = pair[1].text.split_whitespace().collect();
            // Last two words of one window open the next.
            assert_eq!(&head_words[head_words.len() - 2..], &tail_words[..2]);
        }
    }

    #[test]
    fn test_cjk_text_respects_char_boundaries() {
        let text = "哲学 は 存在 を 問う 学問 です";
        let chunks = segmenter(3, 1).segment(1, text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(
                chunk.text,
                &text[chunk.start_pos as usize..chunk.end_pos as usize]
            );
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(segmenter(5, 1).segment(1, "").is_empty());
        assert!(segmenter(5, 1).segment(1, "   \n ").is_empty());
    }
}
