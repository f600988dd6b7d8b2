use serde::{Deserialize, Serialize};

use crate::argument::ArgumentSegmenter;
use crate::chunk::Chunk;
use crate::paragraph::ParagraphSegmenter;
use crate::sliding::SlidingWindowSegmenter;

/// Errors raised while building a segmenter from configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    #[error("invalid segmenter config: {0}")]
    InvalidConfig(String),
}

/// Which segmentation strategy to apply to a book's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStrategy {
    /// Blank-line paragraphs, merged up to a minimum size.
    Paragraph,
    /// Fixed-size word windows with configurable overlap.
    SlidingWindow,
    /// Section- and discourse-marker-aware grouping for argumentative prose.
    Argument,
}

impl Default for SegmentStrategy {
    fn default() -> Self {
        Self::Paragraph
    }
}

impl std::fmt::Display for SegmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentStrategy::Paragraph => write!(f, "paragraph"),
            SegmentStrategy::SlidingWindow => write!(f, "sliding-window"),
            SegmentStrategy::Argument => write!(f, "argument"),
        }
    }
}

impl std::str::FromStr for SegmentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paragraph" | "para" => Ok(SegmentStrategy::Paragraph),
            "sliding-window" | "sliding_window" | "sliding" | "window" => {
                Ok(SegmentStrategy::SlidingWindow)
            }
            "argument" | "philosophical" => Ok(SegmentStrategy::Argument),
            _ => Err(format!(
                "Invalid strategy: '{s}'. Valid values are: paragraph, sliding-window, argument"
            )),
        }
    }
}

/// Tuning knobs shared by all strategies. All sizes count whitespace words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub strategy: SegmentStrategy,
    /// Paragraphs are merged until a chunk reaches at least this many words.
    pub min_chunk_words: usize,
    /// Hard budget; a single oversized paragraph is split down to this.
    pub max_chunk_words: usize,
    /// Window width for the sliding-window strategy.
    pub window_words: usize,
    /// Words shared between consecutive windows. Must stay below the width.
    pub overlap_words: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            strategy: SegmentStrategy::Paragraph,
            min_chunk_words: 50,
            max_chunk_words: 400,
            window_words: 200,
            overlap_words: 40,
        }
    }
}

impl SegmenterConfig {
    pub fn new(strategy: SegmentStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_min_chunk_words(mut self, words: usize) -> Self {
        self.min_chunk_words = words;
        self
    }

    pub fn with_max_chunk_words(mut self, words: usize) -> Self {
        self.max_chunk_words = words;
        self
    }

    pub fn with_window(mut self, window_words: usize, overlap_words: usize) -> Self {
        self.window_words = window_words;
        self.overlap_words = overlap_words;
        self
    }

    fn validate(&self) -> Result<(), SegmentError> {
        if self.max_chunk_words == 0 {
            return Err(SegmentError::InvalidConfig(
                "max_chunk_words must be positive".into(),
            ));
        }
        if self.min_chunk_words > self.max_chunk_words {
            return Err(SegmentError::InvalidConfig(format!(
                "min_chunk_words ({}) exceeds max_chunk_words ({})",
                self.min_chunk_words, self.max_chunk_words
            )));
        }
        if self.window_words == 0 {
            return Err(SegmentError::InvalidConfig(
                "window_words must be positive".into(),
            ));
        }
        if self.overlap_words >= self.window_words {
            return Err(SegmentError::InvalidConfig(format!(
                "overlap_words ({}) must be smaller than window_words ({})",
                self.overlap_words, self.window_words
            )));
        }
        Ok(())
    }

    /// Build the configured strategy as a trait object.
    pub fn build(&self) -> Result<Box<dyn Segmenter>, SegmentError> {
        self.validate()?;
        Ok(match self.strategy {
            SegmentStrategy::Paragraph => Box::new(ParagraphSegmenter::new(self.clone())),
            SegmentStrategy::SlidingWindow => Box::new(SlidingWindowSegmenter::new(self.clone())),
            SegmentStrategy::Argument => Box::new(ArgumentSegmenter::new(self.clone())),
        })
    }
}

/// Splits a book's text into [`Chunk`]s.
///
/// Implementations drop whitespace-only output and assign `index` 0-based in
/// emission order after filtering.
pub trait Segmenter: Send + Sync {
    fn segment(&self, book_id: u64, text: &str) -> Vec<Chunk>;

    fn name(&self) -> &'static str;
}

/// Byte spans of whitespace-delimited words, in order.
pub(crate) fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Byte spans of paragraphs: maximal runs of lines that are not blank.
/// Spans exclude trailing line whitespace and the blank separators.
pub(crate) fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut content_end = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                spans.push((s, content_end));
            }
        } else {
            if start.is_none() {
                start = Some(line_start);
            }
            content_end = line_start + line.trim_end().len();
        }
    }
    if let Some(s) = start {
        spans.push((s, content_end));
    }
    spans
}

pub(crate) fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
