use regex::Regex;
use serde_json::json;

use crate::chunk::Chunk;
use crate::segmenter::{Segmenter, SegmenterConfig, count_words, paragraph_spans};

/// Heading shapes that open a new section: Markdown headings, numbered or
/// roman-numeral headings, chapter-style lines, short all-caps title lines.
const HEADING_PATTERNS: &[&str] = &[
    r"^#{1,6}\s+\S",
    r"^(?:\d+|[IVXLCDM]+)[.)]\s+\S",
    r"^(?i:chapter|part|book|section)\b[^.!?]*$",
    r"^[A-Z][A-Z0-9 ,:;'\-]{3,60}$",
];

/// Markers that continue an argument begun in the previous paragraph.
const CONTINUATION_MARKERS: &[&str] = &[
    "furthermore",
    "moreover",
    "in addition",
    "additionally",
    "second",
    "secondly",
    "third",
    "thirdly",
    "however",
    "nevertheless",
    "nonetheless",
    "on the other hand",
    "conversely",
    "similarly",
    "likewise",
    "by the same token",
];

/// Markers that close an argument; the paragraph joins and seals the group.
const CONCLUSION_MARKERS: &[&str] = &[
    "therefore",
    "thus",
    "hence",
    "consequently",
    "it follows that",
    "in conclusion",
    "accordingly",
    "as a result",
    "we conclude",
    "finally",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Continuation,
    Conclusion,
}

/// Section- and discourse-aware segmentation for argumentative prose.
///
/// Headings open sections; within a section, paragraphs opening with a
/// discourse marker stay with their predecessor as one argument chunk, even
/// past `max_chunk_words`. Only a group far beyond budget (twice the
/// maximum) is split, at sentence boundaries, and adjacent parts then share
/// the boundary sentence.
pub struct ArgumentSegmenter {
    config: SegmenterConfig,
    heading_patterns: Vec<Regex>,
}

struct Group {
    start: usize,
    end: usize,
    words: usize,
    markers: Vec<String>,
}

impl ArgumentSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        let heading_patterns = HEADING_PATTERNS
            .iter()
            .map(|&pattern| Regex::new(pattern).unwrap())
            .collect();
        Self {
            config,
            heading_patterns,
        }
    }

    fn is_heading(&self, line: &str) -> bool {
        !line.is_empty() && self.heading_patterns.iter().any(|re| re.is_match(line))
    }

    /// Byte spans of sections. A heading line closes the previous section and
    /// opens the next one, carrying the heading with it.
    fn section_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut sections = Vec::new();
        let mut current_start = 0;
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            if self.is_heading(line.trim()) && line_start > current_start {
                sections.push((current_start, line_start));
                current_start = line_start;
            }
        }
        if current_start < text.len() || sections.is_empty() {
            sections.push((current_start, text.len()));
        }
        sections
    }

    /// Group a section's paragraphs by discourse markers. Heading paragraphs
    /// and conclusion-sealed groups never accept a following join.
    fn group_paragraphs(&self, text: &str, section: (usize, usize)) -> Vec<Group> {
        let slice = &text[section.0..section.1];
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Option<Group> = None;
        let mut sealed = false;

        for (ps, pe) in paragraph_spans(slice) {
            let (start, end) = (section.0 + ps, section.0 + pe);
            let para = &text[start..end];
            let words = count_words(para);
            let first_line = para.lines().next().unwrap_or("").trim();

            if self.is_heading(first_line) {
                if let Some(g) = current.take() {
                    groups.push(g);
                }
                current = Some(Group {
                    start,
                    end,
                    words,
                    markers: Vec::new(),
                });
                sealed = true;
                continue;
            }

            match (current.as_mut(), opening_marker(para)) {
                (Some(g), Some((marker, kind))) if !sealed => {
                    g.end = end;
                    g.words += words;
                    g.markers.push(marker.to_string());
                    if kind == MarkerKind::Conclusion {
                        sealed = true;
                    }
                }
                _ => {
                    if let Some(g) = current.take() {
                        groups.push(g);
                    }
                    sealed = false;
                    current = Some(Group {
                        start,
                        end,
                        words,
                        markers: Vec::new(),
                    });
                }
            }
        }
        if let Some(g) = current.take() {
            groups.push(g);
        }
        groups
    }

    /// A plain group below the minimum merges into whatever follows it, so
    /// headings and stray short paragraphs travel with their neighbors.
    fn merge_small(&self, groups: Vec<Group>) -> Vec<Group> {
        let mut merged: Vec<Group> = Vec::new();
        for mut g in groups {
            let absorb = merged
                .last()
                .is_some_and(|prev| prev.markers.is_empty() && prev.words < self.config.min_chunk_words);
            if absorb {
                if let Some(prev) = merged.pop() {
                    g.start = prev.start;
                    g.words += prev.words;
                }
            }
            merged.push(g);
        }
        merged
    }

    fn push_group(
        &self,
        chunks: &mut Vec<Chunk>,
        book_id: u64,
        text: &str,
        start: usize,
        end: usize,
        markers: &[String],
        continued: bool,
    ) {
        let slice = &text[start..end];
        if slice.trim().is_empty() {
            return;
        }
        let kind = if markers.is_empty() { "paragraph" } else { "argument" };
        let index = chunks.len() as u32;
        let mut chunk = Chunk::new(book_id, index, slice, start, end).with_tag("type", json!(kind));
        if !markers.is_empty() {
            chunk = chunk.with_tag("markers", json!(markers));
        }
        if continued {
            chunk = chunk.with_tag("continued", json!(true));
        }
        chunks.push(chunk);
    }

    /// Sentence-boundary split for a group far beyond budget. Each part after
    /// the first re-opens with the previous part's final sentence, so spans
    /// of adjacent parts overlap by that shared sentence.
    fn split_long_group(&self, chunks: &mut Vec<Chunk>, book_id: u64, text: &str, group: &Group) {
        let slice = &text[group.start..group.end];
        let sentences = sentence_spans(slice);
        if sentences.len() <= 1 {
            self.push_group(chunks, book_id, text, group.start, group.end, &group.markers, false);
            return;
        }

        let mut parts: Vec<(usize, usize)> = Vec::new();
        let mut first = 0;
        let mut words = 0;
        for (i, &(s, e)) in sentences.iter().enumerate() {
            let sentence_words = count_words(&slice[s..e]);
            if i > first && words + sentence_words > self.config.max_chunk_words {
                parts.push((first, i));
                first = i;
                words = 0;
            }
            words += sentence_words;
        }
        parts.push((first, sentences.len()));

        for (pi, &(a, b)) in parts.iter().enumerate() {
            let open = if pi == 0 { a } else { a - 1 };
            let start = group.start + sentences[open].0;
            let end = group.start + sentences[b - 1].1;
            self.push_group(chunks, book_id, text, start, end, &group.markers, pi > 0);
        }
    }
}

impl Segmenter for ArgumentSegmenter {
    fn segment(&self, book_id: u64, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for section in self.section_spans(text) {
            let groups = self.merge_small(self.group_paragraphs(text, section));
            for group in groups {
                if group.words > 2 * self.config.max_chunk_words {
                    self.split_long_group(&mut chunks, book_id, text, &group);
                } else {
                    self.push_group(
                        &mut chunks,
                        book_id,
                        text,
                        group.start,
                        group.end,
                        &group.markers,
                        false,
                    );
                }
            }
        }
        chunks
    }

    fn name(&self) -> &'static str {
        "argument"
    }
}

fn opening_marker(paragraph: &str) -> Option<(&'static str, MarkerKind)> {
    let head: String = paragraph.chars().take(48).collect::<String>().to_lowercase();
    for &marker in CONCLUSION_MARKERS {
        if marker_matches(&head, marker) {
            return Some((marker, MarkerKind::Conclusion));
        }
    }
    for &marker in CONTINUATION_MARKERS {
        if marker_matches(&head, marker) {
            return Some((marker, MarkerKind::Continuation));
        }
    }
    None
}

fn marker_matches(head: &str, marker: &str) -> bool {
    head.strip_prefix(marker)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
}

/// Sentence boundaries: terminator punctuation plus trailing quotes, followed
/// by whitespace or end of text. Abbreviations are not special-cased.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut iter = text.char_indices().peekable();
    while let Some((i, ch)) = iter.next() {
        if start.is_none() && !ch.is_whitespace() {
            start = Some(i);
        }
        if matches!(ch, '.' | '!' | '?') {
            let mut end = i + ch.len_utf8();
            while let Some(&(j, c)) = iter.peek() {
                if matches!(c, '"' | '\'' | ')' | ']' | '\u{00bb}' | '\u{201d}' | '\u{2019}') {
                    end = j + c.len_utf8();
                    iter.next();
                } else {
                    break;
                }
            }
            let at_boundary = iter.peek().is_none_or(|&(_, c)| c.is_whitespace());
            if at_boundary {
                if let Some(s) = start.take() {
                    spans.push((s, end));
                }
            }
        }
    }
    if let Some(s) = start {
        let end = text.trim_end().len();
        if end > s {
            spans.push((s, end));
        }
    }
    spans
}
