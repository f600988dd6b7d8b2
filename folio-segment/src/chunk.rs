use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A contiguous piece of book text prepared for embedding.
///
/// `start_pos` and `end_pos` are byte offsets into the source text the chunk
/// was cut from; `text == source[start_pos..end_pos]` for every strategy.
/// Spans of adjacent chunks may overlap where a strategy keeps shared
/// context, such as sliding windows or a repeated boundary sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk text, never empty or whitespace-only once emitted.
    pub text: String,
    /// 0-based position of this chunk within its book.
    pub index: u32,
    /// Owning book.
    pub book_id: u64,
    /// Byte offset of the chunk's start in the source text.
    pub start_pos: u32,
    /// Byte offset one past the chunk's end in the source text.
    pub end_pos: u32,
    /// Strategy tags and caller annotations.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(
        book_id: u64,
        index: u32,
        text: impl Into<String>,
        start_pos: usize,
        end_pos: usize,
    ) -> Self {
        Self {
            text: text.into(),
            index,
            book_id,
            start_pos: start_pos as u32,
            end_pos: end_pos as u32,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata tag, builder style.
    pub fn with_tag(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Rough token estimate for budgeting provider requests. English prose
    /// averages about 1.3 tokens per whitespace word.
    pub fn token_count(&self) -> usize {
        (self.word_count() as f64 * 1.3).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_count_estimate() {
        let chunk = Chunk::new(1, 0, "one two three four five six seven eight nine ten", 0, 49);
        assert_eq!(chunk.word_count(), 10);
        assert_eq!(chunk.token_count(), 13);
    }

    #[test]
    fn test_token_count_empty() {
        let chunk = Chunk::new(1, 0, "", 0, 0);
        assert_eq!(chunk.token_count(), 0);
    }

    #[test]
    fn test_with_tag() {
        let chunk = Chunk::new(7, 2, "text", 0, 4).with_tag("type", json!("paragraph"));
        assert_eq!(chunk.metadata["type"], json!("paragraph"));
        assert_eq!(chunk.book_id, 7);
        assert_eq!(chunk.index, 2);
    }

    #[test]
    fn test_serde_round_trip() {
        let chunk = Chunk::new(3, 1, "Der Käse ist alt.", 10, 29).with_tag("lang", json!("de"));
        let encoded = serde_json::to_string(&chunk).unwrap();
        let decoded: Chunk = serde_json::from_str(&encoded).unwrap();
        assert_eq!(chunk, decoded);
    }
}
