pub mod argument;
pub mod chunk;
pub mod paragraph;
pub mod segmenter;
pub mod sliding;

// Re-export the types callers need to segment a book
pub use argument::ArgumentSegmenter;
pub use chunk::Chunk;
pub use paragraph::ParagraphSegmenter;
pub use segmenter::{SegmentError, SegmentStrategy, Segmenter, SegmenterConfig};
pub use sliding::SlidingWindowSegmenter;
