use clap::Parser;
use folio_segment::{SegmentStrategy, SegmenterConfig};
use std::fs;
use std::io::{self, Read};

/// A CLI tool to segment book text into JSON chunks using folio-segment.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Book id attached to every chunk.
    #[arg(short, long, default_value_t = 0)]
    book_id: u64,

    /// Segmentation strategy: paragraph, sliding-window, or argument.
    #[arg(short, long, default_value = "paragraph")]
    strategy: SegmentStrategy,

    /// Minimum words per chunk before paragraphs stop merging.
    #[arg(long, default_value_t = 50)]
    min_words: usize,

    /// Word budget per chunk.
    #[arg(long, default_value_t = 400)]
    max_words: usize,

    /// Window width in words (sliding-window strategy).
    #[arg(long, default_value_t = 200)]
    window: usize,

    /// Words shared between consecutive windows.
    #[arg(long, default_value_t = 40)]
    overlap: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let text = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let config = SegmenterConfig::new(args.strategy)
        .with_min_chunk_words(args.min_words)
        .with_max_chunk_words(args.max_words)
        .with_window(args.window, args.overlap);

    let segmenter = config
        .build()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let chunks = segmenter.segment(args.book_id, &text);

    let json_output = serde_json::to_string_pretty(&chunks)?;
    println!("{}", json_output);

    Ok(())
}
