//! Book sources feeding the indexer.
//!
//! A [`Library`] hands the orchestrator book ids, raw text, and catalog
//! metadata. Two implementations ship here: [`StaticLibrary`] for tests and
//! embedding into other programs, and [`DirectoryLibrary`] reading
//! `<id>.txt` files (plus optional `<id>.json` metadata) from a directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RetrieverError};

static TITLE_YEAR: OnceLock<Regex> = OnceLock::new();

fn title_year_re() -> &'static Regex {
    TITLE_YEAR.get_or_init(|| Regex::new(r"\((\d{4})\)").unwrap())
}

/// Catalog metadata for one book.
///
/// Every field is optional or defaulted so a sparse catalog never blocks
/// indexing; a metadata fetch failure degrades to `BookMetadata::default()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub pubdate: Option<NaiveDate>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub formats: Vec<String>,
}

impl BookMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_pubdate(mut self, pubdate: NaiveDate) -> Self {
        self.pubdate = Some(pubdate);
        self
    }

    /// Publication year: `pubdate` when present, else a `(YYYY)` marker in
    /// the title. Years outside 1000..=2999 are treated as noise.
    pub fn year(&self) -> Option<i32> {
        if let Some(date) = self.pubdate {
            use chrono::Datelike;
            return Some(date.year());
        }
        year_in_title(&self.title)
    }
}

/// Extract a plausible publication year from a `(YYYY)` marker in a title.
pub fn year_in_title(title: &str) -> Option<i32> {
    title_year_re()
        .captures(title)
        .and_then(|caps| caps[1].parse::<i32>().ok())
        .filter(|year| (1000..=2999).contains(year))
}

/// Source of book text and metadata for indexing.
#[async_trait]
pub trait Library: Send + Sync {
    /// Catalog metadata for a book.
    async fn book_metadata(&self, book_id: u64) -> Result<BookMetadata>;

    /// Full plain text of a book.
    async fn book_text(&self, book_id: u64) -> Result<String>;

    /// Every book id this library can serve, ascending.
    async fn book_ids(&self) -> Result<Vec<u64>>;
}

/// Fixed in-memory library.
#[derive(Debug, Default)]
pub struct StaticLibrary {
    books: HashMap<u64, (BookMetadata, String)>,
}

impl StaticLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, book_id: u64, metadata: BookMetadata, text: impl Into<String>) {
        self.books.insert(book_id, (metadata, text.into()));
    }

    pub fn with_book(
        mut self,
        book_id: u64,
        metadata: BookMetadata,
        text: impl Into<String>,
    ) -> Self {
        self.insert(book_id, metadata, text);
        self
    }
}

#[async_trait]
impl Library for StaticLibrary {
    async fn book_metadata(&self, book_id: u64) -> Result<BookMetadata> {
        self.books
            .get(&book_id)
            .map(|(metadata, _)| metadata.clone())
            .ok_or_else(|| RetrieverError::library(book_id, "unknown book"))
    }

    async fn book_text(&self, book_id: u64) -> Result<String> {
        self.books
            .get(&book_id)
            .map(|(_, text)| text.clone())
            .ok_or_else(|| RetrieverError::library(book_id, "unknown book"))
    }

    async fn book_ids(&self) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self.books.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Metadata sidecar format for [`DirectoryLibrary`].
#[derive(Debug, Default, Deserialize)]
struct MetadataSidecar {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    series: Option<String>,
    #[serde(default)]
    pubdate: Option<NaiveDate>,
    #[serde(default)]
    language: Option<String>,
}

/// Library over a directory of `<id>.txt` files.
///
/// An optional `<id>.json` sidecar supplies metadata; a missing or broken
/// sidecar falls back to a title derived from the id.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn text_path(&self, book_id: u64) -> PathBuf {
        self.root.join(format!("{book_id}.txt"))
    }

    fn sidecar_path(&self, book_id: u64) -> PathBuf {
        self.root.join(format!("{book_id}.json"))
    }
}

#[async_trait]
impl Library for DirectoryLibrary {
    async fn book_metadata(&self, book_id: u64) -> Result<BookMetadata> {
        let fallback = BookMetadata::titled(format!("Book {book_id}"));
        let bytes = match tokio::fs::read(self.sidecar_path(book_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(fallback),
            Err(e) => {
                warn!(book_id, error = %e, "unreadable metadata sidecar, using defaults");
                return Ok(fallback);
            }
        };
        match serde_json::from_slice::<MetadataSidecar>(&bytes) {
            Ok(sidecar) => Ok(BookMetadata {
                title: sidecar.title.unwrap_or(fallback.title),
                authors: sidecar.authors,
                tags: sidecar.tags,
                series: sidecar.series,
                pubdate: sidecar.pubdate,
                language: sidecar.language,
                formats: vec!["txt".to_string()],
            }),
            Err(e) => {
                warn!(book_id, error = %e, "invalid metadata sidecar, using defaults");
                Ok(fallback)
            }
        }
    }

    async fn book_text(&self, book_id: u64) -> Result<String> {
        tokio::fs::read_to_string(self.text_path(book_id))
            .await
            .map_err(|e| RetrieverError::library(book_id, e.to_string()))
    }

    async fn book_ids(&self) -> Result<Vec<u64>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| RetrieverError::library(0, format!("cannot list library: {e}")))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RetrieverError::library(0, format!("cannot list library: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}
