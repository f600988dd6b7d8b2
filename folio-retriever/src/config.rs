//! `folio.toml` configuration.
//!
//! Every section is optional; an absent file yields a fully defaulted
//! configuration (mock embeddings, paragraph segmentation, store in
//! `folio.db`). CLI flags override whatever the file provides.

use std::path::{Path, PathBuf};

use folio_embed::{MockConfig, ProviderConfig};
use folio_segment::SegmenterConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, RetrieverError};
use crate::search::SearchMode;

/// Top-level configuration, usually read from `folio.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    pub store: StoreSection,
    pub library: LibrarySection,
    pub embedding: EmbeddingSection,
    pub segmenter: SegmenterConfig,
    pub cache: CacheSection,
    pub search: SearchSection,
    pub index: IndexSection,
}

impl FolioConfig {
    /// Read configuration from a TOML file. A missing file is not an
    /// error; it yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(RetrieverError::validation(format!(
                    "cannot read config {}: {e}",
                    path.display()
                )));
            }
        };
        let config: Self = toml::from_str(&content).map_err(|e| {
            RetrieverError::validation(format!("invalid config {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// SQLite database path.
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("folio.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySection {
    /// Directory holding `<id>.txt` book files and optional `<id>.json`
    /// metadata sidecars.
    pub root: PathBuf,
}

impl Default for LibrarySection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("books"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    /// Provider chain, tried in order.
    pub providers: Vec<ProviderConfig>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            providers: vec![ProviderConfig::Mock(MockConfig::default())],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Total in-memory budget across all caches, in megabytes.
    pub budget_mb: usize,
    /// Snapshot file loaded on startup and saved after indexing.
    pub snapshot: Option<PathBuf>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            budget_mb: 64,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub mode: SearchMode,
    pub limit: usize,
    pub threshold: f32,
    /// Attach the `LIKE`-based keyword scorer for hybrid mode.
    pub keyword: bool,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            mode: SearchMode::Semantic,
            limit: 10,
            threshold: 0.0,
            keyword: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Books indexed concurrently.
    pub max_concurrent: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self { max_concurrent: 2 }
    }
}
