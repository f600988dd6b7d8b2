use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheStats, TtlCache};

const SNAPSHOT_VERSION: u32 = 1;

// Rough per-entry footprints used to turn a byte budget into capacities.
const EMBEDDING_ENTRY_BYTES: usize = 2048;
const METADATA_ENTRY_BYTES: usize = 1024;
const RESULT_ENTRY_BYTES: usize = 8192;

/// Errors raised while persisting a snapshot. Loading never fails: an
/// unreadable or corrupt snapshot yields an empty manager.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot persist: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Total memory the shared caches may occupy, split by fixed ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBudget {
    pub total_bytes: usize,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            total_bytes: 64 * 1024 * 1024,
        }
    }
}

impl CacheBudget {
    pub fn from_megabytes(mb: usize) -> Self {
        Self {
            total_bytes: mb * 1024 * 1024,
        }
    }

    fn capacity(self, share_percent: usize, entry_bytes: usize) -> usize {
        (self.total_bytes * share_percent / 100 / entry_bytes).max(16)
    }
}

/// Expiry policy per cache. `None` leaves eviction to LRU pressure alone.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub query_embeddings: Option<Duration>,
    pub chunk_embeddings: Option<Duration>,
    pub metadata: Option<Duration>,
    pub results: Option<Duration>,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            query_embeddings: Some(Duration::from_secs(3600)),
            // Chunk vectors are deterministic per model, so they never go stale.
            chunk_embeddings: None,
            metadata: Some(Duration::from_secs(600)),
            results: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerStats {
    pub query_embeddings: CacheStats,
    pub chunk_embeddings: CacheStats,
    pub metadata: CacheStats,
    pub results: CacheStats,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    query_embeddings: Vec<(String, Vec<f32>)>,
    chunk_embeddings: Vec<(String, Vec<f32>)>,
    metadata: Vec<(u64, serde_json::Value)>,
    results: Vec<(String, serde_json::Value)>,
}

/// The typed caches shared across the indexing and search pipeline.
///
/// Embedding caches are keyed by `(text digest, model id)` strings the
/// embedding layer builds; the metadata cache by book id; the result cache by
/// a digest of the full search request. Each cache is behind an `Arc` so
/// collaborators can hold a handle to just the cache they use.
pub struct CacheManager {
    pub query_embeddings: Arc<TtlCache<String, Vec<f32>>>,
    pub chunk_embeddings: Arc<TtlCache<String, Vec<f32>>>,
    pub metadata: Arc<TtlCache<u64, serde_json::Value>>,
    pub results: Arc<TtlCache<String, serde_json::Value>>,
}

impl CacheManager {
    pub fn new(budget: CacheBudget, ttls: CacheTtls) -> Self {
        Self {
            query_embeddings: Arc::new(TtlCache::new(
                budget.capacity(20, EMBEDDING_ENTRY_BYTES),
                ttls.query_embeddings,
            )),
            chunk_embeddings: Arc::new(TtlCache::new(
                budget.capacity(50, EMBEDDING_ENTRY_BYTES),
                ttls.chunk_embeddings,
            )),
            metadata: Arc::new(TtlCache::new(
                budget.capacity(10, METADATA_ENTRY_BYTES),
                ttls.metadata,
            )),
            results: Arc::new(TtlCache::new(
                budget.capacity(20, RESULT_ENTRY_BYTES),
                ttls.results,
            )),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheBudget::default(), CacheTtls::default())
    }

    /// Write surviving entries to `path` atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            query_embeddings: self.query_embeddings.entries(),
            chunk_embeddings: self.chunk_embeddings.entries(),
            metadata: self.metadata.entries(),
            results: self.results.entries(),
        };
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let file = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;
        serde_json::to_writer(file.as_file(), &snapshot)?;
        file.persist(path)?;
        debug!(
            path = %path.display(),
            entries = snapshot_len(&snapshot),
            "saved cache snapshot"
        );
        Ok(())
    }

    /// Restore a snapshot, or start empty when there is nothing usable.
    /// Restored entries re-enter with a fresh TTL clock.
    pub fn load(path: &Path, budget: CacheBudget, ttls: CacheTtls) -> Self {
        let manager = Self::new(budget, ttls);
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache snapshot, starting cold");
                return manager;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache snapshot, starting cold");
                return manager;
            }
        };
        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding corrupt cache snapshot");
                return manager;
            }
        };
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(
                found = snapshot.version,
                supported = SNAPSHOT_VERSION,
                "discarding cache snapshot with unknown version"
            );
            return manager;
        }
        let restored = snapshot_len(&snapshot);
        for (key, value) in snapshot.query_embeddings {
            manager.query_embeddings.insert(key, value);
        }
        for (key, value) in snapshot.chunk_embeddings {
            manager.chunk_embeddings.insert(key, value);
        }
        for (key, value) in snapshot.metadata {
            manager.metadata.insert(key, value);
        }
        for (key, value) in snapshot.results {
            manager.results.insert(key, value);
        }
        debug!(path = %path.display(), entries = restored, "restored cache snapshot");
        manager
    }

    pub fn clear_all(&self) {
        self.query_embeddings.clear();
        self.chunk_embeddings.clear();
        self.metadata.clear();
        self.results.clear();
    }

    /// Sweep expired entries from every cache.
    pub fn cleanup_expired(&self) -> usize {
        self.query_embeddings.cleanup_expired()
            + self.chunk_embeddings.cleanup_expired()
            + self.metadata.cleanup_expired()
            + self.results.cleanup_expired()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            query_embeddings: self.query_embeddings.stats(),
            chunk_embeddings: self.chunk_embeddings.stats(),
            metadata: self.metadata.stats(),
            results: self.results.stats(),
        }
    }
}

fn snapshot_len(snapshot: &Snapshot) -> usize {
    snapshot.query_embeddings.len()
        + snapshot.chunk_embeddings.len()
        + snapshot.metadata.len()
        + snapshot.results.len()
}
