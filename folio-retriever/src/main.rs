use clap::{Parser, Subcommand};
use folio_cache::{CacheBudget, CacheManager, CacheTtls};
use folio_embed::{EmbeddingService, ProviderRegistry};
use folio_retriever::{
    config::FolioConfig,
    index::{IndexingOrchestrator, OrchestratorConfig, ProgressEvent},
    library::{DirectoryLibrary, Library},
    search::{LikeKeywordScorer, SearchEngine, SearchMode, SearchOptions, SearchResult},
    storage::{SearchFilters, VectorStore},
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{Level, warn};

/// A CLI tool to index book collections and search them semantically.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "folio.toml")]
    config: PathBuf,

    /// Book directory, overriding the configured library root
    #[arg(short, long)]
    library: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index books into the vector store
    Index {
        /// Book ids to index (comma-separated)
        #[arg(long, value_delimiter = ',')]
        ids: Vec<u64>,
        /// Index every book in the library
        #[arg(long)]
        all: bool,
        /// Re-process books that already have embeddings
        #[arg(long)]
        reindex: bool,
        /// Books processed concurrently
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
    /// Search indexed chunks
    Search {
        /// Query text
        query: String,
        /// Search mode (semantic, dialectical, genealogical, hybrid)
        #[arg(short, long)]
        mode: Option<SearchMode>,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Minimum similarity threshold (0.0 to 1.0)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Restrict results to these book ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        books: Vec<u64>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find chunks similar to an already indexed chunk
    Similar {
        /// Chunk ID
        chunk_id: i64,
        /// Maximum number of results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-book indexing status
    Status {
        /// Book ID (all books when omitted)
        book_id: Option<u64>,
        /// Print status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics
    Stats {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a book's chunks, embeddings, and indexing status
    Clear {
        /// Book ID
        book_id: u64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    // Logs go to stderr so --json output stays machine readable.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = FolioConfig::load(&args.config)?;
    if let Some(root) = args.library {
        config.library.root = root;
    }

    match args.command {
        Commands::Index {
            ids,
            all,
            reindex,
            max_concurrent,
        } => {
            if ids.is_empty() && !all {
                return Err(anyhow::anyhow!("Nothing to index: pass --ids or --all"));
            }

            let store = VectorStore::open(&config.store.path).await?;
            let caches = build_caches(&config);
            let embeddings = build_embeddings(&config, &caches)?;
            let library: Arc<dyn Library> =
                Arc::new(DirectoryLibrary::new(config.library.root.clone()));

            let orchestrator_config = OrchestratorConfig::new()
                .with_max_concurrent(max_concurrent.unwrap_or(config.index.max_concurrent))
                .with_reindex(reindex);
            let mut orchestrator = IndexingOrchestrator::new(
                library,
                embeddings,
                store,
                config.segmenter.build()?,
                orchestrator_config,
            );
            orchestrator.add_progress_observer(Arc::new(|event: ProgressEvent| {
                let detail = event
                    .detail
                    .as_deref()
                    .map(|d| format!(" | {d}"))
                    .unwrap_or_default();
                println!(
                    "  book {} | {} | {:.0}%{}",
                    event.book_id,
                    event.stage,
                    event.progress * 100.0,
                    detail
                );
            }));

            // First Ctrl-C stops pulling new books; in-flight ones finish.
            let cancel = orchestrator.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("Interrupted: letting in-flight books finish");
                    cancel.cancel();
                }
            });

            let report = if all {
                orchestrator.index_all().await?
            } else {
                orchestrator.index_books(&ids).await
            };

            println!(
                "Indexed {} of {} books: {} chunks stored, {} skipped, {} failed",
                report.successful, report.total, report.total_chunks, report.skipped, report.failed
            );
            for (book_id, error) in &report.errors {
                println!("  book {book_id}: {error}");
            }

            if let Some(path) = &config.cache.snapshot {
                if let Err(e) = caches.save(path) {
                    warn!(path = %path.display(), error = %e, "failed to save cache snapshot");
                }
            }
            Ok(())
        }
        Commands::Search {
            query,
            mode,
            limit,
            threshold,
            books,
            json,
        } => {
            let store = VectorStore::open(&config.store.path).await?;
            let caches = build_caches(&config);
            let embeddings = build_embeddings(&config, &caches)?;
            let library: Arc<dyn Library> =
                Arc::new(DirectoryLibrary::new(config.library.root.clone()));
            let engine = build_engine(store, caches, embeddings, library, config.search.keyword);

            let mut options = SearchOptions::new(mode.unwrap_or(config.search.mode))
                .with_limit(limit.unwrap_or(config.search.limit))
                .with_threshold(threshold.unwrap_or(config.search.threshold));
            if !books.is_empty() {
                options = options.with_filters(SearchFilters::for_books(books));
            }

            let results = engine.search(&query, &options).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
            Ok(())
        }
        Commands::Similar {
            chunk_id,
            limit,
            json,
        } => {
            let store = VectorStore::open(&config.store.path).await?;
            let caches = build_caches(&config);
            let embeddings = build_embeddings(&config, &caches)?;
            let library: Arc<dyn Library> =
                Arc::new(DirectoryLibrary::new(config.library.root.clone()));
            let engine = build_engine(store, caches, embeddings, library, false);

            let results = engine.find_similar(chunk_id, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
            Ok(())
        }
        Commands::Status { book_id, json } => {
            let store = VectorStore::open(&config.store.path).await?;
            let statuses = match book_id {
                Some(id) => match store.get_indexing_status(id).await? {
                    Some(status) => vec![status],
                    None => {
                        println!("No indexing status for book {id}");
                        return Ok(());
                    }
                },
                None => store.all_indexing_statuses().await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else {
                println!("Indexing status for {} books:", statuses.len());
                for status in statuses {
                    let error = status
                        .error
                        .as_deref()
                        .map(|e| format!(" | {e}"))
                        .unwrap_or_default();
                    println!(
                        "  book {} | {} | {:.0}% | {}{}",
                        status.book_id,
                        status.state,
                        status.progress * 100.0,
                        status.updated_at.to_rfc3339(),
                        error
                    );
                }
            }
            Ok(())
        }
        Commands::Stats { json } => {
            let store = VectorStore::open(&config.store.path).await?;
            let stats = store.stats().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Store statistics:");
                println!("  Books: {}", stats.books);
                println!("  Chunks: {}", stats.chunks);
                match stats.embedding_dimension {
                    Some(dimension) => println!("  Embedding dimension: {dimension}"),
                    None => println!("  Embedding dimension: not set (nothing indexed)"),
                }
                println!("  Model: {}", stats.model_id.as_deref().unwrap_or("none"));
            }
            Ok(())
        }
        Commands::Clear { book_id } => {
            let store = VectorStore::open(&config.store.path).await?;
            let removed = store.clear_book_embeddings(book_id).await?;
            println!("Removed {removed} chunks for book {book_id}");
            Ok(())
        }
    }
}

fn build_caches(config: &FolioConfig) -> Arc<CacheManager> {
    let budget = CacheBudget::from_megabytes(config.cache.budget_mb);
    let caches = match &config.cache.snapshot {
        Some(path) => CacheManager::load(path, budget, CacheTtls::default()),
        None => CacheManager::new(budget, CacheTtls::default()),
    };
    Arc::new(caches)
}

fn build_embeddings(
    config: &FolioConfig,
    caches: &Arc<CacheManager>,
) -> anyhow::Result<Arc<EmbeddingService>> {
    let registry = ProviderRegistry::with_defaults();
    let service = EmbeddingService::from_configs(
        &registry,
        &config.embedding.providers,
        caches.chunk_embeddings.clone(),
    )?;
    Ok(Arc::new(service))
}

fn build_engine(
    store: VectorStore,
    caches: Arc<CacheManager>,
    embeddings: Arc<EmbeddingService>,
    library: Arc<dyn Library>,
    keyword: bool,
) -> SearchEngine {
    let mut engine = SearchEngine::new(store.clone(), embeddings, caches, library);
    if keyword {
        engine = engine.with_keyword_scorer(Arc::new(LikeKeywordScorer::new(store)));
    }
    engine
}

fn print_results(results: &[SearchResult]) {
    println!("Found {} results:", results.len());
    for (rank, result) in results.iter().enumerate() {
        let authors = if result.authors.is_empty() {
            String::new()
        } else {
            format!(" ({})", result.authors.join(", "))
        };
        println!(
            "{:>3}. {:.3} | {}{} | book {} chunk {}",
            rank + 1,
            result.similarity,
            result.title,
            authors,
            result.book_id,
            result.chunk_index
        );
        println!("     {}", preview(&result.text, 160));
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        flattened
    } else {
        let mut out: String = flattened.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}
