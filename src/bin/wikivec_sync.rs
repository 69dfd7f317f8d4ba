use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use wikivec::{
    build_embedder, ChunkingConfig, EmbedderArgs, RetryPolicy, SyncEngine, VectorStore, WikiClient,
};

/// Bounded bootstrap retries in case Qdrant is still starting up.
const STORE_CONNECT_ATTEMPTS: usize = 6;
const STORE_CONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    name = "wikivec-sync",
    about = "Ingest public Wiki.js pages into a Qdrant vector store"
)]
struct SyncCli {
    /// Base URL of the Wiki.js instance
    #[arg(long, env = "WIKI_URL")]
    wiki_url: String,

    /// Wiki.js API bearer token (optional; guest access is used without it)
    #[arg(long, env = "WIKI_API_KEY")]
    wiki_api_key: Option<String>,

    /// Qdrant HTTP endpoint
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant API key (optional)
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Target collection name
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "wiki")]
    collection: String,

    /// Maximum words per chunk
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 512)]
    chunk_size: usize,

    /// Words shared between consecutive chunks
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 64)]
    chunk_overlap: usize,

    /// Milliseconds to pause between pages
    #[arg(long, env = "PAGE_DELAY_MS", default_value_t = 100)]
    page_delay_ms: u64,

    /// Seconds to wait for each wiki or store request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Maximum attempts per wiki fetch
    #[arg(long, env = "WIKI_MAX_RETRIES", default_value_t = 3)]
    max_retries: usize,

    /// Base retry delay in milliseconds (attempt n waits n times this)
    #[arg(long, env = "WIKI_RETRY_DELAY_MS", default_value_t = 2000)]
    retry_delay_ms: u64,

    #[command(flatten)]
    embedder: EmbedderArgs,
}

fn main() -> Result<()> {
    wikivec::logging::init();
    let cli = SyncCli::parse();

    let chunking = ChunkingConfig {
        chunk_size: cli.chunk_size,
        chunk_overlap: cli.chunk_overlap,
    };
    chunking.validate().context("invalid chunking configuration")?;

    // The slow part: may download a model on first use.
    let embedder = build_embedder(&cli.embedder).context("failed to load embedder")?;

    let timeout = Duration::from_secs(cli.timeout_secs.max(1));
    let store = connect_store(&cli, embedder.dimension(), timeout)?;

    let policy = RetryPolicy {
        max_attempts: cli.max_retries.max(1),
        retry_delay: Duration::from_millis(cli.retry_delay_ms),
    };
    let wiki = WikiClient::new(&cli.wiki_url, cli.wiki_api_key.as_deref(), timeout, policy)
        .context("failed to build wiki client")?;

    let engine = SyncEngine::new(
        &wiki,
        embedder.as_ref(),
        &store,
        chunking,
        cli.embedder.batch_size.max(1),
        Duration::from_millis(cli.page_delay_ms),
    );

    info!("fetching public page list from {}", cli.wiki_url);
    let stats = engine.run()?;

    let collection_size = match store.collection_info() {
        Ok(info) => info.chunk_count().to_string(),
        Err(err) => {
            warn!("could not read collection info: {err}");
            "?".to_string()
        }
    };
    info!(
        "done. pages_ok={} skipped={} errors={} | collection='{}' total_chunks={}",
        stats.ok,
        stats.skipped,
        stats.errors,
        store.collection(),
        collection_size
    );

    if stats.errors > 0 {
        std::process::exit(2);
    }
    Ok(())
}

/// Connects to Qdrant, retrying with a fixed delay while it starts up.
fn connect_store(cli: &SyncCli, dimension: usize, timeout: Duration) -> Result<VectorStore> {
    info!("connecting to Qdrant at {}", cli.qdrant_url);
    let mut attempt = 1;
    loop {
        match VectorStore::connect(
            &cli.qdrant_url,
            cli.qdrant_api_key.as_deref(),
            &cli.collection,
            dimension,
            timeout,
        ) {
            Ok(store) => return Ok(store),
            Err(err) if attempt < STORE_CONNECT_ATTEMPTS => {
                warn!(
                    "Qdrant not ready (attempt {attempt}/{STORE_CONNECT_ATTEMPTS}): {err}, retrying in {}s",
                    STORE_CONNECT_DELAY.as_secs()
                );
                thread::sleep(STORE_CONNECT_DELAY);
                attempt += 1;
            }
            Err(err) => {
                error!("cannot connect to Qdrant: {err}");
                return Err(err);
            }
        }
    }
}
