//! Per-page synchronization of wiki content into the vector store.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::chunker::{chunk_page, ChunkingConfig};
use crate::embedder::Embedder;
use crate::page::PageMeta;
use crate::store::{ChunkPayload, VectorStore};
use crate::wiki::WikiClient;

/// Run-level outcome counters; every page lands in exactly one bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Pages whose chunk set was committed to the store.
    pub ok: usize,
    /// Pages with nothing to index (empty content, zero chunks).
    pub skipped: usize,
    /// Pages that failed to fetch, embed, or store.
    pub errors: usize,
}

enum PageOutcome {
    Indexed,
    Skipped,
    Failed,
}

/// Drives one sequential ingestion pass over all public pages.
///
/// Per page: fetch (scrape fallback included) → clean/chunk → one batched
/// embedding call → delete-old-then-upsert-new against the store. Per-page
/// failures are converted into counters and log lines; only the initial
/// page listing aborts the run.
pub struct SyncEngine<'a> {
    wiki: &'a WikiClient,
    embedder: &'a dyn Embedder,
    store: &'a VectorStore,
    chunking: ChunkingConfig,
    batch_size: usize,
    page_delay: Duration,
}

impl<'a> SyncEngine<'a> {
    /// Assembles an engine over already-connected collaborators. The
    /// chunking config must have been validated beforehand.
    pub fn new(
        wiki: &'a WikiClient,
        embedder: &'a dyn Embedder,
        store: &'a VectorStore,
        chunking: ChunkingConfig,
        batch_size: usize,
        page_delay: Duration,
    ) -> Self {
        Self {
            wiki,
            embedder,
            store,
            chunking,
            batch_size,
            page_delay,
        }
    }

    /// Runs one full pass, processing pages in the order the wiki lists
    /// them. Returns counters; failing to list pages at all is fatal.
    pub fn run(&self) -> Result<RunStats> {
        let pages = self
            .wiki
            .list_public_pages()
            .context("failed to list wiki pages")?;

        let mut stats = RunStats::default();
        if pages.is_empty() {
            info!("no public pages found, nothing to do");
            return Ok(stats);
        }

        let total = pages.len();
        for (i, meta) in pages.iter().enumerate() {
            let label = if meta.title.is_empty() {
                &meta.path
            } else {
                &meta.title
            };
            info!("[{}/{total}] processing page {}: {label}", i + 1, meta.id);

            let outcome = self.sync_page(meta);
            match outcome {
                PageOutcome::Indexed => stats.ok += 1,
                PageOutcome::Skipped => stats.skipped += 1,
                PageOutcome::Failed => stats.errors += 1,
            }

            // Pause only after pages that actually wrote to the store.
            if matches!(outcome, PageOutcome::Indexed)
                && !self.page_delay.is_zero()
                && i + 1 < total
            {
                thread::sleep(self.page_delay);
            }
        }
        Ok(stats)
    }

    fn sync_page(&self, meta: &PageMeta) -> PageOutcome {
        let page = match self.wiki.get_page(meta.id, Some(meta)) {
            Ok(page) => page,
            Err(err) => {
                error!("could not fetch page {}: {err}", meta.id);
                return PageOutcome::Failed;
            }
        };

        if page.content.trim().is_empty() {
            debug!("page {} has no content, skipping", meta.id);
            return PageOutcome::Skipped;
        }

        let chunks = chunk_page(&page.content, page.content_type, &self.chunking);
        if chunks.is_empty() {
            debug!("page {} produced no chunks, skipping", meta.id);
            return PageOutcome::Skipped;
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = match self.embedder.encode(&texts, self.batch_size) {
            Ok(vectors) => vectors,
            Err(err) => {
                error!("embedding failed for page {}: {err}", meta.id);
                return PageOutcome::Failed;
            }
        };

        let page_url = self.wiki.page_url(&page.path);
        let tags = page.tag_names();
        let payloads: Vec<ChunkPayload> = chunks
            .into_iter()
            .map(|chunk| ChunkPayload {
                text: chunk.text,
                chunk_index: chunk.chunk_index,
                section: chunk.section,
                page_id: 0, // injected by replace_page
                page_path: page.path.clone(),
                page_title: page.title.clone(),
                page_url: page_url.clone(),
                description: page.description.clone(),
                tags: tags.clone(),
                updated_at: page.updated_at.clone(),
            })
            .collect();

        if let Err(err) = self.store.replace_page(meta.id, vectors, payloads) {
            error!("store failed for page {}: {err}", meta.id);
            return PageOutcome::Failed;
        }
        PageOutcome::Indexed
    }
}
