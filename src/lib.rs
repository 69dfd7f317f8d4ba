#![warn(missing_docs)]
//! wikivec ingests public Wiki.js pages into a Qdrant vector store.
//!
//! The pipeline per page: fetch via GraphQL (with an HTML-scraping fallback
//! on permission denial), clean and chunk the content into overlapping word
//! windows, embed the chunk texts, and replace the page's stored points so
//! the collection always mirrors the wiki's most recent published state.

pub mod chunker;
pub mod embedder;
pub mod logging;
pub mod page;
pub mod store;
pub mod sync;
pub mod wiki;

pub use chunker::{chunk_page, Chunk, ChunkingConfig, ChunkingConfigError};
pub use embedder::{build_embedder, BackendKind, Embedder, EmbedderArgs};
pub use page::{ContentType, Page, PageMeta, PageTag};
pub use store::{ChunkPayload, CollectionInfo, PointRecord, ScoredPoint, VectorStore};
pub use sync::{RunStats, SyncEngine};
pub use wiki::{RetryPolicy, WikiClient, WikiError};
