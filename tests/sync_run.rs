//! End-to-end sync runs over a mock wiki and mock Qdrant, with a stub
//! embedder so no model files are needed.

use std::time::Duration;

use anyhow::Result;
use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;

use wikivec::{
    ChunkingConfig, Embedder, RetryPolicy, SyncEngine, VectorStore, WikiClient,
};

const DIM: usize = 4;

struct StubEmbedder;

impl Embedder for StubEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn encode(&self, texts: &[&str], _batch_size: usize) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.25; DIM]).collect())
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    fn encode(&self, _texts: &[&str], _batch_size: usize) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding backend is down")
    }
}

fn wiki_client(server: &MockServer) -> WikiClient {
    let policy = RetryPolicy {
        max_attempts: 2,
        retry_delay: Duration::from_millis(5),
    };
    WikiClient::new(&server.base_url(), None, Duration::from_secs(5), policy)
        .expect("build wiki client")
}

fn store(server: &MockServer) -> VectorStore {
    VectorStore::connect(&server.base_url(), None, "wiki", DIM, Duration::from_secs(5))
        .expect("connect store")
}

fn qdrant_bootstrap(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/collections/wiki");
        then.status(200).json_body(json!({
            "result": { "status": "green", "points_count": 0 }
        }));
    });
}

fn meta_json(id: i64, path: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id, "path": path, "title": title,
        "isPublished": true, "isPrivate": false,
        "contentType": "markdown", "updatedAt": "2024-05-01"
    })
}

fn page_json(id: i64, path: &str, title: &str, content: &str) -> serde_json::Value {
    json!({
        "data": { "pages": { "single": {
            "id": id, "path": path, "title": title,
            "content": content, "description": "",
            "contentType": "markdown", "tags": [],
            "createdAt": "2024-01-01", "updatedAt": "2024-05-01"
        } } }
    })
}

fn engine<'a>(
    wiki: &'a WikiClient,
    embedder: &'a dyn Embedder,
    store: &'a VectorStore,
) -> SyncEngine<'a> {
    let chunking = ChunkingConfig {
        chunk_size: 5,
        chunk_overlap: 2,
    };
    SyncEngine::new(wiki, embedder, store, chunking, 8, Duration::ZERO)
}

#[test]
fn full_run_counts_indexed_skipped_and_scraped_pages() {
    let wiki_server = MockServer::start();
    let qdrant = MockServer::start();
    qdrant_bootstrap(&qdrant);

    wiki_server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("isPublished");
        then.status(200).json_body(json!({
            "data": { "pages": { "list": [
                meta_json(1, "guides/setup", "Setup Guide"),
                meta_json(2, "empty", "Empty Page"),
                meta_json(3, "restricted/page", "Restricted"),
            ] } }
        }));
    });
    wiki_server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("GetPage")
            .body_includes("\"id\":1");
        then.status(200).json_body(page_json(
            1,
            "guides/setup",
            "Setup Guide",
            "# Install\n\nrun the installer now",
        ));
    });
    wiki_server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("GetPage")
            .body_includes("\"id\":2");
        then.status(200).json_body(page_json(2, "empty", "Empty Page", "   "));
    });
    wiki_server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("GetPage")
            .body_includes("\"id\":3");
        then.status(200).json_body(json!({
            "errors": [{
                "message": "denied",
                "extensions": { "exception": { "code": 6013 } }
            }]
        }));
    });
    wiki_server.mock(|when, then| {
        when.method(GET).path("/restricted/page");
        then.status(200)
            .header("content-type", "text/html")
            .body("<html><body><main><p>words recovered by the scraper</p></main></body></html>");
    });

    let delete = qdrant.mock(|when, then| {
        when.method(POST)
            .path("/collections/wiki/points/delete")
            .query_param("wait", "true");
        then.status(200).json_body(json!({ "result": { "status": "acknowledged" } }));
    });
    let upsert = qdrant.mock(|when, then| {
        when.method(PUT)
            .path("/collections/wiki/points")
            .query_param("wait", "true");
        then.status(200).json_body(json!({ "result": { "status": "completed" } }));
    });

    let wiki = wiki_client(&wiki_server);
    let store = store(&qdrant);
    let embedder = StubEmbedder;
    let stats = engine(&wiki, &embedder, &store).run().expect("run");

    assert_eq!(stats.ok, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.errors, 0);
    assert_eq!(delete.hits(), 2);
    assert_eq!(upsert.hits(), 2);
}

#[test]
fn empty_page_list_yields_zero_stats() {
    let wiki_server = MockServer::start();
    let qdrant = MockServer::start();
    qdrant_bootstrap(&qdrant);

    wiki_server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200)
            .json_body(json!({ "data": { "pages": { "list": [] } } }));
    });

    let wiki = wiki_client(&wiki_server);
    let store = store(&qdrant);
    let embedder = StubEmbedder;
    let stats = engine(&wiki, &embedder, &store).run().expect("run");

    assert_eq!(stats.ok, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.errors, 0);
}

#[test]
fn failing_embedder_marks_the_page_as_an_error_without_touching_the_store() {
    let wiki_server = MockServer::start();
    let qdrant = MockServer::start();
    qdrant_bootstrap(&qdrant);

    wiki_server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("isPublished");
        then.status(200).json_body(json!({
            "data": { "pages": { "list": [meta_json(1, "guides/setup", "Setup Guide")] } }
        }));
    });
    wiki_server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("GetPage");
        then.status(200).json_body(page_json(
            1,
            "guides/setup",
            "Setup Guide",
            "enough words to produce a chunk",
        ));
    });

    let delete = qdrant.mock(|when, then| {
        when.method(POST).path("/collections/wiki/points/delete");
        then.status(200).json_body(json!({ "result": { "status": "acknowledged" } }));
    });

    let wiki = wiki_client(&wiki_server);
    let store = store(&qdrant);
    let embedder = FailingEmbedder;
    let stats = engine(&wiki, &embedder, &store).run().expect("run");

    assert_eq!(stats.ok, 0);
    assert_eq!(stats.errors, 1);
    assert_eq!(delete.hits(), 0);
}

#[test]
fn page_delay_only_applies_after_indexed_pages() {
    let wiki_server = MockServer::start();
    let qdrant = MockServer::start();
    qdrant_bootstrap(&qdrant);

    wiki_server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("isPublished");
        then.status(200).json_body(json!({
            "data": { "pages": { "list": [
                meta_json(1, "empty-one", "Empty One"),
                meta_json(2, "empty-two", "Empty Two"),
                meta_json(3, "empty-three", "Empty Three"),
            ] } }
        }));
    });
    wiki_server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("GetPage");
        then.status(200).json_body(page_json(1, "empty", "Empty", " "));
    });

    let wiki = wiki_client(&wiki_server);
    let store = store(&qdrant);
    let embedder = StubEmbedder;
    let chunking = ChunkingConfig {
        chunk_size: 5,
        chunk_overlap: 2,
    };
    let engine = SyncEngine::new(
        &wiki,
        &embedder,
        &store,
        chunking,
        8,
        Duration::from_millis(500),
    );

    let started = std::time::Instant::now();
    let stats = engine.run().expect("run");
    assert_eq!(stats.skipped, 3);
    // Three skipped pages must not accumulate ~1s of configured delays.
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[test]
fn page_fetch_failure_is_counted_but_does_not_stop_the_run() {
    let wiki_server = MockServer::start();
    let qdrant = MockServer::start();
    qdrant_bootstrap(&qdrant);

    wiki_server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("isPublished");
        then.status(200).json_body(json!({
            "data": { "pages": { "list": [
                meta_json(1, "broken", "Broken"),
                meta_json(2, "guides/setup", "Setup Guide"),
            ] } }
        }));
    });
    wiki_server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("GetPage")
            .body_includes("\"id\":1");
        then.status(200).json_body(json!({
            "errors": [{ "message": "internal resolver failure" }]
        }));
    });
    wiki_server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("GetPage")
            .body_includes("\"id\":2");
        then.status(200).json_body(page_json(
            2,
            "guides/setup",
            "Setup Guide",
            "chunkable words for the second page",
        ));
    });

    qdrant.mock(|when, then| {
        when.method(POST).path("/collections/wiki/points/delete");
        then.status(200).json_body(json!({ "result": { "status": "acknowledged" } }));
    });
    let upsert = qdrant.mock(|when, then| {
        when.method(PUT).path("/collections/wiki/points");
        then.status(200).json_body(json!({ "result": { "status": "completed" } }));
    });

    let wiki = wiki_client(&wiki_server);
    let store = store(&qdrant);
    let embedder = StubEmbedder;
    let stats = engine(&wiki, &embedder, &store).run().expect("run");

    assert_eq!(stats.ok, 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(upsert.hits(), 1);
}
