//! WikiClient behavior against a mock Wiki.js server: retry bounds,
//! permission-denial classification, and the HTML scrape fallback.

use std::time::Duration;

use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;

use wikivec::{ContentType, PageMeta, RetryPolicy, WikiClient, WikiError};

fn client(server: &MockServer) -> WikiClient {
    let policy = RetryPolicy {
        max_attempts: 3,
        retry_delay: Duration::from_millis(10),
    };
    WikiClient::new(&server.base_url(), None, Duration::from_secs(5), policy)
        .expect("build wiki client")
}

fn meta(id: i64, path: &str) -> PageMeta {
    serde_json::from_value(json!({
        "id": id,
        "path": path,
        "title": "Home",
        "isPublished": true,
        "isPrivate": false,
        "contentType": "markdown",
        "updatedAt": "2024-05-01T10:00:00.000Z"
    }))
    .expect("page meta")
}

#[test]
fn list_filters_unpublished_and_private_pages() {
    let server = MockServer::start();
    let list = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({
            "data": { "pages": { "list": [
                {
                    "id": 1, "path": "home", "title": "Home",
                    "isPublished": true, "isPrivate": false,
                    "contentType": "markdown", "updatedAt": "2024-05-01"
                },
                {
                    "id": 2, "path": "drafts/wip", "title": "WIP",
                    "isPublished": false, "isPrivate": false,
                    "contentType": "markdown", "updatedAt": "2024-05-01"
                },
                {
                    "id": 3, "path": "internal/secrets", "title": "Secrets",
                    "isPublished": true, "isPrivate": true,
                    "contentType": "markdown", "updatedAt": "2024-05-01"
                }
            ] } }
        }));
    });

    let pages = client(&server).list_public_pages().expect("list pages");
    list.assert();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].id, 1);
    assert_eq!(pages[0].path, "home");
}

#[test]
fn empty_list_is_a_valid_outcome() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200)
            .json_body(json!({ "data": { "pages": { "list": [] } } }));
    });

    let pages = client(&server).list_public_pages().expect("list pages");
    assert!(pages.is_empty());
}

#[test]
fn get_page_parses_the_full_record() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql").body_includes("GetPage");
        then.status(200).json_body(json!({
            "data": { "pages": { "single": {
                "id": 7,
                "path": "guides/setup",
                "title": "Setup Guide",
                "content": "# Install\n\nrun the installer",
                "description": "How to install",
                "contentType": "markdown",
                "tags": [{ "tag": "guide" }, { "tag": "setup" }],
                "createdAt": "2024-01-01",
                "updatedAt": "2024-05-01"
            } } }
        }));
    });

    let page = client(&server).get_page(7, None).expect("get page");
    assert_eq!(page.id, 7);
    assert_eq!(page.content_type, ContentType::Markdown);
    assert_eq!(page.tag_names(), vec!["guide".to_string(), "setup".to_string()]);
    assert_eq!(page.description, "How to install");
}

#[test]
fn server_errors_are_retried_up_to_the_attempt_budget() {
    let server = MockServer::start();
    let failing = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(500);
    });

    let err = client(&server).get_page(1, None).expect_err("should exhaust retries");
    assert_eq!(failing.hits(), 3);
    match err {
        WikiError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[test]
fn forbidden_without_a_fallback_path_propagates_unretried() {
    let server = MockServer::start();
    let forbidden = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({
            "data": null,
            "errors": [{
                "message": "You are not authorized to view this page",
                "extensions": { "exception": { "code": 6013 } }
            }]
        }));
    });

    let err = client(&server).get_page(1, None).expect_err("should be forbidden");
    assert_eq!(forbidden.hits(), 1);
    assert!(matches!(err, WikiError::Forbidden(_)));
}

#[test]
fn forbidden_with_a_path_falls_back_to_scraping() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({
            "errors": [{
                "message": "denied",
                "extensions": { "exception": { "code": 6013 } }
            }]
        }));
    });
    let scrape = server.mock(|when, then| {
        when.method(GET).path("/restricted/page");
        then.status(200)
            .header("content-type", "text/html")
            .body(concat!(
                "<html><body>",
                "<nav><a href=\"/\">navigation chrome</a></nav>",
                "<div class=\"contents\"><p>Visible wiki prose.</p></div>",
                "<footer>footer chrome</footer>",
                "</body></html>"
            ));
    });

    let meta = meta(9, "restricted/page");
    let page = client(&server).get_page(9, Some(&meta)).expect("fallback page");

    scrape.assert();
    assert_eq!(page.id, 9);
    assert_eq!(page.content_type, ContentType::Html);
    assert!(page.content.contains("Visible wiki prose."));
    assert!(!page.content.contains("navigation chrome"));
    assert!(!page.content.contains("footer chrome"));
    assert_eq!(page.description, "");
    assert!(page.tags.is_empty());
    assert_eq!(page.title, "Home");
    assert_eq!(page.updated_at, "2024-05-01T10:00:00.000Z");
}

#[test]
fn other_graphql_errors_fail_immediately() {
    let server = MockServer::start();
    let fatal = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({
            "errors": [{ "message": "Variable \"$id\" of required type \"Int!\" was not provided." }]
        }));
    });

    let err = client(&server).get_page(1, None).expect_err("should be fatal");
    assert_eq!(fatal.hits(), 1);
    assert!(matches!(err, WikiError::GraphQl(_)));
}

#[test]
fn non_transient_http_statuses_are_not_retried() {
    let server = MockServer::start();
    let not_found = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(404);
    });

    let err = client(&server).get_page(1, None).expect_err("should fail fast");
    assert_eq!(not_found.hits(), 1);
    assert!(matches!(err, WikiError::Status { .. }));
}
