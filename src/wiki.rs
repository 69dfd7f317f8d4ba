//! Wiki.js GraphQL client with an HTML-scraping fallback.
//!
//! Targets Wiki.js 2.x. The `pages.single` resolver enforces its own
//! permission layer that can reject guest access to pages the list query
//! reports as public (error code 6013 / PageViewForbidden). When that
//! happens and the caller can supply the page's path, the client falls back
//! to fetching the rendered HTML and extracting the themed content
//! container.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::page::{ContentType, Page, PageMeta};

const LIST_PAGES_QUERY: &str = "\
query {
  pages {
    list {
      id
      path
      title
      isPublished
      isPrivate
      contentType
      updatedAt
    }
  }
}";

const GET_PAGE_QUERY: &str = "\
query GetPage($id: Int!) {
  pages {
    single(id: $id) {
      id
      path
      title
      content
      description
      contentType
      tags {
        tag
      }
      createdAt
      updatedAt
    }
  }
}";

/// Wiki.js extension code for PageViewForbidden.
const FORBIDDEN_CODE: i64 = 6013;

/// CSS selectors tried in order to locate the rendered content container.
/// Wiki.js 2.x renders content inside `div.contents`; the rest cover
/// customized themes, with `main` as the generic last resort before `body`.
const CONTENT_SELECTORS: &[&str] = &[
    "div.contents",
    "div#page-contents",
    "div.page-content",
    "main article",
    "main",
];

/// Elements removed from a scraped document before content extraction.
const CHROME_SELECTOR: &str = "nav, header, footer, aside, script, style, [role=\"navigation\"]";

/// Fetch failures surfaced by [`WikiClient`].
#[derive(Debug, thiserror::Error)]
pub enum WikiError {
    /// The API rejected the content fetch with PageViewForbidden.
    #[error("page view forbidden: {0}")]
    Forbidden(String),
    /// A GraphQL application error without the forbidden code; never retried.
    #[error("graphql errors: {0}")]
    GraphQl(String),
    /// A non-transient HTTP status outside the GraphQL protocol.
    #[error("unexpected http status {status}: {body}")]
    Status {
        /// Response status code.
        status: StatusCode,
        /// Response body, best effort.
        body: String,
    },
    /// Transport-level failure on a non-retryable call path.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Transient failures persisted past the bounded retry budget.
    #[error("exceeded {attempts} fetch attempts, last failure: {last}")]
    RetriesExhausted {
        /// Attempts performed.
        attempts: usize,
        /// Description of the final failure.
        last: String,
    },
    /// The HTML fallback fetch or extraction failed.
    #[error("html scrape failed for {url}: {reason}")]
    Scrape {
        /// Scraped URL.
        url: String,
        /// Failure description.
        reason: String,
    },
    /// The response decoded but did not carry the expected data shape.
    #[error("unexpected response shape: {0}")]
    Shape(String),
}

/// Bounded linear-backoff retry schedule for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts per call, including the first.
    pub max_attempts: usize,
    /// Base delay; attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Next action after a transient failure on the given attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryStep {
    /// Wait, then re-issue the call.
    RetryAfter(Duration),
    /// The attempt budget is spent.
    GiveUp,
}

/// Pure retry decision: transport call not involved, unit-testable offline.
pub(crate) fn retry_step(policy: &RetryPolicy, attempt: usize) -> RetryStep {
    if attempt < policy.max_attempts {
        RetryStep::RetryAfter(policy.retry_delay.saturating_mul(attempt as u32))
    } else {
        RetryStep::GiveUp
    }
}

/// Transport-layer statuses worth retrying: rate limiting and server errors.
pub(crate) fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct GraphQlResponse<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    extensions: GraphQlExtensions,
}

#[derive(Debug, Default, Deserialize)]
struct GraphQlExtensions {
    #[serde(default)]
    exception: GraphQlException,
}

#[derive(Debug, Default, Deserialize)]
struct GraphQlException {
    #[serde(default)]
    code: Option<i64>,
}

/// Maps a GraphQL error list to the forbidden or fatal variant.
///
/// Code 6013 (or a "not authorized" message) means permission denial; the
/// caller may still recover via the scrape fallback. Anything else is fatal
/// for the call and never retried.
pub(crate) fn classify_graphql_errors(errors: &[GraphQlError]) -> WikiError {
    let rendered = errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    let forbidden = errors.iter().any(|err| {
        err.extensions.exception.code == Some(FORBIDDEN_CODE)
            || err.message.to_lowercase().contains("not authorized")
    });
    if forbidden {
        WikiError::Forbidden(rendered)
    } else {
        WikiError::GraphQl(rendered)
    }
}

/// Blocking Wiki.js API client scoped to one ingestion run.
pub struct WikiClient {
    client: Client,
    base_url: String,
    graphql_url: String,
    policy: RetryPolicy,
    selectors: ScrapeSelectors,
}

impl WikiClient {
    /// Builds a client for `base_url`, optionally authenticating with a
    /// bearer token. The timeout applies per request.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "wiki base url must be an http(s) URL"
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let bearer = format!("Bearer {key}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer).context("invalid wiki API key")?,
            );
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build wiki HTTP client")?;

        let graphql_url = format!("{base_url}/graphql");
        Ok(Self {
            client,
            base_url,
            graphql_url,
            policy,
            selectors: ScrapeSelectors::new(),
        })
    }

    /// Public URL for a page path, used for payloads and the scrape fallback.
    pub fn page_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Returns metadata for all published, non-private pages.
    ///
    /// An empty result is a valid outcome, not a failure.
    pub fn list_public_pages(&self) -> Result<Vec<PageMeta>, WikiError> {
        let data: ListData = self.query(LIST_PAGES_QUERY, None)?;
        let total = data.pages.list.len();
        let public: Vec<PageMeta> = data
            .pages
            .list
            .into_iter()
            .filter(PageMeta::is_public)
            .collect();
        info!("found {} public pages out of {} total", public.len(), total);
        Ok(public)
    }

    /// Fetches full content for a single page.
    ///
    /// Tries the GraphQL API first. On a permission denial, falls back to
    /// scraping the rendered HTML when `meta` supplies the page's path;
    /// without a meta the denial propagates unchanged.
    pub fn get_page(&self, page_id: i64, meta: Option<&PageMeta>) -> Result<Page, WikiError> {
        let variables = json!({ "id": page_id });
        match self.query::<SingleData>(GET_PAGE_QUERY, Some(variables)) {
            Ok(data) => data
                .pages
                .single
                .ok_or_else(|| WikiError::Shape(format!("page {page_id} missing from response"))),
            Err(WikiError::Forbidden(msg)) => match meta {
                Some(meta) if !meta.path.is_empty() => {
                    debug!("graphql access denied for page {page_id}, trying html scrape");
                    self.scrape_page(meta)
                }
                _ => Err(WikiError::Forbidden(msg)),
            },
            Err(err) => Err(err),
        }
    }

    fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<serde_json::Value>,
    ) -> Result<T, WikiError> {
        let mut payload = json!({ "query": query });
        if let Some(variables) = variables {
            payload["variables"] = variables;
        }

        let mut attempt = 1usize;
        loop {
            let failure = match self.client.post(&self.graphql_url).json(&payload).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: GraphQlResponse<T> = resp.json()?;
                        if !parsed.errors.is_empty() {
                            return Err(classify_graphql_errors(&parsed.errors));
                        }
                        return parsed
                            .data
                            .ok_or_else(|| WikiError::Shape("missing data field".to_string()));
                    }
                    if !is_transient(status) {
                        let body = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
                        return Err(WikiError::Status { status, body });
                    }
                    format!("http status {status}")
                }
                // Connection-level errors (refused, reset, timeout) are
                // transient; anything after a successful send is not.
                Err(err) => format!("request error: {err}"),
            };

            match retry_step(&self.policy, attempt) {
                RetryStep::RetryAfter(delay) => {
                    warn!(
                        "attempt {attempt}/{}: {failure}, retrying in {:.1}s",
                        self.policy.max_attempts,
                        delay.as_secs_f64()
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                RetryStep::GiveUp => {
                    return Err(WikiError::RetriesExhausted {
                        attempts: attempt,
                        last: failure,
                    });
                }
            }
        }
    }

    /// Fetches the rendered HTML for a page and extracts its content
    /// container, returning a [`Page`] in the same shape as a normal fetch.
    ///
    /// Description and tags are unavailable via scraping and come back
    /// empty; `content_type` is forced to html.
    fn scrape_page(&self, meta: &PageMeta) -> Result<Page, WikiError> {
        let url = self.page_url(&meta.path);
        debug!("falling back to html scrape: {url}");

        let scrape_err = |reason: String| WikiError::Scrape {
            url: url.clone(),
            reason,
        };
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|err| scrape_err(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(scrape_err(format!("http status {status}")));
        }
        let body = resp.text().map_err(|err| scrape_err(err.to_string()))?;

        let content = self
            .selectors
            .extract_content(&body, &meta.path)
            .ok_or_else(|| scrape_err("document has no body element".to_string()))?;

        Ok(Page {
            id: meta.id,
            path: meta.path.clone(),
            title: meta.title.clone(),
            content,
            description: String::new(),
            content_type: ContentType::Html,
            tags: Vec::new(),
            created_at: String::new(),
            updated_at: meta.updated_at.clone(),
        })
    }
}

/// Pre-parsed selectors for the scrape fallback.
struct ScrapeSelectors {
    chrome: Selector,
    content: Vec<Selector>,
    body: Selector,
}

impl ScrapeSelectors {
    fn new() -> Self {
        Self {
            chrome: Selector::parse(CHROME_SELECTOR).expect("chrome selector"),
            content: CONTENT_SELECTORS
                .iter()
                .map(|s| Selector::parse(s).expect("content selector"))
                .collect(),
            body: Selector::parse("body").expect("body selector"),
        }
    }

    /// Strips chrome elements, then returns the HTML of the first matching
    /// content container (or the whole `<body>` as a last resort).
    fn extract_content(&self, html: &str, path: &str) -> Option<String> {
        let mut document = Html::parse_document(html);

        let chrome_ids: Vec<_> = document.select(&self.chrome).map(|el| el.id()).collect();
        for id in chrome_ids {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        for (selector, css) in self.content.iter().zip(CONTENT_SELECTORS) {
            if let Some(element) = document.select(selector).next() {
                debug!("found content via selector '{css}'");
                return Some(element.html());
            }
        }

        warn!("no content selector matched for {path}; using <body>");
        document.select(&self.body).next().map(|el| el.html())
    }
}

#[derive(Debug, Deserialize)]
struct ListData {
    pages: ListPages,
}

#[derive(Debug, Deserialize)]
struct ListPages {
    list: Vec<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct SingleData {
    pages: SinglePages,
}

#[derive(Debug, Deserialize)]
struct SinglePages {
    single: Option<Page>,
}
