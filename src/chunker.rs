//! Page content cleaning and overlap-preserving word-window chunking.
//!
//! Markdown pages are cleaned (front-matter, inline markup, link/image
//! syntax, code fences), split into sections on H1-H3 headings, and each
//! section body is chunked with a sliding word window. HTML pages are
//! reduced to their visible text and chunked as a single untitled section;
//! they never carry a section header.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use serde::Serialize;

use crate::page::ContentType;

/// One overlapping slice of a page's cleaned text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Chunk body, prefixed with its section header when one exists.
    pub text: String,
    /// Zero-based position within the page, stable for the current run only.
    pub chunk_index: usize,
    /// Originating section header, empty when the chunk has none.
    pub section: String,
}

/// Word-window sizing knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Maximum words per chunk.
    pub chunk_size: usize,
    /// Words shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
        }
    }
}

impl ChunkingConfig {
    /// Rejects window geometries that cannot make forward progress.
    ///
    /// An overlap at or above the window size yields a non-positive stride;
    /// that is a configuration error, caught before any page is processed.
    pub fn validate(&self) -> Result<(), ChunkingConfigError> {
        if self.chunk_size == 0 {
            return Err(ChunkingConfigError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingConfigError::OverlapTooLarge {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// Invalid window geometry, rejected at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkingConfigError {
    /// `chunk_size` must be at least one word.
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    /// `chunk_overlap` must leave a positive stride.
    #[error("chunk_overlap {chunk_overlap} must be smaller than chunk_size {chunk_size}")]
    OverlapTooLarge {
        /// Configured window size.
        chunk_size: usize,
        /// Configured overlap.
        chunk_overlap: usize,
    },
}

static FRONT_MATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A---[^\S\n]*\n.*?\n---[^\S\n]*\n").expect("front matter regex"));
static INLINE_HTML: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("inline html regex"));
static IMAGE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("image link regex"));
static HYPERLINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("hyperlink regex"));
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").expect("code fence regex"));
static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank lines regex"));
static HEADING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").expect("heading regex"));

/// Normalizes raw markdown into plain prose.
///
/// Idempotent: cleaning already-cleaned text returns it unchanged.
pub fn clean_markdown(text: &str) -> String {
    let text = FRONT_MATTER.replace(text, "");
    let text = INLINE_HTML.replace_all(&text, " ");
    let text = IMAGE_LINK.replace_all(&text, "$1");
    let text = HYPERLINK.replace_all(&text, "$1");
    let text = CODE_FENCE.replace_all(&text, "$1");
    let text = EXCESS_BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Extracts the visible text of an HTML document, markup dropped.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut joined = String::new();
    for piece in document.root_element().text() {
        if !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(piece);
    }
    collapse_whitespace(&joined)
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim_end().to_string()
}

/// Partitions cleaned markdown into ordered `(header, body)` sections on
/// H1-H3 heading lines.
///
/// Sections whose trimmed body is empty are dropped. When the text contains
/// no heading line at all, the whole text becomes one section with an empty
/// header; a document of nothing but headings yields no sections.
pub fn split_sections(text: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut current_header = String::new();
    let mut current_lines: Vec<&str> = Vec::new();
    let mut saw_heading = false;

    let close_section = |header: &str, lines: &[&str], sections: &mut Vec<(String, String)>| {
        let body = lines.join("\n").trim().to_string();
        if !body.is_empty() {
            sections.push((header.to_string(), body));
        }
    };

    for line in text.lines() {
        if let Some(caps) = HEADING_LINE.captures(line) {
            saw_heading = true;
            close_section(&current_header, &current_lines, &mut sections);
            current_header = caps[2].trim().to_string();
            current_lines.clear();
        } else {
            current_lines.push(line);
        }
    }
    close_section(&current_header, &current_lines, &mut sections);

    if !saw_heading && sections.is_empty() {
        let whole = text.trim();
        if !whole.is_empty() {
            sections.push((String::new(), whole.to_string()));
        }
    }

    sections
}

/// Slides a word window across one section body, continuing `start_index`.
///
/// Windows advance by `chunk_size - chunk_overlap` words; the window whose
/// right edge reaches the end of the body is emitted (even when shorter than
/// `chunk_size`) and terminates the section.
pub fn window_chunks(
    header: &str,
    body: &str,
    config: &ChunkingConfig,
    start_index: usize,
) -> Vec<Chunk> {
    let words: Vec<&str> = body.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut index = start_index;
    let mut pos = 0usize;

    loop {
        let end = (pos + config.chunk_size).min(words.len());
        let window = words[pos..end].join(" ");
        let text = if header.is_empty() {
            window
        } else {
            format!("{header}\n\n{window}")
        };
        chunks.push(Chunk {
            text,
            chunk_index: index,
            section: header.to_string(),
        });
        index += 1;
        if end == words.len() {
            break;
        }
        pos += config.stride();
    }

    chunks
}

/// Splits a page's raw content into ordered, overlapping chunks.
///
/// Returns an empty vector for content that cleans down to nothing; that is
/// a valid skip outcome, not an error.
pub fn chunk_page(content: &str, content_type: ContentType, config: &ChunkingConfig) -> Vec<Chunk> {
    let sections = match content_type {
        ContentType::Html => {
            let text = html_to_text(content);
            if text.is_empty() {
                return Vec::new();
            }
            vec![(String::new(), text)]
        }
        ContentType::Markdown => split_sections(&clean_markdown(content)),
    };

    let mut all_chunks = Vec::new();
    for (header, body) in &sections {
        let next = window_chunks(header, body, config, all_chunks.len());
        all_chunks.extend(next);
    }
    all_chunks
}
