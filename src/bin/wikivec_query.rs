use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Style};

use wikivec::{build_embedder, EmbedderArgs, ScoredPoint, VectorStore};

#[derive(Parser, Debug)]
#[command(
    name = "wikivec-query",
    about = "Search the wikivec Qdrant collection from the command line"
)]
struct QueryCli {
    /// Search query text
    #[arg(required = true)]
    query: Vec<String>,

    /// Number of results to return
    #[arg(short, long, env = "QUERY_LIMIT", default_value_t = 5)]
    limit: usize,

    /// Qdrant HTTP endpoint
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant API key (optional)
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Qdrant collection name
    #[arg(short, long, env = "QDRANT_COLLECTION", default_value = "wiki")]
    collection: String,

    /// Print the matched chunk text under each result
    #[arg(long, env = "QUERY_SHOW_TEXT", default_value_t = false)]
    show_text: bool,

    /// Hide results below this cosine similarity (0-1)
    #[arg(long, env = "QUERY_MIN_SCORE", default_value_t = 0.0)]
    min_score: f32,

    /// Terminal width for text wrapping
    #[arg(long, env = "QUERY_WIDTH", default_value_t = 100)]
    width: usize,

    #[command(flatten)]
    embedder: EmbedderArgs,
}

fn main() -> Result<()> {
    wikivec::logging::init();
    let cli = QueryCli::parse();
    let query_text = cli.query.join(" ");
    let color = supports_color();

    let embedder = build_embedder(&cli.embedder).context("failed to load embedder")?;
    let vectors = embedder
        .encode(&[query_text.as_str()], 1)
        .context("failed to embed query")?;
    let query_vector = vectors
        .into_iter()
        .next()
        .context("embedder returned no vector for the query")?;

    // Read-only tool: never create the collection on a typo'd name.
    let store = VectorStore::open(
        &cli.qdrant_url,
        cli.qdrant_api_key.as_deref(),
        &cli.collection,
        Duration::from_secs(30),
    )
    .context("cannot reach Qdrant")?;

    let threshold = (cli.min_score > 0.0).then_some(cli.min_score);
    let hits = store.search(&query_vector, cli.limit, threshold)?;

    println!();
    println!("  {} {query_text}", paint("Query:", Style::new().bold(), color));
    println!(
        "  {}",
        paint(
            &format!(
                "collection={} model={}",
                cli.collection,
                cli.embedder.model_label()
            ),
            Style::new().dimmed(),
            color
        )
    );
    println!();

    if hits.is_empty() {
        println!("  {}", paint("No results found.", Style::new().dimmed(), color));
        println!();
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{}", format_result(rank + 1, hit, cli.show_text, cli.width, color));
        println!();
    }
    Ok(())
}

/// Color is decided once: stdout attached to a terminal and `NO_COLOR` unset.
fn supports_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Applies a style only when color output is enabled.
fn paint(text: &str, style: Style, color: bool) -> String {
    if color {
        text.style(style).to_string()
    } else {
        text.to_string()
    }
}

fn format_result(rank: usize, hit: &ScoredPoint, show_text: bool, width: usize, color: bool) -> String {
    let p = &hit.payload;
    let title = if !p.page_title.is_empty() {
        p.page_title.as_str()
    } else if !p.page_path.is_empty() {
        p.page_path.as_str()
    } else {
        "Untitled"
    };
    let bold = Style::new().bold();
    let dim = Style::new().dimmed();

    let mut lines = Vec::new();
    let mut headline = format!(
        "{}  {}",
        paint(&format!("#{rank}"), bold, color),
        paint(title, bold, color)
    );
    if !p.section.is_empty() {
        headline.push_str(&format!(
            "  {}  {}",
            paint("\u{203a}", dim, color),
            paint(&p.section, dim, color)
        ));
    }
    lines.push(headline);
    lines.push(format!("   {}", paint(&p.page_url, Style::new().cyan(), color)));
    lines.push(format!(
        "   score {} {}",
        score_bar(hit.score, 20, color),
        paint(&format!("{:.3}", hit.score), Style::new().yellow(), color)
    ));

    if !p.tags.is_empty() {
        lines.push(format!(
            "   {} {}",
            paint("tags:", dim, color),
            paint(&p.tags.join(", "), dim, color)
        ));
    }

    if show_text && !p.text.is_empty() {
        let flat = p.text.replace('\n', " ");
        lines.push(String::new());
        for wrapped in wrap_text(&flat, width.saturating_sub(6).max(20)) {
            lines.push(paint(&format!("   \u{2502} {wrapped}"), dim, color));
        }
    }

    lines.join("\n")
}

/// Renders a filled similarity bar colored by score band.
fn score_bar(score: f32, width: usize, color: bool) -> String {
    let clamped = score.clamp(0.0, 1.0);
    let filled = (clamped * width as f32).round() as usize;
    let bar = format!(
        "{}{}",
        "\u{2588}".repeat(filled),
        "\u{2591}".repeat(width.saturating_sub(filled))
    );
    let style = if score >= 0.7 {
        Style::new().green()
    } else if score >= 0.5 {
        Style::new().yellow()
    } else {
        Style::new().red()
    };
    paint(&bar, style, color)
}

/// Greedy word wrap; words longer than the width get their own line.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
