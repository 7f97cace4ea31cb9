//! HTML page to Markdown text.
//!
//! Extracts the main content container, rewrites tables (which `htmd` does not
//! handle), converts with `htmd`, then runs the cleanup passes.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::NormalizationFailure;
use crate::cleanup;

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("valid selector"));
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").expect("valid selector"));
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("head > title, title").expect("valid selector"));
static BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("valid selector"));

/// Content containers in priority order. The first match wins.
static CONTENT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "article .markdown",     // Docusaurus
        ".vp-doc",               // VitePress
        ".markdown-section",     // GitBook / docsify
        "[role=\"main\"]",       // ReadTheDocs / generic
        "article",
        "main",
        ".content",
    ]
    .iter()
    .map(|s| Selector::parse(s).expect("valid selector"))
    .collect()
});

const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "iframe", "noscript", "svg", "header", "footer", "aside", "form",
    "button",
];

/// Markdown text recovered from an HTML page.
#[derive(Debug, Clone)]
pub(crate) struct HtmlConversion {
    pub markdown: String,
    /// Text of the `<title>` element, if any.
    pub title: Option<String>,
}

/// Convert a full HTML page to Markdown text.
pub(crate) fn html_to_markdown(html: &str) -> Result<HtmlConversion, NormalizationFailure> {
    let doc = Html::parse_document(html);
    let title = doc
        .select(&TITLE_SEL)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let content_html = extract_content_html(&doc).unwrap_or_else(|| html.to_string());
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();
    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| NormalizationFailure::Conversion(format!("htmd conversion failed: {e}")))?;

    debug!(raw_len = raw_markdown.len(), "htmd conversion complete");

    Ok(HtmlConversion {
        markdown: cleanup::run_pipeline(&raw_markdown),
        title,
    })
}

/// Inner HTML of the main content container, falling back to `<body>`.
fn extract_content_html(doc: &Html) -> Option<String> {
    CONTENT_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .or_else(|| doc.select(&BODY_SEL).next())
        .map(|el| el.inner_html())
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Replace each `<table>` with a pipe table before conversion.
fn preprocess_tables(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut result = html.to_string();

    for table in fragment.select(&TABLE_SEL) {
        let markdown = html_table_to_markdown(&table);
        let outer = table.html();
        if result.contains(&outer) {
            result = result.replacen(&outer, &markdown, 1);
        } else {
            debug!("table markup not found verbatim, leaving it to htmd");
        }
    }
    result
}

fn html_table_to_markdown(table: &ElementRef<'_>) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for tr in table.select(&TR_SEL) {
        let cells: Vec<String> = tr
            .select(&CELL_SEL)
            .map(|cell| escape_cell(&collapse_whitespace(&cell.text().collect::<String>())))
            .collect();
        if cells.is_empty() {
            continue;
        }
        if rows.is_empty() && tr.select(&TH_SEL).next().is_some() {
            has_header = true;
        }
        rows.push(cells);
    }

    let col_count = rows.iter().map(Vec::len).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(col_count, String::new());
    }

    // A table without a header row gets an empty one.
    if !has_header {
        rows.insert(0, vec![String::new(); col_count]);
    }

    let mut md = String::from("\n\n");
    for (i, row) in rows.iter().enumerate() {
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
        if i == 0 {
            md.push_str("| ");
            md.push_str(&vec!["---"; col_count].join(" | "));
            md.push_str(" |\n");
        }
    }
    md.push('\n');
    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(html: &str) -> HtmlConversion {
        html_to_markdown(html).unwrap()
    }

    #[test]
    fn simple_page() {
        let result = convert(
            "<html><head><title>Hello | Docs</title></head><body><main><h1>Hello World</h1><p>Some text.</p></main></body></html>",
        );
        assert!(result.markdown.contains("# Hello World"));
        assert!(result.markdown.contains("Some text."));
        assert_eq!(result.title.as_deref(), Some("Hello | Docs"));
    }

    #[test]
    fn strips_chrome() {
        let result = convert(
            r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Content</h1><p>Important text.</p></main>
            <footer><p>Copyright 2024</p></footer>
        </body></html>"#,
        );
        assert!(result.markdown.contains("Important text."));
        assert!(!result.markdown.contains("Copyright 2024"));
        assert!(!result.markdown.contains("Home"));
    }

    #[test]
    fn preserves_code_blocks() {
        let result = convert(
            r#"<html><body><main>
            <h1>Code Example</h1>
            <pre><code class="language-rust">fn main() {
    println!("hello");
}</code></pre>
        </main></body></html>"#,
        );
        assert!(result.markdown.contains("```rust"));
        assert!(result.markdown.contains("println!"));
    }

    #[test]
    fn converts_tables() {
        let result = convert(
            r#"<html><body><main>
            <table>
                <thead><tr><th>Name</th><th>Value</th></tr></thead>
                <tbody><tr><td>foo</td><td>a|b</td></tr></tbody>
            </table>
        </main></body></html>"#,
        );
        assert!(result.markdown.contains("| Name | Value |"));
        assert!(result.markdown.contains("| foo | a\\|b |"));
    }

    #[test]
    fn keeps_relative_links_verbatim() {
        let result = convert(
            r#"<html><body><article><p>See <a href="../install/">install</a> and <img src="/img/x.png" alt="x"></p></article></body></html>"#,
        );
        assert!(result.markdown.contains("[install](../install/)"));
        assert!(result.markdown.contains("![x](/img/x.png)"));
    }

    #[test]
    fn docusaurus_container_wins() {
        let result = convert(
            r#"<html><body><div class="sidebar">Menu</div><article><div class="markdown"><h1>Installation</h1><p>npm install tool</p></div><div>Edit this page</div></article></body></html>"#,
        );
        assert!(result.markdown.contains("npm install tool"));
        assert!(!result.markdown.contains("Edit this page"));
        assert!(!result.markdown.contains("Menu"));
    }

    #[test]
    fn empty_body() {
        let result = convert("<html><body></body></html>");
        assert!(result.title.is_none());
        assert_eq!(result.markdown.trim(), "");
    }
}
