//! Document normalization: Markdown, MDX and HTML sources into one block model.
//!
//! [`normalize`] decodes a [`SourceDocument`], splits off its metadata header,
//! dispatches on the [`Dialect`], and parses the result into [`Block`]s.
//! [`render_blocks`] serializes blocks back to Markdown.

mod blocks;
mod cleanup;
mod frontmatter;
mod html;
mod inline;
mod mdx;
mod render;
mod title;

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use docs2md_shared::{Block, Dialect, HierarchyPosition, SourceDocument, SourceId};

pub use render::render_blocks;
pub use title::{is_index_name, title_from_position};

/// Metadata key holding the `<title>` text of an HTML page.
pub const HTML_TITLE_KEY: &str = "html_title";

/// Encoding labels accepted as UTF-8.
const UTF8_LABELS: &[&str] = &["utf-8", "utf8", "ascii", "us-ascii"];

const BOM: &[u8] = b"\xEF\xBB\xBF";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A recoverable problem; the document is kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationWarning {
    #[error("invalid {format} metadata header: {message}")]
    InvalidHeader {
        format: &'static str,
        message: String,
    },

    #[error("metadata header is never closed; treated as body")]
    UnterminatedHeader,

    #[error("code fence opened on line {line} is never closed")]
    UnbalancedFence { line: usize },

    #[error("unknown component <{0}> kept as raw text")]
    UnknownComponent(String),

    #[error("unknown directive :::{0} kept as raw text")]
    UnknownDirective(String),
}

/// An unrecoverable problem; the document is excluded from the output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationFailure {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("conversion error: {0}")]
    Conversion(String),
}

/// A source document parsed into blocks, with its title resolved.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    pub source: SourceId,
    pub position: HierarchyPosition,
    pub dialect: Dialect,
    pub title: String,
    /// Discovery metadata overlaid with header fields.
    pub metadata: BTreeMap<String, String>,
    pub blocks: Vec<Block>,
    pub warnings: Vec<NormalizationWarning>,
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Normalize one source document.
#[instrument(skip_all, fields(source = %doc.id, dialect = ?doc.dialect))]
pub fn normalize(doc: SourceDocument) -> Result<NormalizedDocument, NormalizationFailure> {
    let text = decode(&doc.bytes, doc.encoding.as_deref())?;
    let mut metadata = doc.metadata;
    let mut warnings = Vec::new();

    let mut blocks = match doc.dialect {
        Dialect::Html => {
            let converted = html::html_to_markdown(&text)?;
            if let Some(title) = converted.title {
                metadata.insert(HTML_TITLE_KEY.to_string(), title);
            }
            blocks::parse_blocks(&converted.markdown, &mut warnings)
        }
        Dialect::Markdown | Dialect::Mdx => {
            let split = frontmatter::split_header(&text);
            warnings.extend(split.warnings);
            metadata.extend(split.fields);

            let body = if doc.dialect == Dialect::Mdx {
                mdx::mdx_to_markdown(split.body, &mut warnings)
            } else {
                split.body.to_string()
            };

            let mut blocks = Vec::new();
            if let Some(raw) = split.raw {
                blocks.push(Block::Raw { text: raw });
            }
            blocks.extend(blocks::parse_blocks(&body, &mut warnings));
            blocks
        }
    };

    let title = resolve_title(&metadata, &mut blocks, &doc.position);

    debug!(
        title = %title,
        blocks = blocks.len(),
        warnings = warnings.len(),
        "document normalized"
    );

    Ok(NormalizedDocument {
        source: doc.id,
        position: doc.position,
        dialect: doc.dialect,
        title,
        metadata,
        blocks,
        warnings,
    })
}

fn decode(bytes: &[u8], label: Option<&str>) -> Result<String, NormalizationFailure> {
    if let Some(label) = label {
        let label = label.trim();
        if !UTF8_LABELS.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            return Err(NormalizationFailure::Encoding(format!(
                "unsupported encoding `{label}`"
            )));
        }
    }

    let bytes = bytes.strip_prefix(BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| {
        NormalizationFailure::Encoding(format!("invalid UTF-8 at byte {}", e.valid_up_to()))
    })?;

    Ok(text.replace("\r\n", "\n"))
}

/// Title precedence: header `title`, a leading level-1 heading (removed from
/// the body), the HTML `<title>`, then the source path.
fn resolve_title(
    metadata: &BTreeMap<String, String>,
    blocks: &mut Vec<Block>,
    position: &HierarchyPosition,
) -> String {
    let leading_h1 = blocks
        .iter()
        .position(|b| !matches!(b, Block::Raw { .. } | Block::Html { .. }))
        .filter(|&i| matches!(&blocks[i], Block::Heading { level: 1, .. }));

    let header_title = metadata
        .get("title")
        .map(|t| t.trim())
        .filter(|t| !t.is_empty());

    if let Some(title) = header_title {
        if let Some(i) = leading_h1 {
            if matches!(&blocks[i], Block::Heading { text, .. } if text.trim().eq_ignore_ascii_case(title)) {
                blocks.remove(i);
            }
        }
        return title.to_string();
    }

    if let Some(i) = leading_h1 {
        if let Block::Heading { text, .. } = blocks.remove(i) {
            let text = text.trim().to_string();
            if !text.is_empty() {
                return text;
            }
        }
    }

    metadata
        .get(HTML_TITLE_KEY)
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .unwrap_or_else(|| title_from_position(position))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use docs2md_shared::Inline;
    use std::path::Path;
    use url::Url;

    fn file_doc(rel: &str, body: &str) -> SourceDocument {
        let dialect = if rel.ends_with(".mdx") {
            Dialect::Mdx
        } else {
            Dialect::Markdown
        };
        SourceDocument {
            id: SourceId::file(Path::new(rel)),
            bytes: body.as_bytes().to_vec(),
            encoding: None,
            dialect,
            metadata: BTreeMap::new(),
            position: HierarchyPosition::for_file(rel, 0),
        }
    }

    #[test]
    fn leading_h1_becomes_title() {
        let doc = normalize(file_doc("guide/setup.md", "# Setup Guide\n\n## Install\n\nRun it.")).unwrap();
        assert_eq!(doc.title, "Setup Guide");
        assert_eq!(doc.blocks[0], Block::Heading { level: 2, text: "Install".into() });
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn header_title_wins_and_drops_duplicate_h1() {
        let doc = normalize(file_doc("a.md", "---\ntitle: Intro\n---\n# intro\n\nBody")).unwrap();
        assert_eq!(doc.title, "Intro");
        assert_eq!(doc.metadata["title"], "Intro");
        assert_eq!(doc.blocks, vec![Block::text("Body")]);
    }

    #[test]
    fn header_title_keeps_different_h1() {
        let doc = normalize(file_doc("a.md", "---\ntitle: Intro\n---\n# Welcome\n")).unwrap();
        assert_eq!(doc.title, "Intro");
        assert_eq!(doc.blocks.len(), 1);
    }

    #[test]
    fn title_falls_back_to_path() {
        let doc = normalize(file_doc("getting-started.md", "Just text.")).unwrap();
        assert_eq!(doc.title, "Getting Started");
    }

    #[test]
    fn invalid_header_is_raw_with_warning() {
        let doc = normalize(file_doc("a.md", "---\nnot valid\n---\n# T\n")).unwrap();
        assert_eq!(doc.title, "T");
        assert_eq!(doc.blocks, vec![Block::raw("---\nnot valid\n---")]);
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn bom_and_crlf_are_handled() {
        let mut doc = file_doc("a.md", "");
        doc.bytes = b"\xEF\xBB\xBF# Hello\r\n\r\nWorld\r\n".to_vec();
        let doc = normalize(doc).unwrap();
        assert_eq!(doc.title, "Hello");
        assert_eq!(doc.blocks, vec![Block::text("World")]);
    }

    #[test]
    fn invalid_utf8_fails() {
        let mut doc = file_doc("a.md", "");
        doc.bytes = vec![b'#', b' ', 0xFF, 0xFE];
        let err = normalize(doc).unwrap_err();
        assert!(matches!(err, NormalizationFailure::Encoding(_)));
    }

    #[test]
    fn non_utf8_label_fails() {
        let mut doc = file_doc("a.md", "# A");
        doc.encoding = Some("ISO-8859-1".into());
        assert!(matches!(normalize(doc), Err(NormalizationFailure::Encoding(_))));
    }

    #[test]
    fn mdx_components_are_approximated() {
        let body = "import Tabs from '@theme/Tabs';\n\n# Config\n\n<Note>\n  Remember this.\n</Note>\n\n<Widget />\n";
        let doc = normalize(file_doc("config.mdx", body)).unwrap();
        assert_eq!(doc.title, "Config");
        let rendered = render_blocks(&doc.blocks);
        assert!(rendered.contains("**Note**"));
        assert!(rendered.contains("Remember this."));
        assert!(!rendered.contains("import Tabs"));
        assert!(doc.warnings.contains(&NormalizationWarning::UnknownComponent("Widget".into())));
    }

    #[test]
    fn html_page_uses_h1_then_title_tag() {
        let url = Url::parse("https://docs.example.com/guide/intro").unwrap();
        let html = "<html><head><title>Intro | Docs</title></head><body><main><h1>Introduction</h1><p>See <a href=\"../api\">API</a>.</p></main></body></html>";
        let doc = SourceDocument {
            id: SourceId::Page(url.clone()),
            bytes: html.as_bytes().to_vec(),
            encoding: Some("utf-8".into()),
            dialect: Dialect::Html,
            metadata: BTreeMap::new(),
            position: HierarchyPosition::for_page(&url, 1, 3),
        };
        let doc = normalize(doc).unwrap();
        assert_eq!(doc.title, "Introduction");
        assert_eq!(doc.metadata[HTML_TITLE_KEY], "Intro | Docs");
        let has_link = doc.blocks.iter().any(|b| {
            matches!(b, Block::Paragraph { spans } if spans.iter().any(|s| matches!(s, Inline::Reference(r) if r.target == "../api")))
        });
        assert!(has_link, "blocks: {:?}", doc.blocks);
    }

    #[test]
    fn html_without_h1_uses_title_tag() {
        let url = Url::parse("https://docs.example.com/faq").unwrap();
        let doc = SourceDocument {
            id: SourceId::Page(url.clone()),
            bytes: b"<html><head><title>FAQ</title></head><body><p>Q and A</p></body></html>".to_vec(),
            encoding: None,
            dialect: Dialect::Html,
            metadata: BTreeMap::new(),
            position: HierarchyPosition::for_page(&url, 0, 0),
        };
        assert_eq!(normalize(doc).unwrap().title, "FAQ");
    }
}
