//! Core document model for docs2md.
//!
//! Discovery produces [`SourceDocument`]s, the normalizer turns each one into
//! an ordered sequence of [`Block`]s, and the ToC generator derives
//! [`TocEntry`]s from the ordered result.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// Deepest heading level Markdown can express.
pub const MAX_HEADING_LEVEL: u8 = 6;

// ---------------------------------------------------------------------------
// SourceId / SourceRoot
// ---------------------------------------------------------------------------

/// Unique identifier of one input unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceId {
    /// A file, as a `/`-separated path relative to the source root.
    File(String),
    /// A crawled page.
    Page(Url),
}

impl SourceId {
    /// Build a file id from a path relative to the source root.
    pub fn file(rel_path: &Path) -> Self {
        let joined = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        Self::File(joined)
    }

    /// The relative file path, if this is a file source.
    pub fn as_file(&self) -> Option<&str> {
        match self {
            Self::File(path) => Some(path),
            Self::Page(_) => None,
        }
    }

    /// The page URL, if this is a crawled source.
    pub fn as_page(&self) -> Option<&Url> {
        match self {
            Self::Page(url) => Some(url),
            Self::File(_) => None,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.write_str(path),
            Self::Page(url) => f.write_str(url.as_str()),
        }
    }
}

/// The declared root of a source tree. Root-relative references resolve against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceRoot {
    /// A local documentation directory.
    Directory { path: PathBuf },
    /// A repository checkout (cloned or local). File ids are relative to
    /// `subdir` when one was selected; references resolve against `checkout`.
    Repository {
        checkout: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subdir: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remote: Option<String>,
    },
    /// A crawled site, rooted at the start URL.
    Site { start_url: Url },
}

impl SourceRoot {
    /// The local filesystem root, for directory and repository sources.
    pub fn local_root(&self) -> Option<&Path> {
        match self {
            Self::Directory { path } => Some(path),
            Self::Repository { checkout, .. } => Some(checkout),
            Self::Site { .. } => None,
        }
    }

    /// Path segments from the local root to the directory file ids are
    /// relative to. Empty unless a repository subdirectory was selected.
    pub fn id_prefix(&self) -> Vec<&str> {
        match self {
            Self::Repository {
                subdir: Some(subdir),
                ..
            } => subdir.split('/').filter(|s| !s.is_empty() && *s != ".").collect(),
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// HierarchyPosition
// ---------------------------------------------------------------------------

/// Where a document sits in its source hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyPosition {
    /// Ancestor names, outermost first (directories, or URL path segments).
    pub ancestors: Vec<String>,
    /// The document's own name (file name or last URL segment).
    pub name: String,
    /// Link distance from the start URL, for crawled sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_depth: Option<u32>,
    /// Order in which discovery yielded this document.
    pub discovery_index: usize,
}

impl HierarchyPosition {
    /// Position of a file given its `/`-separated path relative to the root.
    pub fn for_file(rel_path: &str, discovery_index: usize) -> Self {
        let mut parts: Vec<String> = rel_path
            .split('/')
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        let name = parts.pop().unwrap_or_default();
        Self {
            ancestors: parts,
            name,
            crawl_depth: None,
            discovery_index,
        }
    }

    /// Position of a crawled page found `depth` links away from the start URL.
    pub fn for_page(url: &Url, depth: u32, discovery_index: usize) -> Self {
        let mut parts: Vec<String> = url
            .path_segments()
            .map(|segs| segs.filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        let name = parts.pop().unwrap_or_else(|| "index".to_string());
        Self {
            ancestors: parts,
            name,
            crawl_depth: Some(depth),
            discovery_index,
        }
    }

    /// Hierarchy depth: crawl depth for pages, directory nesting for files.
    pub fn depth(&self) -> usize {
        match self.crawl_depth {
            Some(d) => d as usize,
            None => self.ancestors.len(),
        }
    }

    /// Whether this position came from a crawl.
    pub fn is_crawled(&self) -> bool {
        self.crawl_depth.is_some()
    }
}

// ---------------------------------------------------------------------------
// SourceDocument
// ---------------------------------------------------------------------------

/// Markup dialect of a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Markdown,
    Mdx,
    Html,
}

impl Dialect {
    /// Dialect for a file extension (without the dot, case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "mdx" => Some(Self::Mdx),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    /// Dialect for an HTTP `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            "text/mdx" => Self::Mdx,
            _ => Self::Html,
        }
    }
}

/// One input unit, as read by discovery. Consumed once by normalization.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Unique source identifier.
    pub id: SourceId,
    /// Raw content bytes.
    pub bytes: Vec<u8>,
    /// Declared or detected encoding label (e.g. from a `charset=` parameter).
    pub encoding: Option<String>,
    /// Markup dialect.
    pub dialect: Dialect,
    /// Metadata supplied by discovery; the normalizer merges header fields into it.
    pub metadata: BTreeMap<String, String>,
    /// Position in the source hierarchy.
    pub position: HierarchyPosition,
}

// ---------------------------------------------------------------------------
// Block model
// ---------------------------------------------------------------------------

/// Whether a reference embeds an image or links somewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Image,
    Link,
}

/// How a reference was written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStyle {
    /// `[text](target)` or `![alt](target)`.
    Inline,
    /// `[label]: target` link definition.
    Definition(String),
    /// `src` or `href` attribute value inside an HTML block.
    HtmlAttribute,
}

/// An image or link target embedded in content, subject to path resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceReference {
    pub kind: ReferenceKind,
    /// Target as written in the source document.
    pub original: String,
    /// Target to emit; equal to `original` until the resolver rewrites it.
    pub target: String,
    /// Link text or image alt text.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub style: ReferenceStyle,
}

impl ResourceReference {
    /// A fresh inline reference with its target not yet resolved.
    pub fn new(kind: ReferenceKind, target: impl Into<String>, text: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            kind,
            original: target.clone(),
            target,
            text: text.into(),
            title: None,
            style: ReferenceStyle::Inline,
        }
    }

    /// Whether the resolver changed the target.
    pub fn is_rewritten(&self) -> bool {
        self.target != self.original
    }
}

/// A run of inline content inside a paragraph or list item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inline {
    Text(String),
    Reference(ResourceReference),
    /// `[![alt](image)](link)`: an image wrapped in a link.
    LinkedImage {
        image: ResourceReference,
        link: ResourceReference,
    },
}

impl Inline {
    fn for_each_reference_mut(&mut self, f: &mut impl FnMut(&mut ResourceReference)) {
        match self {
            Self::Text(_) => {}
            Self::Reference(reference) => f(reference),
            Self::LinkedImage { image, link } => {
                f(image);
                f(link);
            }
        }
    }

    fn references(&self) -> Vec<&ResourceReference> {
        match self {
            Self::Text(_) => Vec::new(),
            Self::Reference(reference) => vec![reference],
            Self::LinkedImage { image, link } => vec![image, link],
        }
    }
}

/// Atomic content unit of a normalized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Heading {
        level: u8,
        text: String,
    },
    Paragraph {
        spans: Vec<Inline>,
    },
    CodeFence {
        language: Option<String>,
        text: String,
    },
    Resource {
        reference: ResourceReference,
    },
    ListItem {
        depth: usize,
        marker: String,
        spans: Vec<Inline>,
    },
    /// An HTML block. Text spans are emitted verbatim; references are
    /// attribute values.
    Html {
        spans: Vec<Inline>,
    },
    Raw {
        text: String,
    },
}

impl Block {
    /// A paragraph made of a single text span.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Paragraph {
            spans: vec![Inline::Text(text.into())],
        }
    }

    /// A raw passthrough block.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw { text: text.into() }
    }

    /// Visit every resource reference carried by this block, in source order.
    pub fn for_each_reference_mut(&mut self, mut f: impl FnMut(&mut ResourceReference)) {
        match self {
            Self::Resource { reference } => f(reference),
            Self::Paragraph { spans } | Self::ListItem { spans, .. } | Self::Html { spans } => {
                for span in spans {
                    span.for_each_reference_mut(&mut f);
                }
            }
            Self::Heading { .. } | Self::CodeFence { .. } | Self::Raw { .. } => {}
        }
    }

    /// Read-only view of every resource reference carried by this block.
    pub fn references(&self) -> Vec<&ResourceReference> {
        match self {
            Self::Resource { reference } => vec![reference],
            Self::Paragraph { spans } | Self::ListItem { spans, .. } | Self::Html { spans } => {
                spans.iter().flat_map(Inline::references).collect()
            }
            Self::Heading { .. } | Self::CodeFence { .. } | Self::Raw { .. } => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// TocEntry
// ---------------------------------------------------------------------------

/// A single table-of-contents entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Display title.
    pub title: String,
    /// Anchor id, unique across the whole output.
    pub anchor: String,
    /// Output heading level of the entry.
    pub level: u8,
    /// Document the entry belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_display() {
        let id = SourceId::file(Path::new("guide/setup.md"));
        assert_eq!(id.to_string(), "guide/setup.md");

        let url = Url::parse("https://docs.example.com/guide/intro").unwrap();
        assert_eq!(SourceId::Page(url).to_string(), "https://docs.example.com/guide/intro");
    }

    #[test]
    fn file_position_splits_ancestors() {
        let pos = HierarchyPosition::for_file("guide/advanced/tuning.md", 4);
        assert_eq!(pos.ancestors, vec!["guide", "advanced"]);
        assert_eq!(pos.name, "tuning.md");
        assert_eq!(pos.depth(), 2);
        assert!(!pos.is_crawled());
    }

    #[test]
    fn page_position_uses_crawl_depth() {
        let url = Url::parse("https://docs.example.com/a/b/c").unwrap();
        let pos = HierarchyPosition::for_page(&url, 1, 7);
        assert_eq!(pos.ancestors, vec!["a", "b"]);
        assert_eq!(pos.name, "c");
        assert_eq!(pos.depth(), 1);

        let root = Url::parse("https://docs.example.com/").unwrap();
        assert_eq!(HierarchyPosition::for_page(&root, 0, 0).name, "index");
    }

    #[test]
    fn dialect_detection() {
        assert_eq!(Dialect::from_extension("MD"), Some(Dialect::Markdown));
        assert_eq!(Dialect::from_extension("mdx"), Some(Dialect::Mdx));
        assert_eq!(Dialect::from_extension("png"), None);
        assert_eq!(Dialect::from_content_type("text/html; charset=utf-8"), Dialect::Html);
        assert_eq!(Dialect::from_content_type("text/markdown"), Dialect::Markdown);
    }

    #[test]
    fn for_each_reference_visits_inline_spans() {
        let mut block = Block::Paragraph {
            spans: vec![
                Inline::Text("See ".into()),
                Inline::Reference(ResourceReference::new(ReferenceKind::Link, "./a.md", "A")),
                Inline::Text(" and ".into()),
                Inline::Reference(ResourceReference::new(ReferenceKind::Image, "b.png", "B")),
            ],
        };

        let mut seen = 0;
        block.for_each_reference_mut(|r| {
            seen += 1;
            r.target = format!("rewritten-{seen}");
        });

        assert_eq!(seen, 2);
        let refs = block.references();
        assert!(refs.iter().all(|r| r.is_rewritten()));
        assert_eq!(refs[0].original, "./a.md");
    }

    #[test]
    fn linked_images_and_html_attributes_are_visited_in_order() {
        let mut attr = ResourceReference::new(ReferenceKind::Image, "logo.png", "");
        attr.style = ReferenceStyle::HtmlAttribute;
        let blocks = [
            Block::Paragraph {
                spans: vec![Inline::LinkedImage {
                    image: ResourceReference::new(ReferenceKind::Image, "badge.svg", "b"),
                    link: ResourceReference::new(ReferenceKind::Link, "ci.md", "b"),
                }],
            },
            Block::Html {
                spans: vec![Inline::Text("<img src=\"".into()), Inline::Reference(attr), Inline::Text("\">".into())],
            },
        ];

        let targets: Vec<&str> = blocks
            .iter()
            .flat_map(Block::references)
            .map(|r| r.target.as_str())
            .collect();
        assert_eq!(targets, vec!["badge.svg", "ci.md", "logo.png"]);
    }
}
