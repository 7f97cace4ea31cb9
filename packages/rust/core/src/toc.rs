//! Table of contents and anchor assignment.
//!
//! Every heading in the merged output (the ToC heading, each document title,
//! and each inner heading) draws its anchor from one namespace in output
//! order, so anchors are unique and stable for a fixed input.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use docs2md_shared::{
    Block, ConsolidateConfig, Inline, ReferenceKind, ResourceReference, SourceId, TocEntry,
};

use crate::hierarchy::HierarchyNode;

/// Anchor used when a heading slugs to nothing.
const EMPTY_ANCHOR: &str = "section";

/// ToC rendering options.
#[derive(Debug, Clone)]
pub struct TocOptions {
    /// Heading above the list; `None` renders the list alone.
    pub title: Option<String>,
    /// Level of the ToC heading.
    pub title_level: u8,
    /// Also list inner headings.
    pub include_sections: bool,
    /// Deepest inner heading level listed.
    pub max_level: u8,
}

impl From<&ConsolidateConfig> for TocOptions {
    fn from(config: &ConsolidateConfig) -> Self {
        Self {
            title: config.toc_title.clone(),
            title_level: config.base_heading_level,
            include_sections: config.toc_include_sections,
            max_level: config.toc_max_level,
        }
    }
}

/// Generated table of contents.
#[derive(Debug, Clone, Default)]
pub struct TableOfContents {
    pub entries: Vec<TocEntry>,
    /// Blocks to place at the top of the output.
    pub blocks: Vec<Block>,
    pub anchors: AnchorIndex,
}

/// Final anchors by document and by original heading slug.
#[derive(Debug, Clone, Default)]
pub struct AnchorIndex {
    documents: HashMap<SourceId, String>,
    headings: HashMap<SourceId, HashMap<String, String>>,
    global: HashMap<String, String>,
}

impl AnchorIndex {
    /// Anchor of a document's title.
    pub fn document(&self, source: &SourceId) -> Option<&str> {
        self.documents.get(source).map(String::as_str)
    }

    /// Anchor of the first heading in `source` whose text slugs to `slug`.
    pub fn heading(&self, source: &SourceId, slug: &str) -> Option<&str> {
        self.headings.get(source)?.get(slug).map(String::as_str)
    }

    /// Anchor of the first heading anywhere whose text slugs to `slug`.
    pub fn global(&self, slug: &str) -> Option<&str> {
        self.global.get(slug).map(String::as_str)
    }

    fn record(&mut self, source: Option<&SourceId>, slug: &str, anchor: &str) {
        if let Some(source) = source {
            self.headings
                .entry(source.clone())
                .or_default()
                .entry(slug.to_string())
                .or_insert_with(|| anchor.to_string());
        }
        self.global
            .entry(slug.to_string())
            .or_insert_with(|| anchor.to_string());
    }
}

/// Hands out unique anchors in first-come order.
#[derive(Debug, Default)]
pub struct AnchorNamespace {
    taken: HashSet<String>,
    next_suffix: HashMap<String, usize>,
}

impl AnchorNamespace {
    /// Claim `base`, or the first free `base-N` for N = 1, 2, ...
    pub fn claim(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let suffix = self.next_suffix.entry(base.to_string()).or_insert(0);
        loop {
            *suffix += 1;
            let candidate = format!("{base}-{suffix}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Anchor id for a heading: lowercase, whitespace runs become `-`, anything
/// other than alphanumerics and `-` is dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut in_whitespace = false;

    for c in text.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_alphanumeric() || c == '-' {
            slug.extend(c.to_lowercase());
        }
    }

    if slug.is_empty() {
        EMPTY_ANCHOR.to_string()
    } else {
        slug
    }
}

/// Assign anchors to every heading and build the ToC for `nodes` (in output order).
#[instrument(skip_all, fields(nodes = nodes.len()))]
pub fn build_toc(nodes: &[HierarchyNode], options: &TocOptions) -> TableOfContents {
    let mut namespace = AnchorNamespace::default();
    let mut anchors = AnchorIndex::default();
    let mut entries = Vec::new();

    if let Some(title) = &options.title {
        let slug = slugify(title);
        let anchor = namespace.claim(&slug);
        anchors.record(None, &slug, &anchor);
    }

    for node in nodes {
        let source = node.source();
        let slug = slugify(node.title());
        let anchor = namespace.claim(&slug);
        anchors.record(Some(source), &slug, &anchor);
        anchors.documents.insert(source.clone(), anchor.clone());
        entries.push(TocEntry {
            title: node.title().to_string(),
            anchor,
            level: node.title_level,
            source: Some(source.clone()),
        });

        for block in &node.document().blocks {
            let Block::Heading { level, text } = block else {
                continue;
            };
            let slug = slugify(text);
            let anchor = namespace.claim(&slug);
            anchors.record(Some(source), &slug, &anchor);
            if options.include_sections && *level <= options.max_level {
                entries.push(TocEntry {
                    title: text.clone(),
                    anchor,
                    level: *level,
                    source: Some(source.clone()),
                });
            }
        }
    }

    let blocks = render_toc(&entries, options);
    debug!(entries = entries.len(), "table of contents built");

    TableOfContents {
        entries,
        blocks,
        anchors,
    }
}

/// ToC heading plus one list item per entry, indented by `level - min level`.
fn render_toc(entries: &[TocEntry], options: &TocOptions) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(entries.len() + 1);
    if let Some(title) = &options.title {
        blocks.push(Block::Heading {
            level: options.title_level,
            text: title.clone(),
        });
    }

    let min_level = entries.iter().map(|e| e.level).min().unwrap_or(1);
    for entry in entries {
        let reference = ResourceReference::new(
            ReferenceKind::Link,
            format!("#{}", entry.anchor),
            escape_link_text(&entry.title),
        );
        blocks.push(Block::ListItem {
            depth: usize::from(entry.level - min_level),
            marker: "-".to_string(),
            spans: vec![Inline::Reference(reference)],
        });
    }
    blocks
}

fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::build_hierarchy;
    use crate::resolver::ResolvedDocument;
    use docs2md_markdown::{NormalizedDocument, render_blocks};
    use docs2md_shared::{Dialect, HierarchyPosition};
    use std::collections::BTreeMap;

    fn doc(rel: &str, title: &str, blocks: Vec<Block>) -> ResolvedDocument {
        ResolvedDocument::from(NormalizedDocument {
            source: SourceId::File(rel.into()),
            position: HierarchyPosition::for_file(rel, 0),
            dialect: Dialect::Markdown,
            title: title.into(),
            metadata: BTreeMap::new(),
            blocks,
            warnings: Vec::new(),
        })
    }

    fn options(include_sections: bool) -> TocOptions {
        TocOptions {
            title: Some("Table of Contents".into()),
            title_level: 1,
            include_sections,
            max_level: 3,
        }
    }

    #[test]
    fn slugify_common_titles() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("  API   Reference (v2)! "), "api-reference-v2");
        assert_eq!(slugify("C++ & Rust"), "c--rust");
        assert_eq!(slugify("Hello !"), "hello-");
        assert_eq!(slugify("a - b"), "a---b");
        assert_eq!(slugify("Überblick"), "überblick");
        assert_eq!(slugify("!!!"), "section");
        assert_eq!(slugify("pre-release"), "pre-release");
    }

    #[test]
    fn duplicate_titles_get_suffixes() {
        let nodes = build_hierarchy(
            vec![doc("a.md", "Overview", vec![]), doc("b.md", "Overview", vec![])],
            1,
        );
        let toc = build_toc(&nodes, &options(false));
        let anchors: Vec<&str> = toc.entries.iter().map(|e| e.anchor.as_str()).collect();
        assert_eq!(anchors, vec!["overview", "overview-1"]);
    }

    #[test]
    fn suffixes_skip_taken_ids() {
        let mut ns = AnchorNamespace::default();
        assert_eq!(ns.claim("a-1"), "a-1");
        assert_eq!(ns.claim("a"), "a");
        assert_eq!(ns.claim("a"), "a-2");
        assert_eq!(ns.claim("a"), "a-3");
    }

    #[test]
    fn toc_title_claims_first_anchor() {
        let nodes = build_hierarchy(vec![doc("a.md", "Table of Contents", vec![])], 1);
        let toc = build_toc(&nodes, &options(false));
        assert_eq!(toc.entries[0].anchor, "table-of-contents-1");
    }

    #[test]
    fn entries_follow_levels() {
        let nodes = build_hierarchy(
            vec![
                doc("index.md", "Home", vec![]),
                doc("guide/a.md", "A", vec![]),
                doc("guide/b.md", "B", vec![]),
            ],
            1,
        );
        let toc = build_toc(&nodes, &options(false));
        let levels: Vec<u8> = toc.entries.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![1, 2, 2]);
        assert_eq!(
            render_blocks(&toc.blocks),
            "# Table of Contents\n\n- [Home](#home)\n  - [A](#a)\n  - [B](#b)\n"
        );
    }

    #[test]
    fn sections_are_listed_up_to_max_level() {
        let blocks = vec![
            Block::Heading { level: 2, text: "Install".into() },
            Block::Heading { level: 3, text: "Linux".into() },
            Block::Heading { level: 4, text: "Arch".into() },
        ];
        let nodes = build_hierarchy(vec![doc("setup.md", "Setup", blocks)], 1);
        let toc = build_toc(&nodes, &options(true));
        let titles: Vec<&str> = toc.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Setup", "Install", "Linux"]);

        let source = SourceId::File("setup.md".into());
        assert_eq!(toc.anchors.document(&source), Some("setup"));
        assert_eq!(toc.anchors.heading(&source, "arch"), Some("arch"));
    }

    #[test]
    fn heading_lookup_prefers_owning_document() {
        let a = vec![Block::Heading { level: 2, text: "Usage".into() }];
        let b = vec![Block::Heading { level: 2, text: "Usage".into() }];
        let nodes = build_hierarchy(vec![doc("a.md", "A", a), doc("b.md", "B", b)], 1);
        let toc = build_toc(&nodes, &options(false));
        let b_id = SourceId::File("b.md".into());
        assert_eq!(toc.anchors.heading(&b_id, "usage"), Some("usage-1"));
        assert_eq!(toc.anchors.global("usage"), Some("usage"));
    }

    #[test]
    fn untitled_toc_renders_list_only() {
        let nodes = build_hierarchy(vec![doc("a.md", "[Beta] API", vec![])], 1);
        let toc = build_toc(
            &nodes,
            &TocOptions {
                title: None,
                ..options(false)
            },
        );
        assert_eq!(render_blocks(&toc.blocks), "- [\\[Beta\\] API](#beta-api)\n");
    }
}
