//! Output ordering and heading levels.
//!
//! File sources are ordered depth-first by path, pages by crawl depth then
//! discovery order. Each document's title sits at `base + depth` and its inner
//! headings are shifted to nest directly beneath it.

use std::cmp::Ordering;

use tracing::{debug, instrument};

use docs2md_markdown::{NormalizedDocument, is_index_name};
use docs2md_shared::{Block, HierarchyPosition, MAX_HEADING_LEVEL, SourceId};

use crate::resolver::ResolvedDocument;

/// A document placed in the output.
#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub resolved: ResolvedDocument,
    /// Heading level of the document's own title.
    pub title_level: u8,
    /// Zero-based position in the output.
    pub ordinal: usize,
}

impl HierarchyNode {
    pub fn document(&self) -> &NormalizedDocument {
        &self.resolved.document
    }

    pub fn source(&self) -> &SourceId {
        &self.resolved.document.source
    }

    pub fn title(&self) -> &str {
        &self.resolved.document.title
    }
}

/// Order documents and assign heading levels. Consumes the surviving set;
/// ordinals of the result are `0..n`.
#[instrument(skip_all, fields(documents = documents.len(), base_level = base_level))]
pub fn build_hierarchy(documents: Vec<ResolvedDocument>, base_level: u8) -> Vec<HierarchyNode> {
    let (mut files, mut pages): (Vec<_>, Vec<_>) = documents
        .into_iter()
        .partition(|d| !d.document.position.is_crawled());

    files.sort_by(|a, b| compare_files(&a.document.position, &b.document.position));
    pages.sort_by_key(|d| {
        let pos = &d.document.position;
        (pos.crawl_depth, pos.discovery_index)
    });

    let nodes: Vec<HierarchyNode> = files
        .into_iter()
        .chain(pages)
        .enumerate()
        .map(|(ordinal, mut resolved)| {
            let title_level = title_level(base_level, resolved.document.position.depth());
            shift_headings(&mut resolved.document.blocks, title_level);
            HierarchyNode {
                resolved,
                title_level,
                ordinal,
            }
        })
        .collect();

    debug!(nodes = nodes.len(), "hierarchy built");
    nodes
}

/// `clamp(base + depth, 1, 6)`.
pub fn title_level(base_level: u8, depth: usize) -> u8 {
    let level = (base_level as usize).saturating_add(depth);
    level.clamp(1, MAX_HEADING_LEVEL as usize) as u8
}

/// Shift inner headings so the shallowest sits one level below the title,
/// keeping relative nesting until levels clamp at 6.
fn shift_headings(blocks: &mut [Block], title_level: u8) {
    let Some(min_level) = blocks
        .iter()
        .filter_map(|b| match b {
            Block::Heading { level, .. } => Some(*level),
            _ => None,
        })
        .min()
    else {
        return;
    };

    let shift = i32::from(title_level) + 1 - i32::from(min_level);
    for block in blocks {
        if let Block::Heading { level, .. } = block {
            *level = (i32::from(*level) + shift).clamp(1, i32::from(MAX_HEADING_LEVEL)) as u8;
        }
    }
}

// ---------------------------------------------------------------------------
// File ordering
// ---------------------------------------------------------------------------

/// One path component as a sort key: index pages first, then
/// case-insensitive name, files before same-named directories, then exact name.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ComponentKey<'a> {
    rank: u8,
    folded: String,
    is_dir: bool,
    exact: &'a str,
}

fn component_keys(position: &HierarchyPosition) -> Vec<ComponentKey<'_>> {
    let dirs = position.ancestors.iter().map(|dir| ComponentKey {
        rank: 1,
        folded: dir.to_lowercase(),
        is_dir: true,
        exact: dir,
    });
    let name = &position.name;
    let file = ComponentKey {
        rank: if is_index_name(name) { 0 } else { 1 },
        folded: stem(name).to_lowercase(),
        is_dir: false,
        exact: name,
    };
    dirs.chain(std::iter::once(file)).collect()
}

fn compare_files(a: &HierarchyPosition, b: &HierarchyPosition) -> Ordering {
    component_keys(a)
        .cmp(&component_keys(b))
        .then(a.discovery_index.cmp(&b.discovery_index))
}

fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
