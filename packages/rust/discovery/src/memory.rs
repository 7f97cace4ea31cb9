//! In-memory discovery source.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use url::Url;

use docs2md_shared::{Dialect, HierarchyPosition, SourceDocument, SourceId, SourceRoot};

use crate::{DiscoveryError, DiscoverySource};

/// Yields a fixed list of documents and errors in insertion order.
pub struct MemorySource {
    root: SourceRoot,
    items: VecDeque<Result<SourceDocument, DiscoveryError>>,
    next_index: usize,
}

impl MemorySource {
    pub fn new(root: SourceRoot) -> Self {
        Self {
            root,
            items: VecDeque::new(),
            next_index: 0,
        }
    }

    /// A source rooted at a (possibly nonexistent) directory.
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(SourceRoot::Directory { path: path.into() })
    }

    /// A source rooted at a site.
    pub fn site(start_url: Url) -> Self {
        Self::new(SourceRoot::Site { start_url })
    }

    /// Add a file; the dialect follows the extension.
    pub fn with_file(mut self, rel_path: &str, content: impl Into<Vec<u8>>) -> Self {
        let id = SourceId::file(Path::new(rel_path));
        let dialect = Path::new(rel_path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Dialect::from_extension)
            .unwrap_or(Dialect::Markdown);
        let position = HierarchyPosition::for_file(&id.to_string(), self.take_index());
        self.items.push_back(Ok(SourceDocument {
            id,
            bytes: content.into(),
            encoding: None,
            dialect,
            metadata: BTreeMap::new(),
            position,
        }));
        self
    }

    /// Add an HTML page found `depth` links from the start URL.
    pub fn with_page(mut self, url: Url, depth: u32, html: impl Into<Vec<u8>>) -> Self {
        let position = HierarchyPosition::for_page(&url, depth, self.take_index());
        self.items.push_back(Ok(SourceDocument {
            id: SourceId::Page(url),
            bytes: html.into(),
            encoding: Some("utf-8".into()),
            dialect: Dialect::Html,
            metadata: BTreeMap::new(),
            position,
        }));
        self
    }

    /// Add a prepared document as-is.
    pub fn with_document(mut self, doc: SourceDocument) -> Self {
        self.next_index += 1;
        self.items.push_back(Ok(doc));
        self
    }

    /// Add a discovery error.
    pub fn with_error(mut self, err: DiscoveryError) -> Self {
        self.items.push_back(Err(err));
        self
    }

    fn take_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

impl DiscoverySource for MemorySource {
    fn root(&self) -> &SourceRoot {
        &self.root
    }

    async fn next_item(&mut self) -> Option<Result<SourceDocument, DiscoveryError>> {
        self.items.pop_front()
    }
}
