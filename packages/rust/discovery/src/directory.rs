//! Recursive walk of a local documentation directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use docs2md_shared::{Dialect, HierarchyPosition, SourceDocument, SourceId, SourceRoot, WalkConfig};

use crate::{DiscoveryError, DiscoverySource};

type EntryIter = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>;

/// Yields every matching file under a root directory, one read per pull.
pub struct DirectorySource {
    root: SourceRoot,
    walk_root: PathBuf,
    extensions: Vec<String>,
    entries: EntryIter,
    next_index: usize,
    finished: bool,
}

impl DirectorySource {
    /// Walk `path` with the given filters.
    pub fn new(path: impl Into<PathBuf>, config: WalkConfig) -> Self {
        let path = path.into();
        Self::with_root(SourceRoot::Directory { path: path.clone() }, path, config)
    }

    /// Walk `walk_root`, reporting `root` as the declared source root.
    pub(crate) fn with_root(root: SourceRoot, walk_root: PathBuf, config: WalkConfig) -> Self {
        let WalkConfig {
            extensions,
            ignore_dirs,
            include_hidden,
        } = config;
        let entries = WalkDir::new(&walk_root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| keep_entry(e, &ignore_dirs, include_hidden));
        Self {
            root,
            walk_root,
            extensions,
            entries: Box::new(entries),
            next_index: 0,
            finished: false,
        }
    }

    fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.extensions.contains(&e))
    }

    async fn read_document(&mut self, path: &Path) -> Result<SourceDocument, DiscoveryError> {
        let rel = path
            .strip_prefix(&self.walk_root)
            .map_err(|_| DiscoveryError::item(path.display().to_string(), "outside walk root"))?;
        let id = SourceId::file(rel);

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DiscoveryError::item(id.to_string(), format!("read failed: {e}")))?;

        let dialect = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Dialect::from_extension)
            .unwrap_or(Dialect::Markdown);

        let index = self.next_index;
        self.next_index += 1;

        let rel_str = id.to_string();
        Ok(SourceDocument {
            position: HierarchyPosition::for_file(&rel_str, index),
            id,
            bytes,
            encoding: None,
            dialect,
            metadata: BTreeMap::new(),
        })
    }
}

impl DiscoverySource for DirectorySource {
    fn root(&self) -> &SourceRoot {
        &self.root
    }

    async fn next_item(&mut self) -> Option<Result<SourceDocument, DiscoveryError>> {
        if self.finished {
            return None;
        }

        loop {
            let entry = match self.entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    let location = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| self.walk_root.display().to_string());
                    // The root itself being unreadable ends the walk.
                    if e.depth() == 0 {
                        self.finished = true;
                        return Some(Err(DiscoveryError::fatal(location, e.to_string())));
                    }
                    warn!(path = %location, error = %e, "skipping unreadable entry");
                    return Some(Err(DiscoveryError::item(location, e.to_string())));
                }
                None => {
                    self.finished = true;
                    debug!(documents = self.next_index, "directory walk complete");
                    return None;
                }
            };

            if entry.depth() == 0 && !entry.file_type().is_dir() {
                self.finished = true;
                return Some(Err(DiscoveryError::fatal(
                    self.walk_root.display().to_string(),
                    "not a directory",
                )));
            }

            if !entry.file_type().is_file() || !self.is_document(entry.path()) {
                continue;
            }

            let path = entry.into_path();
            return Some(self.read_document(&path).await);
        }
    }
}

fn keep_entry(entry: &DirEntry, ignore_dirs: &[String], include_hidden: bool) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if !include_hidden && name.starts_with('.') {
        return false;
    }
    !(entry.file_type().is_dir() && ignore_dirs.iter().any(|d| d == name.as_ref()))
}
