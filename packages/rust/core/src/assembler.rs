//! Final document assembly and output.
//!
//! Builds the [`ConsolidatedDocument`] from the ToC and ordered nodes, writes
//! it through an [`OutputSink`], copies assets, and persists the run manifest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use docs2md_markdown::render_blocks;
use docs2md_shared::{Block, Docs2MdError, Result, RunManifest, SourceId, TocEntry};

use crate::hierarchy::HierarchyNode;
use crate::resolver::AssetCopy;
use crate::toc::TableOfContents;

// ---------------------------------------------------------------------------
// Consolidated document
// ---------------------------------------------------------------------------

/// The merged output: ToC blocks followed by every document in ordinal order.
#[derive(Debug, Clone)]
pub struct ConsolidatedDocument {
    pub blocks: Vec<Block>,
    pub toc: Vec<TocEntry>,
    pub document_count: usize,
}

impl ConsolidatedDocument {
    /// Concatenate the ToC and each node's title and blocks.
    #[instrument(skip_all, fields(nodes = nodes.len()))]
    pub fn assemble(toc: TableOfContents, nodes: Vec<HierarchyNode>, source_attribution: bool) -> Self {
        let document_count = nodes.len();
        let mut blocks = toc.blocks;

        for node in nodes {
            blocks.push(Block::Heading {
                level: node.title_level,
                text: node.resolved.document.title.clone(),
            });
            if source_attribution {
                blocks.push(attribution(&node.resolved.document.source));
            }
            blocks.extend(node.resolved.document.blocks);
        }

        debug!(blocks = blocks.len(), "document assembled");
        Self {
            blocks,
            toc: toc.entries,
            document_count,
        }
    }

    /// Serialize to Markdown.
    pub fn render(&self) -> String {
        render_blocks(&self.blocks)
    }
}

fn attribution(source: &SourceId) -> Block {
    match source {
        SourceId::Page(url) => Block::text(format!("Source: <{url}>")),
        SourceId::File(path) => Block::text(format!("Source: `{path}`")),
    }
}

// ---------------------------------------------------------------------------
// Output sinks
// ---------------------------------------------------------------------------

/// Destination for the rendered output. `write` may be called repeatedly;
/// nothing is visible at `location` until `finish` succeeds.
pub trait OutputSink: Send {
    fn write(&mut self, chunk: &str) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
    fn location(&self) -> Option<PathBuf>;
}

/// Writes to a temp file next to the target and renames it into place.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    temp: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output.md".to_string());
        let temp = path.with_file_name(format!(".{file_name}.tmp"));
        Self {
            path,
            temp,
            writer: None,
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.temp.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| Docs2MdError::io(parent, e))?;
            }
            let file = File::create(&self.temp).map_err(|e| Docs2MdError::io(&self.temp, e))?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| Docs2MdError::Render("output writer unavailable".into()))
    }
}

impl OutputSink for FileSink {
    fn write(&mut self, chunk: &str) -> Result<()> {
        let temp = self.temp.clone();
        self.writer()?
            .write_all(chunk.as_bytes())
            .map_err(|e| Docs2MdError::io(temp, e))
    }

    fn finish(&mut self) -> Result<()> {
        self.writer()?;
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().map_err(|e| Docs2MdError::io(&self.temp, e))?;
        drop(writer);

        if let Err(e) = std::fs::rename(&self.temp, &self.path) {
            let _ = std::fs::remove_file(&self.temp);
            return Err(Docs2MdError::io(&self.path, e));
        }
        info!(path = %self.path.display(), "output written");
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        // Unfinished output never replaces the target.
        if self.writer.take().is_some() {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Collects output in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    contents: String,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, chunk: &str) -> Result<()> {
        self.contents.push_str(chunk);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn location(&self) -> Option<PathBuf> {
        None
    }
}

// ---------------------------------------------------------------------------
// Assets and manifest
// ---------------------------------------------------------------------------

/// Copy one asset, creating the destination directory.
pub async fn copy_asset(copy: &AssetCopy) -> Result<()> {
    if let Some(parent) = copy.destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Docs2MdError::io(parent, e))?;
    }
    tokio::fs::copy(&copy.source, &copy.destination)
        .await
        .map_err(|e| Docs2MdError::io(&copy.source, e))?;
    debug!(
        source = %copy.source.display(),
        destination = %copy.destination.display(),
        "asset copied"
    );
    Ok(())
}

/// Write the manifest as pretty JSON (temp file, then rename).
pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)
        .map_err(|e| Docs2MdError::validation(format!("JSON serialization failed: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Docs2MdError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest.json".to_string());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| Docs2MdError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| Docs2MdError::io(path, e))?;

    debug!(path = %path.display(), "wrote manifest");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
