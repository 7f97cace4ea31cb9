//! Source discovery for docs2md.
//!
//! A [`DiscoverySource`] yields [`SourceDocument`]s one at a time. The
//! consolidation engine pulls from it until it is exhausted, so sources stay
//! lazy: a directory walk reads one file per pull, a crawl fetches on demand.
//!
//! Implementations in this crate:
//! - [`DirectorySource`]: recursive walk of a local documentation directory
//! - [`RepositorySource`]: a local checkout or a shallow `git clone`
//! - [`MemorySource`]: fixed in-memory documents, for tests and embedding
//!
//! The HTTP crawl frontier lives in `docs2md-crawler`.

mod directory;
mod memory;
mod repository;

use std::future::Future;

use docs2md_shared::{SourceDocument, SourceRoot};

pub use directory::DirectorySource;
pub use memory::MemorySource;
pub use repository::RepositorySource;

// ---------------------------------------------------------------------------
// DiscoverySource
// ---------------------------------------------------------------------------

/// A per-item discovery problem.
///
/// Retryable errors affect one item only; the engine records them and keeps
/// pulling. A non-retryable error ends discovery.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{item}: {message}")]
pub struct DiscoveryError {
    /// Display form of the offending item (path, URL, or root).
    pub item: String,
    pub message: String,
    pub retryable: bool,
}

impl DiscoveryError {
    /// An error confined to one item.
    pub fn item(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// An error that ends discovery.
    pub fn fatal(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

/// Pull-based producer of source documents.
pub trait DiscoverySource: Send {
    /// The root that root-relative references resolve against.
    fn root(&self) -> &SourceRoot;

    /// Produce the next document, an item error, or `None` when exhausted.
    fn next_item(
        &mut self,
    ) -> impl Future<Output = Option<Result<SourceDocument, DiscoveryError>>> + Send;
}
