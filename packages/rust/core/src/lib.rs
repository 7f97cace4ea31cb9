//! Consolidation engine and domain logic for docs2md.
//!
//! This crate ties together discovery, normalization, path resolution,
//! ordering and rendering into one run ([`ConsolidationEngine::run`]).

pub mod assembler;
pub mod hierarchy;
pub mod pipeline;
pub mod resolver;
pub mod toc;

pub use assembler::{ConsolidatedDocument, FileSink, MemorySink, OutputSink};
pub use hierarchy::{HierarchyNode, build_hierarchy};
pub use pipeline::{ConsolidationEngine, ProgressReporter, SilentProgress};
pub use resolver::{PathResolver, ResolvedDocument};
pub use toc::{AnchorIndex, TableOfContents, TocOptions, build_toc, slugify};
