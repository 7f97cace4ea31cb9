//! Shared types, error model, and configuration for docs2md.
//!
//! This crate is the foundation depended on by all other docs2md crates.
//! It provides:
//! - [`Docs2MdError`], the unified error type
//! - The document model ([`SourceDocument`], [`Block`], [`ResourceReference`], [`TocEntry`])
//! - The run manifest ([`RunManifest`] and its records)
//! - Configuration ([`AppConfig`], [`ConsolidateConfig`], [`CrawlConfig`], [`WalkConfig`])

pub mod config;
pub mod error;
pub mod manifest;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConsolidateConfig, CrawlConfig, CrawlPoliciesConfig, DefaultsConfig,
    DirectoryConfig, RenderConfig, WalkConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{Docs2MdError, Result};
pub use manifest::{
    AssetRecord, FailureKind, FailureRecord, RunManifest, RunState, SourceRecord, SourceStatus,
    UnresolvedReason, UnresolvedRecord, WarningRecord,
};
pub use types::{
    Block, Dialect, HierarchyPosition, Inline, ReferenceKind, ReferenceStyle, ResourceReference,
    SourceDocument, SourceId, SourceRoot, TocEntry, MAX_HEADING_LEVEL,
};
