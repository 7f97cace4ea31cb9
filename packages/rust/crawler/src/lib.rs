//! Web crawl discovery for docs2md.
//!
//! [`CrawlFrontier`] walks a documentation site breadth-first from a start
//! URL and yields each in-scope page as an HTML [`SourceDocument`] through
//! the [`DiscoverySource`] trait, so the consolidation engine treats a crawl
//! exactly like a directory walk.
//!
//! [`SourceDocument`]: docs2md_shared::SourceDocument
//! [`DiscoverySource`]: docs2md_discovery::DiscoverySource

pub mod engine;

pub use engine::CrawlFrontier;
