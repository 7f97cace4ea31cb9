//! Resource reference rewriting for the merged output.
//!
//! [`PathResolver::resolve`] classifies every reference in a normalized
//! document. Assets are rewritten immediately to their flattened location and
//! registered as [`AssetCopy`] operations; cross-document and fragment links
//! are deferred until the final anchors are known and completed by
//! [`finalize_links`].

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

use docs2md_markdown::NormalizedDocument;
use docs2md_shared::{
    ConsolidateConfig, ReferenceKind, ResourceReference, SourceId, SourceRoot, UnresolvedReason,
    UnresolvedRecord,
};

use crate::toc::{AnchorIndex, slugify};

/// File extensions treated as documents when linked.
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "mdx", "markdown"];

/// Hex digits of the path hash kept in asset names.
const ASSET_HASH_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A file that must be copied into the assets area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCopy {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Where a deferred link points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Another document, tried in candidate order.
    Document {
        candidates: Vec<SourceId>,
        fragment: Option<String>,
        /// Target used when no candidate is part of the output.
        fallback: Option<String>,
    },
    /// A heading, looked up in the owning document first.
    Fragment(String),
}

/// A link awaiting final anchors. `ordinal` counts references in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    pub ordinal: usize,
    pub target: LinkTarget,
}

/// A normalized document whose references have been classified.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub document: NormalizedDocument,
    pub pending: Vec<PendingLink>,
    pub assets: Vec<AssetCopy>,
    pub unresolved: Vec<UnresolvedRecord>,
}

impl From<NormalizedDocument> for ResolvedDocument {
    /// A document with nothing left to resolve.
    fn from(document: NormalizedDocument) -> Self {
        Self {
            document,
            pending: Vec::new(),
            assets: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

enum Outcome {
    Keep,
    Rewrite(String),
    Asset { copy: AssetCopy, target: String },
    Defer(LinkTarget),
    Unresolved(UnresolvedReason),
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Rewrites references against the source root and the output layout.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: SourceRoot,
    assets_dir: String,
    output_dir: PathBuf,
    validate: bool,
}

impl PathResolver {
    pub fn new(root: SourceRoot, config: &ConsolidateConfig) -> Self {
        Self {
            root,
            assets_dir: config.assets_dir.trim_end_matches('/').to_string(),
            output_dir: config.output_dir().to_path_buf(),
            validate: config.validate_references,
        }
    }

    /// Classify and rewrite every reference in `document`.
    #[instrument(skip_all, fields(source = %document.source))]
    pub fn resolve(&self, mut document: NormalizedDocument) -> ResolvedDocument {
        let source = document.source.clone();
        let mut pending = Vec::new();
        let mut assets = Vec::new();
        let mut unresolved = Vec::new();
        let mut ordinal = 0;

        for block in &mut document.blocks {
            block.for_each_reference_mut(|reference| {
                match self.classify(&source, reference) {
                    Outcome::Keep => {}
                    Outcome::Rewrite(target) => reference.target = target,
                    Outcome::Asset { copy, target } => {
                        reference.target = target;
                        if !assets.contains(&copy) {
                            assets.push(copy);
                        }
                    }
                    Outcome::Defer(target) => pending.push(PendingLink { ordinal, target }),
                    Outcome::Unresolved(reason) => unresolved.push(UnresolvedRecord {
                        source: source.clone(),
                        target: reference.target.clone(),
                        reason,
                    }),
                }
                ordinal += 1;
            });
        }

        debug!(
            references = ordinal,
            assets = assets.len(),
            deferred = pending.len(),
            unresolved = unresolved.len(),
            "references classified"
        );

        ResolvedDocument {
            document,
            pending,
            assets,
            unresolved,
        }
    }

    fn classify(&self, source: &SourceId, reference: &ResourceReference) -> Outcome {
        let target = reference.target.trim();
        if target.is_empty() || target.chars().any(char::is_control) {
            return Outcome::Unresolved(UnresolvedReason::Malformed);
        }
        if let Some(fragment) = target.strip_prefix('#') {
            return match fragment {
                "" => Outcome::Keep,
                f => Outcome::Defer(LinkTarget::Fragment(f.to_string())),
            };
        }

        match source {
            SourceId::File(rel) => self.classify_file(rel, target, reference.kind),
            SourceId::Page(url) => classify_page(url, target, reference.kind),
        }
    }

    fn classify_file(&self, owner: &str, target: &str, kind: ReferenceKind) -> Outcome {
        if target.starts_with("//") || has_scheme(target) {
            return Outcome::Keep;
        }
        let Some(root) = self.root.local_root() else {
            return Outcome::Keep;
        };

        // Segments are relative to the local root; file ids to the walked prefix.
        let prefix = self.root.id_prefix();
        let (path, fragment) = split_target(target);
        let base: Vec<&str> = if path.starts_with('/') {
            Vec::new()
        } else {
            prefix.iter().copied().chain(owner_dir(owner)).collect()
        };
        let Some(segments) = join_lexically(&base, path) else {
            return Outcome::Unresolved(UnresolvedReason::OutsideRoot);
        };

        let trailing_slash = path.ends_with('/') || path.is_empty();
        if kind == ReferenceKind::Link && (trailing_slash || is_document_path(&segments)) {
            let candidates = match strip_prefix(&segments, &prefix) {
                Some(rel) => document_candidates(rel, trailing_slash),
                None => Vec::new(),
            };
            return Outcome::Defer(LinkTarget::Document {
                candidates,
                fragment,
                fallback: None,
            });
        }
        if segments.is_empty() || trailing_slash {
            return Outcome::Unresolved(UnresolvedReason::Malformed);
        }

        let source_path = segments.iter().fold(root.to_path_buf(), |p, s| p.join(s));
        if self.validate && !source_path.is_file() {
            return Outcome::Unresolved(UnresolvedReason::MissingFile);
        }

        let name = asset_name(&segments);
        Outcome::Asset {
            target: format!("{}/{name}", self.assets_dir),
            copy: AssetCopy {
                source: source_path,
                destination: self.output_dir.join(&self.assets_dir).join(&name),
            },
        }
    }
}

fn classify_page(page: &Url, target: &str, kind: ReferenceKind) -> Outcome {
    let Ok(joined) = page.join(target) else {
        return Outcome::Unresolved(UnresolvedReason::Malformed);
    };
    if !matches!(joined.scheme(), "http" | "https") {
        return Outcome::Keep;
    }

    let same_site = joined.host_str() == page.host_str()
        && joined.port_or_known_default() == page.port_or_known_default();
    if kind == ReferenceKind::Link && same_site {
        let fragment = joined.fragment().filter(|f| !f.is_empty()).map(String::from);
        let mut target_page = joined.clone();
        target_page.set_fragment(None);
        return Outcome::Defer(LinkTarget::Document {
            candidates: page_candidates(&target_page),
            fragment,
            fallback: Some(joined.to_string()),
        });
    }

    if has_scheme(target) {
        Outcome::Keep
    } else {
        Outcome::Rewrite(joined.to_string())
    }
}

// ---------------------------------------------------------------------------
// Link finalization
// ---------------------------------------------------------------------------

/// Rewrite deferred links to their final anchors. Returns the links that
/// matched nothing in the merged output; those keep their original target.
pub fn finalize_links(resolved: &mut ResolvedDocument, anchors: &AnchorIndex) -> Vec<UnresolvedRecord> {
    let source = resolved.document.source.clone();
    let mut pending = resolved.pending.iter().peekable();
    let mut unresolved = Vec::new();
    let mut ordinal = 0;

    for block in &mut resolved.document.blocks {
        block.for_each_reference_mut(|reference| {
            if let Some(link) = pending.next_if(|p| p.ordinal == ordinal) {
                match finalize_target(&source, &link.target, anchors) {
                    Ok(target) => reference.target = target,
                    Err(reason) => unresolved.push(UnresolvedRecord {
                        source: source.clone(),
                        target: reference.target.clone(),
                        reason,
                    }),
                }
            }
            ordinal += 1;
        });
    }
    unresolved
}

fn finalize_target(
    owner: &SourceId,
    target: &LinkTarget,
    anchors: &AnchorIndex,
) -> Result<String, UnresolvedReason> {
    match target {
        LinkTarget::Fragment(fragment) => {
            let slug = slugify(fragment);
            anchors
                .heading(owner, &slug)
                .or_else(|| anchors.global(&slug))
                .map(|a| format!("#{a}"))
                .ok_or(UnresolvedReason::UnknownAnchor)
        }
        LinkTarget::Document {
            candidates,
            fragment,
            fallback,
        } => {
            let found = candidates
                .iter()
                .find_map(|c| anchors.document(c).map(|a| (c, a)));
            match (found, fallback) {
                (Some((doc, anchor)), _) => {
                    let anchor = fragment
                        .as_deref()
                        .and_then(|f| anchors.heading(doc, &slugify(f)))
                        .unwrap_or(anchor);
                    Ok(format!("#{anchor}"))
                }
                (None, Some(fallback)) => Ok(fallback.clone()),
                (None, None) => Err(UnresolvedReason::UnknownDocument),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `scheme:` prefix, e.g. `https:`, `mailto:`, `data:`.
fn has_scheme(target: &str) -> bool {
    let Some(colon) = target.find(':') else {
        return false;
    };
    let scheme = &target[..colon];
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Split `path?query#fragment` into the path and a non-empty fragment.
fn split_target(target: &str) -> (&str, Option<String>) {
    let (rest, fragment) = match target.split_once('#') {
        Some((rest, f)) if !f.is_empty() => (rest, Some(f.to_string())),
        Some((rest, _)) => (rest, None),
        None => (target, None),
    };
    let path = rest.split_once('?').map_or(rest, |(p, _)| p);
    (path, fragment)
}

/// `segments` with the leading `prefix` removed, or `None` if it lies outside it.
fn strip_prefix<'a>(segments: &'a [String], prefix: &[&str]) -> Option<&'a [String]> {
    let matches = segments.len() >= prefix.len()
        && segments.iter().zip(prefix).all(|(s, p)| s == p);
    matches.then(|| &segments[prefix.len()..])
}

fn owner_dir(owner: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = owner.split('/').filter(|s| !s.is_empty()).collect();
    parts.pop();
    parts
}

/// Join `path` onto `base` resolving `.` and `..`. `None` if it climbs above the root.
fn join_lexically(base: &[&str], path: &str) -> Option<Vec<String>> {
    let mut segments: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other.to_string()),
        }
    }
    Some(segments)
}

fn extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,
        Some(dot) => Some(&name[dot + 1..]),
    }
}

fn is_document_path(segments: &[String]) -> bool {
    match segments.last() {
        None => true,
        Some(name) => match extension(name) {
            None => true,
            Some(ext) => DOCUMENT_EXTENSIONS.iter().any(|d| ext.eq_ignore_ascii_case(d)),
        },
    }
}

fn document_candidates(segments: &[String], directory: bool) -> Vec<SourceId> {
    let joined = segments.join("/");
    let prefixed = |name: &str| {
        if joined.is_empty() {
            name.to_string()
        } else {
            format!("{joined}/{name}")
        }
    };

    let paths: Vec<String> = if directory || segments.is_empty() {
        vec![prefixed("index.md"), prefixed("README.md"), prefixed("index.mdx")]
    } else {
        match extension(&joined) {
            Some(ext) => {
                let stem = &joined[..joined.len() - ext.len() - 1];
                let mut paths = vec![joined.clone()];
                for alt in ["md", "mdx"] {
                    let path = format!("{stem}.{alt}");
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
                paths
            }
            None => vec![
                format!("{joined}.md"),
                format!("{joined}.mdx"),
                prefixed("index.md"),
                prefixed("README.md"),
                prefixed("index.mdx"),
            ],
        }
    };
    paths.into_iter().map(SourceId::File).collect()
}

fn page_candidates(page: &Url) -> Vec<SourceId> {
    let mut candidates = vec![SourceId::Page(page.clone())];
    let path = page.path();
    let toggled = if path.len() > 1 && path.ends_with('/') {
        Some(path.trim_end_matches('/').to_string())
    } else if !path.ends_with('/') {
        Some(format!("{path}/"))
    } else {
        None
    };
    if let Some(toggled) = toggled {
        let mut alt = page.clone();
        alt.set_path(&toggled);
        candidates.push(SourceId::Page(alt));
    }
    candidates
}

/// `<dir segments joined by '-'>-<8 hex of sha256(rel path)>-<file name>`.
fn asset_name(segments: &[String]) -> String {
    let rel = segments.join("/");
    let digest = Sha256::digest(rel.as_bytes());
    let hash: String = format!("{digest:x}").chars().take(ASSET_HASH_LEN).collect();

    let (file, dirs) = match segments.split_last() {
        Some((file, dirs)) => (file.as_str(), dirs),
        None => ("", segments),
    };
    if dirs.is_empty() {
        format!("{hash}-{file}")
    } else {
        format!("{}-{hash}-{file}", dirs.join("-"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
