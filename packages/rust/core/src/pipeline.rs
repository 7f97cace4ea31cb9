//! Consolidation engine: discovery → normalize/resolve → order → render.
//!
//! Per-document work runs on a bounded blocking pool. Everything that
//! accumulates (manifest, resolved set, asset copies) is owned by the engine
//! loop; workers hand back values.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use docs2md_discovery::DiscoverySource;
use docs2md_markdown::normalize;
use docs2md_shared::{
    AssetRecord, ConsolidateConfig, Docs2MdError, FailureKind, Result, RunManifest, RunState,
    SourceDocument, SourceId, SourceStatus, UnresolvedRecord,
};

use crate::assembler::{ConsolidatedDocument, OutputSink, copy_asset, write_manifest};
use crate::hierarchy::build_hierarchy;
use crate::resolver::{AssetCopy, PathResolver, ResolvedDocument, finalize_links};
use crate::toc::{TocOptions, build_toc};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, state: RunState);
    /// Called for each document pulled from the source.
    fn document_discovered(&self, source: &SourceId, discovered: usize);
    /// Called when a document has been normalized and resolved.
    fn document_normalized(&self, source: &SourceId, done: usize, discovered: usize);
    /// Called when a document or discovery item is dropped.
    fn document_failed(&self, source: &str, reason: &str);
    /// Called once the run reaches a terminal state.
    fn done(&self, manifest: &RunManifest);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: RunState) {}
    fn document_discovered(&self, _source: &SourceId, _discovered: usize) {}
    fn document_normalized(&self, _source: &SourceId, _done: usize, _discovered: usize) {}
    fn document_failed(&self, _source: &str, _reason: &str) {}
    fn done(&self, _manifest: &RunManifest) {}
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs one consolidation per call to [`ConsolidationEngine::run`].
#[derive(Debug, Clone)]
pub struct ConsolidationEngine {
    config: ConsolidateConfig,
    cancel: CancellationToken,
}

/// Result of one worker task.
enum WorkOutcome {
    Resolved(ResolvedDocument),
    Failed { source: SourceId, reason: String },
}

type AssetOutcome = (SourceId, AssetCopy, Result<()>);

/// Mutable state of a single run.
struct RunContext<'a> {
    config: &'a ConsolidateConfig,
    progress: &'a dyn ProgressReporter,
    manifest: RunManifest,
    resolved: Vec<ResolvedDocument>,
    /// Source of each spawned worker, for reporting panics.
    task_sources: HashMap<Id, SourceId>,
    assets: JoinSet<AssetOutcome>,
    asset_destinations: HashSet<PathBuf>,
    normalized: usize,
}

impl ConsolidationEngine {
    /// Create an engine; rejects an invalid config.
    pub fn new(config: ConsolidateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this engine.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ConsolidateConfig {
        &self.config
    }

    /// Consolidate everything `source` yields into `sink`.
    ///
    /// Returns the manifest for `Done`, `PartiallyFailed` and `Failed` runs.
    /// Total discovery failure, sink failure and cancellation are errors.
    #[instrument(skip_all, fields(output = %self.config.output.display(), concurrency = self.config.concurrency))]
    pub async fn run<S: DiscoverySource>(
        &self,
        mut source: S,
        sink: &mut dyn OutputSink,
        progress: &dyn ProgressReporter,
    ) -> Result<RunManifest> {
        let mut ctx = RunContext {
            config: &self.config,
            progress,
            manifest: RunManifest::new(),
            resolved: Vec::new(),
            task_sources: HashMap::new(),
            assets: JoinSet::new(),
            asset_destinations: HashSet::new(),
            normalized: 0,
        };
        info!(run_id = %ctx.manifest.run_id, "starting consolidation");

        // --- Phase 1: Discovery, with workers running alongside ---
        ctx.enter(RunState::Discovering);
        let resolver = Arc::new(PathResolver::new(source.root().clone(), &self.config));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut workers: JoinSet<WorkOutcome> = JoinSet::new();

        loop {
            while let Some(joined) = workers.try_join_next_with_id() {
                ctx.harvest(joined);
            }

            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ctx.abort(&mut workers)),
                item = source.next_item() => item,
            };

            match item {
                None => break,
                Some(Ok(doc)) => {
                    ctx.manifest.discovered += 1;
                    progress.document_discovered(&doc.id, ctx.manifest.discovered);

                    let permit = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(ctx.abort(&mut workers)),
                        permit = Arc::clone(&semaphore).acquire_owned() => {
                            permit.map_err(|_| Docs2MdError::Cancelled)?
                        }
                    };
                    let resolver = Arc::clone(&resolver);
                    let id = doc.id.clone();
                    let handle = workers.spawn_blocking(move || {
                        let _permit = permit;
                        process_document(doc, &resolver)
                    });
                    ctx.task_sources.insert(handle.id(), id);
                }
                Some(Err(err)) if err.retryable => {
                    warn!(item = %err.item, error = %err.message, "discovery item skipped");
                    progress.document_failed(&err.item, &err.message);
                    ctx.manifest
                        .record_failure(&err.item, FailureKind::Discovery, err.message);
                }
                Some(Err(err)) => {
                    if ctx.manifest.discovered == 0 {
                        workers.abort_all();
                        return Err(Docs2MdError::Discovery(err.to_string()));
                    }
                    warn!(item = %err.item, error = %err.message, "discovery ended early");
                    progress.document_failed(&err.item, &err.message);
                    ctx.manifest
                        .record_failure(&err.item, FailureKind::Discovery, err.message);
                    break;
                }
            }
        }
        info!(discovered = ctx.manifest.discovered, "discovery complete");

        // --- Phase 2: Drain the worker pool ---
        ctx.enter(RunState::Normalizing);
        while !workers.is_empty() {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                joined = workers.join_next_with_id() => Some(joined),
            };
            match joined {
                Some(Some(joined)) => ctx.harvest(joined),
                Some(None) => break,
                None => return Err(ctx.abort(&mut workers)),
            }
        }
        debug_assert!(ctx.task_sources.is_empty(), "every worker harvested");

        // --- Phase 3: Asset copies complete before anything is reported ---
        ctx.enter(RunState::Resolving);
        while !ctx.assets.is_empty() {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                joined = ctx.assets.join_next() => Some(joined),
            };
            match joined {
                Some(Some(Ok(outcome))) => ctx.record_asset(outcome),
                Some(Some(Err(e))) => warn!(error = %e, "asset copy task failed"),
                Some(None) => break,
                None => return Err(ctx.abort(&mut workers)),
            }
        }

        if self.cancel.is_cancelled() {
            return Err(ctx.abort(&mut workers));
        }

        if ctx.resolved.is_empty() {
            warn!(
                discovered = ctx.manifest.discovered,
                "no document could be consolidated"
            );
            return ctx.complete(RunState::Failed);
        }

        // --- Phase 4: Ordering, ToC, link finalization ---
        ctx.enter(RunState::Ordering);
        let mut nodes =
            build_hierarchy(std::mem::take(&mut ctx.resolved), self.config.base_heading_level);
        let toc = build_toc(&nodes, &TocOptions::from(&self.config));

        for node in &mut nodes {
            let unresolved = finalize_links(&mut node.resolved, &toc.anchors);
            for record in unresolved {
                ctx.record_unresolved(record);
            }
        }
        if self.cancel.is_cancelled() {
            return Err(Docs2MdError::Cancelled);
        }

        // --- Phase 5: Rendering ---
        ctx.enter(RunState::Rendering);
        let output =
            ConsolidatedDocument::assemble(toc, nodes, self.config.source_attribution);
        let markdown = output.render();
        sink.write(&markdown)
            .and_then(|()| sink.finish())
            .map_err(|e| Docs2MdError::Render(e.to_string()))?;
        ctx.manifest.output = sink.location();

        info!(
            documents = output.document_count,
            toc_entries = output.toc.len(),
            bytes = markdown.len(),
            "output rendered"
        );

        let state = if ctx.manifest.has_failures() {
            RunState::PartiallyFailed
        } else {
            RunState::Done
        };
        ctx.complete(state)
    }
}

/// Normalize and resolve one document. Runs on the blocking pool.
fn process_document(doc: SourceDocument, resolver: &PathResolver) -> WorkOutcome {
    let source = doc.id.clone();
    match normalize(doc) {
        Ok(normalized) => WorkOutcome::Resolved(resolver.resolve(normalized)),
        Err(e) => WorkOutcome::Failed {
            source,
            reason: e.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Run context
// ---------------------------------------------------------------------------

impl RunContext<'_> {
    fn enter(&mut self, state: RunState) {
        debug!(%state, "entering phase");
        self.manifest.state = state;
        self.progress.phase(state);
    }

    /// Fold one finished worker into the run and start its asset copies.
    fn harvest(&mut self, joined: std::result::Result<(Id, WorkOutcome), JoinError>) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(e) => e.id(),
        };
        let spawned_for = self.task_sources.remove(&id);

        match joined {
            Ok((_, WorkOutcome::Resolved(resolved))) => self.accept(resolved),
            Ok((_, WorkOutcome::Failed { source, reason })) => self.reject(source, reason),
            Err(e) => match spawned_for {
                Some(source) => self.reject(source, format!("worker failed: {e}")),
                None => warn!(error = %e, "worker failed"),
            },
        }
    }

    fn accept(&mut self, mut resolved: ResolvedDocument) {
        let source = resolved.document.source.clone();
        self.manifest.set_source_status(
            &source,
            SourceStatus::Succeeded,
            Some(resolved.document.title.clone()),
        );

        if !resolved.document.warnings.is_empty() {
            for warning in &resolved.document.warnings {
                self.manifest.record_warning(&source, warning.to_string());
            }
            self.manifest.mark_warned(&source);
        }

        for record in std::mem::take(&mut resolved.unresolved) {
            self.record_unresolved(record);
        }

        for copy in std::mem::take(&mut resolved.assets) {
            if !self.asset_destinations.insert(copy.destination.clone()) {
                continue;
            }
            let owner = source.clone();
            self.assets.spawn(async move {
                let result = copy_asset(&copy).await;
                (owner, copy, result)
            });
        }

        self.normalized += 1;
        self.progress
            .document_normalized(&source, self.normalized, self.manifest.discovered);
        debug!(%source, title = %resolved.document.title, "document resolved");
        self.resolved.push(resolved);
    }

    fn reject(&mut self, source: SourceId, reason: String) {
        warn!(%source, %reason, "document excluded");
        self.progress.document_failed(&source.to_string(), &reason);
        self.manifest.record_failed_source(source, reason);
    }

    fn record_unresolved(&mut self, record: UnresolvedRecord) {
        debug!(source = %record.source, target = %record.target, reason = %record.reason, "unresolved reference");
        self.manifest.mark_warned(&record.source);
        if self.config.validate_references {
            self.manifest.record_failure(
                &record.source,
                FailureKind::UnresolvedReference,
                format!("{}: {}", record.target, record.reason),
            );
        }
        self.manifest.unresolved.push(record);
    }

    fn record_asset(&mut self, (owner, copy, result): AssetOutcome) {
        let copied = match result {
            Ok(()) => true,
            Err(e) => {
                warn!(source = %owner, error = %e, "asset copy failed");
                let message = format!("asset {} not copied: {e}", copy.source.display());
                if self.config.validate_references {
                    self.manifest
                        .record_failure(&owner, FailureKind::AssetCopy, message.clone());
                }
                self.manifest.record_warning(&owner, message);
                self.manifest.mark_warned(&owner);
                false
            }
        };
        self.manifest.assets.push(AssetRecord {
            source: copy.source,
            destination: copy.destination,
            copied,
        });
    }

    /// Stop all in-flight work. Nothing from aborted tasks is merged.
    fn abort(&mut self, workers: &mut JoinSet<WorkOutcome>) -> Docs2MdError {
        info!(
            in_flight = workers.len(),
            assets = self.assets.len(),
            "run cancelled"
        );
        workers.abort_all();
        self.assets.abort_all();
        Docs2MdError::Cancelled
    }

    /// Sort records, enter the terminal state and persist the manifest.
    fn complete(mut self, state: RunState) -> Result<RunManifest> {
        let manifest = &mut self.manifest;
        manifest.sort_records();
        manifest.finish(state);

        if self.config.write_manifest {
            write_manifest(&self.config.manifest_path(), manifest)?;
        }

        info!(
            state = %manifest.state,
            succeeded = manifest.succeeded,
            failed = manifest.failed,
            unresolved = manifest.unresolved.len(),
            "consolidation finished"
        );
        self.progress.done(manifest);
        Ok(self.manifest)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
