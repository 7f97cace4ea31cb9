//! Run manifest: the structured record of one consolidation run.
//!
//! Written as `<output>.manifest.json` next to the consolidated document.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::SourceId;

/// Phase or terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Discovering,
    Normalizing,
    Resolving,
    Ordering,
    Rendering,
    Done,
    PartiallyFailed,
    Failed,
}

impl RunState {
    /// Whether the run has stopped.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::PartiallyFailed | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Discovering => "discovering",
            Self::Normalizing => "normalizing",
            Self::Resolving => "resolving",
            Self::Ordering => "ordering",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::PartiallyFailed => "partially failed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome for one discovered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Succeeded,
    SucceededWithWarnings,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: SourceId,
    pub status: SourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Discovery,
    Normalization,
    UnresolvedReference,
    AssetCopy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Display form of the source (id, path, or URL).
    pub source: String,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub source: String,
    pub message: String,
}

/// Why a reference could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Empty, whitespace-only, control characters, or unparsable.
    Malformed,
    /// Resolves to a location outside the source root.
    OutsideRoot,
    /// The referenced local file does not exist.
    MissingFile,
    /// A document link whose target was not consolidated.
    UnknownDocument,
    /// A fragment that matches no heading.
    UnknownAnchor,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Malformed => "malformed target",
            Self::OutsideRoot => "target escapes the source root",
            Self::MissingFile => "referenced file does not exist",
            Self::UnknownDocument => "linked document is not part of the output",
            Self::UnknownAnchor => "no heading matches the fragment",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRecord {
    pub source: SourceId,
    pub target: String,
    pub reason: UnresolvedReason,
}

/// One asset copy performed (or attempted) by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub copied: bool,
}

// ---------------------------------------------------------------------------
// RunManifest
// ---------------------------------------------------------------------------

/// Structured summary of a consolidation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    pub discovered: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub sources: Vec<SourceRecord>,
    pub failures: Vec<FailureRecord>,
    pub warnings: Vec<WarningRecord>,
    pub unresolved: Vec<UnresolvedRecord>,
    pub assets: Vec<AssetRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Position of each source in `sources`.
    #[serde(skip)]
    source_index: HashMap<SourceId, usize>,
}

impl RunManifest {
    /// Start a new manifest in the `Discovering` state.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Discovering,
            discovered: 0,
            succeeded: 0,
            failed: 0,
            sources: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            unresolved: Vec::new(),
            assets: Vec::new(),
            output: None,
            source_index: HashMap::new(),
        }
    }

    pub fn record_failure(&mut self, source: impl ToString, kind: FailureKind, reason: impl Into<String>) {
        self.failures.push(FailureRecord {
            source: source.to_string(),
            kind,
            reason: reason.into(),
        });
    }

    pub fn record_warning(&mut self, source: impl ToString, message: impl Into<String>) {
        self.warnings.push(WarningRecord {
            source: source.to_string(),
            message: message.into(),
        });
    }

    /// Record a document that was excluded from the output.
    pub fn record_failed_source(&mut self, source: SourceId, reason: impl Into<String>) {
        self.record_failure(&source, FailureKind::Normalization, reason);
        self.set_source_status(&source, SourceStatus::Failed, None);
    }

    /// Set a source's status, inserting the record if it is new.
    pub fn set_source_status(&mut self, source: &SourceId, status: SourceStatus, title: Option<String>) {
        match self.source_mut(source) {
            Some(record) => {
                record.status = status;
                if title.is_some() {
                    record.title = title;
                }
            }
            None => {
                self.source_index.insert(source.clone(), self.sources.len());
                self.sources.push(SourceRecord {
                    source: source.clone(),
                    status,
                    title,
                });
            }
        }
    }

    /// Downgrade a succeeded source to `SucceededWithWarnings`.
    pub fn mark_warned(&mut self, source: &SourceId) {
        if let Some(record) = self.source_mut(source) {
            if record.status == SourceStatus::Succeeded {
                record.status = SourceStatus::SucceededWithWarnings;
            }
        }
    }

    /// Sort every record list by source so output is stable across runs.
    pub fn sort_records(&mut self) {
        self.sources.sort_by(|a, b| a.source.cmp(&b.source));
        self.failures.sort_by(|a, b| a.source.cmp(&b.source));
        self.warnings.sort_by(|a, b| a.source.cmp(&b.source));
        self.unresolved.sort_by(|a, b| a.source.cmp(&b.source));
        self.assets.sort_by(|a, b| a.destination.cmp(&b.destination));
        self.reindex_sources();
    }

    fn source_mut(&mut self, source: &SourceId) -> Option<&mut SourceRecord> {
        // A deserialized manifest starts without an index.
        if self.source_index.len() != self.sources.len() {
            self.reindex_sources();
        }
        let i = *self.source_index.get(source)?;
        self.sources.get_mut(i)
    }

    fn reindex_sources(&mut self) {
        self.source_index = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.source.clone(), i))
            .collect();
    }

    /// Recompute the succeeded/failed counters from the source list.
    pub fn tally(&mut self) {
        self.succeeded = self
            .sources
            .iter()
            .filter(|r| r.status != SourceStatus::Failed)
            .count();
        self.failed = self.sources.len() - self.succeeded;
    }

    /// Move to a terminal state and stamp the finish time.
    pub fn finish(&mut self, state: RunState) {
        self.tally();
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    /// Whether anything went wrong that keeps the run from being `Done`.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(p: &str) -> SourceId {
        SourceId::File(p.into())
    }

    #[test]
    fn tally_counts_warned_sources_as_succeeded() {
        let mut m = RunManifest::new();
        m.set_source_status(&file("a.md"), SourceStatus::Succeeded, Some("A".into()));
        m.set_source_status(&file("b.md"), SourceStatus::Succeeded, None);
        m.mark_warned(&file("b.md"));
        m.record_failed_source(file("c.md"), "invalid UTF-8");

        m.finish(RunState::PartiallyFailed);
        assert_eq!(m.succeeded, 2);
        assert_eq!(m.failed, 1);
        assert_eq!(m.sources[1].status, SourceStatus::SucceededWithWarnings);
        assert!(m.finished_at.is_some());
        assert!(m.has_failures());
    }

    #[test]
    fn status_updates_survive_sorting_and_reload() {
        let mut m = RunManifest::new();
        m.set_source_status(&file("z.md"), SourceStatus::Succeeded, Some("Z".into()));
        m.set_source_status(&file("a.md"), SourceStatus::Succeeded, None);
        m.sort_records();
        assert_eq!(m.sources[0].source, file("a.md"));

        m.mark_warned(&file("z.md"));
        m.set_source_status(&file("a.md"), SourceStatus::Failed, Some("A".into()));
        assert_eq!(m.sources.len(), 2);
        assert_eq!(m.sources[1].status, SourceStatus::SucceededWithWarnings);
        assert_eq!(m.sources[0].title.as_deref(), Some("A"));

        let mut reloaded: RunManifest = serde_json::from_value(serde_json::to_value(&m).unwrap()).unwrap();
        reloaded.mark_warned(&file("a.md"));
        reloaded.set_source_status(&file("z.md"), SourceStatus::Succeeded, None);
        assert_eq!(reloaded.sources.len(), 2);
        assert_eq!(reloaded.sources[1].status, SourceStatus::Succeeded);
    }

    #[test]
    fn manifest_serializes_snake_case_states() {
        let mut m = RunManifest::new();
        m.unresolved.push(UnresolvedRecord {
            source: file("guide/setup.md"),
            target: "../../escape.png".into(),
            reason: UnresolvedReason::OutsideRoot,
        });
        m.finish(RunState::PartiallyFailed);

        let json = serde_json::to_value(&m).expect("serialize");
        assert_eq!(json["state"], "partially_failed");
        assert_eq!(json["unresolved"][0]["reason"], "outside_root");
        assert_eq!(json["unresolved"][0]["source"]["value"], "guide/setup.md");
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Rendering.is_terminal());
    }
}
