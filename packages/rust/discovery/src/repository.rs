//! Repository sources: a local checkout, or a shallow clone of a remote.
//!
//! Cloning shells out to `git clone --depth 1` into a temporary directory
//! that lives as long as the source does.

use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tokio::process::Command;
use tracing::{info, instrument};

use docs2md_shared::{Docs2MdError, Result, SourceDocument, SourceRoot, WalkConfig};

use crate::{DirectorySource, DiscoveryError, DiscoverySource};

/// Documentation inside a repository, optionally limited to one subdirectory.
pub struct RepositorySource {
    walker: DirectorySource,
    // Keeps a cloned checkout on disk until the source is dropped.
    _checkout: Option<TempDir>,
}

impl RepositorySource {
    /// Use an existing checkout on disk.
    pub fn local(checkout: &Path, subdir: Option<&str>, config: WalkConfig) -> Result<Self> {
        let (walk_root, subdir) = select_subdir(checkout, subdir)?;
        let root = SourceRoot::Repository {
            checkout: checkout.to_path_buf(),
            subdir,
            remote: None,
        };
        Ok(Self {
            walker: DirectorySource::with_root(root, walk_root, config),
            _checkout: None,
        })
    }

    /// Shallow-clone `remote` into a temporary directory and walk it.
    #[instrument(skip_all, fields(remote = %remote))]
    pub async fn clone_remote(
        remote: &str,
        branch: Option<&str>,
        subdir: Option<&str>,
        config: WalkConfig,
    ) -> Result<Self> {
        validate_remote(remote)?;
        if let Some(b) = branch {
            validate_remote(b)?;
        }

        let temp = tempfile::Builder::new()
            .prefix("docs2md-repo-")
            .tempdir()
            .map_err(|e| Docs2MdError::io(std::env::temp_dir(), e))?;
        let target = temp.path().join("checkout");

        let mut cmd = Command::new("git");
        cmd.arg("clone").arg("--depth").arg("1");
        if let Some(b) = branch {
            cmd.arg("--branch").arg(b);
        }
        cmd.arg(remote).arg(&target);

        info!(target = %target.display(), "cloning repository");
        let output = cmd
            .output()
            .await
            .map_err(|e| Docs2MdError::Discovery(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Docs2MdError::Discovery(format!(
                "git clone {remote} failed: {}",
                stderr.trim()
            )));
        }

        let (walk_root, subdir) = select_subdir(&target, subdir)?;
        let root = SourceRoot::Repository {
            checkout: target,
            subdir,
            remote: Some(remote.to_string()),
        };
        Ok(Self {
            walker: DirectorySource::with_root(root, walk_root, config),
            _checkout: Some(temp),
        })
    }
}

impl DiscoverySource for RepositorySource {
    fn root(&self) -> &SourceRoot {
        self.walker.root()
    }

    async fn next_item(&mut self) -> Option<std::result::Result<SourceDocument, DiscoveryError>> {
        self.walker.next_item().await
    }
}

/// Join a user-supplied subdirectory onto the checkout, refusing escapes.
/// Returns the directory to walk and the subdirectory as `/`-separated segments.
fn select_subdir(checkout: &Path, subdir: Option<&str>) -> Result<(PathBuf, Option<String>)> {
    let Some(subdir) = subdir.map(|s| s.trim_matches('/')).filter(|s| !s.is_empty()) else {
        return Ok((checkout.to_path_buf(), None));
    };

    let rel = Path::new(subdir);
    if rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(Docs2MdError::validation(format!(
            "subdirectory must stay inside the repository: {subdir}"
        )));
    }

    let path = checkout.join(rel);
    if !path.is_dir() {
        return Err(Docs2MdError::Discovery(format!(
            "subdirectory {subdir} not found in repository"
        )));
    }
    let segments: Vec<&str> = subdir
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let normalized = (!segments.is_empty()).then(|| segments.join("/"));
    Ok((path, normalized))
}

/// Reject values git would parse as options.
fn validate_remote(value: &str) -> Result<()> {
    if value.trim().is_empty() || value.starts_with('-') {
        return Err(Docs2MdError::validation(format!(
            "invalid repository argument: {value:?}"
        )));
    }
    Ok(())
}
