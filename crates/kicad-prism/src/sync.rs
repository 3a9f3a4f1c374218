//! Forced synchronization of project working trees with their remotes.

use std::sync::Arc;

use serde::Serialize;

use crate::config::GitSettings;
use crate::error::{PrismError, Result};
use crate::git::{GitRepository, SyncOutcome};
use crate::locks::KeyedLocks;
use crate::registry::{Project, ProjectRegistry};

/// Result of syncing one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub project_id: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// Fetch and hard reset, serialized per project.
///
/// Destructive: uncommitted changes to tracked files are discarded.
/// Different projects sync in parallel.
pub struct SyncService {
    registry: Arc<dyn ProjectRegistry>,
    git: GitSettings,
    locks: Arc<KeyedLocks>,
}

impl SyncService {
    pub fn new(
        registry: Arc<dyn ProjectRegistry>,
        git: GitSettings,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            registry,
            git,
            locks,
        }
    }

    /// Syncs the project, waiting for an in-flight sync of it to finish first.
    pub fn sync(&self, project_id: &str) -> Result<SyncReport> {
        let project = self.registry.lookup(project_id)?;
        let key = lock_key(&project);
        self.locks.with_lock(&key, || self.run(&project))
    }

    /// Syncs the project unless a sync of it is already running, in which
    /// case a conflict is returned immediately.
    pub fn try_sync(&self, project_id: &str) -> Result<SyncReport> {
        let project = self.registry.lookup(project_id)?;
        let key = lock_key(&project);
        self.locks
            .try_with_lock(&key, || self.run(&project))
            .unwrap_or_else(|| {
                Err(PrismError::conflict(format!(
                    "a sync of '{}' is already in progress",
                    project.id
                )))
            })
    }

    fn run(&self, project: &Project) -> Result<SyncReport> {
        let _span = tracing::info_span!("sync", project_id = %project.id).entered();

        let repo = GitRepository::new(&project.path, self.git.clone());
        let outcome = repo.fetch_and_hard_reset()?;

        if !outcome.discarded_changes.is_empty() {
            tracing::warn!(
                files = outcome.discarded_changes.len(),
                "Discarded uncommitted changes"
            );
        }
        if outcome.up_to_date {
            tracing::info!(revision = %outcome.revision, "Already up to date");
        } else {
            tracing::info!(
                revision = %outcome.revision,
                files_changed = outcome.files_changed.len(),
                "Synchronized"
            );
        }

        Ok(SyncReport {
            project_id: project.id.clone(),
            outcome,
        })
    }
}

/// Shared with the comment store, so a reset never interleaves with a
/// comment write in the same tree.
pub(crate) fn lock_key(project: &Project) -> String {
    project.path.to_string_lossy().to_string()
}
