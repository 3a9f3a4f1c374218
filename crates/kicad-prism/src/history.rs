//! Read-only git views of a project: commits, releases and files at a revision.

use std::sync::Arc;

use crate::config::GitSettings;
use crate::error::Result;
use crate::git::{CommitInfo, GitRepository, ReleaseInfo};
use crate::registry::ProjectRegistry;

pub struct ProjectHistory {
    registry: Arc<dyn ProjectRegistry>,
    git: GitSettings,
}

impl ProjectHistory {
    pub fn new(registry: Arc<dyn ProjectRegistry>, git: GitSettings) -> Self {
        Self { registry, git }
    }

    fn repository(&self, project_id: &str) -> Result<GitRepository> {
        let project = self.registry.lookup(project_id)?;
        Ok(GitRepository::new(project.path, self.git.clone()))
    }

    /// Most recent commits, newest first.
    pub fn commits(&self, project_id: &str, limit: usize) -> Result<Vec<CommitInfo>> {
        Ok(self.repository(project_id)?.list_commits(limit)?)
    }

    /// Tags, newest first.
    pub fn releases(&self, project_id: &str) -> Result<Vec<ReleaseInfo>> {
        Ok(self.repository(project_id)?.list_releases()?)
    }

    /// Contents of `path` as of `revision`.
    pub fn file_at(&self, project_id: &str, revision: &str, path: &str) -> Result<String> {
        Ok(self.repository(project_id)?.read_file_at(revision, path)?)
    }
}
