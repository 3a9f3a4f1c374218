//! Pure data types for git operations.

use serde::{Deserialize, Serialize};

/// Result of a fetch followed by a hard reset to the tracking branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// HEAD before the reset (`None` for a repository without commits).
    pub previous_revision: Option<String>,
    /// HEAD after the reset.
    pub revision: String,
    /// Remote ref the working tree was reset to, e.g. `origin/main`.
    pub tracking_ref: String,
    /// Files that differ between the previous and the new revision.
    pub files_changed: Vec<String>,
    /// Tracked files whose uncommitted modifications were discarded.
    pub discarded_changes: Vec<String>,
    /// True when HEAD did not move.
    pub up_to_date: bool,
}

/// A single commit from the project history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub author: String,
    pub email: String,
    /// Author date, ISO-8601.
    pub date: String,
    pub message: String,
}

/// A tag, presented as a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub tag: String,
    /// Commit the tag points to (peeled for annotated tags).
    pub commit_hash: String,
    /// Tag creation date, ISO-8601.
    pub date: String,
    /// Annotation subject, or the commit subject for lightweight tags.
    pub message: String,
}
