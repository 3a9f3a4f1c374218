//! Git error types and stderr classification.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running git.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git network error: {0}")]
    Network(String),

    #[error("Git authentication failed: {0}")]
    Authentication(String),

    #[error("Remote repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Not a git repository: {0}")]
    NotARepository(String),

    #[error("Git object not found: {0}")]
    ObjectNotFound(String),

    #[error("Git merge/reset conflict: {0}")]
    Conflict(String),

    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("Git operation timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid git argument: {0}")]
    InvalidArgument(String),

    #[error("Git operation failed: {0}")]
    Operation(String),

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Filesystem error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GitError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitError::Network(_) | GitError::Timeout(_))
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> GitError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();

    if lower.contains("not a git repository") {
        return GitError::NotARepository(message);
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitError::Network(message);
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
        || lower.contains("terminal prompts disabled")
    {
        return GitError::Authentication(message);
    }

    if lower.contains("repository not found")
        || lower.contains("does not appear to be a git repository")
        || (lower.contains("repository") && lower.contains("does not exist"))
    {
        return GitError::RepositoryNotFound(message);
    }

    if lower.contains("invalid object name")
        || lower.contains("unknown revision")
        || lower.contains("does not exist in")
        || lower.contains("exists on disk, but not in")
        || lower.contains("bad revision")
    {
        return GitError::ObjectNotFound(message);
    }

    if lower.contains("conflict")
        || lower.contains("needs merge")
        || lower.contains("unmerged")
        || lower.contains("could not reset")
    {
        return GitError::Conflict(message);
    }

    if lower.contains("unable to access") {
        return GitError::Network(message);
    }

    GitError::Operation(message)
}
