use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::GitError;
use crate::jobs::ToolchainError;

/// Top-level error returned by every core operation.
#[derive(Error, Debug)]
pub enum PrismError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: Resource, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("Failed to persist '{path}': {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// The kind of entity a [`PrismError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Project,
    Job,
    Comment,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Project => write!(f, "Project"),
            Resource::Job => write!(f, "Job"),
            Resource::Comment => write!(f, "Comment"),
        }
    }
}

/// Coarse error classification for adapters mapping errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ExternalTool,
    Persistence,
    Internal,
}

impl PrismError {
    pub fn validation(message: impl Into<String>) -> Self {
        PrismError::Validation(message.into())
    }

    pub fn not_found(resource: Resource, id: impl Into<String>) -> Self {
        PrismError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PrismError::Conflict(message.into())
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PrismError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PrismError::Validation(_) | PrismError::Config(_) => ErrorKind::Validation,
            PrismError::NotFound { .. } => ErrorKind::NotFound,
            PrismError::Conflict(_) => ErrorKind::Conflict,
            PrismError::Git(GitError::DestinationExists(_)) => ErrorKind::Conflict,
            PrismError::Git(GitError::InvalidArgument(_)) => ErrorKind::Validation,
            PrismError::Git(GitError::NotARepository(_) | GitError::ObjectNotFound(_)) => {
                ErrorKind::NotFound
            }
            PrismError::Git(_) | PrismError::Toolchain(_) => ErrorKind::ExternalTool,
            PrismError::Persistence { .. } => ErrorKind::Persistence,
            PrismError::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, PrismError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_resource() {
        let err = PrismError::not_found(Resource::Comment, "c_abc123");
        assert_eq!(err.to_string(), "Comment not found: c_abc123");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_git_errors_classify_as_external_tool() {
        let err = PrismError::from(GitError::Network("could not resolve host".to_string()));
        assert_eq!(err.kind(), ErrorKind::ExternalTool);

        let err = PrismError::from(GitError::DestinationExists(PathBuf::from("/tmp/x")));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ExternalTool).unwrap();
        assert_eq!(json, "\"external_tool\"");
    }
}
