//! File-backed comment store, one document per project.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::comments::model::{
    Comment, CommentContext, CommentLocation, CommentReply, CommentStatus, CommentsFile,
};
use crate::error::{PrismError, Resource, Result};
use crate::locks::KeyedLocks;
use crate::registry::ProjectRegistry;
use crate::storage::write_atomic;

/// Location of the document inside a project's working tree.
pub const COMMENTS_DIR: &str = ".comments";
pub const COMMENTS_FILE: &str = "comments.json";

const ID_ATTEMPTS: usize = 16;

/// State of the document on disk.
enum Stored {
    Missing,
    Valid(CommentsFile),
    Malformed(String),
}

/// Review comments for registered projects.
///
/// Every mutation reads the whole document, applies one change and replaces
/// the file, under a per-project lock. Readers never take the lock; the
/// atomic replace means they see the document before or after a mutation.
pub struct CommentStore {
    registry: Arc<dyn ProjectRegistry>,
    locks: Arc<KeyedLocks>,
}

impl CommentStore {
    pub fn new(registry: Arc<dyn ProjectRegistry>, locks: Arc<KeyedLocks>) -> Self {
        Self { registry, locks }
    }

    pub fn document_path(project_dir: &Path) -> PathBuf {
        project_dir.join(COMMENTS_DIR).join(COMMENTS_FILE)
    }

    /// Returns the project's document, or an empty one if none is stored
    /// or the stored one cannot be read.
    pub fn list(&self, project_id: &str) -> Result<CommentsFile> {
        let path = self.resolve(project_id)?;
        match load(&path) {
            Ok(Stored::Valid(document)) => Ok(document),
            Ok(Stored::Missing) => Ok(CommentsFile::default()),
            Ok(Stored::Malformed(reason)) => {
                tracing::error!(
                    path = %path.display(),
                    "Comment document is malformed, serving empty document: {}",
                    reason
                );
                Ok(CommentsFile::default())
            }
            Err(e) => {
                tracing::error!("Serving empty comment document: {}", e);
                Ok(CommentsFile::default())
            }
        }
    }

    /// Appends a new open comment.
    pub fn add(
        &self,
        project_id: &str,
        context: &str,
        location: CommentLocation,
        content: &str,
        author: &str,
    ) -> Result<Comment> {
        let context: CommentContext = context.parse()?;
        if !location.x.is_finite() || !location.y.is_finite() {
            return Err(PrismError::validation("location coordinates must be finite"));
        }

        self.mutate(project_id, |document| {
            let comment = Comment {
                id: unused_id(document)?,
                author: author_or_anonymous(author),
                timestamp: timestamp_now(),
                status: CommentStatus::Open,
                context,
                location,
                content: content.to_string(),
                replies: Vec::new(),
            };
            document.comments.push(comment.clone());
            tracing::info!(comment_id = %comment.id, "Added comment");
            Ok(comment)
        })
    }

    pub fn update_status(
        &self,
        project_id: &str,
        comment_id: &str,
        status: &str,
    ) -> Result<Comment> {
        let status: CommentStatus = status.parse()?;

        self.mutate(project_id, |document| {
            let comment = document
                .find_mut(comment_id)
                .ok_or_else(|| PrismError::not_found(Resource::Comment, comment_id))?;
            comment.status = status;
            tracing::info!(comment_id = %comment_id, status = ?status, "Updated comment status");
            Ok(comment.clone())
        })
    }

    pub fn add_reply(
        &self,
        project_id: &str,
        comment_id: &str,
        content: &str,
        author: &str,
    ) -> Result<(Comment, CommentReply)> {
        self.mutate(project_id, |document| {
            let comment = document
                .find_mut(comment_id)
                .ok_or_else(|| PrismError::not_found(Resource::Comment, comment_id))?;
            let reply = CommentReply {
                author: author_or_anonymous(author),
                timestamp: timestamp_now(),
                content: content.to_string(),
            };
            comment.replies.push(reply.clone());
            tracing::info!(comment_id = %comment_id, "Added reply");
            Ok((comment.clone(), reply))
        })
    }

    pub fn delete(&self, project_id: &str, comment_id: &str) -> Result<()> {
        self.mutate(project_id, |document| {
            let before = document.comments.len();
            document.comments.retain(|c| c.id != comment_id);
            if document.comments.len() == before {
                return Err(PrismError::not_found(Resource::Comment, comment_id));
            }
            tracing::info!(comment_id = %comment_id, "Deleted comment");
            Ok(())
        })
    }

    fn resolve(&self, project_id: &str) -> Result<PathBuf> {
        let project = self.registry.lookup(project_id)?;
        Ok(Self::document_path(&project.path))
    }

    /// Read-modify-write under the project lock. When `apply` fails
    /// nothing is written.
    fn mutate<T>(
        &self,
        project_id: &str,
        apply: impl FnOnce(&mut CommentsFile) -> Result<T>,
    ) -> Result<T> {
        let project = self.registry.lookup(project_id)?;
        let path = Self::document_path(&project.path);
        let key = crate::sync::lock_key(&project);

        self.locks.with_lock(&key, || {
            let _span = tracing::info_span!("comments", project_id = %project_id).entered();

            let (mut document, malformed) = match load(&path)? {
                Stored::Valid(document) => (document, false),
                Stored::Missing => (CommentsFile::default(), false),
                Stored::Malformed(reason) => {
                    tracing::error!(
                        path = %path.display(),
                        "Comment document is malformed, starting from empty: {}",
                        reason
                    );
                    (CommentsFile::default(), true)
                }
            };

            let value = apply(&mut document)?;

            if malformed {
                preserve_malformed(&path)?;
            }
            save(&path, &document)?;
            Ok(value)
        })
    }
}

fn load(path: &Path) -> Result<Stored> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Stored::Missing),
        Err(e) => return Err(PrismError::persistence(path, e)),
    };

    match serde_json::from_slice::<CommentsFile>(&content) {
        Ok(document) => Ok(Stored::Valid(document)),
        Err(e) => Ok(Stored::Malformed(e.to_string())),
    }
}

fn save(path: &Path, document: &CommentsFile) -> Result<()> {
    let json = serde_json::to_vec_pretty(document).map_err(|e| {
        PrismError::persistence(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;
    write_atomic(path, &json).map_err(|e| PrismError::persistence(path, e))
}

/// Moves a malformed document aside so the next write does not destroy it.
fn preserve_malformed(path: &Path) -> Result<PathBuf> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ");
    let backup = path.with_file_name(format!("{}.corrupt-{}", COMMENTS_FILE, stamp));
    std::fs::rename(path, &backup).map_err(|e| PrismError::persistence(path, e))?;
    tracing::warn!(backup = %backup.display(), "Preserved malformed comment document");
    Ok(backup)
}

fn unused_id(document: &CommentsFile) -> Result<String> {
    for _ in 0..ID_ATTEMPTS {
        let candidate = format!("c_{}", &uuid::Uuid::new_v4().simple().to_string()[..6]);
        if !document.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(PrismError::conflict("could not allocate a unique comment id"))
}

fn author_or_anonymous(author: &str) -> String {
    let author = author.trim();
    if author.is_empty() {
        "anonymous".to_string()
    } else {
        author.to_string()
    }
}

fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
