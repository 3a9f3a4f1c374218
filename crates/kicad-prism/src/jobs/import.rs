//! Repository import: URL validation and the clone-and-register job.

use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{PrismError, Result};
use crate::git::GitRepository;
use crate::jobs::record::JobResult;
use crate::jobs::runner::JobContext;
use crate::registry::Project;
use crate::sanitize;

const URL_PATTERN: &str =
    r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://(?P<authority>[^/?#]*)(?P<path>/[^?#]*)?$";

/// `[user@]host:path`, where the path does not start with `/` or `:`.
const SCP_PATTERN: &str = r"^(?:[A-Za-z0-9._-]+@)?[A-Za-z0-9.-]+:[^/:][^:]*$";

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| PrismError::Internal(format!("invalid URL pattern: {}", e)))
}

/// Checks that `url` is a repository location git can clone and that its
/// scheme is allowed.
pub fn validate_repo_url(url: &str, allowed_schemes: &[String]) -> Result<()> {
    let redacted = sanitize::redact_repo_url(url);

    if url.is_empty() {
        return Err(PrismError::validation("repository URL is empty"));
    }
    if url.starts_with('-') {
        return Err(PrismError::validation(format!(
            "repository URL must not start with '-': {}",
            redacted
        )));
    }
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PrismError::validation(format!(
            "repository URL contains whitespace or control characters: {}",
            redacted
        )));
    }

    if let Some(captures) = compile(URL_PATTERN)?.captures(url) {
        let scheme = captures["scheme"].to_lowercase();
        if !allowed_schemes.iter().any(|s| s.eq_ignore_ascii_case(&scheme)) {
            return Err(PrismError::validation(format!(
                "URL scheme '{}' is not allowed",
                scheme
            )));
        }

        let authority = captures.name("authority").map_or("", |m| m.as_str());
        let host = authority.rsplit('@').next().unwrap_or("");
        if scheme != "file" && host.is_empty() {
            return Err(PrismError::validation(format!(
                "repository URL has no host: {}",
                redacted
            )));
        }

        let path = captures.name("path").map_or("", |m| m.as_str());
        if path.trim_matches('/').is_empty() {
            return Err(PrismError::validation(format!(
                "repository URL has no path: {}",
                redacted
            )));
        }
        return Ok(());
    }

    if !url.contains("://") && compile(SCP_PATTERN)?.is_match(url) {
        if allowed_schemes.iter().any(|s| s == "ssh") {
            return Ok(());
        }
        return Err(PrismError::validation(
            "scp-style repository URLs require the 'ssh' scheme to be allowed",
        ));
    }

    Err(PrismError::validation(format!(
        "malformed repository URL: {}",
        redacted
    )))
}

/// Display name from the first `*.kicad_pro` file near the root.
pub fn find_project_name(root: &Path) -> Option<String> {
    let mut candidates: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(2)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "kicad_pro"))
        .collect();
    candidates.sort_by_key(|p| (p.components().count(), p.clone()));

    candidates
        .first()
        .and_then(|p| p.file_stem())
        .map(|stem| stem.to_string_lossy().to_string())
}

/// Clones `url` into `destination` and registers the result as a project
/// named after the destination directory.
pub(crate) async fn run_import(
    ctx: &JobContext,
    url: &str,
    destination: &Path,
) -> Result<JobResult> {
    let project_id = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| PrismError::Internal("import destination has no name".to_string()))?;

    let repo = GitRepository::clone_from(url, destination, &ctx.git).await?;
    let revision = match repo.head_revision() {
        Ok(revision) => revision,
        Err(e) => {
            remove_clone(destination);
            return Err(e.into());
        }
    };

    let name = find_project_name(destination).unwrap_or_else(|| sanitize::repo_slug(url));
    let project = Project {
        id: project_id.clone(),
        name: name.clone(),
        path: destination.to_path_buf(),
        remote_url: Some(sanitize::redact_repo_url(url)),
        imported_at: Utc::now(),
    };

    if let Err(e) = ctx.registry.register(project) {
        remove_clone(destination);
        return Err(e.into());
    }

    tracing::info!(project_id = %project_id, revision = ?revision, "Imported project");
    Ok(JobResult::Import {
        project_id,
        name,
        path: destination.to_string_lossy().to_string(),
        revision,
    })
}

fn remove_clone(destination: &Path) {
    if let Err(e) = std::fs::remove_dir_all(destination) {
        tracing::warn!(
            path = %destination.display(),
            "Failed to remove unregistered clone: {}",
            e
        );
    }
}
