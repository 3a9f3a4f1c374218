//! Git repository operations.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command as TokioCommand;

use super::auth::{build_auth_env, AuthEnv};
use super::error::{classify_git_error, GitError};
use super::parse::{
    format_git_error, last_progress_segment, parse_commit_log, parse_name_list,
    parse_porcelain_paths, parse_tag_list, COMMIT_FORMAT, TAG_FORMAT,
};
use super::types::*;
use crate::config::GitSettings;
use crate::sanitize;

type Result<T> = std::result::Result<T, GitError>;

/// Number of trailing stderr lines kept as the diagnostic of a failed clone.
const DIAGNOSTIC_LINES: usize = 20;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Git repository operations over the `git` CLI.
pub struct GitRepository {
    /// Path to the working tree.
    repo_path: PathBuf,
    settings: GitSettings,
}

impl GitRepository {
    /// Creates a new git repository handle.
    pub fn new(repo_path: impl Into<PathBuf>, settings: GitSettings) -> Self {
        Self {
            repo_path: repo_path.into(),
            settings,
        }
    }

    /// Returns the repository path.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Checks if the directory is a git working tree.
    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    fn ensure_repo(&self) -> Result<()> {
        if self.is_git_repo() {
            Ok(())
        } else {
            Err(GitError::NotARepository(
                self.repo_path.display().to_string(),
            ))
        }
    }

    /// Clones `url` into `destination`.
    ///
    /// Fails with [`GitError::DestinationExists`] instead of touching an
    /// existing directory. A partially written destination is removed when the
    /// clone fails or times out.
    pub async fn clone_from(
        url: &str,
        destination: &Path,
        settings: &GitSettings,
    ) -> Result<Self> {
        if destination.exists() {
            return Err(GitError::DestinationExists(destination.to_path_buf()));
        }
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let redacted = sanitize::redact_repo_url(url);
        let auth = build_auth_env(&settings.auth)?;

        let mut cmd = TokioCommand::new("git");
        cmd.args(["clone", "--progress", "--"])
            .arg(url)
            .arg(destination)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(GitError::Spawn)?;
        let stderr_pipe = child.stderr.take();
        let stdout_pipe = child.stdout.take();

        let stderr_task = async {
            let mut collected = Vec::new();
            if let Some(stderr) = stderr_pipe {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = last_progress_segment(&line).to_string();
                    tracing::debug!(url = %redacted, "git clone: {}", line);
                    collected.push(line);
                }
            }
            collected
        };

        let stdout_task = async {
            if let Some(stdout) = stdout_pipe {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(_line)) = lines.next_line().await {
                    // Drain stdout to prevent pipe buffer from filling
                }
            }
        };

        let timeout_secs = settings.timeout_secs;
        let run = async {
            let (stderr_lines, ()) = tokio::join!(stderr_task, stdout_task);
            let status = child.wait().await;
            (stderr_lines, status)
        };

        let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), run).await;
        drop(auth);

        let failure = match outcome {
            Err(_elapsed) => {
                let _ = child.kill().await;
                GitError::Timeout(timeout_secs)
            }
            Ok((_, Err(e))) => GitError::Spawn(e),
            Ok((stderr_lines, Ok(status))) => {
                if status.success() {
                    return Ok(Self::new(destination, settings.clone()));
                }
                let start = stderr_lines.len().saturating_sub(DIAGNOSTIC_LINES);
                let diagnostic = stderr_lines[start..]
                    .iter()
                    .filter(|line| !line.trim().is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if diagnostic.is_empty() {
                    GitError::Operation(format!(
                        "git clone exited with code {}",
                        status.code().unwrap_or(-1)
                    ))
                } else {
                    classify_git_error(&diagnostic)
                }
            }
        };

        if destination.exists() {
            if let Err(e) = std::fs::remove_dir_all(destination) {
                tracing::warn!(
                    path = %destination.display(),
                    "Failed to remove partial clone: {}",
                    e
                );
            }
        }

        Err(failure)
    }

    /// Fetches the configured remote, pruning deleted branches.
    pub fn fetch(&self) -> Result<()> {
        self.ensure_repo()?;

        let auth = self.get_auth_env()?;
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.repo_path)
            .args(["fetch", "--prune", &self.settings.remote])
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null());

        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        let output = output_within(cmd, Duration::from_secs(self.settings.timeout_secs));
        drop(auth);
        let output = output?;

        if output.status.success() {
            Ok(())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    /// Returns the commit hash of HEAD, or `None` if the branch has no commits yet.
    pub fn head_revision(&self) -> Result<Option<String>> {
        self.ensure_repo()?;

        let output = self.run_git(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    /// Returns the current branch name, or `None` for a detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        self.ensure_repo()?;

        let output = self.run_git(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    /// Resolves the remote ref the working tree follows.
    ///
    /// Tries, in order: the upstream of the current branch, the remote's
    /// default branch (`<remote>/HEAD`), then `<remote>/<current branch>`.
    pub fn tracking_ref(&self) -> Result<String> {
        self.ensure_repo()?;

        let upstream = self.run_git(&[
            "rev-parse",
            "--abbrev-ref",
            "--symbolic-full-name",
            "@{u}",
        ])?;
        if upstream.status.success() {
            let name = String::from_utf8_lossy(&upstream.stdout).trim().to_string();
            if !name.is_empty() {
                return Ok(name);
            }
        }

        let remote_head = format!("refs/remotes/{}/HEAD", self.settings.remote);
        let default = self.run_git(&["symbolic-ref", "--quiet", "--short", &remote_head])?;
        if default.status.success() {
            let name = String::from_utf8_lossy(&default.stdout).trim().to_string();
            if !name.is_empty() {
                return Ok(name);
            }
        }

        if let Some(branch) = self.current_branch()? {
            let candidate = format!("{}/{}", self.settings.remote, branch);
            let remote_ref = format!("refs/remotes/{}", candidate);
            let exists = self.run_git(&["rev-parse", "--verify", "--quiet", &remote_ref])?;
            if exists.status.success() {
                return Ok(candidate);
            }
        }

        Err(GitError::Operation(format!(
            "No remote tracking branch found for '{}'",
            self.repo_path.display()
        )))
    }

    /// Hard-resets the working tree and index to `target`.
    pub fn reset_hard(&self, target: &str) -> Result<()> {
        validate_revision(target)?;
        self.run_git_checked(&["reset", "--hard", "--quiet", target])?;
        Ok(())
    }

    /// Lists files that differ between two revisions.
    pub fn changed_files(&self, from: &str, to: &str) -> Result<Vec<String>> {
        validate_revision(from)?;
        validate_revision(to)?;
        let stdout = self.run_git_checked(&["diff", "--name-only", from, to])?;
        Ok(parse_name_list(&stdout))
    }

    /// Lists tracked files with uncommitted modifications.
    pub fn modified_files(&self) -> Result<Vec<String>> {
        let stdout = self.run_git_checked(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(parse_porcelain_paths(&stdout))
    }

    /// Fetches the remote and forces the working tree to the tracking branch tip.
    ///
    /// Destructive: uncommitted modifications to tracked files are discarded
    /// and reported in [`SyncOutcome::discarded_changes`]. Untracked files are
    /// left in place.
    pub fn fetch_and_hard_reset(&self) -> Result<SyncOutcome> {
        self.ensure_repo()?;

        let previous_revision = self.head_revision()?;
        self.fetch()?;

        let tracking_ref = self.tracking_ref()?;
        let discarded_changes = self.modified_files()?;
        self.reset_hard(&tracking_ref)?;

        let revision = self.head_revision()?.ok_or_else(|| {
            GitError::Operation(format!("'{}' has no commits after reset", tracking_ref))
        })?;

        let files_changed = match previous_revision.as_deref() {
            Some(previous) if previous != revision => self.changed_files(previous, &revision)?,
            _ => Vec::new(),
        };
        let up_to_date = previous_revision.as_deref() == Some(revision.as_str());

        Ok(SyncOutcome {
            previous_revision,
            revision,
            tracking_ref,
            files_changed,
            discarded_changes,
            up_to_date,
        })
    }

    /// Lists the most recent commits reachable from HEAD.
    pub fn list_commits(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        if self.head_revision()?.is_none() {
            return Ok(Vec::new());
        }

        let limit = limit.to_string();
        let format = format!("--format={}", COMMIT_FORMAT);
        let stdout = self.run_git_checked(&["log", "-n", &limit, &format])?;
        Ok(parse_commit_log(&stdout))
    }

    /// Lists tags, newest first.
    pub fn list_releases(&self) -> Result<Vec<ReleaseInfo>> {
        self.ensure_repo()?;

        let format = format!("--format={}", TAG_FORMAT);
        let stdout = self.run_git_checked(&[
            "for-each-ref",
            "--sort=-creatordate",
            &format,
            "refs/tags",
        ])?;
        Ok(parse_tag_list(&stdout))
    }

    /// Reads a file as it existed at `revision`.
    pub fn read_file_at(&self, revision: &str, path: &str) -> Result<String> {
        self.ensure_repo()?;
        validate_revision(revision)?;
        let path = validate_tree_path(path)?;

        let object = format!("{}:{}", revision, path);
        let output = self.run_git(&["show", &object])?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    /// Runs a repository consistency check.
    pub fn verify(&self) -> Result<()> {
        self.ensure_repo()?;
        self.run_git_checked(&["fsck", "--no-progress"])?;
        self.run_git_checked(&["rev-parse", "--verify", "HEAD"])?;
        Ok(())
    }

    /// Runs a git command in the repository directory.
    fn run_git(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .current_dir(&self.repo_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(GitError::Spawn)
    }

    /// Runs a git command and returns stdout, classifying failures.
    fn run_git_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run_git(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }

    fn get_auth_env(&self) -> Result<AuthEnv> {
        build_auth_env(&self.settings.auth)
    }
}

/// Runs `cmd` to completion, killing it once `timeout` has passed.
///
/// Pipes are drained on their own threads so a chatty child cannot block
/// on a full pipe. After a kill those threads are left to finish on their
/// own, since a grandchild (ssh) may still hold the pipes open.
fn output_within(mut cmd: Command, timeout: Duration) -> Result<Output> {
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(GitError::Spawn)?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout));
    let stderr_reader = thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait().map_err(GitError::Spawn)? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GitError::Timeout(timeout.as_secs()));
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: stdout_reader.join().unwrap_or_default(),
        stderr: stderr_reader.join().unwrap_or_default(),
    })
}

fn drain(pipe: Option<impl Read>) -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buffer);
    }
    buffer
}

/// Rejects revisions that git could interpret as options or ranges.
fn validate_revision(revision: &str) -> Result<()> {
    if revision.is_empty()
        || revision.starts_with('-')
        || revision.contains("..")
        || revision.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(GitError::InvalidArgument(format!(
            "invalid revision '{}'",
            revision
        )));
    }
    Ok(())
}

/// Normalizes a path inside the tree, rejecting anything that escapes it.
fn validate_tree_path(path: &str) -> Result<String> {
    let candidate = Path::new(path);
    let mut parts = Vec::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => {
                return Err(GitError::InvalidArgument(format!(
                    "invalid path '{}'",
                    path
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(GitError::InvalidArgument(format!("invalid path '{}'", path)));
    }
    Ok(parts.join("/"))
}
