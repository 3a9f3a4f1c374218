//! Git authentication handling.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::config::{GitAuthSettings, GitAuthType};
use crate::git::error::GitError;

/// Escapes a token for safe use in single-quoted shell strings.
pub fn shell_escape_token(token: &str) -> String {
    token.replace('\'', "'\\''")
}

/// RAII guard for askpass script cleanup.
///
/// Deletes the askpass script when dropped so tokens are not left on disk,
/// even if the git command fails.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Authentication environment for git commands.
#[derive(Debug)]
pub struct AuthEnv {
    /// Environment variables to set for the git command.
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command to keep the askpass script alive.
    pub _cleanup: AskpassCleanup,
}

impl AuthEnv {
    fn none() -> Self {
        Self {
            env_vars: Vec::new(),
            _cleanup: AskpassCleanup::empty(),
        }
    }
}

/// Reads the access token from the configured file or environment variable.
fn resolve_token(auth: &GitAuthSettings) -> Result<SecretString, GitError> {
    if let Some(file) = auth.token_file.as_deref().filter(|f| !f.is_empty()) {
        let content = std::fs::read_to_string(file).map_err(|e| {
            GitError::Authentication(format!("Failed to read token file '{}': {}", file, e))
        })?;
        let token = content.trim().to_string();
        if !token.is_empty() {
            return Ok(SecretString::from(token));
        }
    }

    if !auth.token_env_var.is_empty() {
        return match std::env::var(&auth.token_env_var) {
            Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value.trim().to_string())),
            _ => Err(GitError::Authentication(format!(
                "Environment variable '{}' is not set",
                auth.token_env_var
            ))),
        };
    }

    Err(GitError::Authentication(
        "Token auth configured without token_file or token_env_var".to_string(),
    ))
}

#[cfg(unix)]
fn write_askpass_script(token: &SecretString) -> Result<PathBuf, GitError> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let path = std::env::temp_dir().join(format!(".prism-askpass-{}.sh", uuid::Uuid::new_v4()));
    let script = format!(
        "#!/bin/sh\necho '{}'\n",
        shell_escape_token(token.expose_secret())
    );

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o700)
        .open(&path)
        .map_err(|e| GitError::Io {
            path: path.clone(),
            source: e,
        })?;
    file.write_all(script.as_bytes()).map_err(|e| GitError::Io {
        path: path.clone(),
        source: e,
    })?;

    Ok(path)
}

#[cfg(not(unix))]
fn write_askpass_script(_token: &SecretString) -> Result<PathBuf, GitError> {
    Err(GitError::Authentication(
        "Token authentication is only supported on unix hosts".to_string(),
    ))
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_default();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn ssh_command(key_path: &Path) -> String {
    let escaped = key_path.display().to_string().replace('\'', "'\\''");
    format!(
        "ssh -i '{}' -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
        escaped
    )
}

/// Builds the git environment for the configured credentials.
///
/// The returned [`AuthEnv`] must be kept alive until the git process exits.
pub fn build_auth_env(auth: &GitAuthSettings) -> Result<AuthEnv, GitError> {
    match auth.auth_type {
        GitAuthType::None => Ok(AuthEnv::none()),
        GitAuthType::Token => {
            let token = resolve_token(auth)?;
            let askpass_path = write_askpass_script(&token)?;
            let cleanup = AskpassCleanup::new(askpass_path.clone());

            let askpass = askpass_path.to_str().ok_or_else(|| {
                GitError::Authentication(
                    "Temp directory path contains non-UTF8 characters".to_string(),
                )
            })?;

            Ok(AuthEnv {
                env_vars: vec![
                    ("GIT_ASKPASS".to_string(), askpass.to_string()),
                    ("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()),
                ],
                _cleanup: cleanup,
            })
        }
        GitAuthType::SshKey => {
            let key_path = if auth.ssh_key_path.is_empty() {
                expand_home("~/.ssh/id_ed25519")
            } else {
                expand_home(&auth.ssh_key_path)
            };

            if !key_path.exists() {
                return Err(GitError::Authentication(format!(
                    "SSH key file not found: {}",
                    key_path.display()
                )));
            }

            Ok(AuthEnv {
                env_vars: vec![("GIT_SSH_COMMAND".to_string(), ssh_command(&key_path))],
                _cleanup: AskpassCleanup::empty(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_auth_env_none() {
        let auth = build_auth_env(&GitAuthSettings::default()).unwrap();
        assert!(auth.env_vars.is_empty());
    }

    #[test]
    fn test_shell_escape_token() {
        assert_eq!(shell_escape_token("simple"), "simple");
        assert_eq!(shell_escape_token("it's"), "it'\\''s");
    }

    #[test]
    fn test_ssh_key_not_found() {
        let settings = GitAuthSettings {
            auth_type: GitAuthType::SshKey,
            ssh_key_path: "/nonexistent/path/id_rsa".to_string(),
            ..Default::default()
        };
        let err = build_auth_env(&settings).unwrap_err();
        assert!(err.to_string().contains("SSH key file not found"));
    }

    #[test]
    fn test_token_without_source_is_rejected() {
        let settings = GitAuthSettings {
            auth_type: GitAuthType::Token,
            ..Default::default()
        };
        assert!(matches!(
            build_auth_env(&settings),
            Err(GitError::Authentication(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_writes_askpass_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("token");
        std::fs::write(&token_file, "ghp_secret\n").unwrap();

        let settings = GitAuthSettings {
            auth_type: GitAuthType::Token,
            token_file: Some(token_file.to_string_lossy().to_string()),
            ..Default::default()
        };

        let auth = build_auth_env(&settings).unwrap();
        let askpass = auth
            .env_vars
            .iter()
            .find(|(k, _)| k == "GIT_ASKPASS")
            .map(|(_, v)| PathBuf::from(v))
            .unwrap();
        let script = std::fs::read_to_string(&askpass).unwrap();
        assert!(script.contains("ghp_secret"));

        drop(auth);
        assert!(!askpass.exists());
    }
}
