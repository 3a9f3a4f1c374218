//! Helpers for sanitizing repository URLs before they reach logs, job
//! records or the filesystem.

use sha2::{Digest, Sha256};

/// Strips userinfo/tokens from a git remote URL.
///
/// - `https://ghp_token@github.com/user/repo` → `https://****@github.com/user/repo`
/// - `git@github.com:user/repo.git` → unchanged (no secret in scp-style URLs)
/// - `https://github.com/user/repo` → unchanged
pub fn redact_repo_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &url[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            return format!("{}****@{}", scheme, after_at);
        }
    }

    url.to_string()
}

/// Derives a filesystem-safe slug from the last path segment of a repository URL.
///
/// `https://github.com/acme/Power-Board.git` → `power-board`
pub fn repo_slug(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed
        .rsplit(|c| c == '/' || c == ':')
        .next()
        .unwrap_or(trimmed);
    let last = last.strip_suffix(".git").unwrap_or(last);

    let mut slug = String::with_capacity(last.len());
    let mut previous_dash = false;
    for c in last.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
            previous_dash = false;
        } else if !previous_dash && !slug.is_empty() {
            slug.push('-');
            previous_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();

    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Returns the first `len` hex digits of the SHA-256 of `value`.
pub fn short_digest(value: &str, len: usize) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..len.min(hex.len())].to_string()
}

/// Deterministic, collision-resistant directory name for an imported repository.
pub fn import_dir_name(url: &str) -> String {
    format!("{}-{}", repo_slug(url), short_digest(url.trim(), 8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_repo_url_https_with_token() {
        assert_eq!(
            redact_repo_url("https://ghp_xxxx@github.com/user/repo.git"),
            "https://****@github.com/user/repo.git"
        );
    }

    #[test]
    fn test_redact_repo_url_ignores_at_in_path() {
        assert_eq!(
            redact_repo_url("https://example.com/team/@scope/repo.git"),
            "https://example.com/team/@scope/repo.git"
        );
    }

    #[test]
    fn test_redact_repo_url_ssh() {
        assert_eq!(
            redact_repo_url("git@github.com:user/repo.git"),
            "git@github.com:user/repo.git"
        );
    }

    #[test]
    fn test_repo_slug() {
        assert_eq!(repo_slug("https://github.com/acme/Power-Board.git"), "power-board");
        assert_eq!(repo_slug("git@github.com:acme/sensor_node.git"), "sensor_node");
        assert_eq!(repo_slug("https://github.com/acme/my board/"), "my-board");
        assert_eq!(repo_slug("https://github.com/"), "github-com");
        assert_eq!(repo_slug("///"), "project");
    }

    #[test]
    fn test_import_dir_name_is_deterministic() {
        let a = import_dir_name("https://github.com/acme/board.git");
        let b = import_dir_name("https://github.com/acme/board.git");
        let c = import_dir_name("https://gitlab.com/acme/board.git");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("board-"));
        assert_eq!(a.len(), "board-".len() + 8);
    }
}
