//! Git output parsing helpers.

use std::process::Output;

use super::types::{CommitInfo, ReleaseInfo};

/// Field separator used in `--format` strings (ASCII unit separator).
pub const FIELD_SEP: char = '\u{1f}';
/// Record separator used in `--format` strings (ASCII record separator).
pub const RECORD_SEP: char = '\u{1e}';

/// `git log` format producing one [`CommitInfo`] per record.
pub const COMMIT_FORMAT: &str = "%H%x1f%h%x1f%an%x1f%ae%x1f%aI%x1f%s%x1e";

/// `git for-each-ref` format producing one [`ReleaseInfo`] per line.
pub const TAG_FORMAT: &str =
    "%(refname:short)%1f%(objectname)%1f%(*objectname)%1f%(creatordate:iso-strict)%1f%(contents:subject)";

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Strips carriage-return progress redraws, keeping the final state of the line.
pub fn last_progress_segment(line: &str) -> &str {
    line.rsplit('\r').next().unwrap_or(line).trim_end()
}

/// Parses `git log --format=COMMIT_FORMAT` output.
pub fn parse_commit_log(output: &str) -> Vec<CommitInfo> {
    output
        .split(RECORD_SEP)
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .filter_map(|record| {
            let fields: Vec<&str> = record.split(FIELD_SEP).collect();
            if fields.len() < 6 {
                return None;
            }
            Some(CommitInfo {
                hash: fields[0].to_string(),
                short_hash: fields[1].to_string(),
                author: fields[2].to_string(),
                email: fields[3].to_string(),
                date: fields[4].to_string(),
                message: fields[5].to_string(),
            })
        })
        .collect()
}

/// Parses `git for-each-ref --format=TAG_FORMAT refs/tags` output.
pub fn parse_tag_list(output: &str) -> Vec<ReleaseInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(FIELD_SEP).collect();
            if fields.len() < 5 {
                return None;
            }
            // Annotated tags peel to the commit; lightweight tags point at it directly.
            let commit_hash = if fields[2].is_empty() {
                fields[1]
            } else {
                fields[2]
            };
            Some(ReleaseInfo {
                tag: fields[0].to_string(),
                commit_hash: commit_hash.to_string(),
                date: fields[3].to_string(),
                message: fields[4].to_string(),
            })
        })
        .collect()
}

/// Parses newline-separated path output (`diff --name-only`, `status --porcelain`).
pub fn parse_name_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts paths from `git status --porcelain` output.
pub fn parse_porcelain_paths(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.len() >= 4)
        .map(|line| {
            let path = &line[3..];
            // Renames are reported as "old -> new".
            path.split(" -> ").last().unwrap_or(path).trim().to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit_log() {
        let output = "abc123def\u{1f}abc123d\u{1f}Ada\u{1f}ada@example.com\u{1f}2024-05-01T10:00:00+02:00\u{1f}Route power plane\u{1e}\n\
                      0011223\u{1f}0011223\u{1f}Bob\u{1f}bob@example.com\u{1f}2024-04-30T09:00:00+00:00\u{1f}Initial commit\u{1e}\n";
        let commits = parse_commit_log(output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].short_hash, "abc123d");
        assert_eq!(commits[0].message, "Route power plane");
        assert_eq!(commits[1].author, "Bob");
    }

    #[test]
    fn test_parse_commit_log_skips_truncated_records() {
        let commits = parse_commit_log("abc\u{1f}def\u{1e}");
        assert!(commits.is_empty());
    }

    #[test]
    fn test_parse_tag_list_prefers_peeled_commit() {
        let output = "v1.0\u{1f}tagobj\u{1f}commit1\u{1f}2024-05-01T10:00:00+00:00\u{1f}First release\n\
                      v0.9\u{1f}commit0\u{1f}\u{1f}2024-04-01T10:00:00+00:00\u{1f}Prototype\n";
        let tags = parse_tag_list(output);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].commit_hash, "commit1");
        assert_eq!(tags[1].commit_hash, "commit0");
        assert_eq!(tags[1].message, "Prototype");
    }

    #[test]
    fn test_parse_porcelain_paths() {
        let output = " M board.kicad_pcb\nR  old.kicad_sch -> new.kicad_sch\n";
        assert_eq!(
            parse_porcelain_paths(output),
            vec!["board.kicad_pcb".to_string(), "new.kicad_sch".to_string()]
        );
    }

    #[test]
    fn test_last_progress_segment() {
        assert_eq!(
            last_progress_segment("Receiving objects:  10%\rReceiving objects: 100%, done."),
            "Receiving objects: 100%, done."
        );
        assert_eq!(last_progress_segment("fatal: nope"), "fatal: nope");
    }

    #[cfg(unix)]
    mod unix_tests {
        use super::*;
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        fn make_output(status_code: i32, stdout: &[u8], stderr: &[u8]) -> Output {
            Output {
                status: ExitStatus::from_raw(status_code << 8),
                stdout: stdout.to_vec(),
                stderr: stderr.to_vec(),
            }
        }

        #[test]
        fn test_format_git_error_empty_output() {
            let output = make_output(1, b"", b"");
            assert_eq!(format_git_error(&output), "Command failed with exit code 1");
        }

        #[test]
        fn test_format_git_error_both() {
            let output = make_output(1, b"some output", b"some error");
            assert_eq!(format_git_error(&output), "some error\nsome output");
        }
    }
}
