//! Integration tests for forced sync and git history views.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use common::harness::git;
use common::TestHarness;
use kicad_prism::{CommentLocation, ErrorKind, GitError, GitRepository, PrismError, Project};

#[test]
fn test_sync_picks_up_remote_commits() {
    let harness = TestHarness::new();
    let prism = harness.prism();
    let remote = harness.create_remote(
        "board",
        &[("board.kicad_pro", "{}"), ("board.kicad_sch", "(kicad_sch v1)")],
    );
    let first = git(&remote, &["rev-parse", "HEAD"]);
    let project_id = harness.import(&prism, &remote);

    let second = harness.commit_to_remote(
        &remote,
        &[
            ("board.kicad_sch", "(kicad_sch v2)"),
            ("fab/bom.csv", "ref,value\nR1,10k\n"),
        ],
        "Add BOM",
    );

    let report = prism.sync.sync(&project_id).unwrap();
    assert_eq!(report.project_id, project_id);
    assert_eq!(report.outcome.previous_revision.as_deref(), Some(first.as_str()));
    assert_eq!(report.outcome.revision, second);
    assert_eq!(report.outcome.tracking_ref, "origin/main");
    assert!(!report.outcome.up_to_date);
    assert_eq!(
        report.outcome.files_changed,
        vec!["board.kicad_sch".to_string(), "fab/bom.csv".to_string()]
    );

    let project = prism.registry.lookup(&project_id).unwrap();
    assert_eq!(
        std::fs::read_to_string(project.path.join("board.kicad_sch")).unwrap(),
        "(kicad_sch v2)"
    );

    let again = prism.sync.sync(&project_id).unwrap();
    assert!(again.outcome.up_to_date);
    assert!(again.outcome.files_changed.is_empty());
    assert_eq!(again.outcome.revision, second);

    GitRepository::new(&project.path, harness.config().git)
        .verify()
        .unwrap();
}

#[test]
fn test_sync_discards_local_edits_but_keeps_comments() {
    let harness = TestHarness::new();
    let prism = harness.prism();
    let remote = harness.create_remote("board", &[("board.kicad_pcb", "(kicad_pcb original)")]);
    let project_id = harness.import(&prism, &remote);
    let project = prism.registry.lookup(&project_id).unwrap();

    prism
        .comments
        .add(&project_id, "PCB", CommentLocation::new(5.0, 5.0), "keep me", "alice")
        .unwrap();
    std::fs::write(project.path.join("board.kicad_pcb"), "(kicad_pcb edited)").unwrap();

    let report = prism.sync.sync(&project_id).unwrap();
    assert_eq!(report.outcome.discarded_changes, vec!["board.kicad_pcb".to_string()]);
    assert!(report.outcome.up_to_date);
    assert_eq!(
        std::fs::read_to_string(project.path.join("board.kicad_pcb")).unwrap(),
        "(kicad_pcb original)"
    );

    let comments = prism.comments.list(&project_id).unwrap();
    assert_eq!(comments.comments.len(), 1);
    assert_eq!(comments.comments[0].content, "keep me");
}

#[test]
fn test_concurrent_syncs_agree_on_revision() {
    let harness = TestHarness::new();
    let prism = harness.prism();
    let remote = harness.create_remote("board", &[("board.kicad_pro", "{}")]);
    let project_id = harness.import(&prism, &remote);
    let head = harness.commit_to_remote(&remote, &[("CHANGELOG.md", "v2\n")], "Changelog");

    let reports: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let sync = &prism.sync;
                let project_id = project_id.as_str();
                scope.spawn(move || sync.sync(project_id))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut changed = 0;
    for report in reports {
        let report = report.unwrap();
        assert_eq!(report.outcome.revision, head);
        if !report.outcome.up_to_date {
            changed += 1;
        }
    }
    // Serialized per project: only the first sync moves the tree.
    assert_eq!(changed, 1);

    let project = prism.registry.lookup(&project_id).unwrap();
    GitRepository::new(&project.path, harness.config().git)
        .verify()
        .unwrap();
}

#[test]
fn test_hung_fetch_times_out_and_releases_project_lock() {
    let harness = TestHarness::new();
    let mut config = harness.config();
    config.git.timeout_secs = 1;
    let prism = harness.prism_with(&config);

    // A remote whose transport never answers.
    let checkout = harness.create_remote("stalled", &[("board.kicad_pro", "{}")]);
    git(&checkout, &["remote", "add", "origin", "ssh://hang.invalid/board.git"]);
    git(&checkout, &["config", "core.sshCommand", "sleep 8 #"]);
    prism
        .registry
        .register(Project {
            id: "stalled".to_string(),
            name: "stalled".to_string(),
            path: checkout.clone(),
            remote_url: None,
            imported_at: Utc::now(),
        })
        .unwrap();

    let (sync_result, sync_elapsed, comment_elapsed) = thread::scope(|scope| {
        let syncing = scope.spawn(|| {
            let started = Instant::now();
            let result = prism.sync.sync("stalled");
            (result, started.elapsed())
        });

        thread::sleep(Duration::from_millis(300));
        let started = Instant::now();
        prism
            .comments
            .add("stalled", "PCB", CommentLocation::new(1.0, 1.0), "waiting", "alice")
            .unwrap();
        let comment_elapsed = started.elapsed();

        let (result, sync_elapsed) = syncing.join().unwrap();
        (result, sync_elapsed, comment_elapsed)
    });

    let err = sync_result.unwrap_err();
    assert!(
        matches!(err, PrismError::Git(GitError::Timeout(1))),
        "unexpected error: {}",
        err
    );
    assert_eq!(err.kind(), ErrorKind::ExternalTool);
    assert!(sync_elapsed < Duration::from_secs(5), "sync took {:?}", sync_elapsed);
    assert!(
        comment_elapsed < Duration::from_secs(5),
        "comment write waited {:?}",
        comment_elapsed
    );
    assert_eq!(prism.comments.list("stalled").unwrap().comments.len(), 1);
}

#[test]
fn test_sync_of_unknown_project_is_not_found() {
    let harness = TestHarness::new();
    let prism = harness.prism();

    assert_eq!(prism.sync.sync("ghost").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        prism.sync.try_sync("ghost").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_history_views() {
    let harness = TestHarness::new();
    let prism = harness.prism();
    let remote = harness.create_remote("board", &[("board.kicad_sch", "rev A")]);
    let first = git(&remote, &["rev-parse", "HEAD"]);
    harness.commit_to_remote(&remote, &[("board.kicad_sch", "rev B")], "Swap regulator");
    git(&remote, &["tag", "-a", "v1.0", "-m", "First release"]);
    let project_id = harness.import(&prism, &remote);

    let commits = prism.history.commits(&project_id, 10).unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].message, "Swap regulator");
    assert_eq!(commits[1].hash, first);
    assert_eq!(commits[1].author, "Prism Tester");
    assert_eq!(prism.history.commits(&project_id, 1).unwrap().len(), 1);

    let releases = prism.history.releases(&project_id).unwrap();
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].tag, "v1.0");
    assert_eq!(releases[0].commit_hash, commits[0].hash);
    assert_eq!(releases[0].message, "First release");

    assert_eq!(
        prism
            .history
            .file_at(&project_id, &first, "board.kicad_sch")
            .unwrap(),
        "rev A"
    );
    assert_eq!(
        prism
            .history
            .file_at(&project_id, &first, "../outside")
            .unwrap_err()
            .kind(),
        ErrorKind::Validation
    );
    assert_eq!(
        prism
            .history
            .file_at(&project_id, "v9.9", "board.kicad_sch")
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}
