/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use super::*;
use crate::backend::local::LocalBackend;
use crate::backend::{Backend, BackendSet};
use crate::heal::DRAIN_DEADLINE;
use crate::retry::TimeoutMode;
use crate::testutil::temp_root;
use crate::vfs::FsOptions;

fn fixture(name: &str) -> (PathBuf, Arc<TripleFs>) {
    let root = temp_root(name);
    for sub in ["even", "odd", "parity"] {
        fs::create_dir_all(root.join(sub)).unwrap();
    }
    let backends = BackendSet::new(
        Arc::new(LocalBackend::new("even", &root.join("even"))),
        Arc::new(LocalBackend::new("odd", &root.join("odd"))),
        Arc::new(LocalBackend::new("parity", &root.join("parity"))),
    );
    let options = FsOptions {
        timeout_mode: TimeoutMode::Aggressive,
        ..FsOptions::default()
    };
    let fs = TripleFs::create("raid3", backends, options).unwrap();
    (root, fs)
}

fn mtime() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

#[test]
fn test_unknown_command() {
    let (root, fs) = fixture("admin-unknown");
    let err = run(&fs, "defrag", &[], &HashMap::new()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VfsError>(),
        Some(VfsError::CommandNotFound(name)) if name == "defrag"
    ));
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_status_reports_degraded_with_guide() {
    let (root, fs) = fixture("admin-status");
    fs.put(&ObjectPath::new("f.txt"), b"hello", mtime()).unwrap();
    fs::remove_dir_all(root.join("parity")).unwrap();
    fs::write(root.join("parity"), b"broken").unwrap();

    let report = run(&fs, "status", &[], &HashMap::new()).unwrap();
    assert!(report.contains("overall: DEGRADED"), "report was:\n{}", report);
    assert!(report.contains("rebuild parity"), "report was:\n{}", report);
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_status_healthy() {
    let (root, fs) = fixture("admin-status-ok");
    fs.put(&ObjectPath::new("f.txt"), b"hello", mtime()).unwrap();
    let report = run(&fs, "status", &[], &HashMap::new()).unwrap();
    assert!(report.contains("overall: HEALTHY"), "report was:\n{}", report);
    let json = status::run_json(&fs).unwrap();
    assert!(json.contains("\"overall\": \"HEALTHY\""), "json was:\n{}", json);
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_rebuild_refuses_auto_detect_on_equal_counts() {
    let (root, fs) = fixture("admin-autodetect");
    fs.put(&ObjectPath::new("f.txt"), b"equal", mtime()).unwrap();
    let err = run(&fs, "rebuild", &[], &HashMap::new()).unwrap_err();
    assert!(
        err.to_string().contains("cannot auto-detect"),
        "error was: {:#}",
        err
    );
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_rebuild_auto_detects_smallest_backend() {
    let (root, fs) = fixture("admin-autodetect-ok");
    fs.put(&ObjectPath::new("a.txt"), b"first", mtime()).unwrap();
    fs.put(&ObjectPath::new("b.txt"), b"second", mtime()).unwrap();
    fs.backends()
        .odd
        .remove(&ObjectPath::new("a.txt"))
        .unwrap();

    let report = run(&fs, "rebuild", &[], &HashMap::new()).unwrap();
    assert!(report.contains("rebuild of the odd backend"), "report was:\n{}", report);
    assert!(report.contains("rebuilt: 1"), "report was:\n{}", report);
    assert!(fs.backends().odd.exists(&ObjectPath::new("a.txt")).unwrap());
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_rebuild_check_only_and_dry_run_write_nothing() {
    let (root, fs) = fixture("admin-dryrun");
    fs.put(&ObjectPath::new("a.txt"), b"words", mtime()).unwrap();
    fs.backends()
        .even
        .remove(&ObjectPath::new("a.txt"))
        .unwrap();

    let mut opts = HashMap::new();
    opts.insert("check-only".to_owned(), "true".to_owned());
    let report = run(&fs, "rebuild", &["even".to_owned()], &opts).unwrap();
    assert!(report.contains("to rebuild: 1"), "report was:\n{}", report);
    assert!(!fs.backends().even.exists(&ObjectPath::new("a.txt")).unwrap());

    let mut opts = HashMap::new();
    opts.insert("dry-run".to_owned(), "true".to_owned());
    let report = run(&fs, "rebuild", &["even".to_owned()], &opts).unwrap();
    assert!(
        report.contains("would rebuild even particle of 'a.txt'"),
        "report was:\n{}",
        report
    );
    assert!(!fs.backends().even.exists(&ObjectPath::new("a.txt")).unwrap());
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_heal_restores_degraded_objects() {
    let (root, fs) = fixture("admin-heal");
    fs.put(&ObjectPath::new("fine.txt"), b"fine", mtime()).unwrap();
    fs.put(&ObjectPath::new("hurt.txt"), b"hurt me", mtime()).unwrap();
    fs.backends()
        .parity
        .remove(&ObjectPath::new("hurt.txt.parity-ol"))
        .unwrap();
    // broken beyond repair: only an even particle
    fs.backends()
        .even
        .put(&ObjectPath::new("dead.txt"), b"x", mtime())
        .unwrap();

    let report = run(&fs, "heal", &[], &HashMap::new()).unwrap();
    assert!(report.contains("scanned: 3"), "report was:\n{}", report);
    assert!(report.contains("healthy: 1"), "report was:\n{}", report);
    assert!(report.contains("healed: 1"), "report was:\n{}", report);
    assert!(report.contains("unrecoverable: 1"), "report was:\n{}", report);
    assert!(report.contains("dead.txt"), "report was:\n{}", report);
    assert!(fs
        .backends()
        .parity
        .exists(&ObjectPath::new("hurt.txt.parity-ol"))
        .unwrap());
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_cleanup_leaves_foreign_parity_files_untouched() {
    let (root, fs) = fixture("admin-foreign");
    fs.put(&ObjectPath::new("keep.txt"), b"keep", mtime()).unwrap();
    // an ordinary file on the parity backend, no parity suffix
    fs.backends()
        .parity
        .put(&ObjectPath::new("notes.md"), b"foreign", mtime())
        .unwrap();

    let report = run(&fs, "cleanup", &[], &HashMap::new()).unwrap();
    assert!(report.contains("broken objects: 0"), "report was:\n{}", report);
    assert!(report.contains("particles removed: 0"), "report was:\n{}", report);
    assert!(
        report.contains("foreign files ignored: 1"),
        "report was:\n{}",
        report
    );
    assert!(fs
        .backends()
        .parity
        .exists(&ObjectPath::new("notes.md"))
        .unwrap());

    // heal does not treat it as an object either
    let report = run(&fs, "heal", &[], &HashMap::new()).unwrap();
    assert!(report.contains("scanned: 1"), "report was:\n{}", report);
    assert!(report.contains("unrecoverable: 0"), "report was:\n{}", report);
    assert!(fs
        .backends()
        .parity
        .exists(&ObjectPath::new("notes.md"))
        .unwrap());
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_cleanup_removes_broken_objects_and_transients() {
    let (root, fs) = fixture("admin-cleanup");
    fs.put(&ObjectPath::new("keep.txt"), b"keep", mtime()).unwrap();
    fs.backends()
        .odd
        .put(&ObjectPath::new("lost.txt"), b"z", mtime())
        .unwrap();
    fs.backends()
        .even
        .put(&ObjectPath::new("stale.txt.tmp.even"), b"t", mtime())
        .unwrap();

    let report = run(&fs, "cleanup", &[], &HashMap::new()).unwrap();
    assert!(report.contains("broken objects: 1"), "report was:\n{}", report);
    assert!(report.contains("particles removed: 1"), "report was:\n{}", report);
    assert!(
        report.contains("transient files removed: 1"),
        "report was:\n{}",
        report
    );
    assert!(!fs.backends().odd.exists(&ObjectPath::new("lost.txt")).unwrap());
    assert!(!fs
        .backends()
        .even
        .exists(&ObjectPath::new("stale.txt.tmp.even"))
        .unwrap());
    assert!(fs.backends().even.exists(&ObjectPath::new("keep.txt")).unwrap());
    fs.shutdown(DRAIN_DEADLINE);
    fs::remove_dir_all(&root).unwrap();
}
