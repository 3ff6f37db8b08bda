use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use flowport_core::{PortabilityError, VerificationMismatch, DELETION_INDICATOR_FILE};

use super::*;

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "flowport-migration-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent");
    }
    fs::write(path, content).expect("must write file");
}

fn seed_user_data(root: &Path) {
    write_file(root, "Settings/Settings.json", "{\"Hotkey\":\"Alt + Space\"}");
    write_file(root, "Settings/Plugins/WebSearch/Settings.json", "{\"sources\":[]}");
    write_file(root, "Logs/1.19.4/2026-10-19.txt", "started\n");
    fs::create_dir_all(root.join("Cache")).expect("must create empty dir");
}

#[test]
fn sha256_hex_of_empty_input() {
    assert_eq!(sha256_hex(b""), EMPTY_SHA256);
}

#[test]
fn sha256_file_matches_in_memory_digest() {
    let root = test_root();
    write_file(&root, "blob.bin", "flow launcher");
    assert_eq!(
        sha256_file(&root.join("blob.bin")).expect("must hash"),
        sha256_hex(b"flow launcher")
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn move_user_data_folder_copies_and_verifies_tree() {
    let root = test_root();
    let from = root.join("roaming");
    let to = root.join("portable");
    seed_user_data(&from);

    let report = move_user_data_folder(&from, &to).expect("move must succeed");

    assert_eq!(report.copied.files, 3);
    assert_eq!(report.verified.files_checked, 3);
    assert_eq!(report.verified.directories_checked, report.copied.directories);
    assert!(to.join("Cache").is_dir(), "empty directories are carried over");
    assert_eq!(
        fs::read_to_string(to.join("Settings/Plugins/WebSearch/Settings.json"))
            .expect("must read copy"),
        "{\"sources\":[]}"
    );
    assert!(from.join("Settings/Settings.json").exists(), "source is left in place");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn move_user_data_folder_overwrites_conflicting_destination_entries() {
    let root = test_root();
    let from = root.join("from");
    let to = root.join("to");
    seed_user_data(&from);
    write_file(&to, "Settings/Settings.json", "stale");
    write_file(&to, "Logs/1.19.4/2026-10-19.txt/nested", "directory in the way");
    write_file(&to, "Unrelated.txt", "kept");

    move_user_data_folder(&from, &to).expect("move must succeed");

    assert_eq!(
        fs::read_to_string(to.join("Settings/Settings.json")).expect("must read"),
        "{\"Hotkey\":\"Alt + Space\"}"
    );
    assert!(to.join("Logs/1.19.4/2026-10-19.txt").is_file());
    assert_eq!(
        fs::read_to_string(to.join("Unrelated.txt")).expect("must read"),
        "kept"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn move_user_data_folder_reports_progress_per_file() {
    let root = test_root();
    let from = root.join("from");
    seed_user_data(&from);

    let mut seen = Vec::new();
    move_user_data_folder_with_progress(&from, &root.join("to"), |path, _| {
        seen.push(path.to_path_buf())
    })
    .expect("move must succeed");

    seen.sort();
    assert_eq!(
        seen,
        vec![
            PathBuf::from("Logs/1.19.4/2026-10-19.txt"),
            PathBuf::from("Settings/Plugins/WebSearch/Settings.json"),
            PathBuf::from("Settings/Settings.json"),
        ]
    );
    assert_eq!(count_user_data_files(&from).expect("must count"), 3);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn move_user_data_folder_never_copies_the_deletion_marker() {
    let root = test_root();
    let from = root.join("from");
    let to = root.join("to");
    seed_user_data(&from);
    indicate_deletion(&from).expect("must mark source");

    move_user_data_folder(&from, &to).expect("move must succeed");

    assert!(!to.join(DELETION_INDICATOR_FILE).exists());
    assert_eq!(count_user_data_files(&from).expect("must count"), 3);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn move_user_data_folder_clears_stale_destination_marker() {
    let root = test_root();
    let from = root.join("from");
    let to = root.join("to");
    seed_user_data(&from);
    fs::create_dir_all(&to).expect("must create destination");
    indicate_deletion(&to).expect("must leave a stale marker");

    move_user_data_folder(&from, &to).expect("move must succeed");

    assert!(!has_deletion_marker(&to), "destination must not stay marked");
    assert!(!has_deletion_marker(&from));
    assert!(to.join("Settings/Settings.json").is_file());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn clear_deletion_marker_reports_whether_a_marker_was_removed() {
    let root = test_root();
    let dir = root.join("data");
    assert!(!clear_deletion_marker(&dir).expect("missing directory is not an error"));

    seed_user_data(&dir);
    indicate_deletion(&dir).expect("must mark");
    assert!(clear_deletion_marker(&dir).expect("must clear"));
    assert!(!clear_deletion_marker(&dir).expect("second clear is a no-op"));
    assert!(dir.join("Settings/Settings.json").is_file());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn move_user_data_folder_requires_existing_source() {
    let root = test_root();
    let to = root.join("to");

    let err = move_user_data_folder(&root.join("missing"), &to).expect_err("must fail");
    assert!(matches!(
        err.downcast_ref::<PortabilityError>(),
        Some(PortabilityError::SourceMissing(_))
    ));
    assert!(!to.exists(), "nothing is written when the source is missing");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn verification_detects_corrupted_destination_file() {
    let root = test_root();
    let from = root.join("from");
    let to = root.join("to");
    seed_user_data(&from);
    copy_user_data_tree(&from, &to, |_, _| {}).expect("copy must succeed");
    write_file(&to, "Settings/Settings.json", "corrupted");

    let err = verify_user_data_after_move(&from, &to).expect_err("verification must fail");
    let Some(PortabilityError::VerificationFailure { mismatches, .. }) =
        err.downcast_ref::<PortabilityError>()
    else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(mismatches.len(), 1);
    assert!(matches!(
        &mismatches[0],
        VerificationMismatch::ContentMismatch { path, expected_sha256, .. }
            if path == Path::new("Settings/Settings.json")
                && expected_sha256 == &sha256_hex(b"{\"Hotkey\":\"Alt + Space\"}")
    ));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn verification_detects_missing_files_and_directories() {
    let root = test_root();
    let from = root.join("from");
    let to = root.join("to");
    seed_user_data(&from);
    copy_user_data_tree(&from, &to, |_, _| {}).expect("copy must succeed");
    fs::remove_file(to.join("Logs/1.19.4/2026-10-19.txt")).expect("must remove file");
    fs::remove_dir(to.join("Cache")).expect("must remove dir");

    let err = verify_user_data_after_move(&from, &to).expect_err("verification must fail");
    let Some(PortabilityError::VerificationFailure { mismatches, .. }) =
        err.downcast_ref::<PortabilityError>()
    else {
        panic!("unexpected error: {err}");
    };
    assert!(mismatches.contains(&VerificationMismatch::MissingDirectory(PathBuf::from(
        "Cache"
    ))));
    assert!(mismatches.contains(&VerificationMismatch::MissingFile(PathBuf::from(
        "Logs/1.19.4/2026-10-19.txt"
    ))));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn verification_ignores_extra_destination_entries() {
    let root = test_root();
    let from = root.join("from");
    let to = root.join("to");
    seed_user_data(&from);
    copy_user_data_tree(&from, &to, |_, _| {}).expect("copy must succeed");
    write_file(&to, "Extra/notes.txt", "extra");

    verify_user_data_after_move(&from, &to).expect("extra entries do not fail verification");

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn symlinks_are_recreated_and_verified() {
    let root = test_root();
    let from = root.join("from");
    let to = root.join("to");
    seed_user_data(&from);
    std::os::unix::fs::symlink("Settings/Settings.json", from.join("current.json"))
        .expect("must create symlink");

    move_user_data_folder(&from, &to).expect("move must succeed");
    assert_eq!(
        fs::read_link(to.join("current.json")).expect("must be a symlink"),
        PathBuf::from("Settings/Settings.json")
    );

    fs::remove_file(to.join("current.json")).expect("must remove link");
    std::os::unix::fs::symlink("elsewhere.json", to.join("current.json"))
        .expect("must create symlink");
    let err = verify_user_data_after_move(&from, &to).expect_err("retargeted link must fail");
    assert!(err.to_string().contains("current.json"), "{err}");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn indicate_deletion_is_idempotent() {
    let root = test_root();
    let dir = root.join("roaming");
    seed_user_data(&dir);

    let first = indicate_deletion(&dir).expect("first marker");
    let second = indicate_deletion(&dir).expect("second call must not fail");

    assert_eq!(first, second);
    assert!(has_deletion_marker(&dir));
    let markers = fs::read_dir(&dir)
        .expect("must list dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name() == DELETION_INDICATOR_FILE)
        .count();
    assert_eq!(markers, 1);
    assert_eq!(fs::metadata(&first).expect("must stat marker").len(), 0);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn indicate_deletion_requires_existing_directory() {
    let root = test_root();
    let err = indicate_deletion(&root.join("missing")).expect_err("must fail");
    assert!(err.to_string().contains("cannot mark a missing data directory"));
    assert!(!root.join("missing").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn remove_folder_if_exists_reports_whether_anything_was_removed() {
    let root = test_root();
    let dir = root.join("portable");
    seed_user_data(&dir);

    assert!(remove_folder_if_exists(&dir).expect("must remove"));
    assert!(!dir.exists());
    assert!(!remove_folder_if_exists(&dir).expect("missing dir is not an error"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn superseded_presence_check_tolerates_content_changes() {
    let root = test_root();
    let superseded = root.join("roaming");
    let active = root.join("portable");
    seed_user_data(&superseded);
    move_user_data_folder(&superseded, &active).expect("move must succeed");
    indicate_deletion(&superseded).expect("must mark");
    write_file(&active, "Settings/Settings.json", "{\"Hotkey\":\"Ctrl + Space\"}");

    assert!(verify_superseded_copy_present(&superseded, &active)
        .expect("check must run")
        .is_empty());

    fs::remove_file(active.join("Settings/Plugins/WebSearch/Settings.json"))
        .expect("must remove file");
    let mismatches =
        verify_superseded_copy_present(&superseded, &active).expect("check must run");
    assert_eq!(
        mismatches,
        vec![VerificationMismatch::MissingFile(PathBuf::from(
            "Settings/Plugins/WebSearch/Settings.json"
        ))]
    );

    let missing_active =
        verify_superseded_copy_present(&superseded, &root.join("gone")).expect("check must run");
    assert_eq!(missing_active.len(), 1);

    let _ = fs::remove_dir_all(&root);
}
