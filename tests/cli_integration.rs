//! CLI integration tests
//!
//! Runs the testsops binary against a shell-script stand-in for sops.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Get path to the testsops binary
fn testsops_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_testsops"))
}

/// Write a sops stand-in that prefixes its output with a marker line and
/// echoes stdin back.
fn stub_sops(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("sops");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn run_testsops(args: &[&str], sops: &Path) -> Output {
    Command::new(testsops_bin())
        .arg("--sops-binary")
        .arg(sops)
        .args(args)
        .output()
        .unwrap()
}

/// Parse `NAME=value` lines from stdout.
fn printed_path(output: &Output, name: &str) -> PathBuf {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let prefix = format!("{name}=");
    stdout
        .lines()
        .find_map(|l| l.strip_prefix(&prefix))
        .map(PathBuf::from)
        .unwrap_or_else(|| panic!("{name} missing from output: {stdout}"))
}

#[test]
fn test_encrypt_prints_kept_paths() {
    let bin = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let sops = stub_sops(bin.path(), "echo 'sops-stub'\ncat");
    let input = src.path().join("app.json");
    fs::write(&input, r#"{"FieldA":123}"#).unwrap();

    let result = run_testsops(&["encrypt", "-i", input.to_str().unwrap()], &sops);
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let key_path = printed_path(&result, "SOPS_AGE_KEY_FILE");
    let contents_path = printed_path(&result, "ENCRYPTED_CONTENTS_PATH");
    assert!(key_path.ends_with("key.txt"));
    assert!(contents_path.to_str().unwrap().ends_with(".enc.json"));
    assert!(fs::read_to_string(&key_path).unwrap().starts_with("AGE-SECRET-KEY-1"));
    assert_eq!(
        fs::read_to_string(&contents_path).unwrap(),
        "sops-stub\n{\"FieldA\":123}"
    );

    fs::remove_dir_all(key_path.parent().unwrap()).unwrap();
}

#[test]
fn test_format_flag_overrides_extension() {
    let bin = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let sops = stub_sops(bin.path(), "cat");
    let input = src.path().join("configfile");
    fs::write(&input, "KEY=value\n").unwrap();

    let result = run_testsops(
        &["encrypt", "-i", input.to_str().unwrap(), "--format", "env"],
        &sops,
    );
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let contents_path = printed_path(&result, "ENCRYPTED_CONTENTS_PATH");
    assert!(contents_path.to_str().unwrap().ends_with(".enc.env"));
    fs::remove_dir_all(contents_path.parent().unwrap()).unwrap();
}

#[test]
fn test_missing_extension_fails() {
    let bin = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let sops = stub_sops(bin.path(), "cat");
    let input = src.path().join("configfile");
    fs::write(&input, "a: 1\n").unwrap();

    let result = run_testsops(&["encrypt", "-i", input.to_str().unwrap()], &sops);
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("no extension"), "unexpected stderr: {stderr}");
    assert!(result.stdout.is_empty());
}

#[test]
fn test_sops_failure_is_reported() {
    let bin = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let sops = stub_sops(bin.path(), "echo 'stub refused' >&2\nexit 2");
    let input = src.path().join("app.yaml");
    fs::write(&input, "a: 1\n").unwrap();

    let result = run_testsops(&["encrypt", "-i", input.to_str().unwrap()], &sops);
    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("stub refused"), "sops stderr not passed through: {stderr}");
    assert!(stderr.contains("exit status 2"), "unexpected stderr: {stderr}");
}

#[test]
fn test_sops_binary_from_environment() {
    let bin = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let sops = stub_sops(bin.path(), "cat");
    let input = src.path().join("app.ini");
    fs::write(&input, "[a]\nb = c\n").unwrap();

    let result = Command::new(testsops_bin())
        .env("TESTSOPS_SOPS_BINARY", &sops)
        .args(["encrypt", "-i", input.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(
        result.status.success(),
        "encrypt failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let contents_path = printed_path(&result, "ENCRYPTED_CONTENTS_PATH");
    assert_eq!(fs::read_to_string(&contents_path).unwrap(), "[a]\nb = c\n");
    fs::remove_dir_all(contents_path.parent().unwrap()).unwrap();
}

#[test]
fn test_malformed_format_flag_fails() {
    let bin = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let marker = bin.path().join("ran");
    let sops = stub_sops(bin.path(), &format!("touch '{}'", marker.display()));
    let input = src.path().join("configfile");
    fs::write(&input, "a: 1\n").unwrap();

    for tag in ["", ".yaml", "a/b"] {
        let result = run_testsops(
            &["encrypt", "-i", input.to_str().unwrap(), "--format", tag],
            &sops,
        );
        assert!(!result.status.success(), "tag {tag:?} was accepted");
        let stderr = String::from_utf8_lossy(&result.stderr);
        assert!(stderr.contains("format tag"), "unexpected stderr: {stderr}");
        assert!(result.stdout.is_empty());
    }
    assert!(!marker.exists());
}
