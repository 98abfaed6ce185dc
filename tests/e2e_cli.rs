//! CLI end-to-end tests
//!
//! Tests for the photoforge command-line interface.

#![cfg(unix)]

mod common;

use assert_cmd::prelude::*;
use common::{dataset, FakeTools};
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the photoforge binary
#[allow(deprecated)]
fn photoforge_cmd() -> Command {
    Command::cargo_bin("photoforge").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = photoforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = photoforge_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("photoforge"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = photoforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_run_help() {
    let mut cmd = photoforge_cmd();
    cmd.args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconstruct a textured mesh"))
        .stdout(predicate::str::contains("--profile"));
}

#[test]
fn test_cli_check_tools_with_fake_tools() {
    let tools = FakeTools::new();
    let dir = tempdir().unwrap();
    let config = tools.write_config(dir.path());

    let mut cmd = photoforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ colmap (COLMAP 3.9 (fake))"))
        .stdout(predicate::str::contains("TextureMesh"));
}

#[test]
fn test_cli_check_tools_reports_missing() {
    let tools = FakeTools::new().without("RefineMesh");
    let dir = tempdir().unwrap();
    let config = tools.write_config(dir.path());

    let mut cmd = photoforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("✗ RefineMesh"))
        .stdout(predicate::str::contains("Some tools are missing"));
}

#[test]
fn test_cli_profile_shows_parameters() {
    let mut cmd = photoforge_cmd();
    cmd.args(["profile", "speed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SPEED (skip refine: false)"))
        .stdout(predicate::str::contains("--SiftExtraction.max_image_size 1600"));
}

#[test]
fn test_cli_profile_json() {
    let output = photoforge_cmd()
        .args(["profile", "BALANCED", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["BALANCED"]["skip_refine"], true);
    assert_eq!(
        json["BALANCED"]["steps"]["image_undistorter"][0]["flag"],
        "--max_image_size"
    );
}

#[test]
fn test_cli_run_rejects_empty_dataset() {
    let data = tempdir().unwrap();
    let out = tempdir().unwrap();
    let result = out.path().join("result");

    let mut cmd = photoforge_cmd();
    cmd.arg("run")
        .arg(data.path())
        .arg("--result")
        .arg(&result)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing input"));
    assert!(!result.exists());
}

#[test]
fn test_cli_run_with_fake_tools() {
    let tools = FakeTools::new();
    let data = dataset(2);
    let dir = tempdir().unwrap();
    let config = tools.write_config(dir.path());
    let result = dir.path().join("result");

    let mut cmd = photoforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .args(["run", "--profile", "speed", "--device", "cpu", "--result"])
        .arg(&result)
        .arg(data.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("--- Stage 1/7: SparseReconstruct ---"))
        .stdout(predicate::str::contains("Reconstruction complete!"));

    assert!(result.join("result.obj").exists());
}

#[test]
fn test_cli_run_json_and_clean() {
    let tools = FakeTools::new();
    let data = dataset(2);
    let dir = tempdir().unwrap();
    let config = tools.write_config(dir.path());
    let result = dir.path().join("result");

    let output = photoforge_cmd()
        .arg("--config")
        .arg(&config)
        .args(["run", "--json", "--clean", "--result"])
        .arg(&result)
        .arg(data.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "succeeded");
    assert_eq!(report["profile"], "BALANCED");
    assert_eq!(report["progress"], 100);

    let mut left: Vec<String> = fs::read_dir(&result)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(
        left,
        vec!["result.mtl", "result.obj", "result_material_0_map_Kd.jpg"]
    );
}

#[test]
fn test_cli_run_failure_reports_stage() {
    let tools = FakeTools::new().failing("DensifyPointCloud");
    let data = dataset(2);
    let dir = tempdir().unwrap();
    let config = tools.write_config(dir.path());

    let mut cmd = photoforge_cmd();
    cmd.arg("--config")
        .arg(&config)
        .args(["run", "--result"])
        .arg(dir.path().join("result"))
        .arg(data.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("at DensifyPointCloud"))
        .stderr(predicate::str::contains("fatal error"));
}

#[test]
fn test_cli_clean_command() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("result.obj"), b"obj").unwrap();
    fs::write(dir.path().join("scene.mvs"), b"mvs").unwrap();
    fs::create_dir_all(dir.path().join("images_temp")).unwrap();

    let mut cmd = photoforge_cmd();
    cmd.arg("clean")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 entries, kept 1 result files"));

    assert!(dir.path().join("result.obj").exists());
    assert!(!dir.path().join("scene.mvs").exists());
}

#[test]
fn test_cli_validate_valid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("photoforge.toml");
    fs::write(&path, "[pipeline]\nprofile = \"QUALITY\"\n").unwrap();

    let mut cmd = photoforge_cmd();
    cmd.arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Profile: QUALITY"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("photoforge.toml");
    fs::write(&path, "[pipeline\nprofile = ").unwrap();

    let mut cmd = photoforge_cmd();
    cmd.arg("validate").arg(&path).assert().failure();
}
