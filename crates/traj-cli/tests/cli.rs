//! CLI command integration tests.
//! Each test uses a temp directory via TRAJ_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn traj_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("traj").unwrap();
    cmd.env("TRAJ_DATA_DIR", data_dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Half-second samples over [0, 10]: 21 samples at exact binary instants.
fn generate_coarse(dir: &TempDir, name: &str) {
    traj_cmd(dir)
        .args(["generate", name, "--step", "0.5", "--no-downsampling"])
        .assert()
        .success()
        .stdout(predicate::str::contains("21 samples → 21 retained"));
}

fn stat_value(stdout: &str, key: &str) -> String {
    stdout
        .lines()
        .find(|l| l.starts_with(key))
        .map(|l| l[key.len()..].trim().to_string())
        .unwrap_or_default()
}

#[test]
fn list_fresh_dir() {
    let dir = TempDir::new().unwrap();
    traj_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no trajectories)"));
}

#[test]
fn generate_downsampled_circle_then_stats() {
    let dir = TempDir::new().unwrap();
    traj_cmd(&dir)
        .args([
            "generate",
            "circle",
            "--max-dense",
            "50",
            "--tolerance",
            "0.001",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("1001 samples → 77 retained in 1 segments"));

    let output = traj_cmd(&dir).args(["stats", "circle"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stat_value(&stdout, "samples:"), "77");
    assert_eq!(stat_value(&stdout, "branches:"), "1");
    assert!(stdout.contains("branch 0: root, 1 segments, 77 samples, [0 s, 10 s]"));

    traj_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("circle\tframe=World\tsegments=1\tsamples=77"));
}

#[test]
fn generate_refuses_existing_name() {
    let dir = TempDir::new().unwrap();
    generate_coarse(&dir, "orbit");
    traj_cmd(&dir)
        .args(["generate", "orbit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    traj_cmd(&dir)
        .args(["generate", "orbit", "--force", "--step", "0.25", "--no-downsampling"])
        .assert()
        .success()
        .stdout(predicate::str::contains("41 samples"));
}

#[test]
fn generate_rejects_oversized_timeline() {
    let dir = TempDir::new().unwrap();
    traj_cmd(&dir)
        .args(["generate", "huge", "--to", "1e12", "--step", "1e-9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds"));
    traj_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no trajectories)"));
}

#[test]
fn generate_with_continuation_segments() {
    let dir = TempDir::new().unwrap();
    traj_cmd(&dir)
        .args([
            "generate",
            "chunked",
            "--step",
            "0.5",
            "--segment-samples",
            "10",
            "--no-downsampling",
        ])
        .assert()
        .success();

    let output = traj_cmd(&dir).args(["stats", "chunked"]).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    // Each continuation starts with a copy of the previous segment's last sample.
    assert_eq!(stat_value(&stdout, "segments:"), "3");
    assert!(stdout.contains("branch 0: root, 3 segments, 21 samples"));
}

#[test]
fn evaluate_inside_and_outside() {
    let dir = TempDir::new().unwrap();
    generate_coarse(&dir, "orbit");

    traj_cmd(&dir)
        .args(["evaluate", "orbit", "2.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("time:     2.5 s"))
        .stdout(predicate::str::contains("position: "))
        .stdout(predicate::str::contains("velocity: "));

    traj_cmd(&dir)
        .args(["evaluate", "orbit", "12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside"));
}

#[test]
fn fork_then_forget_after_removes_branch() {
    let dir = TempDir::new().unwrap();
    generate_coarse(&dir, "orbit");

    traj_cmd(&dir)
        .args(["fork", "orbit", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("forked branch 1 from branch 0 at 5 s"));

    let output = traj_cmd(&dir).args(["stats", "orbit"]).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stat_value(&stdout, "branches:"), "2");
    assert!(stdout.contains("branch 1: fork at 5 s"));

    traj_cmd(&dir)
        .args(["evaluate", "orbit", "5", "--branch", "1"])
        .assert()
        .success();

    traj_cmd(&dir)
        .args(["forget-after", "orbit", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains("forgot 13 samples and 1 branches after 4 s"));

    traj_cmd(&dir)
        .args(["evaluate", "orbit", "3", "--branch", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no branch 1"));
}

#[test]
fn forget_before_refuses_to_orphan_forks() {
    let dir = TempDir::new().unwrap();
    generate_coarse(&dir, "orbit");
    traj_cmd(&dir).args(["fork", "orbit", "5"]).assert().success();

    traj_cmd(&dir)
        .args(["forget-before", "orbit", "6"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot forget before 6 s"));

    traj_cmd(&dir)
        .args(["delete-branch", "orbit", "--branch", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted 1 branches"));

    traj_cmd(&dir)
        .args(["forget-before", "orbit", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("forgot 12 samples before 6 s"));
}

#[test]
fn delete_branch_refuses_root() {
    let dir = TempDir::new().unwrap();
    generate_coarse(&dir, "orbit");
    traj_cmd(&dir)
        .args(["delete-branch", "orbit", "--branch", "0"])
        .assert()
        .failure();
}

#[test]
fn export_then_import_under_new_name() {
    let dir = TempDir::new().unwrap();
    generate_coarse(&dir, "orbit");
    traj_cmd(&dir).args(["fork", "orbit", "2"]).assert().success();

    let path = dir.path().join("orbit.json");
    traj_cmd(&dir)
        .args(["export", "orbit"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("exported 'orbit'"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["frame"], "World");
    assert_eq!(json["segments"].as_array().unwrap().len(), 2);

    traj_cmd(&dir)
        .args(["import", "orbit"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    traj_cmd(&dir)
        .args(["import", "copy"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("segments=2, samples=22, branches=2"));

    traj_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("copy\t"))
        .stdout(predicate::str::contains("orbit\t"));
}

#[test]
fn import_rejects_malformed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"version":"1","frame":"World","segments":[]}"#).unwrap();
    traj_cmd(&dir)
        .args(["import", "bad"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to import JSON"));
    traj_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no trajectories)"));
}

#[test]
fn delete_then_stats_fails() {
    let dir = TempDir::new().unwrap();
    generate_coarse(&dir, "orbit");
    traj_cmd(&dir)
        .args(["delete", "orbit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted 'orbit'"));
    traj_cmd(&dir)
        .args(["stats", "orbit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no trajectory named"));
    traj_cmd(&dir).args(["delete", "orbit"]).assert().failure();
}

#[test]
fn config_file_sets_defaults() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "kernel = \"fma\"\n\n[downsampling]\nenabled = false\n",
    )
    .unwrap();
    traj_cmd(&dir)
        .args(["generate", "dense"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1001 samples → 1001 retained"));

    let path = dir.path().join("dense.json");
    traj_cmd(&dir).args(["export", "dense"]).arg(&path).assert().success();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["segments"][0]["kernel"], "fma");
    assert!(json["segments"][0]["downsampling"].is_null());
}

#[test]
fn invalid_config_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "kernel = \"avx\"\n").unwrap();
    traj_cmd(&dir)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open data directory"));
}
