//! End-to-end call-graph profiling of Python targets
//!
//! Skipped (passing) when no `python3` is on `PATH`.
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::process::Command;

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

const WORKLOAD: &str = r#"import time


def work():
    time.sleep(0.05)
    return 7


def main():
    total = 0
    for _ in range(3):
        total += work()
    print("total", total)


main()
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
#[serial]
fn test_python_inline_code() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    cmd.args(["--", "python3", "-c", "print(42)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit code: 0"))
        .stdout(predicate::str::contains("42"));
}

#[test]
#[serial]
fn test_python_script_call_sites() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "workload.py", WORKLOAD);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    cmd.arg("python3")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("total 21"))
        .stdout(predicate::str::contains("workload:work:4"))
        .stdout(predicate::str::contains("workload:main:9"))
        .stdout(predicate::str::contains("MOST CALLED FUNCTIONS"))
        .stdout(predicate::str::contains("<module>").not());
}

#[test]
#[serial]
fn test_bare_script_uses_default_interpreter() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "workload.py", WORKLOAD);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    let output = cmd
        .args(["--format", "json"])
        .arg(&script)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["classification"], "explicit_script");
    assert_eq!(json["strategy"], "call-graph");

    let rows = json["views"]["by_call_count"].as_array().unwrap();
    let work = rows.iter().find(|r| r["key"] == "workload:work:4").unwrap();
    assert_eq!(work["call_count"], 3);
    let avg = work["avg_time"].as_f64().unwrap();
    let cum = work["cumulative_time"].as_f64().unwrap();
    assert!((avg * 3.0 - cum).abs() < 1e-9);
}

#[test]
#[serial]
fn test_inline_code_imports_from_working_directory() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "localmod.py", "VALUE = 7\n");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    cmd.current_dir(dir.path())
        .args(["--", "python3", "-c", "import localmod; print(localmod.VALUE)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit code: 0"))
        .stdout(predicate::str::contains("STDOUT:\n7\n"))
        .stdout(predicate::str::contains("ModuleNotFoundError").not());
}

#[test]
#[serial]
fn test_attached_module_option() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "localmod.py", "print('ran as', __name__)\n");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    cmd.current_dir(dir.path())
        .args(["--", "python3", "-mlocalmod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit code: 0"))
        .stdout(predicate::str::contains("ran as __main__"));
}

#[test]
#[serial]
fn test_program_read_from_stdin() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    cmd.args(["--", "python3", "-"])
        .write_stdin("print(6 * 7)\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit code: 0"))
        .stdout(predicate::str::contains("STDOUT:\n42\n"));
}

#[test]
#[serial]
fn test_python_exit_code_propagates() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    cmd.args(["--", "python3", "-c", "import sys; sys.exit(3)"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit code: 3"));
}

#[test]
#[serial]
fn test_python_exception_reported() {
    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    cmd.args(["--", "python3", "-c", "raise ValueError('bad input')"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit code: 1"))
        .stdout(predicate::str::contains("ValueError: bad input"));
}

#[cfg(unix)]
#[test]
#[serial]
fn test_managed_tool_resolved_through_path() {
    use std::os::unix::fs::PermissionsExt;

    if !python_available() {
        eprintln!("python3 not available, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let launcher = write_script(
        dir.path(),
        "yolo",
        &format!("#!/usr/bin/env python3\n{}", WORKLOAD),
    );
    fs::set_permissions(&launcher, fs::Permissions::from_mode(0o755)).unwrap();

    let path = std::env::var("PATH").unwrap_or_default();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    let output = cmd
        .env("PATH", format!("{}:{}", dir.path().display(), path))
        .args(["--format", "json", "yolo", "predict"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["classification"], "known_managed_tool");
    assert_eq!(json["strategy"], "call-graph");
    assert!(json["outcome"]["stdout"]
        .as_str()
        .unwrap()
        .contains("total 21"));

    // the directive line shifts the workload down by one
    let rows = json["views"]["by_cumulative_time"].as_array().unwrap();
    assert!(rows.iter().any(|r| r["key"] == "yolo:work:5"));
}

#[cfg(unix)]
#[test]
#[serial]
fn test_native_managed_tool_falls_back() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let launcher = write_script(dir.path(), "pytest", "#!/bin/sh\necho native tool\n");
    fs::set_permissions(&launcher, fs::Permissions::from_mode(0o755)).unwrap();

    let path = std::env::var("PATH").unwrap_or_default();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cmdprof");
    let output = cmd
        .env("PATH", format!("{}:{}", dir.path().display(), path))
        .args(["--format", "json", "pytest", "-q"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["classification"], "known_managed_tool");
    assert_eq!(json["strategy"], "wall-clock");
    assert_eq!(json["fallback"], "no managed interpreter directive");
    assert_eq!(
        json["views"]["by_cumulative_time"][0]["key"],
        "pytest -q:total_execution:0"
    );
}
