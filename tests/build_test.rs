//! Integration tests for `repoforge build`
//!
//! Runs the binary against temporary package trees with shell one-liners
//! standing in for the real build toolchain.

mod common;

use common::{stderr, stdout, TestProject, FAIL_BROKEN};
use serde_json::Value;

fn state(project: &TestProject) -> Value {
    serde_json::from_str(&project.read_file(".repoforge/state.json")).unwrap()
}

fn summary(output: &std::process::Output) -> Value {
    let json: Value = serde_json::from_str(&stdout(output)).unwrap();
    json["summary"].clone()
}

fn abc_project() -> TestProject {
    let project = TestProject::new();
    project.add_package("a", "1.0", &[]);
    project.add_package("b", "1.0", &["a"]);
    project.add_package("c", "1.0", &["a"]);
    project
}

#[test]
fn test_build_records_every_success() {
    let project = abc_project();
    project.write_config(FAIL_BROKEN, "");

    let output = project.run(&["--json", "build"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let summary = summary(&output);
    assert_eq!(summary["succeeded"], 3);
    assert_eq!(summary["failed"].as_array().unwrap().len(), 0);

    let state = state(&project);
    for name in ["a", "b", "c"] {
        assert_eq!(state["packages"][name]["version"], "1.0-1");
    }
}

#[test]
fn test_second_run_builds_nothing() {
    let project = abc_project();
    project.write_config(FAIL_BROKEN, "");

    assert!(project.run(&["build"]).status.success());
    let output = project.run(&["--json", "build"]);
    assert!(output.status.success());

    let summary = summary(&output);
    assert_eq!(summary["succeeded"], 0);
    assert_eq!(summary["up_to_date"], 3);
}

#[test]
fn test_failure_skips_dependents_only() {
    let project = TestProject::new();
    project.add_package("broken", "1.0", &[]);
    project.add_package("child", "1.0", &["broken"]);
    project.add_package("other", "1.0", &[]);
    project.write_config(FAIL_BROKEN, "");

    let output = project.run(&["--json", "build"]);
    assert!(!output.status.success());

    let summary = summary(&output);
    assert_eq!(summary["failed"], serde_json::json!(["broken"]));
    assert_eq!(summary["skipped"], serde_json::json!(["child"]));
    assert_eq!(summary["succeeded"], 1);

    let state = state(&project);
    assert!(state["packages"]["broken"].is_null());
    assert!(state["packages"]["child"].is_null());
    assert_eq!(state["packages"]["other"]["version"], "1.0-1");

    let log = project.read_file(".repoforge/logs/broken-1.0-1.log");
    assert!(log.contains("building broken"));
    assert!(project.file_exists(".repoforge/logs/broken-1.0-1.failed"));
}

#[test]
fn test_failure_marker_honored_when_configured() {
    let project = TestProject::new();
    project.add_package("a", "1.0", &[]);
    project.write_config("sh -c 'touch built'", "honor_failure_markers = true\n");
    project.create_file(".repoforge/logs/a-1.0-1.failed", "");

    let output = project.run(&["build"]);
    assert!(!output.status.success());
    assert!(!project.file_exists("packages/a/built"));
}

#[test]
fn test_build_runs_in_package_directory() {
    let project = TestProject::new();
    project.add_package("a", "1.0", &[]);
    project.write_config("sh -c 'touch built'", "");

    let output = project.run(&["build"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(project.file_exists("packages/a/built"));
}

#[test]
fn test_dry_run_leaves_state_alone() {
    let project = abc_project();
    project.write_config(FAIL_BROKEN, "");

    let output = project.run(&["build", "--dry-run"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("1. a"));
    assert!(!project.file_exists(".repoforge/state.json"));
}

#[test]
fn test_package_flag_builds_dependencies_too() {
    let project = abc_project();
    project.write_config(FAIL_BROKEN, "");

    let output = project.run(&["build", "--package", "b"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let state = state(&project);
    assert!(!state["packages"]["a"].is_null());
    assert!(!state["packages"]["b"].is_null());
    assert!(state["packages"]["c"].is_null());
}

#[test]
fn test_unknown_package_flag_fails() {
    let project = abc_project();
    project.write_config(FAIL_BROKEN, "");

    let output = project.run(&["build", "--package", "zzz"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("zzz"));
}

#[test]
fn test_cycle_aborts_before_any_build() {
    let project = TestProject::new();
    project.add_package("a", "1.0", &["b"]);
    project.add_package("b", "1.0", &["a"]);
    project.write_config("sh -c 'touch built'", "");

    let output = project.run(&["build"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Circular dependency"));
    assert!(!project.file_exists("packages/a/built"));
    assert!(!project.file_exists("packages/b/built"));
}

#[test]
fn test_missing_build_command_is_reported() {
    let project = abc_project();
    project.write_config("no-such-build-tool --all", "");

    let output = project.run(&["build"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no-such-build-tool"));
}

#[test]
fn test_run_log_is_written() {
    let project = abc_project();
    project.write_config(FAIL_BROKEN, "");

    assert!(project.run(&["build"]).status.success());

    let logs = std::fs::read_dir(project.path().join(".repoforge/logs")).unwrap();
    let run_logs: Vec<_> = logs
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("run-"))
        .collect();
    assert_eq!(run_logs.len(), 1);

    let run: Value =
        serde_json::from_str(&std::fs::read_to_string(run_logs[0].path()).unwrap()).unwrap();
    assert_eq!(run["records"].as_array().unwrap().len(), 3);
}

#[test]
fn test_timeout_fails_the_package() {
    let project = TestProject::new();
    project.add_package("slow", "1.0", &[]);
    project.write_config("sleep 30", "");

    let output = project.run(&["--json", "build", "--timeout", "1"]);
    assert!(!output.status.success());
    assert_eq!(summary(&output)["failed"], serde_json::json!(["slow"]));
}

#[test]
fn test_fresh_package_in_between_keeps_dependents_waiting() {
    let project = TestProject::new();
    project.add_package("broken", "1.0", &[]);
    project.add_package("middle", "1.0", &["broken"]);
    project.add_package("top", "1.0", &["middle"]);
    project.create_file(
        ".repoforge/state.json",
        r#"{"version":1,"packages":{"middle":{"version":"1.0-1","built_at":0}}}"#,
    );
    project.write_config(FAIL_BROKEN, "");

    let output = project.run(&["--json", "build"]);
    assert!(!output.status.success());

    let summary = summary(&output);
    assert_eq!(summary["failed"], serde_json::json!(["broken"]));
    assert_eq!(summary["skipped"], serde_json::json!(["top"]));
    assert!(!project.file_exists(".repoforge/logs/top-1.0-1.log"));
    assert!(state(&project)["packages"]["top"].is_null());
}

#[test]
fn test_timeout_stops_background_work() {
    let project = TestProject::new();
    project.add_package("slow", "1.0", &[]);
    project.write_config("sh -c '(sleep 3; touch late) & wait'", "");

    let output = project.run(&["build", "--timeout", "1"]);
    assert!(!output.status.success());

    std::thread::sleep(std::time::Duration::from_secs(4));
    assert!(!project.file_exists("packages/slow/late"));
}
