use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sqa");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[cursor]
path = "{}/cursors.json"

[server]
bind = "127.0.0.1:7831"
"#,
        root.display()
    );

    let config_path = root.join("sqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        // Keep tests hermetic: no ambient credentials, no .env pickup.
        .env_remove("SLACK_BOT_TOKEN")
        .env_remove("OPENAI_API_KEY")
        .current_dir(config_path.parent().unwrap())
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_stats_without_ingestion() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sqa(&config_path, &["stats", "general"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("no ingestion recorded"));
}

#[test]
fn test_stats_reads_persisted_cursor() {
    let (tmp, config_path) = setup_test_env();

    fs::write(
        tmp.path().join("cursors.json"),
        r#"{"general": {"last_timestamp": "1727000000.000500", "total_messages": 42,
            "last_updated": "2024-09-22T10:53:20+00:00"}}"#,
    )
    .unwrap();

    let (stdout, _, success) = run_sqa(&config_path, &["stats", "general"]);
    assert!(success);
    assert!(stdout.contains("last timestamp: 1727000000.000500"));
    assert!(stdout.contains("total messages: 42"));
}

#[test]
fn test_corrupt_cursor_file_degrades_to_empty() {
    let (tmp, config_path) = setup_test_env();

    fs::write(tmp.path().join("cursors.json"), "{broken").unwrap();

    let (stdout, _, success) = run_sqa(&config_path, &["stats", "general"]);
    assert!(success, "corrupt cursor file must not be fatal");
    assert!(stdout.contains("no ingestion recorded"));
}

#[test]
fn test_ingest_requires_slack_token() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sqa(&config_path, &["ingest", "general"]);
    assert!(!success, "ingest without a token must fail: {}", stdout);
    assert!(stderr.contains("SLACK_BOT_TOKEN"));
}

#[test]
fn test_ask_rejects_out_of_range_top_k() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_sqa(
        &config_path,
        &["ask", "general", "anything", "--top-k", "21"],
    );
    assert!(!success);
    assert!(stderr.contains("top-k"));
}

#[test]
fn test_malformed_config_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("sqa.toml");
    fs::write(&config_path, "[embedding\nprovider=").unwrap();

    let (_, stderr, success) = run_sqa(&config_path, &["stats", "general"]);
    assert!(!success);
    assert!(stderr.contains("parse"));
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("does-not-exist.toml");

    let (stdout, stderr, success) = run_sqa(&config_path, &["stats", "general"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("no ingestion recorded"));
}
