use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docledger_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docledger"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Create test files
    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("ops")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "---\ntitle: Alpha Document\ntags: [rust, tooling]\n---\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(
        files_dir.join("ops/gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(files_dir.join("debug.log"), "Docker daemon noise").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ledger.sqlite"

[chunking]
max_chars = 400
overlap_chars = 50

[search]
max_page_size = 50

[server]
bind = "127.0.0.1:7399"
"#,
        root.display(),
    );

    let config_path = config_dir.join("docledger.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docledger_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docledger binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_json(config_path: &Path, args: &[&str]) -> Value {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    let (stdout, stderr, success) = run(config_path, &full);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON ({}): {}", e, stdout))
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_index_then_reindex_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);
    let folder = files.to_str().unwrap();

    run(&config_path, &["init"]);
    let first = run_json(&config_path, &["index", folder, "--progress", "off"]);
    assert_eq!(first["files_processed"], 3);
    assert_eq!(first["files_failed"], 0);

    let second = run_json(&config_path, &["index", folder, "--progress", "off"]);
    assert_eq!(second["files_processed"], 0);
    assert_eq!(second["files_skipped"], 3);

    let folders = run_json(&config_path, &["folders", "list"]);
    assert_eq!(folders.as_array().unwrap().len(), 1);
    assert_eq!(folders[0]["file_count"], 3);
}

#[test]
fn test_excluded_files_are_not_indexed() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    run(&config_path, &["init"]);
    run_json(&config_path, &["index", files.to_str().unwrap(), "--progress", "off"]);

    let found = run_json(&config_path, &["search", "daemon"]);
    assert_eq!(found["total"], 0);
}

#[test]
fn test_ingest_versions_and_diff() {
    let (_tmp, config_path) = setup_test_env();
    let note = files_dir(&config_path).join("docker.md");
    let note_str = note.to_str().unwrap();

    run(&config_path, &["init"]);

    fs::write(&note, "# Docker\nUse volumes for persistence.").unwrap();
    let v1 = run_json(&config_path, &["ingest", note_str]);
    assert_eq!(v1["created_new_version"], true);
    assert_eq!(v1["version"], 1);

    let again = run_json(&config_path, &["ingest", note_str]);
    assert_eq!(again["created_new_version"], false);
    assert_eq!(again["version"], 1);

    fs::write(&note, "# Docker\nUse named volumes for persistence.").unwrap();
    let v2 = run_json(&config_path, &["ingest", note_str]);
    assert_eq!(v2["version"], 2);

    let versions = run_json(&config_path, &["versions", note_str]);
    let versions = versions.as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["version"], 2);
    assert_eq!(versions[0]["is_latest"], true);
    assert_eq!(versions[1]["is_latest"], false);

    let diff = run_json(&config_path, &["diff", note_str, "1", "2"]);
    assert_eq!(diff["summary"]["added"], 1);
    assert_eq!(diff["summary"]["removed"], 1);
    assert_eq!(diff["summary"]["unchanged"], 1);

    let (stdout, _, success) = run(&config_path, &["diff", note_str, "1", "2"]);
    assert!(success);
    assert!(stdout.contains("-    2 Use volumes for persistence."));
    assert!(stdout.contains("+    2 Use named volumes for persistence."));
}

#[test]
fn test_search_history_flag() {
    let (_tmp, config_path) = setup_test_env();
    let note = files_dir(&config_path).join("docker.md");
    let note_str = note.to_str().unwrap();

    run(&config_path, &["init"]);
    fs::write(&note, "# Docker\nUse volumes for persistence.").unwrap();
    run_json(&config_path, &["ingest", note_str]);
    fs::write(&note, "# Docker\nUse named volumes for persistence.").unwrap();
    run_json(&config_path, &["ingest", note_str]);

    let latest = run_json(&config_path, &["search", "docker"]);
    assert_eq!(latest["total"], 1);
    assert_eq!(latest["results"][0]["version"], 2);

    let all = run_json(&config_path, &["search", "docker", "--history"]);
    assert_eq!(all["total"], 2);
    let stale: Vec<&Value> = all["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["is_latest"] == false)
        .collect();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0]["version"], 1);
}

#[test]
fn test_search_filters_and_human_output() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    run(&config_path, &["init"]);
    run_json(&config_path, &["index", files.to_str().unwrap(), "--progress", "off"]);

    let by_tag = run_json(&config_path, &["search", "document", "--tag", "rust"]);
    assert_eq!(by_tag["total"], 1);
    assert_eq!(by_tag["results"][0]["document"]["title"], "Alpha Document");

    let by_type = run_json(&config_path, &["search", "docker OR rust", "--type", "txt"]);
    assert_eq!(by_type["total"], 1);
    assert_eq!(by_type["results"][0]["document"]["extension"], "txt");

    let ops = files.join("ops");
    let by_folder = run_json(
        &config_path,
        &["search", "docker OR rust", "--folder", ops.to_str().unwrap()],
    );
    assert_eq!(by_folder["total"], 1);

    let (stdout, _, success) = run(&config_path, &["search", "kubernetes"]);
    assert!(success);
    assert!(stdout.contains("gamma.txt"));
    assert!(stdout.contains("**Kubernetes**"));
}

#[test]
fn test_retention_and_purge() {
    let (_tmp, config_path) = setup_test_env();
    let note = files_dir(&config_path).join("log.md");
    let note_str = note.to_str().unwrap();

    run(&config_path, &["init"]);
    for body in ["one", "two", "three"] {
        fs::write(&note, body).unwrap();
        run_json(&config_path, &["ingest", note_str]);
    }

    let policy = run_json(&config_path, &["retention", "show"]);
    assert_eq!(policy["type"], "all");

    run_json(&config_path, &["retention", "set", "last_n_versions", "1"]);

    let preview = run_json(&config_path, &["purge", "--dry-run"]);
    assert_eq!(preview["dry_run"], true);
    assert_eq!(preview["versions_deleted"], 2);

    // Dry run deleted nothing.
    let versions = run_json(&config_path, &["versions", note_str]);
    assert_eq!(versions.as_array().unwrap().len(), 3);

    let purged = run_json(&config_path, &["purge"]);
    assert_eq!(purged["versions_deleted"], 2);
    assert_eq!(purged["candidates"], preview["candidates"]);

    let versions = run_json(&config_path, &["versions", note_str]);
    let versions = versions.as_array().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["version"], 3);
    assert_eq!(versions[0]["is_latest"], true);
}

#[test]
fn test_ask_returns_citations() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    run(&config_path, &["init"]);
    run_json(&config_path, &["index", files.to_str().unwrap(), "--progress", "off"]);

    let answer = run_json(
        &config_path,
        &["ask", "How is Kubernetes used for deployment?"],
    );
    let chunks = answer["answer_context_chunks"].as_array().unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks[0]["text"].as_str().unwrap().contains("Kubernetes"));
    assert_eq!(answer["citations"][0]["is_latest"], true);
}

#[test]
fn test_projects_and_folders() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);
    let folder = files.to_str().unwrap();

    run(&config_path, &["init"]);
    run_json(&config_path, &["projects", "create", "work", "Work"]);
    run_json(&config_path, &["index", folder, "--project", "work", "--progress", "off"]);

    let notes = run_json(&config_path, &["notes", "--project", "work"]);
    assert_eq!(notes["total"], 3);

    let (_, stderr, success) = run(&config_path, &["projects", "delete", "work"]);
    assert!(!success);
    assert!(stderr.contains("error[INVALID_INPUT]"), "stderr={}", stderr);

    let removed = run_json(&config_path, &["folders", "remove", folder]);
    assert_eq!(removed["documents_removed"], 3);

    let (_, stderr, success) = run(&config_path, &["projects", "delete", "work"]);
    assert!(success, "stderr={}", stderr);
}

#[test]
fn test_error_codes_surface_on_stderr() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["init"]);

    let (_, stderr, success) = run(&config_path, &["get", "no/such/note.md"]);
    assert!(!success);
    assert!(stderr.contains("error[NOT_FOUND]"), "stderr={}", stderr);

    let (_, stderr, success) = run(&config_path, &["search", "docker", "--limit", "1000"]);
    assert!(!success);
    assert!(stderr.contains("error[LIMIT_EXCEEDED]"), "stderr={}", stderr);

    let (_, stderr, success) = run(&config_path, &["diff", "a.md", "0", "1"]);
    assert!(!success);
    assert!(stderr.contains("error[INVALID_INPUT]"), "stderr={}", stderr);

    let (_, stderr, success) = run(&config_path, &["index", "/definitely/not/here"]);
    assert!(!success);
    assert!(stderr.contains("error[NOT_FOUND]"), "stderr={}", stderr);

    let (_, stderr, success) = run(&config_path, &["retention", "set", "last_n_days"]);
    assert!(!success);
    assert!(stderr.contains("error[INVALID_INPUT]"), "stderr={}", stderr);
}

#[test]
fn test_completions_without_config() {
    let output = Command::new(docledger_binary())
        .args(["--config", "/nonexistent.toml", "completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("docledger"));
}
