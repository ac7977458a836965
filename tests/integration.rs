//! End-to-end tests of the `ngr` binary.
//!
//! Extraction is served from pre-seeded cache entries and embeddings are
//! disabled, so no test talks to a network service.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use notegraph_core::cache::CacheKey;
use notegraph_core::extract::render_prompt;
use notegraph_core::models::{content_hash, source_id_for};

const TEMPLATE: &str = "Extract triplets and evidence as JSON.\n\nCONTENT_PLACEHOLDER\n";

const ALPHA: &str = "# Alpha\n\nRust is a systems language. Cargo builds crates.";
const BETA: &str = "# Beta\n\nTokio is an async runtime for Rust.";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("extract_prompt.txt"), TEMPLATE).unwrap();

    let notes_dir = root.join("notes");
    fs::create_dir_all(&notes_dir).unwrap();
    fs::write(notes_dir.join("alpha.md"), ALPHA).unwrap();
    fs::write(notes_dir.join("beta.md"), BETA).unwrap();
    fs::write(notes_dir.join("ignored.txt"), "not a note").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/graph.sqlite"

[notes]
root = "{root}/notes"

[cache]
dir = "{root}/storage"

[extraction]
prompt_file = "{root}/config/extract_prompt.txt"
model = "test-model"
base_url = "http://127.0.0.1:9/v1"
api_key_env = ""
timeout_secs = 2
max_retries = 0

[audit]
rag_log = "{root}/logs/rag_log.jsonl"
direct_log = "{root}/logs/direct_log.jsonl"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("notegraph.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Write the cache entry a sync of `name` with content `text` will look up.
fn seed_cache(root: &Path, name: &str, text: &str, payload: serde_json::Value) {
    let source_id = source_id_for(name);
    let key = CacheKey::new(source_id, content_hash(&render_prompt(TEMPLATE, text)));
    let dir = root.join("storage");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join(key.entry_name()),
        serde_json::to_vec_pretty(&payload).unwrap(),
    )
    .unwrap();
}

fn seed_all(root: &Path) {
    seed_cache(
        root,
        "alpha.md",
        ALPHA,
        serde_json::json!({
            "triplets": [
                {"head": "Rust", "relation": "is a", "tail": "Systems Language"},
                {"head": "Cargo", "relation": "builds", "tail": "Crates"}
            ],
            "chunks": [
                {"content": "Rust is a systems language.", "subject": "Rust", "predicate": "describes"}
            ]
        }),
    );
    seed_cache(
        root,
        "beta.md",
        BETA,
        serde_json::json!({
            "triplets": [{"head": "Tokio", "relation": "IS_A", "tail": "Runtime"}],
            "chunks": [
                {"content": "Tokio is an async runtime.", "subject": "Tokio", "predicate": "describes"}
            ]
        }),
    );
}

fn run_ngr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = env!("CARGO_BIN_EXE_ngr");
    let output = Command::new(binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ngr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ngr(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/graph.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ngr(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ngr(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_sync_from_cache() {
    let (tmp, config_path) = setup_test_env();
    seed_all(tmp.path());

    let (stdout, stderr, success) =
        run_ngr(&config_path, &["sync", "--progress", "off"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("notes found: 2"), "{}", stdout);
    assert!(stdout.contains("  written: 2"), "{}", stdout);
    assert!(stdout.contains("cache hits: 2"), "{}", stdout);
    assert!(stdout.contains("relations written: 3"), "{}", stdout);
    assert!(stdout.contains("ok"));
}

#[test]
fn test_sync_unchanged_is_noop() {
    let (tmp, config_path) = setup_test_env();
    seed_all(tmp.path());

    run_ngr(&config_path, &["sync", "--progress", "off"]);
    let (stdout, _, success) = run_ngr(&config_path, &["sync", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("  written: 0"), "{}", stdout);
    assert!(stdout.contains("unchanged: 2"), "{}", stdout);

    let (stdout, _, success) = run_ngr(&config_path, &["sync", "--full", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("  written: 2"), "{}", stdout);
}

#[test]
fn test_sync_dry_run() {
    let (tmp, config_path) = setup_test_env();
    seed_all(tmp.path());

    let (stdout, _, success) = run_ngr(&config_path, &["sync", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("would sync: 2"), "{}", stdout);
}

#[test]
fn test_sync_unreachable_extractor_skips_note() {
    let (tmp, config_path) = setup_test_env();
    seed_all(tmp.path());
    fs::write(tmp.path().join("notes/gamma.md"), "Uncached note.").unwrap();

    let (stdout, stderr, success) = run_ngr(&config_path, &["sync", "--progress", "off"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("  written: 2"), "{}", stdout);
    assert!(stdout.contains("failed: 1"), "{}", stdout);
    assert!(stdout.contains("gamma.md"), "{}", stdout);
}

#[test]
fn test_stats_after_sync() {
    let (tmp, config_path) = setup_test_env();
    seed_all(tmp.path());
    run_ngr(&config_path, &["sync", "--progress", "off"]);

    let (stdout, stderr, success) = run_ngr(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Relations:   3"), "{}", stdout);
    assert!(stdout.contains("Evidence:    2"), "{}", stdout);
    // "is a" and "IS_A" collapse into one relation type.
    let is_a = stdout
        .lines()
        .find(|l| l.trim_start().starts_with("IS_A"))
        .unwrap();
    assert!(is_a.trim_end().ends_with('2'), "{}", is_a);
    assert!(stdout.contains("note_alpha"));
}

#[test]
fn test_ask_without_embeddings_reports_and_audits() {
    let (tmp, config_path) = setup_test_env();
    run_ngr(&config_path, &["init"]);

    let (stdout, stderr, success) = run_ngr(&config_path, &["ask", "What is Rust?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Cannot vectorize"), "{}", stdout);

    let log = fs::read_to_string(tmp.path().join("logs/rag_log.jsonl")).unwrap();
    let record: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(record["query"], "What is Rust?");
    assert_eq!(record["status"], "embedding_failed");
}

#[test]
fn test_search_requires_embeddings() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ngr(&config_path, &["search", "rust"]);
    assert!(!success);
    assert!(stderr.contains("embedding provider"), "{}", stderr);
}

#[test]
fn test_reset_requires_yes() {
    let (tmp, config_path) = setup_test_env();
    seed_all(tmp.path());
    run_ngr(&config_path, &["sync", "--progress", "off"]);

    let (_, _, success) = run_ngr(&config_path, &["reset"]);
    assert!(!success);

    let (stdout, _, success) = run_ngr(&config_path, &["reset", "--yes"]);
    assert!(success);
    assert!(stdout.contains("Graph cleared"));

    // Version records are gone, so every note is written again.
    let (stdout, _, _) = run_ngr(&config_path, &["sync", "--progress", "off"]);
    assert!(stdout.contains("  written: 2"), "{}", stdout);
}
