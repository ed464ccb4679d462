use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pdfqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_pdfqa"))
}

fn setup_test_env(extra_config: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[chunking]
max_chars = 500
overlap_chars = 50

[embedding]
provider = "hash"

[llm]
provider = "gemini"
api_key_env = "PDFQA_CLI_TEST_UNSET_KEY"
{}
"#,
        extra_config
    );
    let config_path = config_dir.join("pdfqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_pdfqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pdfqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("PDFQA_CLI_TEST_UNSET_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pdfqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(pdfqa_binary()).arg("--help").output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    for command in ["serve", "chat", "ingest"] {
        assert!(stdout.contains(command), "missing {} in help:\n{}", command, stdout);
    }
}

#[test]
fn test_ingest_reports_unreadable_pdf() {
    let (tmp, config) = setup_test_env("");
    let doc = tmp.path().join("files/broken.pdf");
    fs::write(&doc, "this is not a PDF").unwrap();

    let (stdout, stderr, success) = run_pdfqa(&config, &["ingest", doc.to_str().unwrap()]);

    assert!(!success);
    assert!(stdout.contains("skipped: broken.pdf"), "stdout: {}", stdout);
    assert!(
        stderr.contains("No text could be extracted"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_ingest_rejects_non_pdf() {
    let (tmp, config) = setup_test_env("");
    let doc = tmp.path().join("files/notes.txt");
    fs::write(&doc, "plain text").unwrap();

    let (_, stderr, success) = run_pdfqa(&config, &["ingest", doc.to_str().unwrap()]);

    assert!(!success);
    assert!(stderr.contains("Only PDF files are supported"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_missing_path() {
    let (tmp, config) = setup_test_env("");
    let missing = tmp.path().join("files/nope.pdf");

    let (_, stderr, success) = run_pdfqa(&config, &["ingest", missing.to_str().unwrap()]);

    assert!(!success);
    assert!(stderr.contains("does not exist"), "stderr: {}", stderr);
}

#[test]
fn test_chat_fails_fast_without_api_key() {
    let (tmp, config) = setup_test_env("");
    let files = tmp.path().join("files");

    let (_, stderr, success) = run_pdfqa(&config, &["chat", files.to_str().unwrap()]);

    assert!(!success);
    assert!(stderr.contains("PDFQA_CLI_TEST_UNSET_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_serve_require_api_key_fails_fast() {
    let (_tmp, config) = setup_test_env("");

    let (_, stderr, success) = run_pdfqa(
        &config,
        &["serve", "--bind", "127.0.0.1:0", "--require-api-key"],
    );

    assert!(!success);
    assert!(stderr.contains("PDFQA_CLI_TEST_UNSET_KEY"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[chunking]\nmax_chars = 100\noverlap_chars = 100\n").unwrap();
    let doc = tmp.path().join("a.pdf");
    fs::write(&doc, "x").unwrap();

    let (_, stderr, success) = run_pdfqa(&config, &["ingest", doc.to_str().unwrap()]);

    assert!(!success);
    assert!(stderr.contains("overlap_chars"), "stderr: {}", stderr);
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let doc = tmp.path().join("a.pdf");
    fs::write(&doc, "x").unwrap();

    let (_, stderr, success) = run_pdfqa(
        &tmp.path().join("absent.toml"),
        &["ingest", doc.to_str().unwrap()],
    );

    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}
