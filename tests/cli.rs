//! Black-box tests of the `notion-harness` binary that need no network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_notion-harness"))
}

fn run(config: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("NOTION_HARNESS_TEST_TOKEN")
        .output()
        .expect("failed to run notion-harness");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn write_config(tmp: &TempDir, body: &str) -> PathBuf {
    let path = tmp.path().join("notion.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn help_lists_commands() {
    let output = Command::new(binary()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["search", "tree", "top", "children", "find", "path", "refresh", "read", "serve"] {
        assert!(stdout.contains(cmd), "help is missing {cmd}");
    }
}

#[test]
fn missing_token_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(
        &tmp,
        r#"[notion]
token_env = "NOTION_HARNESS_TEST_TOKEN"

[cache]
path = "cache.json"
"#,
    );

    let (_, stderr, ok) = run(&config, &["top"]);
    assert!(!ok);
    assert!(
        stderr.contains("NOTION_HARNESS_TEST_TOKEN environment variable is required"),
        "{stderr}"
    );
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp, "[cache]\nttl_secs = 0\n");

    let (_, stderr, ok) = run(&config, &["top"]);
    assert!(!ok);
    assert!(stderr.contains("ttl_secs"), "{stderr}");
}

#[test]
fn path_requires_segments() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(&tmp, "");

    let (_, stderr, ok) = run(&config, &["path"]);
    assert!(!ok);
    assert!(stderr.contains("required"), "{stderr}");
}
