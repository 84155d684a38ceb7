//! CLI integration tests
//!
//! These tests verify the CLI commands work correctly by running the binary.

#![cfg(feature = "cli")]

use std::path::{Path, PathBuf};
use std::process::Command;

fn yangkit_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_yangkit"))
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const MODULE: &str = "module demo {
  namespace urn:demo;
  prefix d;
  revision 2024-01-15;
  feature fancy;
  container box {
    leaf label { type string; mandatory true; }
    leaf shine { if-feature fancy; type uint8; }
  }
}";

// ============================================================================
// Compile / tree / features
// ============================================================================

#[test]
fn test_cli_compile() {
    let dir = tempfile::tempdir().unwrap();
    let module = write(dir.path(), "demo.yang", MODULE);

    let output = Command::new(yangkit_bin())
        .args(["compile", module.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "compile should succeed");
    assert!(stdout.contains("demo 2024-01-15"));
}

#[test]
fn test_cli_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    let module = write(
        dir.path(),
        "broken.yang",
        "module broken { namespace urn:b; prefix b; leaf x { type missing; } }",
    );

    let output = Command::new(yangkit_bin())
        .args(["compile", module.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "compile should fail");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}

#[test]
fn test_cli_tree_with_feature() {
    let dir = tempfile::tempdir().unwrap();
    let module = write(dir.path(), "demo.yang", MODULE);

    let output = Command::new(yangkit_bin())
        .args(["tree", "-F", "demo:fancy", module.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("module: demo"));
    assert!(stdout.contains("+--rw label   string"));
    assert!(stdout.contains("{fancy}?"));
}

#[test]
fn test_cli_features_json() {
    let dir = tempfile::tempdir().unwrap();
    let module = write(dir.path(), "demo.yang", MODULE);

    let output = Command::new(yangkit_bin())
        .args(["features", "--json", module.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(json[0]["feature"], "fancy");
    assert_eq!(json[0]["enabled"], false);
}

// ============================================================================
// Validate
// ============================================================================

#[test]
fn test_cli_validate() {
    let dir = tempfile::tempdir().unwrap();
    let module = write(dir.path(), "demo.yang", MODULE);
    let good = write(dir.path(), "good.json", r#"{"demo:box": {"label": "x"}}"#);
    let bad = write(dir.path(), "bad.json", r#"{"demo:box": {}}"#);

    let output = Command::new(yangkit_bin())
        .args(["validate", "-s", module.to_str().unwrap(), good.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("✓ Data is valid"));

    let output = Command::new(yangkit_bin())
        .args(["validate", "-s", module.to_str().unwrap(), bad.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Missing mandatory node 'label'"));

    let output = Command::new(yangkit_bin())
        .args(["validate", "--edit", "-s", module.to_str().unwrap(), bad.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
}
