//! CLI integration tests for mongo-sql-migrate.
//!
//! These tests verify command-line argument parsing, help output, exit codes
//! for error conditions, and offline runs against a dump directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;

/// Get a command for the mongo-sql-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("mongo-sql-migrate").unwrap()
}

/// Write a config pointing at `dump_dir`, with an unreachable target.
fn write_config(dir: &Path, dump_dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.yaml");
    let yaml = format!(
        r#"
source:
  path: {}
target:
  host: 127.0.0.1
  port: 1
  database: strapi
  user: strapi
  password: secret
"#,
        dump_dir.display()
    );
    std::fs::write(&path, yaml).unwrap();
    path
}

/// A registry entry line for `core_store.json`.
fn registry_line(id: &str, key: &str, definition: serde_json::Value) -> String {
    serde_json::json!({
        "_id": {"$oid": id},
        "key": key,
        "value": definition.to_string(),
    })
    .to_string()
}

/// Dump with authors and books linked one-to-many.
fn write_library_dump(dump_dir: &Path) {
    std::fs::create_dir_all(dump_dir).unwrap();
    let registry = [
        registry_line(
            "5f0000000000000000000001",
            "model_def_application::author.author",
            serde_json::json!({
                "uid": "application::author.author",
                "collectionName": "authors",
                "attributes": {
                    "name": {"type": "string"},
                    "books": {"collection": "book", "via": "author"}
                }
            }),
        ),
        registry_line(
            "5f0000000000000000000002",
            "model_def_application::book.book",
            serde_json::json!({
                "uid": "application::book.book",
                "collectionName": "books",
                "attributes": {
                    "title": {"type": "string"},
                    "author": {"model": "author", "via": "books"}
                }
            }),
        ),
    ];
    std::fs::write(dump_dir.join("core_store.json"), registry.join("\n")).unwrap();
    std::fs::write(
        dump_dir.join("authors.json"),
        r#"{"_id": {"$oid": "5f0000000000000000000a01"}, "name": "Le Guin"}"#,
    )
    .unwrap();
    std::fs::write(
        dump_dir.join("books.json"),
        concat!(
            r#"{"_id": {"$oid": "5f0000000000000000000b01"}, "title": "The Dispossessed", "author": {"$oid": "5f0000000000000000000a01"}}"#,
            "\n",
            r#"{"_id": {"$oid": "5f0000000000000000000b02"}, "title": "Lathe of Heaven"}"#,
        ),
    )
    .unwrap();
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("models"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mongo-sql-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_global_flags_exist() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"))
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "models"])
        .assert()
        .code(1);
}

#[test]
fn test_unsupported_source_type_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  type: couchdb").unwrap();
    writeln!(file, "  path: ./dump").unwrap();
    writeln!(file, "target:").unwrap();
    writeln!(file, "  host: localhost").unwrap();
    writeln!(file, "  database: strapi").unwrap();
    writeln!(file, "  user: strapi").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_dump_directory_exits_with_code_4() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("no-such-dump"));

    cmd()
        .args(["--config", config.to_str().unwrap(), "models"])
        .assert()
        .code(4);
}

// =============================================================================
// Offline Runs
// =============================================================================

#[test]
fn test_models_prints_plan() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump");
    write_library_dump(&dump);
    let config = write_config(dir.path(), &dump);

    cmd()
        .args(["--config", config.to_str().unwrap(), "models"])
        .assert()
        .success()
        .stdout(predicate::str::contains("application::book.book -> books"))
        .stdout(predicate::str::contains("many-to-one"))
        .stdout(predicate::str::contains("one-to-many"));
}

#[test]
fn test_models_output_json() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump");
    write_library_dump(&dump);
    let config = write_config(dir.path(), &dump);

    let output = cmd()
        .args(["--config", config.to_str().unwrap(), "--output-json", "models"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let models: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let uids: Vec<&str> = models
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["uid"].as_str().unwrap())
        .collect();
    assert_eq!(uids.len(), 2);
    assert!(uids.contains(&"application::author.author"));
}

#[test]
fn test_dry_run_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump");
    write_library_dump(&dump);
    let config = write_config(dir.path(), &dump);

    let output = cmd()
        .args([
            "--config",
            config.to_str().unwrap(),
            "--output-json",
            "run",
            "--dry-run",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["rows_inserted"], 3);
    assert_eq!(result["keys_updated"], 1);
    assert_eq!(result["links_inserted"], 0);
}

#[test]
fn test_dry_run_dangling_reference_exits_with_code_2() {
    let dir = tempfile::tempdir().unwrap();
    let dump = dir.path().join("dump");
    write_library_dump(&dump);
    std::fs::write(
        dump.join("books.json"),
        r#"{"_id": "b9", "title": "Orphan", "author": "5f00000000000000000000ff"}"#,
    )
    .unwrap();
    let config = write_config(dir.path(), &dump);

    cmd()
        .args(["--config", config.to_str().unwrap(), "run", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Dangling reference"));
}

// =============================================================================
// Misc
// =============================================================================

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}
