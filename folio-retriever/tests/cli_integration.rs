//! Integration tests driving the folio binary end to end.

use anyhow::Result;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run the CLI binary with given args
fn run_cli(config: &Path, args: &[&str]) -> Result<std::process::Output> {
    let mut cmd = Command::new("cargo");
    cmd.args(["run", "-p", "folio-retriever", "--quiet", "--"])
        .arg("--config")
        .arg(config)
        .args(args);
    Ok(cmd.output()?)
}

/// Helper to lay out a small library plus a config file pointing at it
fn setup_workspace(temp_dir: &TempDir) -> Result<std::path::PathBuf> {
    let books = temp_dir.path().join("books");
    std::fs::create_dir_all(&books)?;

    std::fs::write(
        books.join("1.txt"),
        "Being and nothing are the same and yet distinct.\n\n\
         The beginning of philosophy must be presuppositionless.",
    )?;
    std::fs::write(
        books.join("2.txt"),
        "Habit is the great flywheel of society.\n\n\
         Attention is the taking possession of the mind.",
    )?;
    std::fs::write(
        books.join("1.json"),
        r#"{"title": "Science of Logic", "authors": ["G. W. F. Hegel"]}"#,
    )?;

    let config_path = temp_dir.path().join("folio.toml");
    std::fs::write(
        &config_path,
        format!(
            "[store]\npath = \"{}\"\n\n[library]\nroot = \"{}\"\n\n[segmenter]\nmin_chunk_words = 3\n",
            temp_dir.path().join("folio.db").display(),
            books.display(),
        ),
    )?;
    Ok(config_path)
}

#[test]
fn test_cli_index_search_stats_clear() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = setup_workspace(&temp_dir)?;

    // Index the whole library.
    let output = run_cli(&config, &["index", "--all"])?;
    assert!(
        output.status.success(),
        "index failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Indexed 2 of 2 books"),
        "unexpected index output: {stdout}"
    );

    // Search with machine-readable output; verbatim chunk text ranks first.
    let output = run_cli(
        &config,
        &[
            "search",
            "Being and nothing are the same and yet distinct.",
            "--json",
        ],
    )?;
    assert!(
        output.status.success(),
        "search failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let results: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let results = results.as_array().expect("expected a JSON array");
    assert!(!results.is_empty());
    assert_eq!(results[0]["book_id"], 1);
    assert_eq!(results[0]["title"], "Science of Logic");
    assert!(results[0]["similarity"].as_f64().unwrap() > 0.999);

    // Stats reflect both books.
    let output = run_cli(&config, &["stats"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Books: 2"), "unexpected stats: {stdout}");

    // Status lists both books as completed.
    let output = run_cli(&config, &["status"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("Indexing status for 2 books"),
        "unexpected status: {stdout}"
    );
    assert!(stdout.contains("completed"), "unexpected status: {stdout}");

    // Clearing removes the book and its status row.
    let output = run_cli(&config, &["clear", "1"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("chunks for book 1"), "unexpected clear output: {stdout}");

    let output = run_cli(&config, &["status", "1"])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("No indexing status for book 1"),
        "unexpected status after clear: {stdout}"
    );
    Ok(())
}

#[test]
fn test_cli_rejects_bad_input() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = setup_workspace(&temp_dir)?;

    // Too-short queries are rejected with the validation message verbatim.
    let output = run_cli(&config, &["search", "be"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Search query must be at least 3 characters"),
        "unexpected stderr: {stderr}"
    );

    // Index needs an explicit target.
    let output = run_cli(&config, &["index"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Nothing to index"),
        "unexpected stderr: {stderr}"
    );
    Ok(())
}
