use std::{fs, path::Path, path::PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TIMESTAMP: &str = "2014-01-09T21:48:00.921000+00:00";

fn pin_all(dir: &Path) -> PathBuf {
  let counts = dir.join("counts.csv");
  let rows: String = ["chrono", "humantime", "iso8601", "jiff", "speedate", "time"]
    .iter()
    .map(|name| format!("{name},2\n"))
    .collect();

  fs::write(&counts, rows).unwrap();
  counts
}

fn bench(timestamp: &str, env: &str, counts: &Path, results: &Path) {
  Command::cargo_bin("iso8601-bench")
    .unwrap()
    .args(["bench", timestamp, "--env", env, "--counts"])
    .arg(counts)
    .arg("--results")
    .arg(results)
    .assert()
    .success();
}

#[test]
fn bench_then_report_round_trips() {
  let dir = TempDir::new().unwrap();
  let results = dir.path().join("benchmark_results");
  let counts = pin_all(dir.path());

  bench(TIMESTAMP, "1.84", &counts, &results);

  let run_dir = results.join(TIMESTAMP.replace(':', ""));
  assert!(run_dir.join("benchmark_timings_rust1_84.csv").exists());
  assert!(run_dir.join("crate_versions_rust1_84.csv").exists());
  assert!(run_dir.join("auto_range_counts.csv").exists());

  let report = dir.path().join("report.md");
  Command::cargo_bin("iso8601-bench")
    .unwrap()
    .arg("report")
    .arg(&results)
    .arg(&report)
    .arg("--include-call")
    .assert()
    .success();

  let rendered = fs::read_to_string(&report).unwrap();
  assert!(rendered.contains("| Crate"));
  assert!(rendered.contains("| Call"));
  assert!(rendered.contains("`chrono`"));
  assert!(rendered.contains("Relative slowdown (versus chrono, Rust 1.84)"));

  // humantime rejects the numeric offset, so it shows up flagged rather than
  // timed, while its version still makes the listing.
  assert!(rendered.contains("`humantime`"));
  assert!(rendered.contains("error ("));

  let versions = fs::read_to_string(dir.path().join("benchmark_crate_versions.md")).unwrap();
  assert!(versions.contains("using the following crates:"));
  assert!(versions.contains("humantime=="));
  assert!(versions.contains("chrono=="));
}

#[test]
fn report_rejects_mixed_timestamps_without_writing() {
  let dir = TempDir::new().unwrap();
  let results = dir.path().join("benchmark_results");
  let counts = pin_all(dir.path());

  bench("2014-01-09T21:48:00Z", "1.80", &counts, &results);
  bench("2017-06-01T08:30:00Z", "1.84", &counts, &results);

  let report = dir.path().join("report.md");
  Command::cargo_bin("iso8601-bench")
    .unwrap()
    .arg("report")
    .arg(&results)
    .arg(&report)
    .assert()
    .failure()
    .stderr(predicate::str::contains("mix"));

  assert!(!report.exists());
}

#[test]
fn report_requires_an_existing_results_directory() {
  let dir = TempDir::new().unwrap();

  Command::cargo_bin("iso8601-bench")
    .unwrap()
    .arg("report")
    .arg(dir.path().join("missing"))
    .arg(dir.path().join("report.md"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn unknown_baselines_fail_the_report() {
  let dir = TempDir::new().unwrap();
  let results = dir.path().join("benchmark_results");
  let counts = pin_all(dir.path());

  bench("2014-01-09T21:48:00Z", "1.84", &counts, &results);

  Command::cargo_bin("iso8601-bench")
    .unwrap()
    .arg("report")
    .arg(&results)
    .arg(dir.path().join("report.md"))
    .args(["--base-library", "nonexistent"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("nonexistent"));
}

#[test]
fn help_names_both_tools() {
  Command::cargo_bin("iso8601-bench")
    .unwrap()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("bench").and(predicate::str::contains("report")));
}
