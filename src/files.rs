use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::stats::EnvKey;

/// One measured (or failed) crate, as exchanged through the timing CSVs.
/// Field order is the column order on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
  pub library: String,
  pub setup: String,
  pub statement: String,
  pub result: Option<String>,
  pub iterations: Option<u64>,
  pub elapsed_seconds: Option<f64>,
  pub equivalent: Option<bool>,
  pub exception: Option<String>,
}

pub const COUNTS_FILE: &str = "auto_range_counts.csv";

/// Filename patterns the aggregator discovers results by. The environment in
/// the name keeps parallel runs apart; the one folded is the preamble's.
pub const TIMINGS_PATTERN: &str = r"^benchmark_timings_rust\d+_\d+\.csv$";
pub const VERSIONS_PATTERN: &str = r"^crate_versions_rust\d+_\d+\.csv$";

pub fn timings_filename(env: EnvKey) -> String {
  format!("benchmark_timings_rust{}_{}.csv", env.major, env.minor)
}

pub fn versions_filename(env: EnvKey) -> String {
  format!("crate_versions_rust{}_{}.csv", env.major, env.minor)
}

/// Writes the preamble row `(major, minor, timestamp)` followed by one record
/// per crate.
pub fn write_timings(path: &Path, env: EnvKey, timestamp: &str, records: &[TimingRecord]) -> Result<()> {
  let mut writer = csv::WriterBuilder::new()
    .has_headers(false)
    .flexible(true)
    .from_path(path)
    .with_context(|| format!("create {path:?}"))?;

  writer
    .write_record([env.major.to_string(), env.minor.to_string(), timestamp.to_string()])
    .context("write preamble")?;

  for record in records {
    writer.serialize(record).with_context(|| format!("write {:?}", record.library))?;
  }

  writer.flush().context("flush")?;

  Ok(())
}

/// Reads a timing CSV back into its environment, source timestamp, and rows.
pub fn read_timings(path: &Path) -> Result<(EnvKey, String, Vec<TimingRecord>)> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .from_path(path)
    .with_context(|| format!("open {path:?}"))?;

  let mut rows = reader.records();

  let preamble = rows.next().with_context(|| format!("{path:?} is empty"))?.context("read preamble")?;
  let env = preamble_env(&preamble).with_context(|| format!("{path:?} preamble"))?;
  let timestamp = preamble.get(2).context("missing timestamp")?.to_string();

  let mut records = Vec::new();
  for row in rows {
    let row = row.context("read row")?;
    records.push(row.deserialize(None).with_context(|| format!("malformed row in {path:?}"))?);
  }

  Ok((env, timestamp, records))
}

/// Writes the preamble row `(major, minor)` followed by `(library, version)`
/// rows, in library order.
pub fn write_versions(path: &Path, env: EnvKey, versions: &BTreeMap<String, String>) -> Result<()> {
  let mut writer = csv::WriterBuilder::new()
    .has_headers(false)
    .flexible(true)
    .from_path(path)
    .with_context(|| format!("create {path:?}"))?;

  writer
    .write_record([env.major.to_string(), env.minor.to_string()])
    .context("write preamble")?;

  for (library, version) in versions {
    writer.write_record([library, version]).with_context(|| format!("write {library:?}"))?;
  }

  writer.flush().context("flush")?;

  Ok(())
}

pub fn read_versions(path: &Path) -> Result<(EnvKey, Vec<(String, String)>)> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(false)
    .flexible(true)
    .from_path(path)
    .with_context(|| format!("open {path:?}"))?;

  let mut rows = reader.records();

  let preamble = rows.next().with_context(|| format!("{path:?} is empty"))?.context("read preamble")?;
  let env = preamble_env(&preamble).with_context(|| format!("{path:?} preamble"))?;

  let mut versions = Vec::new();
  for row in rows {
    let row = row.context("read row")?;
    let library = row.get(0).context("missing library")?.to_string();
    let version = row.get(1).context("missing version")?.to_string();

    versions.push((library, version));
  }

  Ok((env, versions))
}

/// Writes `(library, iteration_count)` rows for every measured crate.
pub fn write_counts(path: &Path, counts: &BTreeMap<String, u64>) -> Result<()> {
  let mut writer = csv::Writer::from_path(path).with_context(|| format!("create {path:?}"))?;

  for (library, count) in counts {
    let count = count.to_string();
    writer.write_record([library.as_str(), count.as_str()]).with_context(|| format!("write {library:?}"))?;
  }

  writer.flush().context("flush")?;

  Ok(())
}

pub fn read_counts(path: &Path) -> Result<BTreeMap<String, u64>> {
  let mut reader = csv::ReaderBuilder::new()
    .has_headers(false)
    .from_path(path)
    .with_context(|| format!("open {path:?}"))?;

  let mut counts = BTreeMap::new();
  for row in reader.records() {
    let row = row.context("read row")?;
    let library = row.get(0).context("missing library")?.to_string();
    let count = row
      .get(1)
      .context("missing count")?
      .parse()
      .with_context(|| format!("count for {library:?}"))?;

    counts.insert(library, count);
  }

  Ok(counts)
}

fn preamble_env(row: &csv::StringRecord) -> Result<EnvKey> {
  let major = row.get(0).context("missing major")?.parse().context("major")?;
  let minor = row.get(1).context("missing minor")?.parse().context("minor")?;

  Ok(EnvKey { major, minor })
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  fn env() -> EnvKey {
    EnvKey { major: 1, minor: 84 }
  }

  fn success(library: &str) -> TimingRecord {
    TimingRecord {
      library: library.to_string(),
      setup: "use chrono::DateTime;".to_string(),
      statement: "DateTime::parse_from_rfc3339(\"2014-01-09T21:48:00Z\")".to_string(),
      result: Some("2014-01-09T21:48:00+00:00".to_string()),
      iterations: Some(1024),
      elapsed_seconds: Some(0.25),
      equivalent: Some(true),
      exception: None,
    }
  }

  fn failure(library: &str) -> TimingRecord {
    TimingRecord {
      library: library.to_string(),
      setup: "use broken;".to_string(),
      statement: "broken::parse(\"2014-01-09T21:48:00Z\")".to_string(),
      result: None,
      iterations: None,
      elapsed_seconds: None,
      equivalent: None,
      exception: Some("panic".to_string()),
    }
  }

  #[test]
  fn timing_rows_round_trip_with_their_preamble() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(timings_filename(env()));
    let records = vec![success("chrono"), failure("broken")];

    write_timings(&path, env(), "2014-01-09T21:48:00Z", &records).unwrap();
    let (read_env, timestamp, read) = read_timings(&path).unwrap();

    assert_eq!(read_env, env());
    assert_eq!(timestamp, "2014-01-09T21:48:00Z");
    assert_eq!(read, records);
  }

  #[test]
  fn version_rows_round_trip_in_library_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(versions_filename(env()));
    let versions = BTreeMap::from([
      ("time".to_string(), "0.3.36".to_string()),
      ("chrono".to_string(), "0.4.38".to_string()),
    ]);

    write_versions(&path, env(), &versions).unwrap();
    let (read_env, read) = read_versions(&path).unwrap();

    assert_eq!(read_env, env());
    assert_eq!(
      read,
      vec![
        ("chrono".to_string(), "0.4.38".to_string()),
        ("time".to_string(), "0.3.36".to_string()),
      ],
    );
  }

  #[test]
  fn counts_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(COUNTS_FILE);
    let counts = BTreeMap::from([("chrono".to_string(), 2048_u64), ("time".to_string(), 512_u64)]);

    write_counts(&path, &counts).unwrap();

    assert_eq!(read_counts(&path).unwrap(), counts);
  }

  #[test]
  fn filenames_match_their_own_patterns_only() {
    let timings = regex::Regex::new(TIMINGS_PATTERN).unwrap();
    let versions = regex::Regex::new(VERSIONS_PATTERN).unwrap();

    assert_eq!(timings_filename(env()), "benchmark_timings_rust1_84.csv");
    assert_eq!(versions_filename(env()), "crate_versions_rust1_84.csv");

    assert!(timings.is_match(&timings_filename(env())));
    assert!(versions.is_match(&versions_filename(env())));
    assert!(!timings.is_match("benchmark_timings_rust1_84.csv.bak"));
    assert!(!timings.is_match(&versions_filename(env())));
    assert!(!versions.is_match(&timings_filename(env())));
  }
}
