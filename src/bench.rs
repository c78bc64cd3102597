use std::{
  collections::BTreeMap,
  fs,
  panic::{self, AssertUnwindSafe},
  path::Path,
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
  candidates::{Candidate, ParseFailure, ParsedTimestamp},
  files::{self, TimingRecord},
  stats::EnvKey,
  timing,
};

/// One full measurement run over a candidate registry.
pub struct Bench {
  /// The input under measurement.
  timestamp: String,
  /// The crate equivalence is judged against.
  base_library: String,
  /// Crates to measure, in recording order.
  candidates: Vec<Candidate>,
  /// Iteration counts pinned by an earlier run.
  pinned: BTreeMap<String, u64>,
  /// The toolchain recorded in output filenames.
  env: EnvKey,
  /// One record per candidate.
  pub records: Vec<TimingRecord>,
  /// Iteration counts actually used for successful measurements.
  pub counts: BTreeMap<String, u64>,
}

struct Measurement {
  value: ParsedTimestamp,
  iterations: u64,
  elapsed: f64,
}

impl Bench {
  pub fn new(
    timestamp: String,
    base_library: String,
    candidates: Vec<Candidate>,
    pinned: BTreeMap<String, u64>,
    env: EnvKey,
  ) -> Result<Self> {
    if !candidates.iter().any(|candidate| candidate.name == base_library) {
      anyhow::bail!("baseline {base_library:?} is not a registered candidate");
    }

    Ok(Self {
      timestamp,
      base_library,
      candidates,
      pinned,
      env,
      records: Vec::new(),
      counts: BTreeMap::new(),
    })
  }

  /// Measures every candidate, capturing failures as records instead of
  /// aborting the batch.
  pub fn bench(&mut self) -> Result<()> {
    let expected = self.reference_parse()?;

    let mut records = Vec::new();
    let mut counts = BTreeMap::new();

    for candidate in &self.candidates {
      info!("benchmarking {}", candidate.name);

      let pinned = self.pinned.get(candidate.name).copied();
      let statement = candidate.statement_for(&self.timestamp);

      let record = match run_candidate(candidate, &self.timestamp, pinned) {
        Ok(measurement) => {
          counts.insert(candidate.name.to_string(), measurement.iterations);

          TimingRecord {
            library: candidate.name.to_string(),
            setup: candidate.setup.to_string(),
            statement,
            result: Some(measurement.value.to_string()),
            iterations: Some(measurement.iterations),
            elapsed_seconds: Some(measurement.elapsed),
            equivalent: Some(measurement.value.roughly_equivalent(&expected)),
            exception: None,
          }
        }
        Err(failure) => {
          warn!("{} failed: {} ({})", candidate.name, failure.message, failure.kind);

          TimingRecord {
            library: candidate.name.to_string(),
            setup: candidate.setup.to_string(),
            statement,
            result: None,
            iterations: None,
            elapsed_seconds: None,
            equivalent: None,
            exception: Some(failure.kind),
          }
        }
      };

      records.push(record);
    }

    self.records = records;
    self.counts = counts;

    Ok(())
  }

  /// Writes the timing, versions, and counts CSVs into `dir`.
  pub fn write_results(&self, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {dir:?}"))?;

    files::write_timings(
      &dir.join(files::timings_filename(self.env)),
      self.env,
      &self.timestamp,
      &self.records,
    )
    .context("write timings")?;

    let versions: BTreeMap<String, String> = self
      .candidates
      .iter()
      .map(|candidate| (candidate.name.to_string(), candidate.version.to_string()))
      .collect();
    files::write_versions(&dir.join(files::versions_filename(self.env)), self.env, &versions)
      .context("write versions")?;

    files::write_counts(&dir.join(files::COUNTS_FILE), &self.counts).context("write counts")?;

    info!("wrote results to {dir:?}");

    Ok(())
  }

  fn reference_parse(&self) -> Result<ParsedTimestamp> {
    let reference = self
      .candidates
      .iter()
      .find(|candidate| candidate.name == self.base_library)
      .with_context(|| format!("baseline {:?} is not a registered candidate", self.base_library))?;

    (reference.parse)(&self.timestamp).map_err(|failure| {
      anyhow::anyhow!(
        "baseline {:?} cannot parse {:?}: {}",
        self.base_library,
        self.timestamp,
        failure.message,
      )
    })
  }
}

/// Probes `candidate` once, then times it, trapping panics alongside parse
/// errors so one broken crate cannot take down the batch.
fn run_candidate(candidate: &Candidate, timestamp: &str, pinned: Option<u64>) -> Result<Measurement, ParseFailure> {
  let parse = candidate.parse;

  let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Measurement, ParseFailure> {
    let value = parse(timestamp)?;

    let (iterations, elapsed) = match pinned {
      Some(iterations) => (iterations, timing::measure(parse, timestamp, iterations)),
      None => timing::auto_range(parse, timestamp),
    };

    Ok(Measurement { value, iterations, elapsed })
  }));

  match outcome {
    Ok(result) => result,
    Err(payload) => Err(ParseFailure::new("panic", panic_message(&*payload))),
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "opaque panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::candidates::ParseFn;

  fn fixed(_: &str) -> Result<ParsedTimestamp, ParseFailure> {
    Ok(ParsedTimestamp { seconds: 60, nanos: 0, offset: Some(0) })
  }

  fn shifted(_: &str) -> Result<ParsedTimestamp, ParseFailure> {
    Ok(ParsedTimestamp { seconds: 120, nanos: 0, offset: Some(0) })
  }

  fn refuses(_: &str) -> Result<ParsedTimestamp, ParseFailure> {
    Err(ParseFailure::new("fake::ParseError", "not today"))
  }

  fn panics(_: &str) -> Result<ParsedTimestamp, ParseFailure> {
    panic!("boom");
  }

  fn candidate(name: &'static str, parse: ParseFn) -> Candidate {
    Candidate {
      name,
      version: "0.0.0",
      setup: "use fake;",
      statement: "fake::parse(\"{timestamp}\")",
      parse,
    }
  }

  fn run(candidates: Vec<Candidate>) -> Bench {
    let pinned = candidates
      .iter()
      .map(|candidate| (candidate.name.to_string(), 1))
      .collect();

    let mut bench = Bench::new(
      "1970-01-01T00:01:00Z".to_string(),
      "good".to_string(),
      candidates,
      pinned,
      EnvKey { major: 9, minor: 99 },
    )
    .unwrap();
    bench.bench().unwrap();

    bench
  }

  #[test]
  fn failures_keep_the_batch_going() {
    let bench = run(vec![
      candidate("good", fixed),
      candidate("bad", refuses),
      candidate("ugly", panics),
    ]);

    assert_eq!(bench.records.len(), 3);

    let bad = &bench.records[1];
    assert_eq!(bad.exception.as_deref(), Some("fake::ParseError"));
    assert_eq!(bad.result, None);
    assert_eq!(bad.iterations, None);
    assert_eq!(bad.elapsed_seconds, None);
    assert_eq!(bad.equivalent, None);

    let ugly = &bench.records[2];
    assert_eq!(ugly.exception.as_deref(), Some("panic"));
  }

  #[test]
  fn equivalence_is_judged_against_the_baseline() {
    let bench = run(vec![
      candidate("good", fixed),
      candidate("close", fixed),
      candidate("far", shifted),
    ]);

    assert_eq!(bench.records[0].equivalent, Some(true));
    assert_eq!(bench.records[1].equivalent, Some(true));
    assert_eq!(bench.records[2].equivalent, Some(false));
  }

  #[test]
  fn pinned_counts_are_respected_and_recorded() {
    let mut pinned = BTreeMap::new();
    pinned.insert("good".to_string(), 3_u64);

    let mut bench = Bench::new(
      "1970-01-01T00:01:00Z".to_string(),
      "good".to_string(),
      vec![candidate("good", fixed)],
      pinned,
      EnvKey { major: 9, minor: 99 },
    )
    .unwrap();
    bench.bench().unwrap();

    assert_eq!(bench.records[0].iterations, Some(3));
    assert_eq!(bench.counts.get("good"), Some(&3));
  }

  #[test]
  fn unknown_baselines_are_rejected_up_front() {
    let result = Bench::new(
      "1970-01-01T00:01:00Z".to_string(),
      "nope".to_string(),
      vec![candidate("good", fixed)],
      BTreeMap::new(),
      EnvKey { major: 9, minor: 99 },
    );

    assert!(result.is_err());
  }

  #[test]
  fn statements_are_recorded_with_the_timestamp_substituted() {
    let bench = run(vec![candidate("good", fixed)]);

    assert_eq!(bench.records[0].statement, "fake::parse(\"1970-01-01T00:01:00Z\")");
  }

  #[test]
  fn write_results_emits_all_three_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let out = dir.path().join("run");

    let bench = run(vec![candidate("good", fixed), candidate("bad", refuses)]);
    bench.write_results(&out).unwrap();

    assert!(out.join("benchmark_timings_rust9_99.csv").exists());
    assert!(out.join("crate_versions_rust9_99.csv").exists());
    assert!(out.join("auto_range_counts.csv").exists());

    let counts = files::read_counts(&out.join("auto_range_counts.csv")).unwrap();
    assert_eq!(counts.get("good"), Some(&1));
    assert_eq!(counts.get("bad"), None);
  }
}
