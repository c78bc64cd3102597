use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::files::{self, TimingRecord};

/// The toolchain that produced a result set, ordered oldest to newest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EnvKey {
  pub major: u32,
  pub minor: u32,
}

impl fmt::Display for EnvKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.major, self.minor)
  }
}

impl FromStr for EnvKey {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    let (major, minor) = s.split_once('.').with_context(|| format!("expected MAJOR.MINOR, got {s:?}"))?;

    Ok(Self {
      major: major.parse().context("major")?,
      minor: minor.parse().context("minor")?,
    })
  }
}

/// The ways assembling a report can fail before any output is written.
#[derive(Debug, Error)]
pub enum AggregateError {
  #[error("no benchmark CSVs found under {0:?}")]
  NoEnvironments(PathBuf),
  #[error("results mix source timestamps {0:?}; rerun against a single input")]
  MixedTimestamps(Vec<String>),
  #[error("{library:?} in Rust {env} has no usable iteration count or elapsed time")]
  InvalidRecord { library: String, env: EnvKey },
  #[error("baseline {0:?} does not appear in any results")]
  UnknownBaseline(String),
  #[error("baseline {library:?} has no successful measurement in Rust {env}")]
  BaselineUnmeasured { library: String, env: EnvKey },
}

/// Per-iteration timings folded across every discovered environment.
#[derive(Debug, Default)]
pub struct ResultTable {
  /// The one input every merged run measured.
  pub timestamp: String,
  /// Every environment with a discovered CSV.
  pub envs: BTreeSet<EnvKey>,
  /// Environment → library → seconds per iteration.
  pub timings: BTreeMap<EnvKey, BTreeMap<String, f64>>,
  /// Environment → library → recorded exception kind.
  pub failures: BTreeMap<EnvKey, BTreeMap<String, String>>,
  /// Library → instantiated call label, last write wins.
  pub calling_code: BTreeMap<String, String>,
}

impl ResultTable {
  /// Folds every timing CSV under `dir`, recursively, into one table.
  pub fn collect(dir: &Path) -> Result<Self> {
    let pattern = Regex::new(files::TIMINGS_PATTERN).context("timings pattern")?;

    let mut table = Self::default();
    let mut timestamps = BTreeSet::new();

    for path in matching_files(dir, &pattern) {
      debug!("folding {path:?}");

      let (env, timestamp, records) = files::read_timings(&path)?;
      timestamps.insert(timestamp);
      table.envs.insert(env);

      for record in records {
        table.fold(env, record)?;
      }
    }

    if table.envs.is_empty() {
      return Err(AggregateError::NoEnvironments(dir.to_path_buf()).into());
    }

    if timestamps.len() > 1 {
      return Err(AggregateError::MixedTimestamps(timestamps.into_iter().collect()).into());
    }

    table.timestamp = timestamps.pop_first().unwrap_or_default();

    Ok(table)
  }

  fn fold(&mut self, env: EnvKey, record: TimingRecord) -> Result<()> {
    self.calling_code.insert(record.library.clone(), record.statement.clone());

    if let Some(exception) = record.exception {
      self.failures.entry(env).or_default().insert(record.library, exception);

      return Ok(());
    }

    let (Some(iterations), Some(elapsed)) = (record.iterations.filter(|&n| n > 0), record.elapsed_seconds) else {
      return Err(AggregateError::InvalidRecord { library: record.library, env }.into());
    };

    self
      .timings
      .entry(env)
      .or_default()
      .insert(record.library, elapsed / iterations as f64);

    Ok(())
  }

  /// Every environment seen, newest first.
  pub fn environments(&self) -> Vec<EnvKey> {
    self.envs.iter().rev().copied().collect()
  }

  /// The newest environment, the reference for ranking and relative factors.
  pub fn reference_env(&self) -> Option<EnvKey> {
    self.envs.last().copied()
  }

  /// Union of crates seen anywhere, failures included.
  pub fn libraries(&self) -> BTreeSet<String> {
    self
      .timings
      .values()
      .flat_map(|by_library| by_library.keys().cloned())
      .chain(self.failures.values().flat_map(|by_library| by_library.keys().cloned()))
      .collect()
  }

  /// Seconds per iteration for `library` in `env`.
  pub fn timing(&self, env: EnvKey, library: &str) -> Option<f64> {
    self.timings.get(&env)?.get(library).copied()
  }

  /// Display order: ascending by reference-environment time with the name as
  /// the tie-break, unmeasured crates last.
  pub fn ranked_libraries(&self) -> Vec<String> {
    let reference = self.reference_env();
    let time = |name: &str| {
      reference
        .and_then(|env| self.timing(env, name))
        .unwrap_or(f64::INFINITY)
    };

    let mut libraries: Vec<String> = self.libraries().into_iter().collect();
    libraries.sort_by(|a, b| time(a).total_cmp(&time(b)).then_with(|| a.cmp(b)));

    libraries
  }
}

/// Which crate versions were observed in which environments.
#[derive(Debug, Default)]
pub struct VersionUsage {
  /// Library → version → environments that reported it.
  pub by_library: BTreeMap<String, BTreeMap<String, BTreeSet<EnvKey>>>,
}

impl VersionUsage {
  /// Folds every versions CSV under `dir`, recursively.
  pub fn collect(dir: &Path) -> Result<Self> {
    let pattern = Regex::new(files::VERSIONS_PATTERN).context("versions pattern")?;

    let mut usage = Self::default();

    for path in matching_files(dir, &pattern) {
      debug!("folding {path:?}");

      let (env, versions) = files::read_versions(&path)?;
      for (library, version) in versions {
        usage
          .by_library
          .entry(library)
          .or_default()
          .entry(version)
          .or_default()
          .insert(env);
      }
    }

    Ok(usage)
  }

  /// One line per crate: `name==version`, or the expansion naming each
  /// version's environments when more than one was seen.
  pub fn lines(&self) -> Vec<String> {
    self
      .by_library
      .iter()
      .map(|(library, versions)| match versions.iter().next() {
        Some((version, _)) if versions.len() == 1 => format!("{library}=={version}"),
        _ => versions
          .iter()
          .map(|(version, envs)| {
            let envs: Vec<String> = envs.iter().map(EnvKey::to_string).collect();

            format!("{library}=={version} (Rust {})", envs.join(", "))
          })
          .collect::<Vec<_>>()
          .join(", "),
      })
      .collect()
  }
}

/// Every file under `dir`, recursively, whose name matches `pattern`.
fn matching_files(dir: &Path, pattern: &Regex) -> Vec<PathBuf> {
  let mut files: Vec<PathBuf> = WalkDir::new(dir)
    .into_iter()
    .filter_map(|entry| entry.ok())
    .filter(|entry| entry.file_type().is_file())
    .filter(|entry| pattern.is_match(&entry.file_name().to_string_lossy()))
    .map(|entry| entry.into_path())
    .collect();

  files.sort();
  files
}
