mod bench;
mod candidates;
mod ext;
mod files;
mod format;
mod stats;
mod timing;

use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{
  bench::Bench,
  candidates::default_candidates,
  format::ReportOptions,
  stats::{EnvKey, ResultTable, VersionUsage},
};

#[derive(Parser)]
struct Args {
  /// Log progress at debug level.
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Times every registered ISO 8601 parser against one timestamp and records
  /// the results as CSV.
  Bench {
    /// The timestamp every candidate parses.
    timestamp: String,
    /// Candidate that equivalence is judged against.
    #[arg(long, default_value = candidates::BASE_LIBRARY)]
    base_library: String,
    /// Directory the per-run output directory is created under.
    #[arg(long, default_value = "benchmark_results")]
    results: PathBuf,
    /// Iteration-count CSV from an earlier run, reused for comparability.
    #[arg(long)]
    counts: Option<PathBuf>,
    /// Toolchain version recorded in output filenames, e.g. 1.84.
    #[arg(long)]
    env: Option<EnvKey>,
  },
  /// Aggregates recorded CSVs from every environment into a comparison
  /// report.
  Report {
    /// Directory tree holding recorded benchmark CSVs.
    results: PathBuf,
    /// File the comparison report is written to.
    output: PathBuf,
    /// Candidate that relative slowdown is computed against.
    #[arg(long, default_value = candidates::BASE_LIBRARY)]
    base_library: String,
    /// Include the calling-code column.
    #[arg(long)]
    include_call: bool,
    /// Filename for the version listing, written next to the report.
    #[arg(long, default_value = "benchmark_crate_versions.md")]
    versions_output: String,
  },
}

fn main() -> Result<()> {
  let args = Args::parse();

  init_tracing(args.verbose);

  match args.command {
    Command::Bench { timestamp, base_library, results, counts, env } => {
      let pinned = match counts {
        Some(path) => files::read_counts(&path).with_context(|| format!("read counts {path:?}"))?,
        None => BTreeMap::new(),
      };
      let env = detect_env(env)?;

      let mut bench = Bench::new(timestamp.clone(), base_library, default_candidates(), pinned, env)
        .context("Bench::new")?;
      bench.bench().context("bench")?;

      let out_dir = results.join(timestamp.replace(':', ""));
      bench.write_results(&out_dir).context("write results")?;

      println!("{}", out_dir.display());
    }
    Command::Report { results, output, base_library, include_call, versions_output } => {
      if !results.exists() {
        anyhow::bail!("{results:?} does not exist");
      }

      let table = ResultTable::collect(&results).context("collect timings")?;
      let usage = VersionUsage::collect(&results).context("collect versions")?;

      let report = format::format_comparison(&table, &ReportOptions { base_library, include_call })
        .context("format comparison")?;
      let versions = format::format_versions(&usage, &system_label()).context("format versions")?;

      fs::write(&output, report).with_context(|| format!("write {output:?}"))?;

      let versions_path = output
        .parent()
        .map(|parent| parent.join(&versions_output))
        .unwrap_or_else(|| PathBuf::from(&versions_output));
      fs::write(&versions_path, versions).with_context(|| format!("write {versions_path:?}"))?;

      println!("{}", output.display());
    }
  }

  Ok(())
}

/// The rustc version captured at build time, unless overridden.
fn detect_env(overridden: Option<EnvKey>) -> Result<EnvKey> {
  if let Some(env) = overridden {
    return Ok(env);
  }

  let detected = env!("ISO8601_BENCH_RUSTC_VERSION");
  if detected.is_empty() {
    anyhow::bail!("could not detect the toolchain version at build time; pass --env MAJOR.MINOR");
  }

  detected.parse().with_context(|| format!("built with unparseable rustc version {detected:?}"))
}

fn system_label() -> String {
  let name = sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string());
  let version = sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_string());

  format!("{name} {version}")
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "iso8601_bench=debug" } else { "iso8601_bench=info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}
