use std::{env, fs, path::Path, process::Command};

/// Crates whose locked versions are reported alongside timings.
const CANDIDATE_CRATES: &[&str] = &["chrono", "humantime", "iso8601", "jiff", "speedate", "time"];

fn main() {
  println!("cargo:rerun-if-changed=Cargo.lock");

  let lock = env::var("CARGO_MANIFEST_DIR")
    .ok()
    .and_then(|dir| fs::read_to_string(Path::new(&dir).join("Cargo.lock")).ok())
    .unwrap_or_default();

  for name in CANDIDATE_CRATES {
    let version = locked_version(&lock, name).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=ISO8601_BENCH_VERSION_{}={version}", name.to_uppercase());
  }

  println!(
    "cargo:rustc-env=ISO8601_BENCH_RUSTC_VERSION={}",
    rustc_major_minor().unwrap_or_default()
  );
}

/// The resolved version of `name` in a lockfile's `[[package]]` entries.
fn locked_version(lock: &str, name: &str) -> Option<String> {
  let mut lines = lock.lines().map(str::trim);

  while let Some(line) = lines.next() {
    if line == format!("name = \"{name}\"") {
      return lines
        .next()?
        .strip_prefix("version = \"")?
        .strip_suffix('"')
        .map(str::to_string);
    }
  }

  None
}

/// `rustc --version` reduced to `major.minor`.
fn rustc_major_minor() -> Option<String> {
  let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
  let output = Command::new(rustc).arg("--version").output().ok()?;
  let stdout = String::from_utf8(output.stdout).ok()?;

  let version = stdout.split_whitespace().nth(1)?;
  let mut parts = version.split('.');

  Some(format!("{}.{}", parts.next()?, parts.next()?))
}
