use std::fmt::Write;

use anyhow::Result;

use crate::{
  ext::F64Ext,
  stats::{AggregateError, EnvKey, ResultTable, VersionUsage},
};

const UNITS: &[(f64, &str)] = &[(1.0, "sec"), (1e-3, "msec"), (1e-6, "usec"), (1e-9, "nsec")];

/// `seconds` in the largest unit keeping the magnitude at or above one, to
/// three significant digits.
pub fn format_duration(seconds: f64) -> String {
  let (scale, unit) = UNITS
    .iter()
    .copied()
    .find(|&(scale, _)| seconds >= scale)
    .unwrap_or((1e-9, "nsec"));

  format!("{} {unit}", (seconds / scale).to_precision_trimmed(3))
}

/// How many times `duration` is of `base`, to four significant digits.
pub fn format_relative(duration: f64, base: f64) -> String {
  format!("{}x", (duration / base).to_precision(4))
}

/// Rendering knobs for the comparison report.
pub struct ReportOptions {
  pub base_library: String,
  pub include_call: bool,
}

/// Renders the ranked comparison table and the summary sentence as markdown.
pub fn format_comparison(table: &ResultTable, options: &ReportOptions) -> Result<String> {
  let libraries = table.ranked_libraries();
  if !libraries.contains(&options.base_library) {
    return Err(AggregateError::UnknownBaseline(options.base_library.clone()).into());
  }

  let Some(reference) = table.reference_env() else {
    anyhow::bail!("no environments to report");
  };
  let environments = table.environments();

  let base_time = table.timing(reference, &options.base_library).ok_or_else(|| {
    AggregateError::BaselineUnmeasured {
      library: options.base_library.clone(),
      env: reference,
    }
  })?;

  let mut header = vec!["Crate".to_string()];
  if options.include_call {
    header.push("Call".to_string());
  }
  header.extend(environments.iter().map(|env| format!("Rust {env}")));
  header.push(format!("Relative slowdown (versus {}, Rust {reference})", options.base_library));

  let mut rows = vec![header];
  for library in &libraries {
    let mut row = vec![format!("`{library}`")];

    if options.include_call {
      row.push(
        table
          .calling_code
          .get(library)
          .map(|code| format!("`{code}`"))
          .unwrap_or_default(),
      );
    }

    for &env in &environments {
      row.push(cell(table, env, library));
    }

    row.push(if library == &options.base_library {
      String::new()
    } else {
      table
        .timing(reference, library)
        .map(|time| format_relative(time, base_time))
        .unwrap_or_default()
    });

    rows.push(row);
  }

  let label_columns = if options.include_call { 2 } else { 1 };

  let mut output = String::new();
  write_markdown_table(&mut output, &rows, label_columns)?;
  writeln!(output)?;
  writeln!(output, "{}", summary_line(table, options, &libraries, reference, base_time)?)?;

  Ok(output)
}

/// The version listing: OS line plus a fenced block of `name==version` lines.
pub fn format_versions(usage: &VersionUsage, system: &str) -> Result<String> {
  let mut output = String::new();

  writeln!(output, "Tested on {system} using the following crates:")?;
  writeln!(output)?;
  writeln!(output, "```")?;
  for line in usage.lines() {
    writeln!(output, "{line}")?;
  }
  writeln!(output, "```")?;

  Ok(output)
}

fn cell(table: &ResultTable, env: EnvKey, library: &str) -> String {
  if let Some(time) = table.timing(env, library) {
    return format_duration(time);
  }

  match table.failures.get(&env).and_then(|failed| failed.get(library)) {
    Some(exception) => format!("error ({exception})"),
    None => String::new(),
  }
}

/// Pipe-delimited table, label columns left-aligned and value columns
/// right-aligned within padded widths.
fn write_markdown_table(output: &mut String, rows: &[Vec<String>], label_columns: usize) -> Result<()> {
  let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
  let widths: Vec<usize> = (0..columns)
    .map(|column| {
      rows
        .iter()
        .filter_map(|row| row.get(column))
        .map(String::len)
        .max()
        .unwrap_or(0)
    })
    .collect();

  for (index, row) in rows.iter().enumerate() {
    let cells: Vec<String> = widths
      .iter()
      .enumerate()
      .map(|(column, &width)| {
        let cell = row.get(column).map(String::as_str).unwrap_or("");

        if column < label_columns {
          format!("{cell:<width$}")
        } else {
          format!("{cell:>width$}")
        }
      })
      .collect();

    writeln!(output, "| {} |", cells.join(" | "))?;

    if index == 0 {
      let rule: Vec<String> = widths.iter().map(|&width| "-".repeat(width.max(1))).collect();
      writeln!(output, "| {} |", rule.join(" | "))?;
    }
  }

  Ok(())
}

fn summary_line(
  table: &ResultTable,
  options: &ReportOptions,
  libraries: &[String],
  reference: EnvKey,
  base_time: f64,
) -> Result<String> {
  let base = &options.base_library;
  let duration = format_duration(base_time);

  let measured: Vec<(&String, f64)> = libraries
    .iter()
    .filter_map(|library| table.timing(reference, library).map(|time| (library, time)))
    .collect();

  let summary = match measured.as_slice() {
    [] => anyhow::bail!("no successful measurements in Rust {reference}"),
    [(only, _)] => format!("`{only}` takes {duration} to parse a typical ISO 8601 timestamp."),
    [(fastest, _), (second, second_time), ..] if *fastest == base => format!(
      "`{base}` takes {duration}, which is **{} faster than `{second}`**, \
       the next fastest ISO 8601 parser in this comparison.",
      format_relative(*second_time, base_time),
    ),
    [(fastest, fastest_time), ..] => format!(
      "`{base}` takes {duration}, which is **{} slower than `{fastest}`**, \
       the fastest ISO 8601 parser in this comparison.",
      format_relative(base_time, *fastest_time),
    ),
  };

  Ok(summary)
}
