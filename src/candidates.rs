use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Weekday};

/// The crate equivalence and relative slowdown are judged against unless
/// overridden on the command line.
pub const BASE_LIBRARY: &str = "chrono";

/// A parse result reduced to the instant it denotes: seconds and nanoseconds
/// since the Unix epoch, reading offset-free input as UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedTimestamp {
  pub seconds: i64,
  pub nanos: u32,
  /// UTC offset in seconds east, `None` when the input carried none.
  pub offset: Option<i32>,
}

impl ParsedTimestamp {
  /// Whether two results denote the same instant, regardless of how (or
  /// whether) their offsets were spelled.
  pub fn roughly_equivalent(&self, other: &ParsedTimestamp) -> bool {
    (self.seconds, self.nanos) == (other.seconds, other.nanos)
  }
}

impl fmt::Display for ParsedTimestamp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Some(utc) = DateTime::from_timestamp(self.seconds, self.nanos) else {
      return write!(f, "{}s+{}ns", self.seconds, self.nanos);
    };

    match self.offset.and_then(FixedOffset::east_opt) {
      Some(offset) => write!(f, "{}", utc.with_timezone(&offset).format("%Y-%m-%dT%H:%M:%S%.f%:z")),
      None => write!(f, "{}", utc.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f")),
    }
  }
}

/// A captured per-candidate failure: the error's type path and its message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseFailure {
  pub kind: String,
  pub message: String,
}

impl ParseFailure {
  pub fn new(kind: impl Into<String>, message: impl fmt::Display) -> Self {
    Self {
      kind: kind.into(),
      message: message.to_string(),
    }
  }

  fn from_error<E: std::error::Error>(err: E) -> Self {
    Self::new(std::any::type_name::<E>(), err)
  }
}

pub type ParseFn = fn(&str) -> Result<ParsedTimestamp, ParseFailure>;

/// One crate under measurement.
pub struct Candidate {
  pub name: &'static str,
  pub version: &'static str,
  /// Import label recorded alongside timings.
  pub setup: &'static str,
  /// Call label; `{timestamp}` is substituted when recorded.
  pub statement: &'static str,
  pub parse: ParseFn,
}

impl Candidate {
  /// The statement label with the measured timestamp substituted in.
  pub fn statement_for(&self, timestamp: &str) -> String {
    self.statement.replace("{timestamp}", timestamp)
  }
}

/// Every crate the runner measures by default.
pub fn default_candidates() -> Vec<Candidate> {
  vec![
    Candidate {
      name: "chrono",
      version: env!("ISO8601_BENCH_VERSION_CHRONO"),
      setup: "use chrono::DateTime;",
      statement: "DateTime::parse_from_rfc3339(\"{timestamp}\")",
      parse: parse_chrono,
    },
    Candidate {
      name: "humantime",
      version: env!("ISO8601_BENCH_VERSION_HUMANTIME"),
      setup: "use humantime::parse_rfc3339;",
      statement: "parse_rfc3339(\"{timestamp}\")",
      parse: parse_humantime,
    },
    Candidate {
      name: "iso8601",
      version: env!("ISO8601_BENCH_VERSION_ISO8601"),
      setup: "use iso8601::datetime;",
      statement: "datetime(\"{timestamp}\")",
      parse: parse_iso8601,
    },
    Candidate {
      name: "jiff",
      version: env!("ISO8601_BENCH_VERSION_JIFF"),
      setup: "use jiff::Timestamp;",
      statement: "\"{timestamp}\".parse::<Timestamp>()",
      parse: parse_jiff,
    },
    Candidate {
      name: "speedate",
      version: env!("ISO8601_BENCH_VERSION_SPEEDATE"),
      setup: "use speedate::DateTime;",
      statement: "DateTime::parse_str(\"{timestamp}\")",
      parse: parse_speedate,
    },
    Candidate {
      name: "time",
      version: env!("ISO8601_BENCH_VERSION_TIME"),
      setup: "use time::{format_description::well_known::Rfc3339, OffsetDateTime};",
      statement: "OffsetDateTime::parse(\"{timestamp}\", &Rfc3339)",
      parse: parse_time,
    },
  ]
}

fn parse_chrono(timestamp: &str) -> Result<ParsedTimestamp, ParseFailure> {
  let parsed = DateTime::parse_from_rfc3339(timestamp).map_err(ParseFailure::from_error)?;

  Ok(ParsedTimestamp {
    seconds: parsed.timestamp(),
    nanos: parsed.timestamp_subsec_nanos(),
    offset: Some(parsed.offset().local_minus_utc()),
  })
}

fn parse_humantime(timestamp: &str) -> Result<ParsedTimestamp, ParseFailure> {
  let parsed = humantime::parse_rfc3339(timestamp).map_err(ParseFailure::from_error)?;
  let since_epoch = parsed
    .duration_since(std::time::UNIX_EPOCH)
    .map_err(ParseFailure::from_error)?;

  Ok(ParsedTimestamp {
    seconds: since_epoch.as_secs() as i64,
    nanos: since_epoch.subsec_nanos(),
    offset: Some(0),
  })
}

fn parse_iso8601(timestamp: &str) -> Result<ParsedTimestamp, ParseFailure> {
  let parsed = iso8601::datetime(timestamp).map_err(|err| ParseFailure::new("iso8601::ParseError", err))?;

  let date = match parsed.date {
    iso8601::Date::YMD { year, month, day } => civil_date(year, month, day)?,
    iso8601::Date::Week { year, ww, d } => NaiveDate::from_isoywd_opt(year, ww, weekday(d)?)
      .ok_or_else(|| ParseFailure::new("out of range", format!("no such week date {year:04}-W{ww:02}-{d}")))?,
    iso8601::Date::Ordinal { year, ddd } => NaiveDate::from_yo_opt(year, ddd)
      .ok_or_else(|| ParseFailure::new("out of range", format!("no such ordinal date {year:04}-{ddd:03}")))?,
  };

  let time = parsed.time;
  let nanos = time
    .millisecond
    .checked_mul(1_000_000)
    .filter(|&nanos| nanos < 1_000_000_000)
    .ok_or_else(|| ParseFailure::new("out of range", format!("fractional part {} overflows", time.millisecond)))?;

  instant(
    date,
    time.hour,
    time.minute,
    time.second,
    nanos,
    Some(time.tz_offset_hours * 3600 + time.tz_offset_minutes * 60),
  )
}

fn parse_jiff(timestamp: &str) -> Result<ParsedTimestamp, ParseFailure> {
  let parsed = timestamp.parse::<jiff::Timestamp>().map_err(ParseFailure::from_error)?;

  let mut seconds = parsed.as_second();
  let mut nanos = parsed.subsec_nanosecond();
  if nanos < 0 {
    seconds -= 1;
    nanos += 1_000_000_000;
  }

  Ok(ParsedTimestamp {
    seconds,
    nanos: nanos as u32,
    offset: Some(0),
  })
}

fn parse_speedate(timestamp: &str) -> Result<ParsedTimestamp, ParseFailure> {
  let parsed = speedate::DateTime::parse_str(timestamp)
    .map_err(|err| ParseFailure::new("speedate::ParseError", format!("{err:?}")))?;

  let date = civil_date(
    parsed.date.year.into(),
    parsed.date.month.into(),
    parsed.date.day.into(),
  )?;

  instant(
    date,
    parsed.time.hour.into(),
    parsed.time.minute.into(),
    parsed.time.second.into(),
    parsed.time.microsecond * 1_000,
    parsed.time.tz_offset,
  )
}

fn parse_time(timestamp: &str) -> Result<ParsedTimestamp, ParseFailure> {
  let parsed = time::OffsetDateTime::parse(timestamp, &time::format_description::well_known::Rfc3339)
    .map_err(ParseFailure::from_error)?;

  Ok(ParsedTimestamp {
    seconds: parsed.unix_timestamp(),
    nanos: parsed.nanosecond(),
    offset: Some(parsed.offset().whole_seconds()),
  })
}

fn civil_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, ParseFailure> {
  NaiveDate::from_ymd_opt(year, month, day)
    .ok_or_else(|| ParseFailure::new("out of range", format!("no such date {year:04}-{month:02}-{day:02}")))
}

/// Epoch seconds of the instant denoted by civil fields plus an optional
/// offset; offset-free input is read as UTC.
fn instant(
  date: NaiveDate,
  hour: u32,
  minute: u32,
  second: u32,
  nanos: u32,
  offset: Option<i32>,
) -> Result<ParsedTimestamp, ParseFailure> {
  let wall = date.and_hms_nano_opt(hour, minute, second, nanos).ok_or_else(|| {
    ParseFailure::new(
      "out of range",
      format!("no such time {hour:02}:{minute:02}:{second:02}.{nanos:09}"),
    )
  })?;

  Ok(ParsedTimestamp {
    seconds: wall.and_utc().timestamp() - i64::from(offset.unwrap_or(0)),
    nanos,
    offset,
  })
}

fn weekday(d: u32) -> Result<Weekday, ParseFailure> {
  match d {
    1 => Ok(Weekday::Mon),
    2 => Ok(Weekday::Tue),
    3 => Ok(Weekday::Wed),
    4 => Ok(Weekday::Thu),
    5 => Ok(Weekday::Fri),
    6 => Ok(Weekday::Sat),
    7 => Ok(Weekday::Sun),
    _ => Err(ParseFailure::new("out of range", format!("no such weekday {d}"))),
  }
}
