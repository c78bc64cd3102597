use std::{hint::black_box, time::Instant};

use crate::candidates::ParseFn;

/// Elapsed time a calibrated run must reach before it counts.
pub const MIN_RUN_SECONDS: f64 = 0.2;

/// Wall-clock seconds spent running `parse` on `timestamp` exactly
/// `iterations` times.
pub fn measure(parse: ParseFn, timestamp: &str, iterations: u64) -> f64 {
  let start = Instant::now();

  for _ in 0..iterations {
    let _ = black_box(parse(black_box(timestamp)));
  }

  start.elapsed().as_secs_f64()
}

/// Doubles the iteration count from 1 until a single run crosses
/// [`MIN_RUN_SECONDS`], returning the (count, elapsed) pair actually used.
pub fn auto_range(parse: ParseFn, timestamp: &str) -> (u64, f64) {
  auto_range_above(parse, timestamp, MIN_RUN_SECONDS)
}

pub(crate) fn auto_range_above(parse: ParseFn, timestamp: &str, min_seconds: f64) -> (u64, f64) {
  let mut iterations = 1;

  loop {
    let elapsed = measure(parse, timestamp, iterations);
    if elapsed >= min_seconds {
      return (iterations, elapsed);
    }

    iterations *= 2;
  }
}
