#[extend::ext(name = F64Ext)]
pub impl f64 {
  /// Rounds to `digits` significant digits, without exponent notation.
  fn to_precision(self, digits: usize) -> String {
    if self == 0.0 || !self.is_finite() {
      return format!("{self}");
    }

    let magnitude = self.abs().log10().floor() as i32;
    let decimals = (digits as i32 - 1 - magnitude).max(0) as usize;

    format!("{self:.decimals$}")
  }

  /// Like `to_precision`, with trailing zeros in the fraction trimmed.
  fn to_precision_trimmed(self, digits: usize) -> String {
    let fixed = self.to_precision(digits);

    if fixed.contains('.') {
      fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
      fixed
    }
  }
}
