// src/cell.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value as it appears in a workbook export.
///
/// Numbers are kept as `f64` (dates included, as Excel serials). The legacy
/// sheets mix blanks, numbers and text freely within one column, so every
/// consumer goes through the coercion helpers below instead of matching on
/// the variant directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Empty cell (no value). Maps to/from JSON null.
    Empty,
    /// Boolean value (TRUE/FALSE).
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Text value.
    Text(String),
}

impl Cell {
    pub fn text<S: Into<String>>(s: S) -> Self {
        Cell::Text(s.into())
    }

    /// True for missing values: an empty cell or a NaN number.
    pub fn is_na(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// True for cells the bulk filler may write into: missing values and
    /// blank/whitespace-only text. Numeric 0 is a valid computed result and
    /// is NOT blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Text(s) => s.trim().is_empty(),
            _ => self.is_na(),
        }
    }

    /// True when the cell carries a usable value: not missing, not blank
    /// text, not numeric zero. Mirrors how the legacy sheets fall through
    /// header variants until one holds something.
    pub fn is_truthy(&self) -> bool {
        match self {
            Cell::Empty => false,
            Cell::Bool(b) => *b,
            // NaN compares unequal to 0.0, so a NaN number counts as truthy
            // here; `is_na` is the missing-value check.
            Cell::Number(n) => *n != 0.0,
            Cell::Text(s) => !s.is_empty(),
        }
    }

    /// Coerce to a number, falling back to `default` for anything that is
    /// missing or does not parse. Never fails.
    pub fn to_number(&self, default: f64) -> f64 {
        match self {
            Cell::Number(n) if !n.is_nan() => *n,
            Cell::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Cell::Text(s) => s.trim().parse::<f64>().unwrap_or(default),
            _ => default,
        }
    }

    /// Coerce to trimmed text, falling back to `default` for missing values.
    /// Integral numbers render without a decimal suffix so numeric codes
    /// (ids, billing codes) compare cleanly against their text spellings.
    pub fn to_text(&self, default: &str) -> String {
        match self {
            Cell::Empty => default.to_string(),
            Cell::Number(n) if n.is_nan() => default.to_string(),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(b) => {
                if *b {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            Cell::Text(s) => s.trim().to_string(),
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Bool(true) => write!(f, "TRUE"),
            Cell::Bool(false) => write!(f, "FALSE"),
            Cell::Number(n) if n.is_nan() => Ok(()),
            Cell::Number(n) => write!(f, "{}", format_number(*n)),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_number_parses_text_and_defaults_on_junk() {
        assert_eq!(Cell::text("45.5").to_number(0.0), 45.5);
        assert_eq!(Cell::text("  160 ").to_number(0.0), 160.0);
        assert_eq!(Cell::text("n/a").to_number(7.0), 7.0);
        assert_eq!(Cell::Empty.to_number(3.0), 3.0);
        assert_eq!(Cell::Number(f64::NAN).to_number(1.0), 1.0);
        assert_eq!(Cell::Bool(true).to_number(0.0), 1.0);
    }

    #[test]
    fn to_text_trims_and_formats_integral_numbers() {
        assert_eq!(Cell::text("  Scope-A  ").to_text(""), "Scope-A");
        assert_eq!(Cell::Number(905264.0).to_text(""), "905264");
        assert_eq!(Cell::Number(35.5).to_text(""), "35.5");
        assert_eq!(Cell::Empty.to_text("USD"), "USD");
        assert_eq!(Cell::Number(f64::NAN).to_text("x"), "x");
    }

    #[test]
    fn blankness_excludes_numeric_zero() {
        assert!(Cell::Empty.is_blank());
        assert!(Cell::text("   ").is_blank());
        assert!(Cell::Number(f64::NAN).is_blank());
        assert!(!Cell::Number(0.0).is_blank());
        assert!(!Cell::text("0").is_blank());
    }

    #[test]
    fn truthiness_skips_zero_and_empty_text() {
        assert!(!Cell::Number(0.0).is_truthy());
        assert!(!Cell::text("").is_truthy());
        assert!(Cell::Number(f64::NAN).is_truthy());
        assert!(Cell::text("x").is_truthy());
    }
}
