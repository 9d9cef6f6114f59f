// src/lookup.rs
//
// The XLOOKUP-equivalent used everywhere in the cascade: single key, single
// return column, caller-supplied fallback. A lookup must never abort a
// calculation, so every miss or degenerate input resolves to the fallback.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cell::Cell;

static WS_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Trim, uppercase and collapse internal whitespace runs to single spaces.
/// Recovers matches lost to inconsistent spacing/casing in hand-maintained
/// reference sheets.
pub fn normalize_key(s: &str) -> String {
    WS_RUNS.replace_all(s.trim(), " ").to_uppercase()
}

/// Scan `keys` top to bottom for `key` and return the cell at the same row
/// of `values`, or `fallback`.
///
/// - A missing key (empty cell / NaN) short-circuits to the fallback.
/// - The first exact match wins. Reference tables legitimately contain
///   duplicate keys (revision rows); taking the lowest row index is the
///   tie-break policy, not an error.
/// - Text keys that miss exactly are retried with both sides normalized.
/// - A matched-but-blank value cell resolves to the fallback, as does a row
///   index past the end of the value column.
pub fn xlookup(key: &Cell, keys: &[Cell], values: &[Cell], fallback: Cell) -> Cell {
    if key.is_na() {
        return fallback;
    }

    let mut hit = keys.iter().position(|k| cells_equal(k, key));

    if hit.is_none() {
        if let Cell::Text(needle) = key {
            let needle = normalize_key(needle);
            hit = keys
                .iter()
                .position(|k| normalize_key(&k.to_text("")) == needle);
        }
    }

    match hit {
        Some(row) => match values.get(row) {
            Some(v) if !v.is_na() => v.clone(),
            _ => fallback,
        },
        None => fallback,
    }
}

// Exact equality: numbers numerically, text as-is, no cross-type coercion.
fn cells_equal(a: &Cell, b: &Cell) -> bool {
    match (a, b) {
        (Cell::Number(x), Cell::Number(y)) => x == y,
        (Cell::Text(x), Cell::Text(y)) => x == y,
        (Cell::Bool(x), Cell::Bool(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<Cell> {
        vec![
            Cell::Number(101.0),
            Cell::text("Scope-A"),
            Cell::Number(101.0),
            Cell::text("  scope-b   extra "),
        ]
    }

    fn values() -> Vec<Cell> {
        vec![
            Cell::text("first"),
            Cell::Number(45.0),
            Cell::text("second"),
            Cell::text("spaced"),
        ]
    }

    #[test]
    fn first_match_wins_on_duplicate_keys() {
        let got = xlookup(&Cell::Number(101.0), &keys(), &values(), Cell::Empty);
        assert_eq!(got, Cell::text("first"));
    }

    #[test]
    fn normalized_retry_recovers_spacing_and_case() {
        let got = xlookup(
            &Cell::text("SCOPE-B EXTRA"),
            &keys(),
            &values(),
            Cell::Empty,
        );
        assert_eq!(got, Cell::text("spaced"));
    }

    #[test]
    fn missing_key_returns_fallback() {
        let fb = Cell::text("fb");
        assert_eq!(xlookup(&Cell::Empty, &keys(), &values(), fb.clone()), fb);
        assert_eq!(
            xlookup(&Cell::Number(f64::NAN), &keys(), &values(), fb.clone()),
            fb
        );
    }

    #[test]
    fn blank_hit_and_short_value_column_return_fallback() {
        let ks = vec![Cell::Number(1.0), Cell::Number(2.0)];
        let vs = vec![Cell::Empty];
        assert_eq!(
            xlookup(&Cell::Number(1.0), &ks, &vs, Cell::Number(0.0)),
            Cell::Number(0.0)
        );
        assert_eq!(
            xlookup(&Cell::Number(2.0), &ks, &vs, Cell::Number(0.0)),
            Cell::Number(0.0)
        );
    }

    #[test]
    fn no_cross_type_match_on_exact_pass() {
        let ks = vec![Cell::text("101")];
        let vs = vec![Cell::text("hit")];
        // Numeric key never matches a text cell.
        assert_eq!(
            xlookup(&Cell::Number(101.0), &ks, &vs, Cell::Empty),
            Cell::Empty
        );
    }
}
