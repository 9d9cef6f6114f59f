// src/reference.rs
//
// The three reference sheets behind the cascade. Columns are addressed by
// fixed zero-based position, never by header: header text has drifted for
// years while positions have not, so position is the backward-compatibility
// contract. The named layout structs below are the single place those
// positions live.
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::cell::Cell;
use crate::loader::LoadError;
use crate::lookup::normalize_key;

/// A rectangular grid of cells, column-major so the cascade's per-column
/// scans borrow a slice instead of walking rows.
#[derive(Debug, Clone, Default)]
pub struct RefTable {
    columns: Vec<Vec<Cell>>,
    row_count: usize,
}

impl RefTable {
    /// Build from row-major data; short rows are padded with empty cells.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        let row_count = rows.len();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut columns = vec![Vec::with_capacity(row_count); width];
        for row in rows {
            for (i, column) in columns.iter_mut().enumerate() {
                column.push(row.get(i).cloned().unwrap_or(Cell::Empty));
            }
        }
        Self { columns, row_count }
    }

    /// The column at `index`, or an empty slice when the sheet is narrower
    /// than the requested position. An out-of-range column therefore makes
    /// every lookup against it resolve to its fallback instead of failing.
    pub fn col(&self, index: usize) -> &[Cell] {
        self.columns.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// Hourly Rates sheet layout (data region, header rows already stripped).
pub struct RatesColumns {
    pub id: usize,
    pub name: usize,
    pub currency: usize,
    /// Base rate billed in the general case.
    pub base_rate_general: usize,
    /// Base rate billed for subcontractor unit-rate work.
    pub base_rate_subcon: usize,
    pub additional_rate: usize,
}

pub const RATES: RatesColumns = RatesColumns {
    id: 0,
    name: 1,
    currency: 6,
    base_rate_general: 7,
    base_rate_subcon: 9,
    additional_rate: 11,
};

/// Info sheet layout.
pub struct InfoColumns {
    /// Billing-code index (NO-10 key side).
    pub code_index: usize,
    /// Billing-code index return side.
    pub code_index_value: usize,
    /// Alternate billing code A (NO-2).
    pub alt_code_a: usize,
    /// Alternate billing code B (NO-3).
    pub alt_code_b: usize,
    pub scope: usize,
    pub projects: usize,
    pub projects_group: usize,
    pub north_south: usize,
    pub tm_kod: usize,
    pub reporting: usize,
    /// Week/period key for the exchange-rate rows.
    pub week_month: usize,
    pub usd_try: usize,
    pub eur_usd: usize,
    /// Secondary person-id column used by the 517-A direct-rate path.
    pub person_id_alt: usize,
    pub special_rate: usize,
    /// NO-1 return side, shared with Konrol-1.
    pub no1_value: usize,
    /// Secondary scope key (NO-1 key side).
    pub scope_alt: usize,
    /// Secondary project key (Konrol-1 key side).
    pub projects_alt: usize,
    /// Wide-table person id (TM Liste key side).
    pub person_id_wide: usize,
    pub tm_liste: usize,
}

pub const INFO: InfoColumns = InfoColumns {
    code_index: 9,
    code_index_value: 10,
    alt_code_a: 11,
    alt_code_b: 12,
    scope: 13,
    projects: 14,
    projects_group: 15,
    north_south: 16,
    tm_kod: 17,
    reporting: 18,
    week_month: 20,
    usd_try: 22,
    eur_usd: 23,
    person_id_alt: 28,
    special_rate: 33,
    no1_value: 42,
    scope_alt: 46,
    projects_alt: 47,
    person_id_wide: 58,
    tm_liste: 60,
};

/// Summary sheet layout (sheet itself is optional).
pub struct SummaryColumns {
    pub code: usize,
    pub unit_price: usize,
}

pub const SUMMARY: SummaryColumns = SummaryColumns {
    code: 2,
    unit_price: 26,
};

/// One fully-loaded set of reference tables. A whole snapshot is the unit of
/// caching and replacement: a record or batch is always computed against a
/// single snapshot, never a half-reloaded mix.
#[derive(Debug, Default)]
pub struct ReferenceSnapshot {
    pub info: RefTable,
    pub rates: RefTable,
    /// Older workbooks ship without a Summary sheet.
    pub summary: Option<RefTable>,
}

/// Rates-sheet row for one person, as served to the person search.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PersonInfo {
    pub id: f64,
    pub name: String,
    pub currency: String,
    /// First non-zero of the two base-rate columns.
    pub base_rate: f64,
    pub additional_rate: f64,
}

impl ReferenceSnapshot {
    /// Case/spacing-insensitive name search over the Rates sheet. First
    /// matching row wins, like every other lookup here.
    pub fn person_info(&self, name: &str) -> Option<PersonInfo> {
        let needle = normalize_key(name);
        if needle.is_empty() {
            return None;
        }
        let names = self.rates.col(RATES.name);
        let row = names
            .iter()
            .position(|cell| normalize_key(&cell.to_text("")) == needle)?;

        let cell_at = |col: usize| self.rates.col(col).get(row).cloned().unwrap_or(Cell::Empty);
        let general = cell_at(RATES.base_rate_general).to_number(0.0);
        let subcon = cell_at(RATES.base_rate_subcon).to_number(0.0);
        Some(PersonInfo {
            id: cell_at(RATES.id).to_number(0.0),
            name: cell_at(RATES.name).to_text(""),
            currency: cell_at(RATES.currency).to_text("USD"),
            base_rate: if general != 0.0 { general } else { subcon },
            additional_rate: cell_at(RATES.additional_rate).to_number(0.0),
        })
    }
}

struct CachedEntry {
    source_id: String,
    snapshot: Arc<ReferenceSnapshot>,
}

/// Process-visible cache holding at most one snapshot, keyed by source
/// identity (normally the workbook path plus version). Replacement is
/// wholesale: a new source identity swaps the entire entry under the lock,
/// and readers keep working off the `Arc` they already hold, so nobody ever
/// observes a partially-replaced snapshot.
#[derive(Default)]
pub struct SnapshotCache {
    entry: Mutex<Option<CachedEntry>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached snapshot for `source_id`, if it is the resident one.
    pub fn get(&self, source_id: &str) -> Option<Arc<ReferenceSnapshot>> {
        let guard = self.entry.lock().unwrap();
        guard
            .as_ref()
            .filter(|entry| entry.source_id == source_id)
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    /// Return the resident snapshot for `source_id`, loading and swapping it
    /// in when a different source (or nothing) is resident. The load runs
    /// outside the lock; if another caller won the race for the same source
    /// in the meantime, their snapshot is reused.
    pub fn get_or_load<F>(&self, source_id: &str, load: F) -> Result<Arc<ReferenceSnapshot>, LoadError>
    where
        F: FnOnce() -> Result<ReferenceSnapshot, LoadError>,
    {
        if let Some(snapshot) = self.get(source_id) {
            debug!("Reference cache HIT for source '{}'", source_id);
            return Ok(snapshot);
        }

        debug!(
            "Reference cache MISS for source '{}'. Loading...",
            source_id
        );
        let loaded = Arc::new(load()?);

        let mut guard = self.entry.lock().unwrap();
        if let Some(entry) = guard.as_ref() {
            if entry.source_id == source_id {
                return Ok(Arc::clone(&entry.snapshot));
            }
        }
        info!(
            "Reference snapshot loaded for source '{}' ({} info rows, {} rate rows, summary: {})",
            source_id,
            loaded.info.row_count(),
            loaded.rates.row_count(),
            loaded.summary.is_some(),
        );
        *guard = Some(CachedEntry {
            source_id: source_id.to_string(),
            snapshot: Arc::clone(&loaded),
        });
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_snapshot(tag: &str) -> ReferenceSnapshot {
        let mut row = vec![Cell::Empty; 12];
        row[RATES.id] = Cell::Number(101.0);
        row[RATES.name] = Cell::text(format!("Person {}", tag));
        row[RATES.currency] = Cell::text("USD");
        row[RATES.base_rate_general] = Cell::Number(45.0);
        row[RATES.base_rate_subcon] = Cell::Number(40.0);
        row[RATES.additional_rate] = Cell::Number(5.0);
        ReferenceSnapshot {
            info: RefTable::default(),
            rates: RefTable::from_rows(vec![row]),
            summary: None,
        }
    }

    #[test]
    fn out_of_range_column_is_an_empty_slice() {
        let t = RefTable::from_rows(vec![vec![Cell::Number(1.0)]]);
        assert!(t.col(60).is_empty());
        assert_eq!(t.col(0).len(), 1);
    }

    #[test]
    fn short_rows_are_padded() {
        let t = RefTable::from_rows(vec![
            vec![Cell::Number(1.0), Cell::text("a")],
            vec![Cell::Number(2.0)],
        ]);
        assert_eq!(t.col(1), &[Cell::text("a"), Cell::Empty]);
    }

    #[test]
    fn cache_serves_same_snapshot_until_source_changes() {
        let cache = SnapshotCache::new();
        let a1 = cache.get_or_load("wb-a", || Ok(tiny_snapshot("a"))).unwrap();
        let a2 = cache.get_or_load("wb-a", || panic!("must not reload")).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let b = cache.get_or_load("wb-b", || Ok(tiny_snapshot("b"))).unwrap();
        assert!(!Arc::ptr_eq(&a1, &b));
        // The old Arc stays valid for readers that still hold it.
        assert_eq!(a1.rates.row_count(), 1);
        assert!(cache.get("wb-a").is_none());
    }

    #[test]
    fn person_search_is_case_and_spacing_insensitive() {
        let snapshot = tiny_snapshot("x");
        let hit = snapshot.person_info("  person   X ").unwrap();
        assert_eq!(hit.id, 101.0);
        assert_eq!(hit.base_rate, 45.0);
        assert!(snapshot.person_info("nobody").is_none());
        assert!(snapshot.person_info("   ").is_none());
    }
}
