// src/filler.rs
//
// Bulk repair of a half-filled workbook export: run the cascade per row and
// write each derived value only into cells that are currently empty, leaving
// every user-entered value untouched. Each step reads the surviving cell
// back after its write attempt, so later steps consume whatever actually
// stands in the row — freshly computed or pre-existing.
use tracing::{debug, info};

use crate::cell::Cell;
use crate::engine::code;
use crate::lookup::xlookup;
use crate::record::Field;
use crate::reference::{ReferenceSnapshot, INFO, RATES, SUMMARY};

/// A dataset table: named columns over rows of cells. Row and column order
/// are preserved through a fill; rows are never added or removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        &self.rows[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        self.rows[row][col] = value;
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        &self.rows[row]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// First header variant of `field` present in this table, as a column
    /// index. Exact header match: variant spellings are enumerated, not
    /// fuzzy-matched.
    pub fn find_field(&self, field: Field) -> Option<usize> {
        field
            .variants()
            .iter()
            .find_map(|name| self.column_index(name))
    }

    /// Read `field` from one row, falling through the header variants the
    /// same way `Record::field` does: first usable value wins, then first
    /// present, then empty.
    pub fn field_value(&self, row: usize, field: Field) -> Cell {
        let mut first_present: Option<&Cell> = None;
        for name in field.variants() {
            if let Some(col) = self.column_index(name) {
                let cell = self.get(row, col);
                if cell.is_truthy() {
                    return cell.clone();
                }
                first_present.get_or_insert(cell);
            }
        }
        first_present.cloned().unwrap_or(Cell::Empty)
    }
}

/// Counters reported by one bulk fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillSummary {
    pub rows: usize,
    /// Previously-empty cells that received a computed value.
    pub cells_filled: usize,
    /// Consistency-flag cells whose stray 0/1 placeholder was rewritten.
    pub flags_normalized: usize,
}

// Write only when the destination is currently empty (missing or blank
// text; numeric 0 stands). Returns whether the write happened.
fn set_if_empty(table: &mut DataTable, row: usize, col: Option<usize>, value: &Cell) -> bool {
    let Some(col) = col else { return false };
    if table.get(row, col).is_blank() {
        table.set(row, col, value.clone());
        true
    } else {
        false
    }
}

/// Fill every empty derived-field cell of `table` from the cascade, against
/// one reference snapshot. Returns the repaired table and the counters; the
/// input is left untouched.
pub fn fill_empty_cells(table: &DataTable, refs: &ReferenceSnapshot) -> (DataTable, FillSummary) {
    let mut out = table.clone();
    let mut summary = FillSummary {
        rows: out.row_count(),
        ..FillSummary::default()
    };

    // Resolve destination columns once; a missing column means the value is
    // still computed for later steps, just never written.
    let col_north_south = out.find_field(Field::NorthSouth);
    let col_currency = out.find_field(Field::Currency);
    let col_ap_cb_subcon = out.find_field(Field::ApCbSubcon);
    let col_ls_unit_rate = out.find_field(Field::LsUnitRate);
    let col_base_rate = out.find_field(Field::HourlyBaseRate);
    let col_additional_rate = out.find_field(Field::HourlyAdditionalRate);
    let col_hourly_rate = out.find_field(Field::HourlyRate);
    let col_cost = out.find_field(Field::Cost);
    let col_general_total = out.find_field(Field::GeneralTotalCostUsd);
    let col_hourly_unit_rate = out.find_field(Field::HourlyUnitRateUsd);
    let col_no_1 = out.find_field(Field::No1);
    let col_no_2 = out.find_field(Field::No2);
    let col_no_3 = out.find_field(Field::No3);
    let col_no_10 = out.find_field(Field::No10);
    let col_birim_fiyat = out.find_field(Field::HakedisBirimFiyat);
    let col_hakedis = out.find_field(Field::Hakedis);
    let col_hakedis_usd = out.find_field(Field::HakedisUsd);
    let col_birim_fiyat_usd = out.find_field(Field::HakedisBirimFiyatUsd);
    let col_control_1 = out.find_field(Field::Control1);
    let col_tm_liste = out.find_field(Field::TmListe);
    let col_tm_kod = out.find_field(Field::TmKod);
    let col_kontrol_1 = out.find_field(Field::Kontrol1);
    let col_kontrol_2 = out.find_field(Field::Kontrol2);

    let info = &refs.info;
    let rates = &refs.rates;

    for idx in 0..out.row_count() {
        if idx % 100 == 0 {
            debug!(row = idx, "bulk fill progress");
        }

        let person_id = out.field_value(idx, Field::Id).to_number(0.0);
        let id_key = Cell::Number(person_id);
        let scope = out.field_value(idx, Field::Scope).to_text("");
        let scope_key = Cell::text(scope.clone());
        let company = out.field_value(idx, Field::Company).to_text("");
        let projects = out.field_value(idx, Field::Projects).to_text("");
        let projects_key = Cell::text(projects.clone());
        let week_month = out.field_value(idx, Field::WeekMonth).to_text("");
        let total_mh = out.field_value(idx, Field::TotalMh).to_number(0.0);
        let kuzey_mh_person = out.field_value(idx, Field::KuzeyMhPerson).to_number(0.0);
        let isveren_currency = out.field_value(idx, Field::IsverenCurrency).to_text("");

        let usd_try = || {
            xlookup(
                &Cell::text(week_month.clone()),
                info.col(INFO.week_month),
                info.col(INFO.usd_try),
                Cell::Number(1.0),
            )
            .to_number(0.0)
        };
        let eur_usd = || {
            xlookup(
                &Cell::text(week_month.clone()),
                info.col(INFO.week_month),
                info.col(INFO.eur_usd),
                Cell::Number(1.0),
            )
            .to_number(0.0)
        };

        // Region classification.
        if col_north_south.is_some() {
            let north_south = xlookup(
                &scope_key,
                info.col(INFO.scope),
                info.col(INFO.north_south),
                Cell::text(""),
            );
            if set_if_empty(&mut out, idx, col_north_south, &north_south) {
                summary.cells_filled += 1;
            }
        }

        // Currency, read back so later branches see the surviving value.
        let currency = if let Some(col) = col_currency {
            let computed = if person_id == code::TL_PAYROLL_ID {
                Cell::text("TL")
            } else {
                xlookup(
                    &id_key,
                    rates.col(RATES.id),
                    rates.col(RATES.currency),
                    Cell::text("USD"),
                )
            };
            if set_if_empty(&mut out, idx, col_currency, &computed) {
                summary.cells_filled += 1;
            }
            out.get(idx, col).to_text("USD")
        } else {
            "USD".to_string()
        };

        // Vendor classification.
        let computed_ap_cb = if company.to_uppercase().contains(code::PRIME_VENDOR) {
            "AP-CB"
        } else {
            "Subcon"
        };
        let ap_cb_subcon = if let Some(col) = col_ap_cb_subcon {
            if set_if_empty(&mut out, idx, col_ap_cb_subcon, &Cell::text(computed_ap_cb)) {
                summary.cells_filled += 1;
            }
            out.get(idx, col).to_text("")
        } else {
            computed_ap_cb.to_string()
        };

        // Pricing model.
        let scope_has_lumpsum = scope.to_lowercase().contains("lumpsum");
        let company_is_lumpsum = code::LUMPSUM_COMPANIES.contains(&company.as_str());
        let computed_ls = if scope_has_lumpsum || company_is_lumpsum {
            "Lumpsum"
        } else {
            "Unit Rate"
        };
        let ls_unit_rate = if let Some(col) = col_ls_unit_rate {
            if set_if_empty(&mut out, idx, col_ls_unit_rate, &Cell::text(computed_ls)) {
                summary.cells_filled += 1;
            }
            out.get(idx, col).to_text("")
        } else {
            computed_ls.to_string()
        };

        // Base hourly rate.
        let base_rate_col = if ap_cb_subcon == "Subcon" && ls_unit_rate == "Unit Rate" {
            RATES.base_rate_subcon
        } else {
            RATES.base_rate_general
        };
        let mut hourly_base_rate = xlookup(
            &id_key,
            rates.col(RATES.id),
            rates.col(base_rate_col),
            Cell::Number(0.0),
        )
        .to_number(0.0);
        if let Some(col) = col_base_rate {
            if set_if_empty(&mut out, idx, col_base_rate, &Cell::Number(hourly_base_rate)) {
                summary.cells_filled += 1;
            }
            hourly_base_rate = out.get(idx, col).to_number(0.0);
        }

        // Additional hourly rate.
        let mut hourly_additional_rate = if ls_unit_rate == "Lumpsum"
            || company == code::PRIME_VENDOR
            || company == code::PRIME_VENDOR_ALT
        {
            0.0
        } else {
            let additional_base = xlookup(
                &id_key,
                rates.col(RATES.id),
                rates.col(RATES.additional_rate),
                Cell::Number(0.0),
            )
            .to_number(0.0);
            match currency.as_str() {
                "USD" => additional_base,
                "TL" => additional_base * usd_try(),
                _ => 0.0,
            }
        };
        if let Some(col) = col_additional_rate {
            if set_if_empty(
                &mut out,
                idx,
                col_additional_rate,
                &Cell::Number(hourly_additional_rate),
            ) {
                summary.cells_filled += 1;
            }
            hourly_additional_rate = out.get(idx, col).to_number(0.0);
        }

        // Total hourly rate.
        let mut hourly_rate = hourly_base_rate + hourly_additional_rate;
        if let Some(col) = col_hourly_rate {
            if set_if_empty(&mut out, idx, col_hourly_rate, &Cell::Number(hourly_rate)) {
                summary.cells_filled += 1;
            }
            hourly_rate = out.get(idx, col).to_number(0.0);
        }

        // Cost.
        let mut cost = hourly_rate * total_mh;
        if let Some(col) = col_cost {
            if set_if_empty(&mut out, idx, col_cost, &Cell::Number(cost)) {
                summary.cells_filled += 1;
            }
            cost = out.get(idx, col).to_number(0.0);
        }

        // Cost in USD.
        let mut general_total_cost_usd = match currency.as_str() {
            "TL" => {
                let rate = usd_try();
                if rate != 0.0 {
                    cost / rate
                } else {
                    0.0
                }
            }
            "EURO" => cost * eur_usd(),
            _ => cost,
        };
        if let Some(col) = col_general_total {
            if set_if_empty(
                &mut out,
                idx,
                col_general_total,
                &Cell::Number(general_total_cost_usd),
            ) {
                summary.cells_filled += 1;
            }
            general_total_cost_usd = out.get(idx, col).to_number(0.0);
        }

        // USD unit rate.
        if col_hourly_unit_rate.is_some() {
            let hourly_unit_rate_usd = if total_mh != 0.0 {
                general_total_cost_usd / total_mh
            } else {
                0.0
            };
            if set_if_empty(
                &mut out,
                idx,
                col_hourly_unit_rate,
                &Cell::Number(hourly_unit_rate_usd),
            ) {
                summary.cells_filled += 1;
            }
        }

        // Billing-code lookups; read back raw cells, the consistency flag
        // compares them with typed equality.
        let mut no_1 = xlookup(
            &scope_key,
            info.col(INFO.scope_alt),
            info.col(INFO.no1_value),
            Cell::Number(0.0),
        );
        if let Some(col) = col_no_1 {
            if set_if_empty(&mut out, idx, col_no_1, &no_1) {
                summary.cells_filled += 1;
            }
            no_1 = out.get(idx, col).clone();
        }

        let mut no_2 = xlookup(
            &scope_key,
            info.col(INFO.scope),
            info.col(INFO.alt_code_a),
            Cell::text(""),
        );
        if let Some(col) = col_no_2 {
            if set_if_empty(&mut out, idx, col_no_2, &no_2) {
                summary.cells_filled += 1;
            }
            no_2 = out.get(idx, col).clone();
        }

        let no_3 = xlookup(
            &scope_key,
            info.col(INFO.scope),
            info.col(INFO.alt_code_b),
            Cell::text(""),
        );
        if set_if_empty(&mut out, idx, col_no_3, &no_3) {
            summary.cells_filled += 1;
        }

        let no_10 = xlookup(
            &no_1,
            info.col(INFO.code_index),
            info.col(INFO.code_index_value),
            Cell::text(""),
        );
        if set_if_empty(&mut out, idx, col_no_10, &no_10) {
            summary.cells_filled += 1;
        }

        // Client unit price.
        let no_1_num = no_1.to_number(0.0);
        let no_2_str = no_2.to_text("");
        let summary_price = |key: &Cell| match &refs.summary {
            Some(s) => xlookup(
                key,
                s.col(SUMMARY.code),
                s.col(SUMMARY.unit_price),
                Cell::Number(0.0),
            )
            .to_number(0.0),
            None => 0.0,
        };
        let mut hakedis_birim_fiyat = if code::AT_RATE_NO2.contains(&no_2_str.as_str())
            || no_1_num == code::AT_RATE_NO1
        {
            hourly_rate
        } else if code::ESCALATED_NO1.contains(&no_1_num) || no_2_str == code::ESCALATED_NO2 {
            hourly_rate * code::ESCALATION_FACTOR
        } else if no_2_str == code::DIRECT_RATE_NO2 {
            xlookup(
                &id_key,
                info.col(INFO.person_id_alt),
                info.col(INFO.special_rate),
                Cell::Number(0.0),
            )
            .to_number(0.0)
        } else {
            summary_price(&no_1) + summary_price(&no_2)
        };
        if let Some(col) = col_birim_fiyat {
            if set_if_empty(
                &mut out,
                idx,
                col_birim_fiyat,
                &Cell::Number(hakedis_birim_fiyat),
            ) {
                summary.cells_filled += 1;
            }
            hakedis_birim_fiyat = out.get(idx, col).to_number(0.0);
        }

        // Client billable.
        let mut hakedis = if kuzey_mh_person > 0.0 {
            kuzey_mh_person * hakedis_birim_fiyat
        } else {
            hakedis_birim_fiyat * total_mh
        };
        if let Some(col) = col_hakedis {
            if set_if_empty(&mut out, idx, col_hakedis, &Cell::Number(hakedis)) {
                summary.cells_filled += 1;
            }
            hakedis = out.get(idx, col).to_number(0.0);
        }

        // Client billable in USD.
        let mut hakedis_usd = if isveren_currency == "EURO" {
            hakedis * eur_usd()
        } else {
            hakedis
        };
        if let Some(col) = col_hakedis_usd {
            if set_if_empty(&mut out, idx, col_hakedis_usd, &Cell::Number(hakedis_usd)) {
                summary.cells_filled += 1;
            }
            hakedis_usd = out.get(idx, col).to_number(0.0);
        }

        // Client unit price in USD.
        if col_birim_fiyat_usd.is_some() {
            let hakedis_birim_fiyat_usd = if kuzey_mh_person > 0.0 {
                hakedis_usd / kuzey_mh_person
            } else if total_mh != 0.0 {
                hakedis_usd / total_mh
            } else {
                0.0
            };
            if set_if_empty(
                &mut out,
                idx,
                col_birim_fiyat_usd,
                &Cell::Number(hakedis_birim_fiyat_usd),
            ) {
                summary.cells_filled += 1;
            }
        }

        // Cross-check codes.
        if col_control_1.is_some() {
            let control_1 = xlookup(
                &projects_key,
                info.col(INFO.projects),
                info.col(INFO.reporting),
                Cell::text(""),
            );
            if set_if_empty(&mut out, idx, col_control_1, &control_1) {
                summary.cells_filled += 1;
            }
        }

        if col_tm_liste.is_some() {
            let tm_liste = xlookup(
                &id_key,
                info.col(INFO.person_id_wide),
                info.col(INFO.tm_liste),
                Cell::text(""),
            );
            if set_if_empty(&mut out, idx, col_tm_liste, &tm_liste) {
                summary.cells_filled += 1;
            }
        }

        if col_tm_kod.is_some() {
            let tm_kod = xlookup(
                &projects_key,
                info.col(INFO.projects),
                info.col(INFO.tm_kod),
                Cell::text(""),
            );
            if set_if_empty(&mut out, idx, col_tm_kod, &tm_kod) {
                summary.cells_filled += 1;
            }
        }

        if col_kontrol_1.is_some() {
            let kontrol_1 = xlookup(
                &projects_key,
                info.col(INFO.projects_alt),
                info.col(INFO.no1_value),
                Cell::text(""),
            );
            if set_if_empty(&mut out, idx, col_kontrol_1, &kontrol_1) {
                summary.cells_filled += 1;
            }
        }

        // Consistency flag, written as literal text. A stray numeric 0/1
        // left by an earlier bad fill is rewritten; genuine TRUE/FALSE text
        // stands.
        if let Some(col) = col_kontrol_2 {
            let kontrol_1_val = match col_kontrol_1 {
                Some(c1) => out.get(idx, c1).clone(),
                None => Cell::text(""),
            };
            let flag = if no_1 == kontrol_1_val { "TRUE" } else { "FALSE" };

            let current = out.get(idx, col);
            // Bare booleans are rewritten as text as well; only literal
            // "TRUE"/"FALSE" strings are already in their final form.
            let stray_placeholder = matches!(
                current,
                Cell::Number(n) if *n == 0.0 || *n == 1.0
            ) || matches!(current, Cell::Bool(_));
            if current.is_blank() {
                out.set(idx, col, Cell::text(flag));
                summary.cells_filled += 1;
            } else if stray_placeholder {
                out.set(idx, col, Cell::text(flag));
                summary.flags_normalized += 1;
            }
        }
    }

    info!(
        rows = summary.rows,
        cells_filled = summary.cells_filled,
        flags_normalized = summary.flags_normalized,
        "bulk fill finished"
    );
    (out, summary)
}
