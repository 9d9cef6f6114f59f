// src/engine.rs
//
// The formula cascade: derives every dependent field of one record from its
// inputs plus the active reference snapshot, in a fixed order so each step
// only consumes fields already computed. The cascade is total — malformed
// input degrades to documented fallbacks, and the only failure signal is the
// "not available" list returned alongside the augmented record.
use tracing::debug;

use crate::cell::Cell;
use crate::lookup::xlookup;
use crate::record::{Field, Record};
use crate::reference::{ReferenceSnapshot, INFO, RATES, SUMMARY};

/// Data constants baked into the legacy formulas.
pub mod code {
    /// The one payroll id whose currency is TL regardless of the Rates sheet.
    pub const TL_PAYROLL_ID: f64 = 905_264.0;
    /// Company-name marker for the prime vendor.
    pub const PRIME_VENDOR: &str = "AP-CB";
    /// Named prime-vendor variant that also earns no additional rate.
    pub const PRIME_VENDOR_ALT: &str = "AP-CB / pergel";
    /// Companies billed lumpsum-only, whatever the scope text says.
    pub const LUMPSUM_COMPANIES: [&str; 3] = ["İ4", "DEGENKOLB", "Kilci Danışmanlık"];

    /// NO-2 codes billed at the plain hourly rate.
    pub const AT_RATE_NO2: [&str; 3] = ["999-A", "999-C", "414-C"];
    /// NO-1 code billed at the plain hourly rate.
    pub const AT_RATE_NO1: f64 = 313.0;
    /// NO-1 codes billed at the escalated hourly rate.
    pub const ESCALATED_NO1: [f64; 3] = [312.0, 314.0, 316.0];
    /// NO-2 code billed at the escalated hourly rate.
    pub const ESCALATED_NO2: &str = "360-T";
    /// NO-2 code priced from the Info sheet's dedicated rate column.
    pub const DIRECT_RATE_NO2: &str = "517-A";
    /// Contractual escalation factor on the hourly rate.
    pub const ESCALATION_FACTOR: f64 = 1.02;
}

/// Result of one cascade run.
#[derive(Debug, Clone)]
pub struct CalcOutcome {
    /// The input record plus every derived field (all header variants set).
    pub record: Record,
    /// Required fields that resolved to nothing, in inspection order. The
    /// caller prompts for exactly these before persisting.
    pub unresolved: Vec<String>,
}

/// USD/TRY rate for a week/period key. Falls back to 1 on a missing period
/// and to 0 on a matched but unparseable rate cell, so the TL division guard
/// downstream sees the same values the legacy sheet produced.
fn usd_try_for_period(refs: &ReferenceSnapshot, week_month: &str) -> f64 {
    xlookup(
        &Cell::text(week_month),
        refs.info.col(INFO.week_month),
        refs.info.col(INFO.usd_try),
        Cell::Number(1.0),
    )
    .to_number(0.0)
}

/// EUR/USD rate for a week/period key, same fallback policy.
fn eur_usd_for_period(refs: &ReferenceSnapshot, week_month: &str) -> f64 {
    xlookup(
        &Cell::text(week_month),
        refs.info.col(INFO.week_month),
        refs.info.col(INFO.eur_usd),
        Cell::Number(1.0),
    )
    .to_number(0.0)
}

/// Unit price for a billing code from the optional Summary sheet; 0 when the
/// sheet is absent or the code misses.
fn summary_unit_price(refs: &ReferenceSnapshot, key: &Cell) -> f64 {
    match &refs.summary {
        Some(summary) => xlookup(
            key,
            summary.col(SUMMARY.code),
            summary.col(SUMMARY.unit_price),
            Cell::Number(0.0),
        )
        .to_number(0.0),
        None => 0.0,
    }
}

fn not_available(field: Field, value: &Cell) -> bool {
    // Numeric 0 only counts as missing for the NO-* lookups, whose fallback
    // is 0; a genuine 0 elsewhere (cost, rates) is a valid result.
    let zero_counts = matches!(field, Field::No1 | Field::No2 | Field::No3 | Field::No10);
    match value {
        Cell::Empty => true,
        Cell::Number(n) => n.is_nan() || (zero_counts && *n == 0.0),
        Cell::Text(s) => {
            let t = s.trim();
            t.is_empty() || t == "N/A"
        }
        Cell::Bool(_) => false,
    }
}

/// Run the cascade for one record against one reference snapshot.
///
/// Functional: the input is layered into a new record, nothing is mutated,
/// and the same snapshot serves every step.
pub fn calculate_fields(input: &Record, refs: &ReferenceSnapshot) -> CalcOutcome {
    let mut record = input.clone();

    let person_id = input.field(Field::Id).to_number(0.0);
    let id_key = Cell::Number(person_id);
    let company = input.field(Field::Company).to_text("");
    let scope = input.field(Field::Scope).to_text("");
    let scope_key = Cell::text(scope.clone());
    let projects = input.field(Field::Projects).to_text("");
    let projects_key = Cell::text(projects.clone());
    let week_month = input.field(Field::WeekMonth).to_text("");
    let total_mh = input.field(Field::TotalMh).to_number(0.0);
    let kuzey_mh_person = input.field(Field::KuzeyMhPerson).to_number(0.0);
    let isveren_currency = input.field(Field::IsverenCurrency).to_text("");

    let info = &refs.info;
    let rates = &refs.rates;

    // 1. Region classification from the scope.
    let north_south = xlookup(
        &scope_key,
        info.col(INFO.scope),
        info.col(INFO.north_south),
        Cell::text(""),
    );
    record.set_field(Field::NorthSouth, north_south.clone());

    // 2. Currency: the TL payroll id short-circuits the Rates sheet.
    let currency = if person_id == code::TL_PAYROLL_ID {
        "TL".to_string()
    } else {
        xlookup(
            &id_key,
            rates.col(RATES.id),
            rates.col(RATES.currency),
            Cell::text("USD"),
        )
        .to_text("USD")
    };
    record.set_field(Field::Currency, Cell::text(currency.clone()));
    debug!(person_id, %currency, "currency resolved");

    // 3. Project group from the project.
    let projects_group = xlookup(
        &projects_key,
        info.col(INFO.projects),
        info.col(INFO.projects_group),
        Cell::text(""),
    );
    record.set_field(Field::ProjectsGroup, projects_group);

    // 4. Vendor classification from the company-name marker.
    let ap_cb_subcon = if company.to_uppercase().contains(code::PRIME_VENDOR) {
        "AP-CB"
    } else {
        "Subcon"
    };
    record.set_field(Field::ApCbSubcon, Cell::text(ap_cb_subcon));

    // 5. Pricing model: lumpsum scope text or a lumpsum-only company.
    let scope_has_lumpsum = scope.to_lowercase().contains("lumpsum");
    let company_is_lumpsum = code::LUMPSUM_COMPANIES.contains(&company.as_str());
    let ls_unit_rate = if scope_has_lumpsum || company_is_lumpsum {
        "Lumpsum"
    } else {
        "Unit Rate"
    };
    record.set_field(Field::LsUnitRate, Cell::text(ls_unit_rate));

    // 6. Base hourly rate. Only the exact Subcon + Unit Rate pair bills the
    // subcontractor rate column.
    let base_rate_col = if ap_cb_subcon == "Subcon" && ls_unit_rate == "Unit Rate" {
        RATES.base_rate_subcon
    } else {
        RATES.base_rate_general
    };
    let hourly_base_rate = xlookup(
        &id_key,
        rates.col(RATES.id),
        rates.col(base_rate_col),
        Cell::Number(0.0),
    )
    .to_number(0.0);
    record.set_field(Field::HourlyBaseRate, Cell::Number(hourly_base_rate));
    debug!(
        ap_cb_subcon,
        ls_unit_rate, base_rate_col, hourly_base_rate, "base rate resolved"
    );

    // 7. Additional hourly rate: zero for lumpsum work and for the prime
    // vendor; otherwise the person's additional rate, converted through the
    // period's USD/TRY rate when the person is paid in TL.
    let hourly_additional_rate = if ls_unit_rate == "Lumpsum"
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
            "TL" => additional_base * usd_try_for_period(refs, &week_month),
            _ => 0.0,
        }
    };
    record.set_field(
        Field::HourlyAdditionalRate,
        Cell::Number(hourly_additional_rate),
    );

    // 8. Total hourly rate, always the sum.
    let hourly_rate = hourly_base_rate + hourly_additional_rate;
    record.set_field(Field::HourlyRate, Cell::Number(hourly_rate));

    // 9. Cost, always rate x man-hours.
    let cost = hourly_rate * total_mh;
    record.set_field(Field::Cost, Cell::Number(cost));

    // 10. Cost in USD via the period's exchange rate.
    let general_total_cost_usd = match currency.as_str() {
        "TL" => {
            let rate = usd_try_for_period(refs, &week_month);
            if rate != 0.0 {
                cost / rate
            } else {
                0.0
            }
        }
        "EURO" => cost * eur_usd_for_period(refs, &week_month),
        _ => cost,
    };
    record.set_field(
        Field::GeneralTotalCostUsd,
        Cell::Number(general_total_cost_usd),
    );

    // 11. USD unit rate per man-hour.
    let hourly_unit_rate_usd = if total_mh != 0.0 {
        general_total_cost_usd / total_mh
    } else {
        0.0
    };
    record.set_field(Field::HourlyUnitRateUsd, Cell::Number(hourly_unit_rate_usd));

    // 12-15. Billing-code lookups. NO-10 chains off NO-1. The wide-table
    // columns behind TM Liste are missing from older Info sheets, which
    // simply resolves to the blank fallback.
    let no_1 = xlookup(
        &scope_key,
        info.col(INFO.scope_alt),
        info.col(INFO.no1_value),
        Cell::Number(0.0),
    );
    record.set_field(Field::No1, no_1.clone());

    let no_2 = xlookup(
        &scope_key,
        info.col(INFO.scope),
        info.col(INFO.alt_code_a),
        Cell::text(""),
    );
    record.set_field(Field::No2, no_2.clone());

    let no_3 = xlookup(
        &scope_key,
        info.col(INFO.scope),
        info.col(INFO.alt_code_b),
        Cell::text(""),
    );
    record.set_field(Field::No3, no_3.clone());

    let no_10 = xlookup(
        &no_1,
        info.col(INFO.code_index),
        info.col(INFO.code_index_value),
        Cell::text(""),
    );
    record.set_field(Field::No10, no_10.clone());

    // 16. Client unit price: fixed code sets pin it to the hourly rate or
    // the escalated hourly rate, 517-A takes the dedicated rate column, and
    // everything else sums the Summary prices for NO-1 and NO-2.
    let no_1_num = no_1.to_number(0.0);
    let no_2_str = no_2.to_text("");
    let hakedis_birim_fiyat = if code::AT_RATE_NO2.contains(&no_2_str.as_str())
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
        summary_unit_price(refs, &no_1) + summary_unit_price(refs, &no_2)
    };
    record.set_field(Field::HakedisBirimFiyat, Cell::Number(hakedis_birim_fiyat));
    debug!(no_1_num, %no_2_str, hakedis_birim_fiyat, "client unit price resolved");

    // 17. Client billable amount; the person-specific hours override wins
    // over total man-hours when present.
    let hakedis = if kuzey_mh_person > 0.0 {
        kuzey_mh_person * hakedis_birim_fiyat
    } else {
        hakedis_birim_fiyat * total_mh
    };
    record.set_field(Field::Hakedis, Cell::Number(hakedis));

    // 18. Client billable in USD.
    let hakedis_usd = if isveren_currency == "EURO" {
        hakedis * eur_usd_for_period(refs, &week_month)
    } else {
        hakedis
    };
    record.set_field(Field::HakedisUsd, Cell::Number(hakedis_usd));

    // 19. Client unit price in USD, guarded against zero divisors.
    let hakedis_birim_fiyat_usd = if kuzey_mh_person > 0.0 {
        hakedis_usd / kuzey_mh_person
    } else if total_mh != 0.0 {
        hakedis_usd / total_mh
    } else {
        0.0
    };
    record.set_field(
        Field::HakedisBirimFiyatUsd,
        Cell::Number(hakedis_birim_fiyat_usd),
    );

    // 20-23. Cross-check codes.
    let control_1 = xlookup(
        &projects_key,
        info.col(INFO.projects),
        info.col(INFO.reporting),
        Cell::text(""),
    );
    record.set_field(Field::Control1, control_1.clone());

    let tm_liste = xlookup(
        &id_key,
        info.col(INFO.person_id_wide),
        info.col(INFO.tm_liste),
        Cell::text(""),
    );
    record.set_field(Field::TmListe, tm_liste.clone());

    let tm_kod = xlookup(
        &projects_key,
        info.col(INFO.projects),
        info.col(INFO.tm_kod),
        Cell::text(""),
    );
    record.set_field(Field::TmKod, tm_kod.clone());

    let kontrol_1 = xlookup(
        &projects_key,
        info.col(INFO.projects_alt),
        info.col(INFO.no1_value),
        Cell::text(""),
    );
    record.set_field(Field::Kontrol1, kontrol_1.clone());

    // 24. Consistency flag: the two independently derived NO-1 codes agree.
    let kontrol_2 = no_1 == kontrol_1;
    record.set_field(Field::Kontrol2, Cell::Bool(kontrol_2));

    // Required-field inspection, in the order callers prompt for them.
    let currency_cell = Cell::text(currency);
    let checks: [(Field, &Cell); 10] = [
        (Field::NorthSouth, &north_south),
        (Field::Currency, &currency_cell),
        (Field::Control1, &control_1),
        (Field::TmListe, &tm_liste),
        (Field::TmKod, &tm_kod),
        (Field::Kontrol1, &kontrol_1),
        (Field::No1, &no_1),
        (Field::No2, &no_2),
        (Field::No3, &no_3),
        (Field::No10, &no_10),
    ];
    let unresolved: Vec<String> = checks
        .iter()
        .filter(|(field, value)| not_available(*field, value))
        .map(|(field, _)| field.name().to_string())
        .collect();
    if !unresolved.is_empty() {
        debug!(?unresolved, "fields need manual entry");
    }

    CalcOutcome { record, unresolved }
}
