// src/record.rs
//
// One timesheet record is an ordered map of header name -> scalar. Years of
// format drift left every logical field with several header spellings
// (newlines, stray spaces, two typos that shipped); `Field` is the canonical
// enum and carries the full alias table, so the cascade itself only ever
// deals in canonical fields.
use once_cell::sync::Lazy;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::cell::Cell;

/// Canonical record fields. Inputs first, then the derived fields in
/// cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    NameSurname,
    Discipline,
    WeekMonth,
    Company,
    Scope,
    Projects,
    ProjectsGroup,
    Nationality,
    OfficeLocation,
    TotalMh,
    KuzeyMh,
    KuzeyMhPerson,
    Status,
    IsverenCurrency,
    IsverenSozlesmeNo,
    IsverenHakedisNo,
    IsverenHakedisDonemi,
    IsverenHakedisKapsam,
    IsverenMhModifiye,
    NorthSouth,
    Currency,
    ApCbSubcon,
    LsUnitRate,
    HourlyBaseRate,
    HourlyAdditionalRate,
    HourlyRate,
    Cost,
    GeneralTotalCostUsd,
    HourlyUnitRateUsd,
    No1,
    No2,
    No3,
    No10,
    HakedisBirimFiyat,
    Hakedis,
    HakedisUsd,
    HakedisBirimFiyatUsd,
    Control1,
    TmListe,
    TmKod,
    Kontrol1,
    Kontrol2,
}

impl Field {
    /// Every known header spelling of this field, canonical name first.
    /// The odd spellings ("Konrol-1", "Knrtol-2", embedded newlines) are the
    /// headers that actually shipped in the legacy workbook and stay
    /// first-class.
    pub fn variants(self) -> &'static [&'static str] {
        match self {
            Field::Id => &["ID"],
            Field::NameSurname => &["Name Surname"],
            Field::Discipline => &["Discipline"],
            Field::WeekMonth => &[
                "(Week /\nMonth)",
                "(Week / Month)",
                "Week / Month",
                "Week/Month",
            ],
            Field::Company => &["Company"],
            Field::Scope => &["Scope"],
            Field::Projects => &["Projects"],
            Field::ProjectsGroup => &["Projects/Group"],
            Field::Nationality => &["Nationality"],
            Field::OfficeLocation => &["Office Location"],
            Field::TotalMh => &["TOTAL\n MH", "TOTAL MH", "Total MH"],
            Field::KuzeyMh => &["Kuzey MH"],
            Field::KuzeyMhPerson => &["Kuzey MH-Person"],
            Field::Status => &["Status"],
            Field::IsverenCurrency => &["İşveren - Currency", "İşveren-Currency"],
            Field::IsverenSozlesmeNo => &["İşveren- Sözleşme No"],
            Field::IsverenHakedisNo => &["İşveren- Hakediş No"],
            Field::IsverenHakedisDonemi => &["İşveren- Hakediş Dönemi"],
            Field::IsverenHakedisKapsam => &["İşveren- Hakediş Kapsam"],
            Field::IsverenMhModifiye => &["İşveren- MH-Modifiye"],
            Field::NorthSouth => &["North/South", "North/\nSouth", "North/ South"],
            Field::Currency => &["Currency"],
            Field::ApCbSubcon => &["AP-CB /\nSubcon", "AP-CB / \nSubcon", "AP-CB/Subcon"],
            Field::LsUnitRate => &["LS/Unit Rate"],
            Field::HourlyBaseRate => &["Hourly Base Rate"],
            Field::HourlyAdditionalRate => {
                &["Hourly Additional Rates", "Hourly Additional Rate"]
            }
            Field::HourlyRate => &["Hourly Rate", "Hourly\n Rate"],
            Field::Cost => &["Cost"],
            Field::GeneralTotalCostUsd => {
                &["General Total Cost (USD)", "General Total\n Cost (USD)"]
            }
            Field::HourlyUnitRateUsd => &["Hourly Unit Rate (USD)"],
            Field::No1 => &["NO-1"],
            Field::No2 => &["NO-2"],
            Field::No3 => &["NO-3"],
            Field::No10 => &["NO-10"],
            Field::HakedisBirimFiyat => &["İşveren-Hakediş Birim Fiyat"],
            Field::Hakedis => &["İşveren- Hakediş"],
            Field::HakedisUsd => &["İşveren- Hakediş (USD)"],
            Field::HakedisBirimFiyatUsd => &[
                "İşveren-Hakediş Birim Fiyat\n(USD)",
                "İşveren-Hakediş Birim Fiyat (USD)",
            ],
            Field::Control1 => &["Control-1"],
            Field::TmListe => &["TM Liste"],
            Field::TmKod => &["TM Kod"],
            Field::Kontrol1 => &["Konrol-1", "Kontrol-1"],
            Field::Kontrol2 => &["Knrtol-2", "Kontrol-2"],
        }
    }

    /// Canonical header name (the spelling reports and new columns use).
    pub fn name(self) -> &'static str {
        self.variants()[0]
    }

    /// Resolve a header spelling to its canonical field.
    pub fn from_name(name: &str) -> Option<Field> {
        ALIAS_INDEX.get(name).copied()
    }
}

const ALL_FIELDS: [Field; 43] = [
    Field::Id,
    Field::NameSurname,
    Field::Discipline,
    Field::WeekMonth,
    Field::Company,
    Field::Scope,
    Field::Projects,
    Field::ProjectsGroup,
    Field::Nationality,
    Field::OfficeLocation,
    Field::TotalMh,
    Field::KuzeyMh,
    Field::KuzeyMhPerson,
    Field::Status,
    Field::IsverenCurrency,
    Field::IsverenSozlesmeNo,
    Field::IsverenHakedisNo,
    Field::IsverenHakedisDonemi,
    Field::IsverenHakedisKapsam,
    Field::IsverenMhModifiye,
    Field::NorthSouth,
    Field::Currency,
    Field::ApCbSubcon,
    Field::LsUnitRate,
    Field::HourlyBaseRate,
    Field::HourlyAdditionalRate,
    Field::HourlyRate,
    Field::Cost,
    Field::GeneralTotalCostUsd,
    Field::HourlyUnitRateUsd,
    Field::No1,
    Field::No2,
    Field::No3,
    Field::No10,
    Field::HakedisBirimFiyat,
    Field::Hakedis,
    Field::HakedisUsd,
    Field::HakedisBirimFiyatUsd,
    Field::Control1,
    Field::TmListe,
    Field::TmKod,
    Field::Kontrol1,
    Field::Kontrol2,
];

static ALIAS_INDEX: Lazy<HashMap<&'static str, Field>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for field in ALL_FIELDS {
        for variant in field.variants() {
            index.insert(*variant, field);
        }
    }
    index
});

/// An insertion-ordered map of header name -> cell. Unrecognized keys are
/// carried through untouched; only reads/writes that go through `Field`
/// consult the alias table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    keys: Vec<String>,
    values: HashMap<String, Cell>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, value: Cell) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.as_str())
    }

    /// Read a canonical field, falling through the header variants: the
    /// first variant holding a usable value wins; failing that, the first
    /// variant present at all; failing that, an empty cell. Matches how the
    /// legacy sheets are read (a zero under one spelling defers to a real
    /// value under another).
    pub fn field(&self, field: Field) -> Cell {
        let mut first_present: Option<&Cell> = None;
        for variant in field.variants() {
            if let Some(cell) = self.values.get(*variant) {
                if cell.is_truthy() {
                    return cell.clone();
                }
                first_present.get_or_insert(cell);
            }
        }
        first_present.cloned().unwrap_or(Cell::Empty)
    }

    /// Write a derived field under every known header spelling, so whichever
    /// variant a downstream consumer selects sees the same value.
    pub fn set_field(&mut self, field: Field, value: Cell) {
        for variant in field.variants() {
            self.insert(*variant, value.clone());
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for key in &self.keys {
            map.serialize_entry(key, &self.values[key])?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of header name to scalar value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
                let mut record = Record::new();
                while let Some((key, value)) = access.next_entry::<String, Cell>()? {
                    record.insert(key, value);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_read_falls_through_header_variants() {
        let mut r = Record::new();
        r.insert("TOTAL\n MH", Cell::Number(0.0));
        r.insert("Total MH", Cell::Number(160.0));
        // Zero under the first spelling defers to the populated variant.
        assert_eq!(r.field(Field::TotalMh), Cell::Number(160.0));

        let mut only_zero = Record::new();
        only_zero.insert("TOTAL MH", Cell::Number(0.0));
        assert_eq!(only_zero.field(Field::TotalMh), Cell::Number(0.0));

        assert_eq!(Record::new().field(Field::TotalMh), Cell::Empty);
    }

    #[test]
    fn set_field_writes_every_variant() {
        let mut r = Record::new();
        r.set_field(Field::NorthSouth, Cell::text("North"));
        assert_eq!(r.get("North/South"), Some(&Cell::text("North")));
        assert_eq!(r.get("North/\nSouth"), Some(&Cell::text("North")));
        assert_eq!(r.get("North/ South"), Some(&Cell::text("North")));
    }

    #[test]
    fn insertion_order_survives_serde_round_trip() {
        let mut r = Record::new();
        r.insert("ID", Cell::Number(101.0));
        r.insert("Scope", Cell::text("Scope-A"));
        r.insert("Custom Key", Cell::text("pass-through"));

        let json = serde_json::to_string(&r).unwrap();
        assert!(json.find("ID").unwrap() < json.find("Scope").unwrap());
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert_eq!(
            back.keys().collect::<Vec<_>>(),
            vec!["ID", "Scope", "Custom Key"]
        );
    }

    #[test]
    fn alias_index_resolves_legacy_spellings() {
        assert_eq!(Field::from_name("Knrtol-2"), Some(Field::Kontrol2));
        assert_eq!(Field::from_name("Kontrol-2"), Some(Field::Kontrol2));
        assert_eq!(Field::from_name("(Week /\nMonth)"), Some(Field::WeekMonth));
        assert_eq!(Field::from_name("No Such Header"), None);
    }
}
