//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Uncertain datetimes are stored as their 20-character sort key, so that
//! `ORDER BY` on the column gives their natural order. Calendar dates are
//! `YYYY-MM-DD`. Enum fields are stored by their `strum` names and
//! structured fields (common names, case detail, SI&M review) as compact JSON.

use std::str::FromStr;

use cetus_core::{
  animal::{Animal, Gender, Observation},
  case::{
    Case, CaseDetail, CaseNames, HumanInteraction, NewCase, SeriousInjuryAndMortality,
    Validity,
  },
  datetime::UncertainDateTime,
  ids::{AnimalId, CaseId, ObservationId, TaxonId},
  numbering::YearCaseNumber,
  taxon::Taxon,
};
use chrono::NaiveDate;
use rusqlite::Row;

use crate::{Error, Result};

fn parse<T: FromStr>(column: &'static str, value: &str) -> Result<T> {
  value
    .parse()
    .map_err(|_| Error::Decode { column, value: value.to_owned() })
}

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(column: &'static str, s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|_| Error::Decode { column, value: s.to_owned() })
}

pub fn encode_udt(dt: &UncertainDateTime) -> String { dt.sortkey(false) }

pub fn decode_udt(s: &str) -> Result<UncertainDateTime> {
  Ok(UncertainDateTime::from_sortkey(s)?)
}

// ─── Taxon ───────────────────────────────────────────────────────────────────

pub const TAXON_COLUMNS: &str = "taxon_id, name, common_names, rank";

pub struct RawTaxon {
  pub taxon_id:     i64,
  pub name:         String,
  pub common_names: String,
  pub rank:         String,
}

impl RawTaxon {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      taxon_id:     row.get(0)?,
      name:         row.get(1)?,
      common_names: row.get(2)?,
      rank:         row.get(3)?,
    })
  }

  pub fn into_taxon(self) -> Result<Taxon> {
    Ok(Taxon {
      id:           TaxonId(self.taxon_id),
      name:         self.name,
      common_names: serde_json::from_str(&self.common_names)?,
      rank:         parse("taxa.rank", &self.rank)?,
    })
  }
}

// ─── Animal ──────────────────────────────────────────────────────────────────

pub const ANIMAL_COLUMNS: &str = "animal_id, field_number, name, determined_taxon, \
   determined_gender, determined_dead_before, carcass_disposed, partial_necropsy, \
   necropsy, cause_of_death";

pub struct RawAnimal {
  pub animal_id:              i64,
  pub field_number:           Option<String>,
  pub name:                   Option<String>,
  pub determined_taxon:       Option<i64>,
  pub determined_gender:      Option<String>,
  pub determined_dead_before: Option<String>,
  pub carcass_disposed:       Option<bool>,
  pub partial_necropsy:       bool,
  pub necropsy:               bool,
  pub cause_of_death:         Option<String>,
}

impl RawAnimal {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      animal_id:              row.get(0)?,
      field_number:           row.get(1)?,
      name:                   row.get(2)?,
      determined_taxon:       row.get(3)?,
      determined_gender:      row.get(4)?,
      determined_dead_before: row.get(5)?,
      carcass_disposed:       row.get(6)?,
      partial_necropsy:       row.get(7)?,
      necropsy:               row.get(8)?,
      cause_of_death:         row.get(9)?,
    })
  }

  pub fn into_animal(self) -> Result<Animal> {
    Ok(Animal {
      id:                     AnimalId(self.animal_id),
      field_number:           self.field_number,
      name:                   self.name,
      determined_taxon:       self.determined_taxon.map(TaxonId),
      determined_gender:      self
        .determined_gender
        .as_deref()
        .map(|g| parse::<Gender>("animals.determined_gender", g))
        .transpose()?,
      determined_dead_before: self
        .determined_dead_before
        .as_deref()
        .map(|d| decode_date("animals.determined_dead_before", d))
        .transpose()?,
      carcass_disposed:       self.carcass_disposed,
      partial_necropsy:       self.partial_necropsy,
      necropsy:               self.necropsy,
      cause_of_death:         self.cause_of_death,
    })
  }
}

// ─── Observation ─────────────────────────────────────────────────────────────

pub const OBSERVATION_COLUMNS: &str = "o.observation_id, o.animal_id, o.datetime_observed, \
   o.datetime_reported, o.taxon_id, o.gender, o.animal_description, o.gear_present, \
   o.gear_retrieved";

pub struct RawObservation {
  pub observation_id:     i64,
  pub animal_id:          i64,
  pub datetime_observed:  String,
  pub datetime_reported:  Option<String>,
  pub taxon_id:           Option<i64>,
  pub gender:             Option<String>,
  pub animal_description: Option<String>,
  pub gear_present:       Option<bool>,
  pub gear_retrieved:     Option<bool>,
}

impl RawObservation {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      observation_id:     row.get(0)?,
      animal_id:          row.get(1)?,
      datetime_observed:  row.get(2)?,
      datetime_reported:  row.get(3)?,
      taxon_id:           row.get(4)?,
      gender:             row.get(5)?,
      animal_description: row.get(6)?,
      gear_present:       row.get(7)?,
      gear_retrieved:     row.get(8)?,
    })
  }

  pub fn into_observation(self) -> Result<Observation> {
    Ok(Observation {
      id:                 ObservationId(self.observation_id),
      animal_id:          AnimalId(self.animal_id),
      datetime_observed:  decode_udt(&self.datetime_observed)?,
      datetime_reported:  self.datetime_reported.as_deref().map(decode_udt).transpose()?,
      taxon:              self.taxon_id.map(TaxonId),
      gender:             self
        .gender
        .as_deref()
        .map(|g| parse::<Gender>("observations.gender", g))
        .transpose()?,
      animal_description: self.animal_description,
      gear_present:       self.gear_present,
      gear_retrieved:     self.gear_retrieved,
    })
  }
}

// ─── Case ────────────────────────────────────────────────────────────────────

/// Case columns, with the ledger row of the current number joined in as `y`.
pub const CASE_COLUMNS: &str = "c.case_id, c.animal_id, c.case_type, c.detail_json, \
   c.validity, c.happened_after, c.human_interaction, c.ole_investigation, c.si_n_m, \
   c.import_notes, c.date, c.current_year, c.current_number, y.case_id, c.names, \
   c.merged_into";

pub const CASE_FROM: &str = "cases c LEFT JOIN year_case_numbers y \
   ON y.year = c.current_year AND y.number = c.current_number";

pub struct RawCase {
  pub case_id:           i64,
  pub animal_id:         i64,
  pub case_type:         String,
  pub detail_json:       String,
  pub validity:          String,
  pub happened_after:    Option<String>,
  pub human_interaction: String,
  pub ole_investigation: Option<bool>,
  pub si_n_m:            String,
  pub import_notes:      String,
  pub date:              Option<String>,
  pub current_year:      Option<i32>,
  pub current_number:    Option<u32>,
  pub number_holder:     Option<i64>,
  pub names:             String,
  pub merged_into:       Option<i64>,
}

impl RawCase {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      case_id:           row.get(0)?,
      animal_id:         row.get(1)?,
      case_type:         row.get(2)?,
      detail_json:       row.get(3)?,
      validity:          row.get(4)?,
      happened_after:    row.get(5)?,
      human_interaction: row.get(6)?,
      ole_investigation: row.get(7)?,
      si_n_m:            row.get(8)?,
      import_notes:      row.get(9)?,
      date:              row.get(10)?,
      current_year:      row.get(11)?,
      current_number:    row.get(12)?,
      number_holder:     row.get(13)?,
      names:             row.get(14)?,
      merged_into:       row.get(15)?,
    })
  }

  pub fn into_case(self) -> Result<Case> {
    let detail_json: serde_json::Value = serde_json::from_str(&self.detail_json)?;
    let current_number = match (self.current_year, self.current_number, self.number_holder) {
      (Some(year), Some(number), Some(holder)) => {
        Some(YearCaseNumber { year, number, case_id: CaseId(holder) })
      }
      _ => None,
    };
    Ok(Case {
      id: CaseId(self.case_id),
      animal_id: AnimalId(self.animal_id),
      detail: CaseDetail::from_parts(&self.case_type, detail_json)?,
      validity: parse("cases.validity", &self.validity)?,
      happened_after: self
        .happened_after
        .as_deref()
        .map(|d| decode_date("cases.happened_after", d))
        .transpose()?,
      human_interaction: parse("cases.human_interaction", &self.human_interaction)?,
      ole_investigation: self.ole_investigation,
      date: self.date.as_deref().map(decode_udt).transpose()?,
      current_number,
      names: CaseNames::parse(&self.names),
      import_notes: self.import_notes,
      si_n_m: serde_json::from_str(&self.si_n_m)?,
      merged_into: self.merged_into.map(CaseId),
    })
  }
}

/// The user-editable columns of a case, ready to bind.
pub struct CaseFields {
  pub case_type:         String,
  pub detail_json:       String,
  pub validity:          String,
  pub happened_after:    Option<String>,
  pub human_interaction: String,
  pub ole_investigation: Option<bool>,
  pub si_n_m:            String,
  pub import_notes:      String,
}

impl CaseFields {
  pub fn from_new(case: &NewCase) -> Result<Self> {
    Self::encode(
      &case.detail,
      case.validity,
      case.happened_after,
      case.human_interaction,
      case.ole_investigation,
      &case.si_n_m,
      &case.import_notes,
    )
  }

  pub fn from_case(case: &Case) -> Result<Self> {
    Self::encode(
      &case.detail,
      case.validity,
      case.happened_after,
      case.human_interaction,
      case.ole_investigation,
      &case.si_n_m,
      &case.import_notes,
    )
  }

  fn encode(
    detail: &CaseDetail,
    validity: Validity,
    happened_after: Option<NaiveDate>,
    human_interaction: HumanInteraction,
    ole_investigation: Option<bool>,
    si_n_m: &SeriousInjuryAndMortality,
    import_notes: &str,
  ) -> Result<Self> {
    Ok(Self {
      case_type: detail.discriminant(),
      detail_json: detail.to_json()?.to_string(),
      validity: validity.to_string(),
      happened_after: happened_after.map(encode_date),
      human_interaction: human_interaction.to_string(),
      ole_investigation,
      si_n_m: serde_json::to_string(si_n_m)?,
      import_notes: import_notes.to_owned(),
    })
  }
}
