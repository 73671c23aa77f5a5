//! Cases: one incident (stranding, entanglement, ship strike) of one animal.
//!
//! Most of what is known about a case lives in the observations linked to it.
//! Its `date` is the earliest of their observation datetimes; its yearly
//! number follows from that date (see [`crate::numbering`]); its display name
//! is derived from both, and every distinct name it has carried is kept in an
//! append-only history.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  Result,
  animal::Observation,
  datetime::UncertainDateTime,
  error::MergeError,
  ids::{AnimalId, CaseId, GearAttributeId},
  numbering::YearCaseNumber,
};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The concrete kind of a case. Stored in the `case_type` column.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CaseKind {
  /// A generic case, typically a stranding.
  Stranding,
  Entanglement,
  Shipstrike,
}

impl CaseKind {
  /// Label used in case names.
  pub fn label(self) -> &'static str {
    match self {
      Self::Stranding => "Case",
      Self::Entanglement => "Entanglement",
      Self::Shipstrike => "Shipstrike",
    }
  }
}

/// Behaviour every kind-specific payload provides.
pub trait CaseVariant {
  fn case_kind(&self) -> CaseKind;

  /// Extra text placed after the kind label in case names.
  fn subtype_name_suffix(&self) -> Option<String> { None }
}

/// Entanglement-specific data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntanglementDetail {
  /// Identifier assigned by NMFS, if any.
  pub nmfs_id:                  Option<String>,
  /// Has the recovered gear been analysed?
  pub gear_analyzed:            bool,
  /// Attributes found by analysis. Everything they imply is derived, not
  /// stored.
  pub analyzed_gear_attributes: BTreeSet<GearAttributeId>,
}

impl CaseVariant for EntanglementDetail {
  fn case_kind(&self) -> CaseKind { CaseKind::Entanglement }

  fn subtype_name_suffix(&self) -> Option<String> {
    self.nmfs_id.clone().filter(|id| !id.is_empty())
  }
}

/// Ship-strike-specific data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipstrikeDetail {
  /// Free-text description of the striking vessel.
  pub striking_vessel: Option<String>,
}

impl CaseVariant for ShipstrikeDetail {
  fn case_kind(&self) -> CaseKind { CaseKind::Shipstrike }
}

/// The kind-specific payload of a case. The variant name is the `case_type`
/// discriminant stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CaseDetail {
  Stranding,
  Entanglement(EntanglementDetail),
  Shipstrike(ShipstrikeDetail),
}

impl CaseVariant for CaseDetail {
  fn case_kind(&self) -> CaseKind {
    match self {
      Self::Stranding => CaseKind::Stranding,
      Self::Entanglement(e) => e.case_kind(),
      Self::Shipstrike(s) => s.case_kind(),
    }
  }

  fn subtype_name_suffix(&self) -> Option<String> {
    match self {
      Self::Stranding => None,
      Self::Entanglement(e) => e.subtype_name_suffix(),
      Self::Shipstrike(s) => s.subtype_name_suffix(),
    }
  }
}

impl CaseDetail {
  /// The discriminant string stored in the `case_type` column.
  pub fn discriminant(&self) -> String { self.case_kind().to_string() }

  /// Serialise the inner payload (without the type tag).
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild from the stored discriminant and payload.
  pub fn from_parts(discriminant: &str, data: serde_json::Value) -> Result<Self> {
    let kind: CaseKind = discriminant
      .parse()
      .map_err(|_| crate::Error::UnknownCaseType(discriminant.to_owned()))?;
    let wrapped = match kind {
      CaseKind::Stranding => serde_json::json!({ "type": discriminant }),
      _ => serde_json::json!({ "type": discriminant, "data": data }),
    };
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── Classification fields ───────────────────────────────────────────────────

/// How certain it is that the case happened as recorded.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Validity {
  /// Doesn't count towards year totals.
  Invalid,
  #[default]
  Suspected,
  Confirmed,
}

/// Was the incident due to human interaction?
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display,
  EnumString,
)]
pub enum HumanInteraction {
  #[default]
  #[serde(rename = "unk")]
  #[strum(serialize = "unk")]
  Unknown,
  #[serde(rename = "yes")]
  #[strum(serialize = "yes")]
  Yes,
  #[serde(rename = "no")]
  #[strum(serialize = "no")]
  No,
  #[serde(rename = "cbd")]
  #[strum(serialize = "cbd")]
  CantBeDetermined,
}

/// Reviewer classification of a case's cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseClassification {
  #[serde(rename = "UN")]
  Unknown,
  #[serde(rename = "SS")]
  ShipStrike,
  #[serde(rename = "EN")]
  Entanglement,
  #[serde(rename = "ES")]
  EntanglementAndShipStrike,
  #[serde(rename = "ET")]
  Entrapment,
  #[serde(rename = "NO")]
  NoHumanInteraction,
  #[serde(rename = "RS")]
  Resight,
  #[serde(rename = "OT")]
  Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnimalFate {
  #[serde(rename = "MT")]
  Mortality,
  #[serde(rename = "SI")]
  SeriousInjury,
  #[serde(rename = "NS")]
  NonSeriousInjury,
  #[serde(rename = "NO")]
  NoInjury,
  #[serde(rename = "UN")]
  Unknown,
}

/// Serious Injury and Mortality determination, filled in by reviewers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriousInjuryAndMortality {
  pub review_1_date:          Option<NaiveDate>,
  pub review_1_inits:         Option<String>,
  pub review_2_date:          Option<NaiveDate>,
  pub review_2_inits:         Option<String>,
  pub reviewer_casetype:      Option<CaseClassification>,
  pub case_confirm_criteria:  Vec<u8>,
  pub animal_fate:            Option<AnimalFate>,
  pub fate_cause:             Option<CaseClassification>,
  pub fate_cause_indications: Vec<u8>,
  pub si_prevented:           Option<bool>,
  pub included_in_sar:        Option<bool>,
  pub review_1_notes:         Option<String>,
  pub review_2_notes:         Option<String>,
}

impl SeriousInjuryAndMortality {
  /// Whether any field holds something other than its default. Blank strings
  /// count as default.
  pub fn has_info(&self) -> bool {
    let text = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.is_empty());
    self.review_1_date.is_some()
      || text(&self.review_1_inits)
      || self.review_2_date.is_some()
      || text(&self.review_2_inits)
      || self.reviewer_casetype.is_some()
      || !self.case_confirm_criteria.is_empty()
      || self.animal_fate.is_some()
      || self.fate_cause.is_some()
      || !self.fate_cause_indications.is_empty()
      || self.si_prevented.is_some()
      || self.included_in_sar.is_some()
      || text(&self.review_1_notes)
      || text(&self.review_2_notes)
  }
}

// ─── Names ───────────────────────────────────────────────────────────────────

/// Every name a case has had, oldest first. The last one is current. Names
/// never contain commas, so the history is stored comma-joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseNames(Vec<String>);

impl CaseNames {
  pub fn new() -> Self { Self::default() }

  /// Parse the stored, comma-joined form.
  pub fn parse(stored: &str) -> Self {
    Self(
      stored
        .split(',')
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
        .collect(),
    )
  }

  pub fn to_stored(&self) -> String { self.0.join(",") }

  pub fn current(&self) -> Option<&str> { self.0.last().map(String::as_str) }

  /// Append `name` unless it is already the current one. Returns whether the
  /// history changed.
  pub fn push_if_changed(&mut self, name: String) -> bool {
    if self.current() == Some(name.as_str()) {
      return false;
    }
    self.0.push(name.replace(',', ";"));
    true
  }

  /// Put a merged-away case's history in front of this one.
  pub fn absorb(&mut self, source: &CaseNames) {
    let mut merged = source.0.clone();
    merged.append(&mut self.0);
    self.0 = merged;
  }

  pub fn contains(&self, name: &str) -> bool { self.0.iter().any(|n| n == name) }

  pub fn iter(&self) -> impl Iterator<Item = &str> { self.0.iter().map(String::as_str) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Everything a case name is built from.
#[derive(Debug, Clone)]
pub struct CaseNameParts<'a> {
  pub case_id:      CaseId,
  pub number:       Option<YearCaseNumber>,
  pub date:         &'a UncertainDateTime,
  pub kind:         CaseKind,
  pub suffix:       Option<String>,
  /// Scientific name of the animal's taxon.
  pub taxon:        Option<String>,
  pub field_number: Option<&'a str>,
}

/// `"<year>#<number> (<date>) <kind>[ <suffix>] of <taxon>[ <field number>]"`,
/// with commas replaced by semicolons.
pub fn format_case_name(parts: &CaseNameParts<'_>) -> String {
  let id = parts
    .number
    .map(|n| n.identifier())
    .unwrap_or_else(|| format!("#{:06}", parts.case_id.get()));

  let mut kind = parts.kind.label().to_owned();
  if let Some(suffix) = parts.suffix.as_deref().filter(|s| !s.is_empty()) {
    kind.push(' ');
    kind.push_str(suffix);
  }

  let taxon = parts.taxon.as_deref().unwrap_or("Unknown taxon");
  let mut name = format!("{id} ({}) {kind} of {taxon}", parts.date.format_date());
  if let Some(field_number) = parts.field_number.filter(|f| !f.is_empty()) {
    name.push(' ');
    name.push_str(field_number);
  }
  name.replace(',', ";")
}

// ─── Case ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
  pub id:                CaseId,
  pub animal_id:         AnimalId,
  pub detail:            CaseDetail,
  pub validity:          Validity,
  /// A day whose start is definitely before the incident, e.g. the day the
  /// animal was last seen unentangled.
  pub happened_after:    Option<NaiveDate>,
  pub human_interaction: HumanInteraction,
  /// Is there a corresponding Office of Law Enforcement investigation?
  pub ole_investigation: Option<bool>,
  /// Earliest observation datetime. Derived.
  pub date:              Option<UncertainDateTime>,
  /// Derived from `date` and the ledger.
  pub current_number:    Option<YearCaseNumber>,
  /// Derived name history.
  pub names:             CaseNames,
  pub import_notes:      String,
  pub si_n_m:            SeriousInjuryAndMortality,
  /// Set once this case has been merged into another one.
  pub merged_into:       Option<CaseId>,
}

/// Input to [`crate::store::IncidentStore::add_case`].
#[derive(Debug, Clone)]
pub struct NewCase {
  pub animal_id:         AnimalId,
  pub detail:            CaseDetail,
  pub validity:          Validity,
  pub happened_after:    Option<NaiveDate>,
  pub human_interaction: HumanInteraction,
  pub ole_investigation: Option<bool>,
  pub import_notes:      String,
  pub si_n_m:            SeriousInjuryAndMortality,
}

impl NewCase {
  pub fn new(animal_id: AnimalId, detail: CaseDetail) -> Self {
    Self {
      animal_id,
      detail,
      validity: Validity::default(),
      happened_after: None,
      human_interaction: HumanInteraction::default(),
      ole_investigation: Some(false),
      import_notes: String::new(),
      si_n_m: SeriousInjuryAndMortality::default(),
    }
  }

  pub fn into_case(self, id: CaseId) -> Case {
    Case {
      id,
      animal_id: self.animal_id,
      detail: self.detail,
      validity: self.validity,
      happened_after: self.happened_after,
      human_interaction: self.human_interaction,
      ole_investigation: self.ole_investigation,
      date: None,
      current_number: None,
      names: CaseNames::new(),
      import_notes: self.import_notes,
      si_n_m: self.si_n_m,
      merged_into: None,
    }
  }
}

impl Case {
  pub fn kind(&self) -> CaseKind { self.detail.case_kind() }

  /// The current name: the last entry of the name history. A case that
  /// lost its date keeps the name it last had.
  pub fn name(&self) -> Option<&str> { self.names.current() }

  pub fn yearly_number(&self) -> Option<u32> { self.current_number.map(|n| n.number) }

  /// Validate that `source` may be merged into `self`.
  pub fn check_merge(&self, source: &Case) -> Result<(), MergeError> {
    if source.id == self.id {
      return Err(MergeError::SameCase(self.id));
    }
    for case in [source, self] {
      if let Some(into) = case.merged_into {
        return Err(MergeError::AlreadyMerged { case: case.id, into });
      }
    }
    if source.animal_id != self.animal_id {
      return Err(MergeError::DifferentAnimals { from: source.id, into: self.id });
    }
    if self.si_n_m.has_info() || source.si_n_m.has_info() {
      return Err(MergeError::SeriousInjuryInfo);
    }
    Ok(())
  }

  /// Fold `source`'s name history and notes into this case.
  ///
  /// Date and numbering are not touched here: they follow from the merged
  /// observations on the next recompute, which keeps the current number
  /// unless the year changes.
  pub fn absorb(&mut self, source: &Case) -> Result<(), MergeError> {
    self.check_merge(source)?;
    self.names.absorb(&source.names);
    if !source.import_notes.is_empty() {
      if !self.import_notes.is_empty() {
        self.import_notes.push('\n');
      }
      self.import_notes.push_str(&source.import_notes);
    }
    Ok(())
  }
}

// ─── Aggregates over observations ────────────────────────────────────────────

/// The earliest observation datetime, by the uncertain-datetime ordering.
pub fn case_date<'a>(
  observations: impl IntoIterator<Item = &'a Observation>,
) -> Option<UncertainDateTime> {
  observations.into_iter().map(|o| o.datetime_observed).min()
}

/// Earliest instant any observation may have started.
pub fn earliest_datetime<'a>(
  observations: impl IntoIterator<Item = &'a Observation>,
) -> Option<NaiveDateTime> {
  observations
    .into_iter()
    .map(|o| o.datetime_observed.earliest())
    .min()
}

/// Latest instant any observation may have started.
pub fn latest_datetime<'a>(
  observations: impl IntoIterator<Item = &'a Observation>,
) -> Option<NaiveDateTime> {
  observations
    .into_iter()
    .map(|o| o.datetime_observed.latest())
    .max()
}

/// The span between [`earliest_datetime`] and [`latest_datetime`].
pub fn breadth(observations: &[Observation]) -> Option<Duration> {
  Some(latest_datetime(observations)? - earliest_datetime(observations)?)
}

/// Was gear retrieved in this case?
///
/// Any observation reporting retrieval makes it `Some(true)`. Otherwise an
/// observation that doesn't know leaves it `None`; only when every
/// observation says no is it `Some(false)`.
pub fn gear_retrieved(reports: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
  let mut any_unknown = false;
  let mut any_report = false;
  for report in reports {
    any_report = true;
    match report {
      Some(true) => return Some(true),
      Some(false) => {}
      None => any_unknown = true,
    }
  }
  (any_report && !any_unknown).then_some(false)
}

/// Was gear seen on the animal in any observation?
pub fn gear_present(reports: impl IntoIterator<Item = Option<bool>>) -> bool {
  reports.into_iter().any(|r| r == Some(true))
}
