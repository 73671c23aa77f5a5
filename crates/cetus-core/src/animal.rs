//! Animals and the observations of them.
//!
//! Observations are owned by their animal. An animal exposes *determined*
//! taxon and gender (authoritative, entered by a person) and *probable* ones
//! aggregated over its observations; the effective value is the determined one
//! if set, else the probable one.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  dag::{DagSource, implied_supertypes},
  datetime::UncertainDateTime,
  ids::{AnimalId, ObservationId, TaxonId},
};

// ─── Gender ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
pub enum Gender {
  #[serde(rename = "f")]
  #[strum(serialize = "f")]
  Female,
  #[serde(rename = "m")]
  #[strum(serialize = "m")]
  Male,
}

impl Gender {
  pub fn label(self) -> &'static str {
    match self {
      Self::Female => "female",
      Self::Male => "male",
    }
  }
}

// ─── Animal ──────────────────────────────────────────────────────────────────

/// One individual animal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Animal {
  pub id:                     AnimalId,
  /// Stranding-network field number; unique to the animal when present.
  pub field_number:           Option<String>,
  /// Comma-separated names given to this animal, e.g. "Kingfisher".
  pub name:                   Option<String>,
  pub determined_taxon:       Option<TaxonId>,
  pub determined_gender:      Option<Gender>,
  /// A date on which the animal was certainly dead.
  pub determined_dead_before: Option<NaiveDate>,
  pub carcass_disposed:       Option<bool>,
  pub partial_necropsy:       bool,
  pub necropsy:               bool,
  pub cause_of_death:         Option<String>,
}

/// Input to [`crate::store::IncidentStore::add_animal`].
#[derive(Debug, Clone, Default)]
pub struct NewAnimal {
  pub field_number:           Option<String>,
  pub name:                   Option<String>,
  pub determined_taxon:       Option<TaxonId>,
  pub determined_gender:      Option<Gender>,
  pub determined_dead_before: Option<NaiveDate>,
  pub carcass_disposed:       Option<bool>,
  pub partial_necropsy:       bool,
  pub necropsy:               bool,
  pub cause_of_death:         Option<String>,
}

impl NewAnimal {
  pub fn into_animal(self, id: AnimalId) -> Animal {
    Animal {
      id,
      field_number: self.field_number,
      name: self.name,
      determined_taxon: self.determined_taxon,
      determined_gender: self.determined_gender,
      determined_dead_before: self.determined_dead_before,
      carcass_disposed: self.carcass_disposed,
      partial_necropsy: self.partial_necropsy,
      necropsy: self.necropsy,
      cause_of_death: self.cause_of_death,
    }
  }
}

impl Animal {
  /// The individual names in [`Animal::name`].
  pub fn names(&self) -> Vec<&str> {
    self
      .name
      .as_deref()
      .unwrap_or_default()
      .split(',')
      .map(str::trim)
      .filter(|n| !n.is_empty())
      .collect()
  }

  /// A fully necropsied animal is dead; if no date was recorded, `today` is
  /// the latest it could have died.
  pub fn settle_dead_before(&mut self, today: NaiveDate) {
    if self.necropsy && self.determined_dead_before.is_none() {
      self.determined_dead_before = Some(today);
    }
  }

  pub fn is_dead(&self, today: NaiveDate) -> bool {
    self.determined_dead_before.is_some_and(|d| d <= today)
  }

  /// The determined taxon if set, else `probable`.
  pub fn taxon(&self, probable: Option<TaxonId>) -> Option<TaxonId> {
    self.determined_taxon.or(probable)
  }

  /// The determined gender if set, else `probable`.
  pub fn gender(&self, probable: Option<Gender>) -> Option<Gender> {
    self.determined_gender.or(probable)
  }

  pub fn label(&self) -> String {
    if let Some(field_number) = self.field_number.as_deref().filter(|s| !s.is_empty()) {
      return field_number.to_owned();
    }
    if let Some(name) = self.name.as_deref().filter(|s| !s.is_empty()) {
      return name.to_owned();
    }
    format!("unnamed animal #{:06}", self.id.get())
  }
}

// ─── Observation ─────────────────────────────────────────────────────────────

/// A dated report of sighting or examining an animal. Any of the reported
/// details may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
  pub id:                 ObservationId,
  pub animal_id:          AnimalId,
  pub datetime_observed:  UncertainDateTime,
  pub datetime_reported:  Option<UncertainDateTime>,
  /// The most specific taxon the observer could identify.
  pub taxon:              Option<TaxonId>,
  pub gender:             Option<Gender>,
  pub animal_description: Option<String>,
  pub gear_present:       Option<bool>,
  pub gear_retrieved:     Option<bool>,
}

/// Input to [`crate::store::IncidentStore::add_observation`].
#[derive(Debug, Clone)]
pub struct NewObservation {
  pub animal_id:          AnimalId,
  pub datetime_observed:  UncertainDateTime,
  pub datetime_reported:  Option<UncertainDateTime>,
  pub taxon:              Option<TaxonId>,
  pub gender:             Option<Gender>,
  pub animal_description: Option<String>,
  pub gear_present:       Option<bool>,
  pub gear_retrieved:     Option<bool>,
}

impl NewObservation {
  /// Convenience constructor with every optional detail unknown.
  pub fn new(animal_id: AnimalId, datetime_observed: UncertainDateTime) -> Self {
    Self {
      animal_id,
      datetime_observed,
      datetime_reported: None,
      taxon: None,
      gender: None,
      animal_description: None,
      gear_present: None,
      gear_retrieved: None,
    }
  }

  pub fn into_observation(self, id: ObservationId) -> Observation {
    Observation {
      id,
      animal_id: self.animal_id,
      datetime_observed: self.datetime_observed,
      datetime_reported: self.datetime_reported,
      taxon: self.taxon,
      gender: self.gender,
      animal_description: self.animal_description,
      gear_present: self.gear_present,
      gear_retrieved: self.gear_retrieved,
    }
  }
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// The most specific taxon that is an ancestor-or-self of every reported
/// taxon.
///
/// `None` when nothing was reported, when the reported taxa share no ancestor,
/// or when the shared ancestors have no single most specific member (two
/// unrelated parents in the DAG). This is never a majority vote: a species and
/// its genus resolve to the genus.
pub fn probable_taxon<S>(
  source: &S,
  reported: impl IntoIterator<Item = TaxonId>,
) -> Result<Option<TaxonId>, S::Error>
where
  S: DagSource<TaxonId> + ?Sized,
{
  let reported: BTreeSet<TaxonId> = reported.into_iter().collect();

  let mut common: Option<BTreeSet<TaxonId>> = None;
  for &taxon in &reported {
    let mut lineage = implied_supertypes(source, taxon)?;
    lineage.insert(taxon);
    common = Some(match common {
      Some(so_far) => &so_far & &lineage,
      None => lineage,
    });
  }
  let Some(common) = common.filter(|c| !c.is_empty()) else {
    return Ok(None);
  };

  for &candidate in &common {
    let above = implied_supertypes(source, candidate)?;
    if common.iter().all(|t| *t == candidate || above.contains(t)) {
      return Ok(Some(candidate));
    }
  }
  Ok(None)
}

/// The gender every reporting observation agrees on, else `None`.
pub fn probable_gender(reported: impl IntoIterator<Item = Gender>) -> Option<Gender> {
  let mut reported = reported.into_iter();
  let first = reported.next()?;
  reported.all(|g| g == first).then_some(first)
}

#[cfg(test)]
mod tests {
  use crate::dag::Dag;

  use super::*;

  const CETACEA: TaxonId = TaxonId(1);
  const BALAENOPTERIDAE: TaxonId = TaxonId(2);
  const MEGAPTERA: TaxonId = TaxonId(3);
  const HUMPBACK: TaxonId = TaxonId(4);
  const BALAENOPTERA: TaxonId = TaxonId(5);
  const FIN: TaxonId = TaxonId(6);
  const ODONTOCETI: TaxonId = TaxonId(7);
  const ORPHAN: TaxonId = TaxonId(8);

  fn tree() -> Dag<TaxonId> {
    let mut dag = Dag::new();
    dag.add_edge(BALAENOPTERIDAE, CETACEA).unwrap();
    dag.add_edge(MEGAPTERA, BALAENOPTERIDAE).unwrap();
    dag.add_edge(HUMPBACK, MEGAPTERA).unwrap();
    dag.add_edge(BALAENOPTERA, BALAENOPTERIDAE).unwrap();
    dag.add_edge(FIN, BALAENOPTERA).unwrap();
    dag.add_edge(ODONTOCETI, CETACEA).unwrap();
    dag.add_node(ORPHAN);
    dag
  }

  fn probable(dag: &Dag<TaxonId>, reported: &[TaxonId]) -> Option<TaxonId> {
    probable_taxon(dag, reported.iter().copied()).unwrap_or_else(|e| match e {})
  }

  #[test]
  fn probable_taxon_of_nothing_is_none() {
    assert_eq!(probable(&tree(), &[]), None);
  }

  #[test]
  fn probable_taxon_of_agreeing_reports_is_that_taxon() {
    assert_eq!(probable(&tree(), &[HUMPBACK, HUMPBACK]), Some(HUMPBACK));
  }

  #[test]
  fn species_and_its_genus_resolve_to_the_genus() {
    assert_eq!(probable(&tree(), &[HUMPBACK, MEGAPTERA]), Some(MEGAPTERA));
  }

  #[test]
  fn different_species_resolve_to_their_common_family() {
    assert_eq!(probable(&tree(), &[HUMPBACK, FIN]), Some(BALAENOPTERIDAE));
    assert_eq!(probable(&tree(), &[HUMPBACK, FIN, ODONTOCETI]), Some(CETACEA));
  }

  #[test]
  fn unrelated_taxa_have_no_probable_taxon() {
    assert_eq!(probable(&tree(), &[HUMPBACK, ORPHAN]), None);
  }

  #[test]
  fn incomparable_common_ancestors_yield_none() {
    // A hybrid-ish node with two unrelated parents: both parents are common
    // ancestors and neither is more specific.
    let (left, right, a, b) = (TaxonId(20), TaxonId(21), TaxonId(22), TaxonId(23));
    let mut dag = Dag::new();
    dag.add_edge(a, left).unwrap();
    dag.add_edge(a, right).unwrap();
    dag.add_edge(b, left).unwrap();
    dag.add_edge(b, right).unwrap();
    assert_eq!(probable(&dag, &[a, b]), None);
  }

  #[test]
  fn probable_gender_requires_agreement() {
    assert_eq!(probable_gender([]), None);
    assert_eq!(probable_gender([Gender::Female]), Some(Gender::Female));
    assert_eq!(probable_gender([Gender::Male, Gender::Male]), Some(Gender::Male));
    assert_eq!(probable_gender([Gender::Male, Gender::Female]), None);
  }

  fn animal() -> Animal { NewAnimal::default().into_animal(AnimalId(12)) }

  #[test]
  fn determined_values_win_over_probable_ones() {
    let mut a = animal();
    assert_eq!(a.taxon(Some(FIN)), Some(FIN));
    assert_eq!(a.gender(None), None);

    a.determined_taxon = Some(HUMPBACK);
    a.determined_gender = Some(Gender::Female);
    assert_eq!(a.taxon(Some(FIN)), Some(HUMPBACK));
    assert_eq!(a.gender(Some(Gender::Male)), Some(Gender::Female));
  }

  #[test]
  fn names_and_label() {
    let mut a = animal();
    assert_eq!(a.label(), "unnamed animal #000012");
    a.name = Some("Kingfisher, RW #2427 ,".into());
    assert_eq!(a.names(), vec!["Kingfisher", "RW #2427"]);
    assert_eq!(a.label(), "Kingfisher, RW #2427 ,");
    a.field_number = Some("MH-09-123".into());
    assert_eq!(a.label(), "MH-09-123");
  }

  #[test]
  fn necropsy_implies_dead() {
    let today = NaiveDate::from_ymd_opt(2010, 5, 1).unwrap();
    let mut a = animal();
    a.settle_dead_before(today);
    assert!(!a.is_dead(today));

    a.necropsy = true;
    a.settle_dead_before(today);
    assert_eq!(a.determined_dead_before, Some(today));
    assert!(a.is_dead(today));
  }

  #[test]
  fn gender_uses_single_letter_codes() {
    assert_eq!(Gender::Female.to_string(), "f");
    assert_eq!("m".parse::<Gender>().unwrap(), Gender::Male);
    assert_eq!(Gender::Male.label(), "male");
  }
}
