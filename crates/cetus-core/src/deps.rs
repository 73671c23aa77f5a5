//! Cache dependency declarations.
//!
//! Derived values (a case's name, an animal's taxon) are cached by whoever
//! renders them. A [`CacheDependency`] says which mutations make such a cached
//! value stale: creation of an entity of some kind matching a filter, or an
//! update or deletion of one particular entity. Dependencies compose with `|`.

use std::{
  collections::{BTreeMap, BTreeSet},
  ops::{BitOr, BitOrAssign},
};

use serde::{Deserialize, Serialize};

use crate::{
  animal::Animal,
  case::Case,
  ids::{AnimalId, CaseId, EntityKind, EntityRef, ObservationId, TaxonId},
};

/// What a filter gets to look at when an entity is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub entity: EntityRef,
  /// The animal the entity belongs to, for observations and cases.
  pub animal: Option<AnimalId>,
  /// Cases the entity is linked to: an observation's cases, or the case a
  /// ledger row was issued to.
  pub cases:  BTreeSet<CaseId>,
}

impl Snapshot {
  pub fn new(entity: impl Into<EntityRef>) -> Self {
    Self { entity: entity.into(), animal: None, cases: BTreeSet::new() }
  }

  pub fn of_animal(mut self, animal: AnimalId) -> Self {
    self.animal = Some(animal);
    self
  }

  pub fn in_case(mut self, case: CaseId) -> Self {
    self.cases.insert(case);
    self
  }
}

/// Predicate over a newly created entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Filter {
  Always,
  ObservationOfAnimal(AnimalId),
  ObservationInCase(CaseId),
  NumberOfCase(CaseId),
}

impl Filter {
  pub fn matches(&self, snapshot: &Snapshot) -> bool {
    let kind = snapshot.entity.kind;
    match *self {
      Self::Always => true,
      Self::ObservationOfAnimal(animal) => {
        kind == EntityKind::Observation && snapshot.animal == Some(animal)
      }
      Self::ObservationInCase(case) => {
        kind == EntityKind::Observation && snapshot.cases.contains(&case)
      }
      Self::NumberOfCase(case) => {
        kind == EntityKind::YearCaseNumber && snapshot.cases.contains(&case)
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
  Created(Snapshot),
  Updated(EntityRef),
  Deleted(EntityRef),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDependency {
  create: BTreeMap<EntityKind, BTreeSet<Filter>>,
  update: BTreeSet<EntityRef>,
  delete: BTreeSet<EntityRef>,
}

impl CacheDependency {
  pub fn new() -> Self { Self::default() }

  /// Stale when an entity of `kind` matching `filter` is created.
  pub fn on_create(mut self, kind: EntityKind, filter: Filter) -> Self {
    self.create.entry(kind).or_default().insert(filter);
    self
  }

  /// Stale when `entity` is updated.
  pub fn on_update(mut self, entity: impl Into<EntityRef>) -> Self {
    self.update.insert(entity.into());
    self
  }

  /// Stale when `entity` is deleted.
  pub fn on_delete(mut self, entity: impl Into<EntityRef>) -> Self {
    self.delete.insert(entity.into());
    self
  }

  /// Stale on either an update or a deletion of `entity`.
  pub fn on_change(self, entity: impl Into<EntityRef>) -> Self {
    let entity = entity.into();
    self.on_update(entity).on_delete(entity)
  }

  pub fn is_empty(&self) -> bool {
    self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
  }

  pub fn invalidated_by(&self, mutation: &Mutation) -> bool {
    match mutation {
      Mutation::Created(snapshot) => self
        .create
        .get(&snapshot.entity.kind)
        .is_some_and(|filters| filters.iter().any(|f| f.matches(snapshot))),
      Mutation::Updated(entity) => self.update.contains(entity),
      Mutation::Deleted(entity) => self.delete.contains(entity),
    }
  }
}

impl BitOrAssign for CacheDependency {
  fn bitor_assign(&mut self, rhs: Self) {
    for (kind, filters) in rhs.create {
      self.create.entry(kind).or_default().extend(filters);
    }
    self.update.extend(rhs.update);
    self.delete.extend(rhs.delete);
  }
}

impl BitOr for CacheDependency {
  type Output = Self;

  fn bitor(mut self, rhs: Self) -> Self {
    self |= rhs;
    self
  }
}

// ─── Builders ────────────────────────────────────────────────────────────────

/// What an animal's effective taxon depends on. Without a determined taxon
/// that is every observation of the animal, including ones not yet created.
pub fn animal_taxon_dependencies(
  animal: &Animal,
  observations: &[ObservationId],
) -> CacheDependency {
  let mut deps = CacheDependency::new().on_change(animal.id);
  if animal.determined_taxon.is_none() {
    deps = deps.on_create(EntityKind::Observation, Filter::ObservationOfAnimal(animal.id));
    for &o in observations {
      deps = deps.on_change(o);
    }
  }
  deps
}

/// What an animal's effective gender depends on. Same shape as the taxon:
/// a determined gender only changes with the animal itself.
pub fn animal_gender_dependencies(
  animal: &Animal,
  observations: &[ObservationId],
) -> CacheDependency {
  let mut deps = CacheDependency::new().on_change(animal.id);
  if animal.determined_gender.is_none() {
    deps = deps.on_create(EntityKind::Observation, Filter::ObservationOfAnimal(animal.id));
    for &o in observations {
      deps = deps.on_change(o);
    }
  }
  deps
}

/// Everything a case's name depends on.
///
/// `taxon_lineage` is the animal's effective taxon followed by its implied
/// supertypes, whose names make up the scientific name. Ledger rows are never
/// updated or deleted, so only the creation of new numbers matters.
pub fn case_name_dependencies(
  case: &Case,
  animal: &Animal,
  case_observations: &[ObservationId],
  animal_observations: &[ObservationId],
  taxon_lineage: &[TaxonId],
) -> CacheDependency {
  let mut deps = CacheDependency::new()
    .on_create(EntityKind::Observation, Filter::ObservationInCase(case.id))
    .on_create(EntityKind::Observation, Filter::ObservationOfAnimal(case.animal_id))
    .on_create(EntityKind::YearCaseNumber, Filter::NumberOfCase(case.id))
    .on_change(case.id)
    .on_change(case.animal_id);
  for &o in case_observations.iter().chain(animal_observations) {
    deps = deps.on_change(o);
  }
  deps |= animal_taxon_dependencies(animal, animal_observations);
  for &t in taxon_lineage {
    deps = deps.on_change(t);
  }
  deps
}

#[cfg(test)]
mod tests {
  use crate::{
    animal::{Gender, NewAnimal},
    case::{CaseDetail, NewCase},
  };

  use super::*;

  const ANIMAL: AnimalId = AnimalId(1);
  const CASE: CaseId = CaseId(10);

  fn animal() -> Animal { NewAnimal::default().into_animal(ANIMAL) }

  fn case() -> Case { NewCase::new(ANIMAL, CaseDetail::Stranding).into_case(CASE) }

  #[test]
  fn union_combines_both_sides() {
    let a = CacheDependency::new().on_update(CASE);
    let b = CacheDependency::new()
      .on_delete(ANIMAL)
      .on_create(EntityKind::Observation, Filter::Always);
    let both = a.clone() | b;

    assert!(both.invalidated_by(&Mutation::Updated(CASE.into())));
    assert!(both.invalidated_by(&Mutation::Deleted(ANIMAL.into())));
    assert!(both.invalidated_by(&Mutation::Created(Snapshot::new(ObservationId(3)))));
    assert!(!a.invalidated_by(&Mutation::Deleted(ANIMAL.into())));
  }

  #[test]
  fn updates_and_deletes_are_tracked_separately() {
    let deps = CacheDependency::new().on_update(CASE);
    assert!(!deps.invalidated_by(&Mutation::Deleted(CASE.into())));
  }

  #[test]
  fn observation_filters_look_at_the_snapshot() {
    let deps = CacheDependency::new()
      .on_create(EntityKind::Observation, Filter::ObservationOfAnimal(ANIMAL));

    let mine = Snapshot::new(ObservationId(5)).of_animal(ANIMAL);
    let other = Snapshot::new(ObservationId(6)).of_animal(AnimalId(2));
    assert!(deps.invalidated_by(&Mutation::Created(mine)));
    assert!(!deps.invalidated_by(&Mutation::Created(other)));
  }

  #[test]
  fn undetermined_taxon_depends_on_observations() {
    let obs = [ObservationId(1), ObservationId(2)];
    let deps = animal_taxon_dependencies(&animal(), &obs);
    assert!(deps.invalidated_by(&Mutation::Updated(ObservationId(2).into())));
    assert!(deps.invalidated_by(&Mutation::Created(
      Snapshot::new(ObservationId(9)).of_animal(ANIMAL)
    )));

    let mut determined = animal();
    determined.determined_taxon = Some(TaxonId(4));
    let deps = animal_taxon_dependencies(&determined, &obs);
    assert!(!deps.invalidated_by(&Mutation::Updated(ObservationId(2).into())));
    assert!(deps.invalidated_by(&Mutation::Updated(ANIMAL.into())));
  }

  #[test]
  fn determined_gender_ignores_observations() {
    let obs = [ObservationId(1)];
    let deps = animal_gender_dependencies(&animal(), &obs);
    assert!(deps.invalidated_by(&Mutation::Deleted(ObservationId(1).into())));

    let mut determined = animal();
    determined.determined_gender = Some(Gender::Female);
    let deps = animal_gender_dependencies(&determined, &obs);
    assert!(!deps.invalidated_by(&Mutation::Deleted(ObservationId(1).into())));
    assert!(!deps.invalidated_by(&Mutation::Created(
      Snapshot::new(ObservationId(9)).of_animal(ANIMAL)
    )));
    assert!(deps.invalidated_by(&Mutation::Updated(ANIMAL.into())));
  }

  #[test]
  fn case_name_depends_on_numbers_observations_and_taxa() {
    let deps = case_name_dependencies(
      &case(),
      &animal(),
      &[ObservationId(1)],
      &[ObservationId(1), ObservationId(2)],
      &[TaxonId(7), TaxonId(8)],
    );

    let minted = Snapshot::new(EntityRef { kind: EntityKind::YearCaseNumber, id: 1 }).in_case(CASE);
    let elsewhere =
      Snapshot::new(EntityRef { kind: EntityKind::YearCaseNumber, id: 2 }).in_case(CaseId(11));
    assert!(deps.invalidated_by(&Mutation::Created(minted)));
    assert!(!deps.invalidated_by(&Mutation::Created(elsewhere)));

    assert!(deps.invalidated_by(&Mutation::Updated(CASE.into())));
    assert!(deps.invalidated_by(&Mutation::Deleted(ObservationId(2).into())));
    assert!(deps.invalidated_by(&Mutation::Updated(TaxonId(8).into())));
    assert!(!deps.invalidated_by(&Mutation::Updated(TaxonId(9).into())));
    assert!(!deps.invalidated_by(&Mutation::Updated(CaseId(11).into())));
  }
}
