//! The `IncidentStore` trait.
//!
//! Implemented by storage backends (e.g. `cetus-store-sqlite`). The CRUD
//! surface around the core (forms, import, reports) depends on this
//! abstraction, not on any concrete backend.

use std::{collections::BTreeSet, future::Future};

use crate::{
  animal::{Animal, Gender, NewAnimal, NewObservation, Observation},
  case::{Case, NewCase},
  dag::DagNode,
  deps::CacheDependency,
  gear::GearAttribute,
  ids::{AnimalId, CaseId, GearAttributeId, ObservationId, TaxonId},
  numbering::YearCaseNumber,
  taxon::{NewTaxon, Taxon},
};

/// Abstraction over an incident store backend.
///
/// Every write runs in a single transaction together with the recomputation
/// of whatever derived case fields (date, yearly number, name) it affects, so
/// readers never observe a stale case. The yearly-number ledger and the merge
/// log are append-only.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait IncidentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Taxa and gear attributes ──────────────────────────────────────────

  fn add_taxon(
    &self,
    input: NewTaxon,
  ) -> impl Future<Output = Result<Taxon, Self::Error>> + Send + '_;

  fn get_taxon(
    &self,
    id: TaxonId,
  ) -> impl Future<Output = Result<Option<Taxon>, Self::Error>> + Send + '_;

  /// Full scientific name of a taxon, e.g. `Megaptera novaeangliae`.
  fn scientific_name(
    &self,
    id: TaxonId,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  fn add_gear_attribute(
    &self,
    name: String,
  ) -> impl Future<Output = Result<GearAttribute, Self::Error>> + Send + '_;

  fn get_gear_attribute(
    &self,
    id: GearAttributeId,
  ) -> impl Future<Output = Result<Option<GearAttribute>, Self::Error>> + Send + '_;

  // ── Hierarchies ───────────────────────────────────────────────────────

  /// Add the edge `subtype -> supertype`. Returns `false` if it already
  /// existed. Fails with a cycle error, leaving the graph unchanged, if the
  /// edge would make `subtype` imply itself.
  fn add_supertype<N: DagNode>(
    &self,
    subtype: N,
    supertype: N,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Remove the edge `subtype -> supertype`. Returns whether it existed.
  fn remove_supertype<N: DagNode>(
    &self,
    subtype: N,
    supertype: N,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Every node `node` implies, excluding itself.
  fn implied_supertypes<N: DagNode>(
    &self,
    node: N,
  ) -> impl Future<Output = Result<BTreeSet<N>, Self::Error>> + Send + '_;

  /// Nodes with no supertypes, ordered by name.
  fn dag_roots<N: DagNode>(
    &self,
  ) -> impl Future<Output = Result<Vec<N>, Self::Error>> + Send + '_;

  /// Depth-first, pre-order list of every node implying `node`, excluding
  /// `node`. Siblings are ordered by name.
  fn descendants<N: DagNode>(
    &self,
    node: N,
  ) -> impl Future<Output = Result<Vec<N>, Self::Error>> + Send + '_;

  /// `node` followed by its [`descendants`](IncidentStore::descendants).
  fn with_descendants<N: DagNode>(
    &self,
    node: N,
  ) -> impl Future<Output = Result<Vec<N>, Self::Error>> + Send + '_;

  // ── Animals ───────────────────────────────────────────────────────────

  fn add_animal(
    &self,
    input: NewAnimal,
  ) -> impl Future<Output = Result<Animal, Self::Error>> + Send + '_;

  fn get_animal(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<Option<Animal>, Self::Error>> + Send + '_;

  /// Replace an animal's fields and recompute all of its cases.
  fn update_animal(
    &self,
    animal: Animal,
  ) -> impl Future<Output = Result<Animal, Self::Error>> + Send + '_;

  /// Delete an animal and its observations. Refused while any case still
  /// refers to it.
  fn delete_animal(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The most specific taxon consistent with every observation of the animal.
  fn probable_taxon(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<Option<TaxonId>, Self::Error>> + Send + '_;

  fn probable_gender(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<Option<Gender>, Self::Error>> + Send + '_;

  // ── Observations ──────────────────────────────────────────────────────

  /// Record an observation and recompute the animal's cases.
  fn add_observation(
    &self,
    input: NewObservation,
  ) -> impl Future<Output = Result<Observation, Self::Error>> + Send + '_;

  /// Replace an observation's fields. If it moved to another animal, cases of
  /// both animals are recomputed.
  fn update_observation(
    &self,
    observation: Observation,
  ) -> impl Future<Output = Result<Observation, Self::Error>> + Send + '_;

  fn get_observation(
    &self,
    id: ObservationId,
  ) -> impl Future<Output = Result<Option<Observation>, Self::Error>> + Send + '_;

  fn delete_observation(
    &self,
    id: ObservationId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn animal_observations(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<Vec<Observation>, Self::Error>> + Send + '_;

  fn case_observations(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<Vec<Observation>, Self::Error>> + Send + '_;

  /// Attach an observation to a case. Returns `false` if it already was.
  fn link_observation(
    &self,
    case: CaseId,
    observation: ObservationId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Detach an observation from a case. Returns whether it was attached.
  fn unlink_observation(
    &self,
    case: CaseId,
    observation: ObservationId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Cases ─────────────────────────────────────────────────────────────

  fn add_case(
    &self,
    input: NewCase,
  ) -> impl Future<Output = Result<Case, Self::Error>> + Send + '_;

  /// Retrieve a case, merged-away ones included.
  fn get_case(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<Option<Case>, Self::Error>> + Send + '_;

  /// Replace a case's user-editable fields. Derived fields on the input are
  /// ignored and recomputed.
  fn update_case(
    &self,
    case: Case,
  ) -> impl Future<Output = Result<Case, Self::Error>> + Send + '_;

  /// Live cases ordered by date, number year, number and id. Cases merged
  /// into others are left out.
  fn list_cases(&self) -> impl Future<Output = Result<Vec<Case>, Self::Error>> + Send + '_;

  fn animal_cases(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<Vec<Case>, Self::Error>> + Send + '_;

  /// The case's current name; `None` while it has no date.
  fn case_name(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// Every ledger entry ever issued to the case's lineage, oldest first.
  fn case_numbers(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<Vec<YearCaseNumber>, Self::Error>> + Send + '_;

  /// Merge `source` into `destination` and return the updated destination.
  /// The source is kept, marked as merged, so its history stays traceable.
  fn merge_cases(
    &self,
    source: CaseId,
    destination: CaseId,
  ) -> impl Future<Output = Result<Case, Self::Error>> + Send + '_;

  /// Recompute a case's date, yearly number and name.
  fn recompute_case(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<Case, Self::Error>> + Send + '_;

  /// Recompute every live case. Returns how many were recomputed.
  fn recompute_all_cases(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn case_gear_retrieved(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<Option<bool>, Self::Error>> + Send + '_;

  fn case_gear_present(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// For an entanglement, the attributes its analysed gear attributes imply
  /// that aren't already among them. Empty for other kinds.
  fn implied_analyzed_gear_attributes(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<BTreeSet<GearAttributeId>, Self::Error>> + Send + '_;

  /// What the animal's effective taxon depends on.
  fn animal_taxon_dependencies(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<CacheDependency, Self::Error>> + Send + '_;

  /// What the animal's effective gender depends on.
  fn animal_gender_dependencies(
    &self,
    id: AnimalId,
  ) -> impl Future<Output = Result<CacheDependency, Self::Error>> + Send + '_;

  /// What the case's cached name depends on.
  fn case_name_dependencies(
    &self,
    id: CaseId,
  ) -> impl Future<Output = Result<CacheDependency, Self::Error>> + Send + '_;
}
