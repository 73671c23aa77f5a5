//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeSet;

use cetus_core::{
  animal::{Gender, NewAnimal, NewObservation, Observation},
  case::{AnimalFate, Case, CaseDetail, EntanglementDetail, NewCase},
  datetime::UncertainDateTime,
  deps::{Mutation, Snapshot},
  error::MergeError,
  ids::{AnimalId, CaseId, GearAttributeId, ObservationId, TaxonId},
  store::IncidentStore,
  taxon::{NewTaxon, Rank},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn udt(y: i32, m: u32, d: u32) -> UncertainDateTime { UncertainDateTime::ymd(y, m, d).unwrap() }

async fn animal(s: &SqliteStore) -> AnimalId {
  s.add_animal(NewAnimal::default()).await.unwrap().id
}

/// A stranding of `animal` with one linked observation on `date`.
async fn dated_case(
  s: &SqliteStore,
  animal: AnimalId,
  date: UncertainDateTime,
) -> (Case, Observation) {
  let case = s
    .add_case(NewCase::new(animal, CaseDetail::Stranding))
    .await
    .unwrap();
  let obs = s
    .add_observation(NewObservation::new(animal, date))
    .await
    .unwrap();
  s.link_observation(case.id, obs.id).await.unwrap();
  (s.get_case(case.id).await.unwrap().unwrap(), obs)
}

async fn humpback(s: &SqliteStore) -> TaxonId {
  let family = s
    .add_taxon(NewTaxon::new("Balaenopteridae", Rank::Family))
    .await
    .unwrap();
  let genus = s
    .add_taxon(NewTaxon::new("Megaptera", Rank::Genus))
    .await
    .unwrap();
  let species = s
    .add_taxon(NewTaxon::new("novaeangliae", Rank::Species))
    .await
    .unwrap();
  s.add_supertype(genus.id, family.id).await.unwrap();
  s.add_supertype(species.id, genus.id).await.unwrap();
  species.id
}

// ─── Hierarchies ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn taxon_round_trips_with_scientific_name() {
  let s = store().await;
  let species = humpback(&s).await;

  let taxon = s.get_taxon(species).await.unwrap().unwrap();
  assert_eq!(taxon.rank, Rank::Species);
  assert_eq!(
    s.scientific_name(species).await.unwrap().as_deref(),
    Some("Megaptera novaeangliae")
  );
  assert!(s.get_taxon(TaxonId(999)).await.unwrap().is_none());
}

#[tokio::test]
async fn cycle_is_rejected_and_graph_unchanged() {
  let s = store().await;
  let mut ids = Vec::new();
  for name in ["A", "B", "C"] {
    ids.push(s.add_taxon(NewTaxon::new(name, Rank::Order)).await.unwrap().id);
  }
  let (a, b, c) = (ids[0], ids[1], ids[2]);
  assert!(s.add_supertype(a, b).await.unwrap());
  assert!(s.add_supertype(b, c).await.unwrap());

  let err = s.add_supertype(c, a).await.unwrap_err();
  assert!(err.is_cycle(), "{err}");
  let err = s.add_supertype(a, a).await.unwrap_err();
  assert!(err.is_cycle(), "{err}");

  assert!(s.implied_supertypes(c).await.unwrap().is_empty());
  assert_eq!(s.implied_supertypes(a).await.unwrap(), BTreeSet::from([b, c]));
  assert_eq!(s.dag_roots::<TaxonId>().await.unwrap(), vec![c]);
}

#[tokio::test]
async fn duplicate_edge_is_not_added_twice() {
  let s = store().await;
  let a = s.add_gear_attribute("a".into()).await.unwrap().id;
  let b = s.add_gear_attribute("b".into()).await.unwrap().id;
  assert!(s.add_supertype(a, b).await.unwrap());
  assert!(!s.add_supertype(a, b).await.unwrap());
  assert!(s.remove_supertype(a, b).await.unwrap());
  assert!(!s.remove_supertype(a, b).await.unwrap());
}

#[tokio::test]
async fn edge_to_missing_node_is_not_found() {
  let s = store().await;
  let a = s.add_gear_attribute("a".into()).await.unwrap().id;
  let err = s.add_supertype(a, GearAttributeId(77)).await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn traversals_of_a_missing_node_are_not_found() {
  let s = store().await;
  let missing = TaxonId(404);
  assert!(s.implied_supertypes(missing).await.unwrap_err().is_not_found());
  assert!(s.descendants(missing).await.unwrap_err().is_not_found());
  assert!(s.with_descendants(missing).await.unwrap_err().is_not_found());
  assert!(s.with_descendants(GearAttributeId(404)).await.unwrap_err().is_not_found());

  let line = s.add_gear_attribute("line".into()).await.unwrap().id;
  assert_eq!(s.with_descendants(line).await.unwrap(), vec![line]);
}

#[tokio::test]
async fn descendants_are_listed_depth_first_by_name() {
  let s = store().await;
  let line = s.add_gear_attribute("line".into()).await.unwrap().id;
  let trap = s.add_gear_attribute("trap line".into()).await.unwrap().id;
  let long = s.add_gear_attribute("long line".into()).await.unwrap().id;
  let longer = s.add_gear_attribute("longer line".into()).await.unwrap().id;
  s.add_supertype(trap, line).await.unwrap();
  s.add_supertype(long, line).await.unwrap();
  s.add_supertype(longer, long).await.unwrap();

  assert_eq!(s.descendants(line).await.unwrap(), vec![long, longer, trap]);
  assert_eq!(s.with_descendants(long).await.unwrap(), vec![long, longer]);
  assert_eq!(s.dag_roots::<GearAttributeId>().await.unwrap(), vec![line]);
}

#[tokio::test]
async fn analyzed_gear_implies_its_supertypes() {
  let s = store().await;
  let line = s.add_gear_attribute("line".into()).await.unwrap().id;
  let long = s.add_gear_attribute("long line".into()).await.unwrap().id;
  let longer = s.add_gear_attribute("longer line".into()).await.unwrap().id;
  s.add_supertype(long, line).await.unwrap();
  s.add_supertype(longer, long).await.unwrap();

  let a = animal(&s).await;
  let detail = EntanglementDetail {
    nmfs_id: Some("E-1".into()),
    gear_analyzed: true,
    analyzed_gear_attributes: BTreeSet::from([long, longer]),
  };
  let case = s
    .add_case(NewCase::new(a, CaseDetail::Entanglement(detail)))
    .await
    .unwrap();
  assert_eq!(
    s.implied_analyzed_gear_attributes(case.id).await.unwrap(),
    BTreeSet::from([line])
  );

  let stranding = s
    .add_case(NewCase::new(a, CaseDetail::Stranding))
    .await
    .unwrap();
  assert!(s.implied_analyzed_gear_attributes(stranding.id).await.unwrap().is_empty());
}

// ─── Animals and observations ────────────────────────────────────────────────

#[tokio::test]
async fn necropsy_sets_dead_before() {
  let s = store().await;
  let a = s
    .add_animal(NewAnimal { necropsy: true, ..Default::default() })
    .await
    .unwrap();
  assert!(a.determined_dead_before.is_some());
  let fetched = s.get_animal(a.id).await.unwrap().unwrap();
  assert_eq!(fetched, a);
}

#[tokio::test]
async fn probable_values_come_from_observations() {
  let s = store().await;
  let species = humpback(&s).await;
  let genus = *s.implied_supertypes(species).await.unwrap().iter().next_back().unwrap();
  let a = animal(&s).await;
  assert_eq!(s.probable_taxon(a).await.unwrap(), None);

  for (taxon, gender) in [(Some(species), Some(Gender::Female)), (Some(genus), None)] {
    let mut obs = NewObservation::new(a, udt(2001, 1, 1));
    obs.taxon = taxon;
    obs.gender = gender;
    s.add_observation(obs).await.unwrap();
  }
  assert_eq!(s.probable_taxon(a).await.unwrap(), Some(genus));
  assert_eq!(s.probable_gender(a).await.unwrap(), Some(Gender::Female));
}

#[tokio::test]
async fn animal_with_cases_cannot_be_deleted() {
  let s = store().await;
  let a = animal(&s).await;
  dated_case(&s, a, udt(2005, 6, 1)).await;
  assert!(matches!(
    s.delete_animal(a).await,
    Err(Error::AnimalHasCases { cases: 1, .. })
  ));

  let b = animal(&s).await;
  let obs = s
    .add_observation(NewObservation::new(b, udt(2005, 6, 1)))
    .await
    .unwrap();
  s.delete_animal(b).await.unwrap();
  assert!(s.get_animal(b).await.unwrap().is_none());
  assert!(s.get_observation(obs.id).await.unwrap().is_none());
}

#[tokio::test]
async fn observation_of_another_animal_cannot_be_linked() {
  let s = store().await;
  let a = animal(&s).await;
  let b = animal(&s).await;
  let case = s.add_case(NewCase::new(a, CaseDetail::Stranding)).await.unwrap();
  let obs = s
    .add_observation(NewObservation::new(b, udt(2005, 6, 1)))
    .await
    .unwrap();
  assert!(matches!(
    s.link_observation(case.id, obs.id).await,
    Err(Error::ForeignObservation { .. })
  ));
}

// ─── Numbering and naming ────────────────────────────────────────────────────

#[tokio::test]
async fn undated_case_has_no_number_or_name() {
  let s = store().await;
  let a = animal(&s).await;
  let case = s.add_case(NewCase::new(a, CaseDetail::Stranding)).await.unwrap();
  assert_eq!(case.date, None);
  assert_eq!(case.current_number, None);
  assert!(case.names.is_empty());
  assert_eq!(s.case_name(case.id).await.unwrap(), None);
  assert!(s.case_numbers(case.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn dated_case_is_numbered_and_named() {
  let s = store().await;
  let species = humpback(&s).await;
  let a = s
    .add_animal(NewAnimal {
      determined_taxon: Some(species),
      field_number: Some("MH-03-01".into()),
      ..Default::default()
    })
    .await
    .unwrap()
    .id;
  let (case, _) = dated_case(&s, a, udt(2003, 5, 2)).await;

  assert_eq!(case.date, Some(udt(2003, 5, 2)));
  let number = case.current_number.unwrap();
  assert_eq!((number.year, number.number), (2003, 1));
  assert_eq!(
    case.name(),
    Some("2003#1 (2003-05-02) Case of Megaptera novaeangliae MH-03-01")
  );
}

#[tokio::test]
async fn redating_back_restores_the_old_number() {
  let s = store().await;
  for _ in 0..66 {
    let other = animal(&s).await;
    dated_case(&s, other, udt(2003, 1, 1)).await;
  }

  let a = animal(&s).await;
  let (case, obs) = dated_case(&s, a, udt(2003, 7, 4)).await;
  assert_eq!(case.current_number.unwrap().identifier(), "2003#67");

  let mut moved = obs.clone();
  moved.datetime_observed = udt(2004, 2, 1);
  s.update_observation(moved).await.unwrap();
  let case = s.get_case(case.id).await.unwrap().unwrap();
  assert_eq!(case.current_number.unwrap().identifier(), "2004#1");

  // 2003#68 goes to somebody else meanwhile.
  let other = animal(&s).await;
  let (late, _) = dated_case(&s, other, udt(2003, 12, 1)).await;
  assert_eq!(late.current_number.unwrap().identifier(), "2003#68");

  s.update_observation(obs).await.unwrap();
  let case = s.get_case(case.id).await.unwrap().unwrap();
  assert_eq!(case.current_number.unwrap().identifier(), "2003#67");

  let history: Vec<String> = s
    .case_numbers(case.id)
    .await
    .unwrap()
    .iter()
    .map(|n| n.identifier())
    .collect();
  assert_eq!(history, vec!["2003#67", "2004#1"]);
  assert!(case.names.contains("2004#1 (2004-02-01) Case of Unknown taxon"));
  assert_eq!(case.name(), Some("2003#67 (2003-07-04) Case of Unknown taxon"));
}

#[tokio::test]
async fn losing_all_observations_clears_the_date() {
  let s = store().await;
  let a = animal(&s).await;
  let (case, obs) = dated_case(&s, a, udt(2010, 3, 3)).await;
  assert!(case.name().is_some());

  assert!(s.unlink_observation(case.id, obs.id).await.unwrap());
  let case = s.get_case(case.id).await.unwrap().unwrap();
  assert_eq!(case.date, None);
  assert_eq!(case.current_number, None);
  // The name it last had stays current.
  assert_eq!(case.name(), Some("2010#1 (2010-03-03) Case of Unknown taxon"));
  assert_eq!(
    s.case_name(case.id).await.unwrap().as_deref(),
    Some("2010#1 (2010-03-03) Case of Unknown taxon")
  );
  assert_eq!(case.names.len(), 1);
}

#[tokio::test]
async fn taxon_change_renames_case() {
  let s = store().await;
  let species = humpback(&s).await;
  let a = animal(&s).await;
  let (case, _) = dated_case(&s, a, udt(2003, 5, 2)).await;
  assert_eq!(case.name(), Some("2003#1 (2003-05-02) Case of Unknown taxon"));

  let mut animal = s.get_animal(a).await.unwrap().unwrap();
  animal.determined_taxon = Some(species);
  s.update_animal(animal).await.unwrap();

  let case = s.get_case(case.id).await.unwrap().unwrap();
  assert_eq!(case.name(), Some("2003#1 (2003-05-02) Case of Megaptera novaeangliae"));
  assert_eq!(case.names.len(), 2);
}

#[tokio::test]
async fn entanglement_name_carries_the_nmfs_id() {
  let s = store().await;
  let a = animal(&s).await;
  let detail = EntanglementDetail { nmfs_id: Some("E12-03".into()), ..Default::default() };
  let case = s
    .add_case(NewCase::new(a, CaseDetail::Entanglement(detail)))
    .await
    .unwrap();
  let obs = s
    .add_observation(NewObservation::new(a, UncertainDateTime::year(2003).unwrap()))
    .await
    .unwrap();
  s.link_observation(case.id, obs.id).await.unwrap();
  assert_eq!(
    s.case_name(case.id).await.unwrap().as_deref(),
    Some("2003#1 (2003) Entanglement E12-03 of Unknown taxon")
  );
}

#[tokio::test]
async fn cases_are_listed_by_date() {
  let s = store().await;
  let a = animal(&s).await;
  let (late, _) = dated_case(&s, a, udt(2004, 1, 1)).await;
  let (early, _) = dated_case(&s, a, udt(2001, 1, 1)).await;
  let undated = s.add_case(NewCase::new(a, CaseDetail::Stranding)).await.unwrap();

  let ids: Vec<CaseId> = s.list_cases().await.unwrap().iter().map(|c| c.id).collect();
  assert_eq!(ids, vec![undated.id, early.id, late.id]);
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn gear_retrieved_follows_observations() {
  let s = store().await;
  let a = animal(&s).await;
  let case = s.add_case(NewCase::new(a, CaseDetail::Stranding)).await.unwrap();
  assert_eq!(s.case_gear_retrieved(case.id).await.unwrap(), None);

  let mut observations = Vec::new();
  for retrieved in [Some(true), Some(false), None] {
    let mut input = NewObservation::new(a, udt(2008, 8, 8));
    input.gear_retrieved = retrieved;
    let obs = s.add_observation(input).await.unwrap();
    s.link_observation(case.id, obs.id).await.unwrap();
    observations.push(obs);
  }
  assert_eq!(s.case_gear_retrieved(case.id).await.unwrap(), Some(true));

  observations[0].gear_retrieved = Some(false);
  s.update_observation(observations[0].clone()).await.unwrap();
  assert_eq!(s.case_gear_retrieved(case.id).await.unwrap(), None);

  observations[2].gear_retrieved = Some(false);
  s.update_observation(observations[2].clone()).await.unwrap();
  assert_eq!(s.case_gear_retrieved(case.id).await.unwrap(), Some(false));
  assert!(!s.case_gear_present(case.id).await.unwrap());
}

#[tokio::test]
async fn name_dependencies_cover_linked_observations() {
  let s = store().await;
  let a = animal(&s).await;
  let (case, obs) = dated_case(&s, a, udt(2003, 5, 2)).await;
  let deps = s.case_name_dependencies(case.id).await.unwrap();

  assert!(deps.invalidated_by(&Mutation::Updated(obs.id.into())));
  assert!(deps.invalidated_by(&Mutation::Created(
    Snapshot::new(ObservationId(999)).of_animal(a)
  )));
  assert!(!deps.invalidated_by(&Mutation::Updated(CaseId(999).into())));
}

#[tokio::test]
async fn taxon_dependencies_follow_the_animal_observations() {
  let s = store().await;
  let a = animal(&s).await;
  let obs = s
    .add_observation(NewObservation::new(a, udt(2003, 5, 2)))
    .await
    .unwrap();
  let deps = s.animal_taxon_dependencies(a).await.unwrap();
  assert!(deps.invalidated_by(&Mutation::Updated(obs.id.into())));
  assert!(deps.invalidated_by(&Mutation::Created(
    Snapshot::new(ObservationId(999)).of_animal(a)
  )));
  assert!(!deps.invalidated_by(&Mutation::Created(
    Snapshot::new(ObservationId(999)).of_animal(AnimalId(999))
  )));

  let species = humpback(&s).await;
  let mut fetched = s.get_animal(a).await.unwrap().unwrap();
  fetched.determined_taxon = Some(species);
  s.update_animal(fetched).await.unwrap();
  let deps = s.animal_taxon_dependencies(a).await.unwrap();
  assert!(!deps.invalidated_by(&Mutation::Updated(obs.id.into())));
  assert!(deps.invalidated_by(&Mutation::Updated(a.into())));
}

#[tokio::test]
async fn gender_dependencies_follow_the_animal_observations() {
  let s = store().await;
  let a = animal(&s).await;
  let obs = s
    .add_observation(NewObservation::new(a, udt(2003, 5, 2)))
    .await
    .unwrap();
  let deps = s.animal_gender_dependencies(a).await.unwrap();
  assert!(deps.invalidated_by(&Mutation::Deleted(obs.id.into())));
  assert!(deps.invalidated_by(&Mutation::Created(
    Snapshot::new(ObservationId(999)).of_animal(a)
  )));

  let mut fetched = s.get_animal(a).await.unwrap().unwrap();
  fetched.determined_gender = Some(Gender::Male);
  s.update_animal(fetched).await.unwrap();
  let deps = s.animal_gender_dependencies(a).await.unwrap();
  assert!(!deps.invalidated_by(&Mutation::Deleted(obs.id.into())));

  assert!(s.animal_gender_dependencies(AnimalId(999)).await.unwrap_err().is_not_found());
}

// ─── Merge ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_moves_observations_and_history() {
  let s = store().await;
  let a = animal(&s).await;
  let (source, source_obs) = dated_case(&s, a, udt(2003, 3, 1)).await;
  let (dest, _) = dated_case(&s, a, udt(2003, 4, 1)).await;
  assert_eq!(source.current_number.unwrap().number, 1);
  assert_eq!(dest.current_number.unwrap().number, 2);

  let merged = s.merge_cases(source.id, dest.id).await.unwrap();

  // Same year: the destination keeps its own number.
  assert_eq!(merged.current_number.unwrap().identifier(), "2003#2");
  assert_eq!(merged.date, Some(udt(2003, 3, 1)));
  let names: Vec<&str> = merged.names.iter().collect();
  assert_eq!(
    names,
    vec![
      "2003#1 (2003-03-01) Case of Unknown taxon",
      "2003#2 (2003-04-01) Case of Unknown taxon",
      "2003#2 (2003-03-01) Case of Unknown taxon",
    ]
  );
  let linked: Vec<ObservationId> = s
    .case_observations(dest.id)
    .await
    .unwrap()
    .iter()
    .map(|o| o.id)
    .collect();
  assert!(linked.contains(&source_obs.id));

  let source = s.get_case(source.id).await.unwrap().unwrap();
  assert_eq!(source.merged_into, Some(dest.id));
  let listed: Vec<CaseId> = s.list_cases().await.unwrap().iter().map(|c| c.id).collect();
  assert_eq!(listed, vec![dest.id]);

  // The number stays issued: nobody else gets 2003#1 or 2003#2.
  let (next, _) = dated_case(&s, a, udt(2003, 9, 9)).await;
  assert_eq!(next.current_number.unwrap().number, 3);
  assert!(matches!(
    s.merge_cases(source.id, next.id).await,
    Err(Error::Core(cetus_core::Error::Merge(MergeError::AlreadyMerged { .. })))
  ));
}

#[tokio::test]
async fn merge_that_changes_the_year_reuses_the_lineage_number() {
  let s = store().await;
  let a = animal(&s).await;
  let (source, _) = dated_case(&s, a, udt(2003, 3, 1)).await;
  let (dest, _) = dated_case(&s, a, udt(2004, 6, 1)).await;
  assert_eq!(source.current_number.unwrap().identifier(), "2003#1");
  assert_eq!(dest.current_number.unwrap().identifier(), "2004#1");

  let merged = s.merge_cases(source.id, dest.id).await.unwrap();
  assert_eq!(merged.date, Some(udt(2003, 3, 1)));
  assert_eq!(merged.current_number.unwrap().identifier(), "2003#1");
  assert_eq!(merged.name(), Some("2003#1 (2003-03-01) Case of Unknown taxon"));

  let history: Vec<String> = s
    .case_numbers(dest.id)
    .await
    .unwrap()
    .iter()
    .map(|n| n.identifier())
    .collect();
  assert_eq!(history, vec!["2003#1", "2004#1"]);

  let other = animal(&s).await;
  let (next, _) = dated_case(&s, other, udt(2003, 8, 8)).await;
  assert_eq!(next.current_number.unwrap().identifier(), "2003#2");
}

#[tokio::test]
async fn merge_across_animals_is_rejected() {
  let s = store().await;
  let a = animal(&s).await;
  let b = animal(&s).await;
  let (x, _) = dated_case(&s, a, udt(2003, 3, 1)).await;
  let (y, _) = dated_case(&s, b, udt(2003, 3, 1)).await;

  let err = s.merge_cases(x.id, y.id).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(cetus_core::Error::Merge(MergeError::DifferentAnimals { .. }))
  ));
  // Nothing changed.
  assert_eq!(s.get_case(x.id).await.unwrap().unwrap(), x);
  assert_eq!(s.get_case(y.id).await.unwrap().unwrap(), y);
}

#[tokio::test]
async fn merge_with_si_n_m_info_is_rejected() {
  let s = store().await;
  let a = animal(&s).await;
  let (x, _) = dated_case(&s, a, udt(2003, 3, 1)).await;
  let (mut y, _) = dated_case(&s, a, udt(2003, 3, 2)).await;
  y.si_n_m.animal_fate = Some(AnimalFate::Mortality);
  let y = s.update_case(y).await.unwrap();

  let err = s.merge_cases(x.id, y.id).await.unwrap_err();
  assert!(err.is_merge());
  assert!(s.get_case(x.id).await.unwrap().unwrap().merged_into.is_none());
}
