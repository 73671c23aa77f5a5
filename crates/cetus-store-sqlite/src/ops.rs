//! Synchronous operations run on the database thread, inside the transaction
//! of whichever store method called them.
//!
//! Writes that touch a case's inputs finish by calling [`recompute_cases`],
//! so derived fields are updated in the same transaction as the write.

use std::collections::BTreeSet;

use cetus_core::{
  animal::{self, Animal, Gender, Observation},
  case::{Case, CaseNameParts, CaseVariant as _, case_date, format_case_name},
  dag::implied_supertypes,
  ids::{AnimalId, CaseId, ObservationId, TaxonId},
  numbering::{Settlement, settle_numbering},
  taxon::Taxon,
};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, Params, params};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  encode::{
    ANIMAL_COLUMNS, CASE_COLUMNS, CASE_FROM, OBSERVATION_COLUMNS, RawAnimal, RawCase,
    RawObservation, RawTaxon, TAXON_COLUMNS, encode_udt,
  },
  graph::SqlDag,
  ledger::SqlLedger,
};

// ─── Taxa ────────────────────────────────────────────────────────────────────

pub fn load_taxon(conn: &Connection, id: TaxonId) -> Result<Option<Taxon>> {
  conn
    .query_row(
      &format!("SELECT {TAXON_COLUMNS} FROM taxa WHERE taxon_id = ?1"),
      params![id.get()],
      RawTaxon::from_row,
    )
    .optional()?
    .map(RawTaxon::into_taxon)
    .transpose()
}

/// The taxon's full scientific name, built from its implied supertypes.
pub fn scientific_name(conn: &Connection, id: TaxonId) -> Result<Option<String>> {
  let Some(taxon) = load_taxon(conn, id)? else {
    return Ok(None);
  };
  let mut ancestors = Vec::new();
  for ancestor in implied_supertypes(&SqlDag::<TaxonId>::new(conn), id)? {
    if let Some(t) = load_taxon(conn, ancestor)? {
      ancestors.push(t);
    }
  }
  Ok(Some(taxon.scientific_name(&ancestors)))
}

// ─── Animals and observations ────────────────────────────────────────────────

pub fn load_animal(conn: &Connection, id: AnimalId) -> Result<Option<Animal>> {
  conn
    .query_row(
      &format!("SELECT {ANIMAL_COLUMNS} FROM animals WHERE animal_id = ?1"),
      params![id.get()],
      RawAnimal::from_row,
    )
    .optional()?
    .map(RawAnimal::into_animal)
    .transpose()
}

pub fn require_animal(conn: &Connection, id: AnimalId) -> Result<Animal> {
  load_animal(conn, id)?.ok_or_else(|| Error::not_found(id))
}

fn query_observations(
  conn: &Connection,
  sql_tail: &str,
  params: impl Params,
) -> Result<Vec<Observation>> {
  let mut stmt = conn.prepare(&format!("SELECT {OBSERVATION_COLUMNS} {sql_tail}"))?;
  let raws = stmt
    .query_map(params, RawObservation::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawObservation::into_observation).collect()
}

pub fn load_observation(conn: &Connection, id: ObservationId) -> Result<Option<Observation>> {
  Ok(
    query_observations(
      conn,
      "FROM observations o WHERE o.observation_id = ?1",
      params![id.get()],
    )?
    .pop(),
  )
}

pub fn require_observation(conn: &Connection, id: ObservationId) -> Result<Observation> {
  load_observation(conn, id)?.ok_or_else(|| Error::not_found(id))
}

pub fn animal_observations(conn: &Connection, id: AnimalId) -> Result<Vec<Observation>> {
  query_observations(
    conn,
    "FROM observations o WHERE o.animal_id = ?1
     ORDER BY o.datetime_observed, o.observation_id",
    params![id.get()],
  )
}

pub fn animal_observation_ids(conn: &Connection, id: AnimalId) -> Result<Vec<ObservationId>> {
  Ok(animal_observations(conn, id)?.into_iter().map(|o| o.id).collect())
}

pub fn case_observations(conn: &Connection, id: CaseId) -> Result<Vec<Observation>> {
  query_observations(
    conn,
    "FROM observations o
     JOIN case_observations co ON co.observation_id = o.observation_id
     WHERE co.case_id = ?1
     ORDER BY o.datetime_observed, o.observation_id",
    params![id.get()],
  )
}

pub fn probable_taxon(conn: &Connection, id: AnimalId) -> Result<Option<TaxonId>> {
  let reported = animal_observations(conn, id)?.into_iter().filter_map(|o| o.taxon);
  Ok(animal::probable_taxon(&SqlDag::<TaxonId>::new(conn), reported)?)
}

pub fn probable_gender(conn: &Connection, id: AnimalId) -> Result<Option<Gender>> {
  let reported = animal_observations(conn, id)?.into_iter().filter_map(|o| o.gender);
  Ok(animal::probable_gender(reported))
}

// ─── Cases ───────────────────────────────────────────────────────────────────

pub fn query_cases(conn: &Connection, sql_tail: &str, params: impl Params) -> Result<Vec<Case>> {
  let mut stmt = conn.prepare(&format!("SELECT {CASE_COLUMNS} FROM {CASE_FROM} {sql_tail}"))?;
  let raws = stmt
    .query_map(params, RawCase::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawCase::into_case).collect()
}

pub fn load_case(conn: &Connection, id: CaseId) -> Result<Option<Case>> {
  Ok(query_cases(conn, "WHERE c.case_id = ?1", params![id.get()])?.pop())
}

pub fn require_case(conn: &Connection, id: CaseId) -> Result<Case> {
  load_case(conn, id)?.ok_or_else(|| Error::not_found(id))
}

fn case_ids(conn: &Connection, sql: &str, params: impl Params) -> Result<Vec<CaseId>> {
  let mut stmt = conn.prepare(sql)?;
  let ids = stmt
    .query_map(params, |row| row.get(0).map(CaseId))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(ids)
}

/// Live (not merged-away) cases of an animal.
pub fn animal_case_ids(conn: &Connection, id: AnimalId) -> Result<Vec<CaseId>> {
  case_ids(
    conn,
    "SELECT case_id FROM cases WHERE animal_id = ?1 AND merged_into IS NULL",
    params![id.get()],
  )
}

pub fn observation_case_ids(conn: &Connection, id: ObservationId) -> Result<Vec<CaseId>> {
  case_ids(
    conn,
    "SELECT case_id FROM case_observations WHERE observation_id = ?1",
    params![id.get()],
  )
}

pub fn live_case_ids(conn: &Connection) -> Result<Vec<CaseId>> {
  case_ids(conn, "SELECT case_id FROM cases WHERE merged_into IS NULL ORDER BY case_id", params![])
}

/// Recompute a case's date, yearly number and name, and store them.
pub fn recompute_case(conn: &Connection, id: CaseId) -> Result<Case> {
  let mut case = require_case(conn, id)?;
  let observations = case_observations(conn, id)?;
  let date = case_date(&observations);

  let settlement =
    settle_numbering(&mut SqlLedger::new(conn), id, case.current_number, date.as_ref())?;
  if let Settlement::Minted(n) = settlement {
    info!(case = %id, number = %n.identifier(), "issued yearly number");
  }
  case.date = date;
  case.current_number = settlement.current();

  if let Some(date) = &case.date {
    let animal = require_animal(conn, case.animal_id)?;
    let taxon = match animal.taxon(probable_taxon(conn, animal.id)?) {
      Some(t) => scientific_name(conn, t)?,
      None => None,
    };
    let name = format_case_name(&CaseNameParts {
      case_id: id,
      number: case.current_number,
      date,
      kind: case.kind(),
      suffix: case.detail.subtype_name_suffix(),
      taxon,
      field_number: animal.field_number.as_deref(),
    });
    if case.names.push_if_changed(name) {
      debug!(case = %id, name = ?case.names.current(), "case renamed");
    }
  }

  conn.execute(
    "UPDATE cases SET date = ?1, current_year = ?2, current_number = ?3, names = ?4
     WHERE case_id = ?5",
    params![
      case.date.as_ref().map(encode_udt),
      case.current_number.map(|n| n.year),
      case.current_number.map(|n| n.number),
      case.names.to_stored(),
      id.get(),
    ],
  )?;
  debug!(case = %id, "recomputed case");
  Ok(case)
}

/// Recompute each distinct case in `ids`.
pub fn recompute_cases(conn: &Connection, ids: impl IntoIterator<Item = CaseId>) -> Result<usize> {
  let ids: BTreeSet<CaseId> = ids.into_iter().collect();
  for &id in &ids {
    recompute_case(conn, id)?;
  }
  Ok(ids.len())
}

/// Fold `source` into `destination`; see [`IncidentStore::merge_cases`].
///
/// [`IncidentStore::merge_cases`]: cetus_core::store::IncidentStore::merge_cases
pub fn merge_cases(conn: &Connection, source: CaseId, destination: CaseId) -> Result<Case> {
  let from = require_case(conn, source)?;
  let mut into = require_case(conn, destination)?;
  if let Err(e) = into.absorb(&from) {
    warn!(%source, %destination, error = %e, "rejected case merge");
    return Err(e.into());
  }

  conn.execute(
    "INSERT OR IGNORE INTO case_observations (case_id, observation_id)
     SELECT ?1, observation_id FROM case_observations WHERE case_id = ?2",
    params![destination.get(), source.get()],
  )?;
  conn.execute(
    "DELETE FROM case_observations WHERE case_id = ?1",
    params![source.get()],
  )?;
  conn.execute(
    "INSERT INTO case_merges (source_id, destination_id, recorded_at) VALUES (?1, ?2, ?3)",
    params![source.get(), destination.get(), Utc::now().to_rfc3339()],
  )?;
  conn.execute(
    "UPDATE cases SET merged_into = ?1, current_year = NULL, current_number = NULL
     WHERE case_id = ?2",
    params![destination.get(), source.get()],
  )?;
  conn.execute(
    "UPDATE cases SET names = ?1, import_notes = ?2 WHERE case_id = ?3",
    params![into.names.to_stored(), into.import_notes, destination.get()],
  )?;

  let merged = recompute_case(conn, destination)?;
  info!(
    %source,
    %destination,
    number = ?merged.current_number.map(|n| n.identifier()),
    "merged cases"
  );
  Ok(merged)
}
