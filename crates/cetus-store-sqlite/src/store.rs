//! [`SqliteStore`], the SQLite implementation of [`IncidentStore`].

use std::{collections::BTreeSet, path::Path};

use cetus_core::{
  animal::{Animal, Gender, NewAnimal, NewObservation, Observation},
  case::{Case, CaseDetail, NewCase, gear_present, gear_retrieved},
  dag::{DagNode, NodeKind, descendants, implied_by_set, implied_supertypes, with_descendants},
  deps::{
    CacheDependency, animal_gender_dependencies, animal_taxon_dependencies,
    case_name_dependencies,
  },
  gear::GearAttribute,
  ids::{AnimalId, CaseId, GearAttributeId, ObservationId, TaxonId},
  numbering::YearCaseNumber,
  store::IncidentStore,
  taxon::{NewTaxon, Taxon},
};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, params};
use tracing::info;

use crate::{
  Error, Result,
  encode::{CaseFields, encode_date, encode_udt},
  graph::{SqlDag, node_ref},
  ledger::SqlLedger,
  ops,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Cetus incident store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

/// Run `f` in a `BEGIN IMMEDIATE` transaction, committing only if it succeeds.
/// Taking the write lock up front serialises yearly-number assignment.
fn with_tx<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let out = f(&tx)?;
  tx.commit()?;
  Ok(out)
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(with_tx(conn, f))).await?
  }
}

fn today() -> chrono::NaiveDate { Local::now().date_naive() }

fn ensure_live(case: &Case) -> Result<()> {
  match case.merged_into {
    Some(into) => Err(Error::MergedCase { case: case.id, into }),
    None => Ok(()),
  }
}

/// The graph `node` lives in, or not-found if there is no such node.
fn existing_node<N: DagNode>(conn: &Connection, node: N) -> Result<SqlDag<'_, N>> {
  let dag = SqlDag::<N>::new(conn);
  if !dag.node_exists(node)? {
    return Err(Error::not_found(node_ref(node)));
  }
  Ok(dag)
}

/// After a DAG edit: taxon edges feed every case name, gear edges none.
fn recompute_after_edge<N: DagNode>(conn: &Connection) -> Result<()> {
  if N::KIND == NodeKind::Taxon {
    ops::recompute_cases(conn, ops::live_case_ids(conn)?)?;
  }
  Ok(())
}

// ─── IncidentStore impl ──────────────────────────────────────────────────────

impl IncidentStore for SqliteStore {
  type Error = Error;

  // ── Taxa and gear attributes ──────────────────────────────────────────────

  async fn add_taxon(&self, input: NewTaxon) -> Result<Taxon> {
    self
      .write(move |conn| {
        conn.execute(
          "INSERT INTO taxa (name, common_names, rank) VALUES (?1, ?2, ?3)",
          params![
            input.name,
            serde_json::to_string(&input.common_names)?,
            input.rank.to_string(),
          ],
        )?;
        Ok(Taxon {
          id:           TaxonId(conn.last_insert_rowid()),
          name:         input.name,
          common_names: input.common_names,
          rank:         input.rank,
        })
      })
      .await
  }

  async fn get_taxon(&self, id: TaxonId) -> Result<Option<Taxon>> {
    self.read(move |conn| ops::load_taxon(conn, id)).await
  }

  async fn scientific_name(&self, id: TaxonId) -> Result<Option<String>> {
    self.read(move |conn| ops::scientific_name(conn, id)).await
  }

  async fn add_gear_attribute(&self, name: String) -> Result<GearAttribute> {
    self
      .write(move |conn| {
        conn.execute("INSERT INTO gear_attributes (name) VALUES (?1)", params![name])?;
        Ok(GearAttribute { id: GearAttributeId(conn.last_insert_rowid()), name })
      })
      .await
  }

  async fn get_gear_attribute(&self, id: GearAttributeId) -> Result<Option<GearAttribute>> {
    self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT name FROM gear_attributes WHERE gear_attribute_id = ?1",
              params![id.get()],
              |row| Ok(GearAttribute { id, name: row.get(0)? }),
            )
            .optional()?,
        )
      })
      .await
  }

  // ── Hierarchies ───────────────────────────────────────────────────────────

  async fn add_supertype<N: DagNode>(&self, subtype: N, supertype: N) -> Result<bool> {
    self
      .write(move |conn| {
        let dag = existing_node(conn, subtype)?;
        existing_node(conn, supertype)?;
        let added = dag.add_edge(subtype, supertype)?;
        if added {
          info!(kind = %N::KIND, subtype = subtype.id(), supertype = supertype.id(), "added supertype");
          recompute_after_edge::<N>(conn)?;
        }
        Ok(added)
      })
      .await
  }

  async fn remove_supertype<N: DagNode>(&self, subtype: N, supertype: N) -> Result<bool> {
    self
      .write(move |conn| {
        let removed = SqlDag::<N>::new(conn).remove_edge(subtype, supertype)?;
        if removed {
          info!(kind = %N::KIND, subtype = subtype.id(), supertype = supertype.id(), "removed supertype");
          recompute_after_edge::<N>(conn)?;
        }
        Ok(removed)
      })
      .await
  }

  async fn implied_supertypes<N: DagNode>(&self, node: N) -> Result<BTreeSet<N>> {
    self
      .read(move |conn| Ok(implied_supertypes(&existing_node(conn, node)?, node)?))
      .await
  }

  async fn dag_roots<N: DagNode>(&self) -> Result<Vec<N>> {
    self.read(|conn| Ok(SqlDag::<N>::new(conn).roots()?)).await
  }

  async fn descendants<N: DagNode>(&self, node: N) -> Result<Vec<N>> {
    self
      .read(move |conn| Ok(descendants(&existing_node(conn, node)?, node)?))
      .await
  }

  async fn with_descendants<N: DagNode>(&self, node: N) -> Result<Vec<N>> {
    self
      .read(move |conn| Ok(with_descendants(&existing_node(conn, node)?, node)?))
      .await
  }

  // ── Animals ───────────────────────────────────────────────────────────────

  async fn add_animal(&self, input: NewAnimal) -> Result<Animal> {
    self
      .write(move |conn| {
        let mut animal = input.into_animal(AnimalId(0));
        animal.settle_dead_before(today());
        conn.execute(
          "INSERT INTO animals (
             field_number, name, determined_taxon, determined_gender,
             determined_dead_before, carcass_disposed, partial_necropsy, necropsy,
             cause_of_death
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          params![
            animal.field_number,
            animal.name,
            animal.determined_taxon.map(TaxonId::get),
            animal.determined_gender.map(|g| g.to_string()),
            animal.determined_dead_before.map(encode_date),
            animal.carcass_disposed,
            animal.partial_necropsy,
            animal.necropsy,
            animal.cause_of_death,
          ],
        )?;
        animal.id = AnimalId(conn.last_insert_rowid());
        Ok(animal)
      })
      .await
  }

  async fn get_animal(&self, id: AnimalId) -> Result<Option<Animal>> {
    self.read(move |conn| ops::load_animal(conn, id)).await
  }

  async fn update_animal(&self, mut animal: Animal) -> Result<Animal> {
    self
      .write(move |conn| {
        ops::require_animal(conn, animal.id)?;
        animal.settle_dead_before(today());
        conn.execute(
          "UPDATE animals SET
             field_number = ?1, name = ?2, determined_taxon = ?3, determined_gender = ?4,
             determined_dead_before = ?5, carcass_disposed = ?6, partial_necropsy = ?7,
             necropsy = ?8, cause_of_death = ?9
           WHERE animal_id = ?10",
          params![
            animal.field_number,
            animal.name,
            animal.determined_taxon.map(TaxonId::get),
            animal.determined_gender.map(|g| g.to_string()),
            animal.determined_dead_before.map(encode_date),
            animal.carcass_disposed,
            animal.partial_necropsy,
            animal.necropsy,
            animal.cause_of_death,
            animal.id.get(),
          ],
        )?;
        ops::recompute_cases(conn, ops::animal_case_ids(conn, animal.id)?)?;
        Ok(animal)
      })
      .await
  }

  async fn delete_animal(&self, id: AnimalId) -> Result<()> {
    self
      .write(move |conn| {
        ops::require_animal(conn, id)?;
        let cases: i64 = conn.query_row(
          "SELECT COUNT(*) FROM cases WHERE animal_id = ?1",
          params![id.get()],
          |row| row.get(0),
        )?;
        if cases > 0 {
          return Err(Error::AnimalHasCases { animal: id, cases: cases as usize });
        }
        conn.execute("DELETE FROM observations WHERE animal_id = ?1", params![id.get()])?;
        conn.execute("DELETE FROM animals WHERE animal_id = ?1", params![id.get()])?;
        Ok(())
      })
      .await
  }

  async fn probable_taxon(&self, id: AnimalId) -> Result<Option<TaxonId>> {
    self
      .read(move |conn| {
        ops::require_animal(conn, id)?;
        ops::probable_taxon(conn, id)
      })
      .await
  }

  async fn probable_gender(&self, id: AnimalId) -> Result<Option<Gender>> {
    self
      .read(move |conn| {
        ops::require_animal(conn, id)?;
        ops::probable_gender(conn, id)
      })
      .await
  }

  // ── Observations ──────────────────────────────────────────────────────────

  async fn add_observation(&self, input: NewObservation) -> Result<Observation> {
    self
      .write(move |conn| {
        ops::require_animal(conn, input.animal_id)?;
        conn.execute(
          "INSERT INTO observations (
             animal_id, datetime_observed, datetime_reported, taxon_id, gender,
             animal_description, gear_present, gear_retrieved
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          params![
            input.animal_id.get(),
            encode_udt(&input.datetime_observed),
            input.datetime_reported.as_ref().map(encode_udt),
            input.taxon.map(TaxonId::get),
            input.gender.map(|g| g.to_string()),
            input.animal_description,
            input.gear_present,
            input.gear_retrieved,
          ],
        )?;
        let observation = input.into_observation(ObservationId(conn.last_insert_rowid()));
        ops::recompute_cases(conn, ops::animal_case_ids(conn, observation.animal_id)?)?;
        Ok(observation)
      })
      .await
  }

  async fn update_observation(&self, observation: Observation) -> Result<Observation> {
    self
      .write(move |conn| {
        let old = ops::require_observation(conn, observation.id)?;
        ops::require_animal(conn, observation.animal_id)?;

        let mut affected = ops::observation_case_ids(conn, observation.id)?;
        affected.extend(ops::animal_case_ids(conn, old.animal_id)?);
        if old.animal_id != observation.animal_id {
          affected.extend(ops::animal_case_ids(conn, observation.animal_id)?);
          conn.execute(
            "DELETE FROM case_observations WHERE observation_id = ?1
               AND case_id IN (SELECT case_id FROM cases WHERE animal_id != ?2)",
            params![observation.id.get(), observation.animal_id.get()],
          )?;
        }

        conn.execute(
          "UPDATE observations SET
             animal_id = ?1, datetime_observed = ?2, datetime_reported = ?3, taxon_id = ?4,
             gender = ?5, animal_description = ?6, gear_present = ?7, gear_retrieved = ?8
           WHERE observation_id = ?9",
          params![
            observation.animal_id.get(),
            encode_udt(&observation.datetime_observed),
            observation.datetime_reported.as_ref().map(encode_udt),
            observation.taxon.map(TaxonId::get),
            observation.gender.map(|g| g.to_string()),
            observation.animal_description,
            observation.gear_present,
            observation.gear_retrieved,
            observation.id.get(),
          ],
        )?;
        ops::recompute_cases(conn, affected)?;
        Ok(observation)
      })
      .await
  }

  async fn get_observation(&self, id: ObservationId) -> Result<Option<Observation>> {
    self.read(move |conn| ops::load_observation(conn, id)).await
  }

  async fn delete_observation(&self, id: ObservationId) -> Result<()> {
    self
      .write(move |conn| {
        let observation = ops::require_observation(conn, id)?;
        let mut affected = ops::observation_case_ids(conn, id)?;
        affected.extend(ops::animal_case_ids(conn, observation.animal_id)?);
        conn.execute("DELETE FROM observations WHERE observation_id = ?1", params![id.get()])?;
        ops::recompute_cases(conn, affected)?;
        Ok(())
      })
      .await
  }

  async fn animal_observations(&self, id: AnimalId) -> Result<Vec<Observation>> {
    self.read(move |conn| ops::animal_observations(conn, id)).await
  }

  async fn case_observations(&self, id: CaseId) -> Result<Vec<Observation>> {
    self.read(move |conn| ops::case_observations(conn, id)).await
  }

  async fn link_observation(&self, case: CaseId, observation: ObservationId) -> Result<bool> {
    self
      .write(move |conn| {
        let c = ops::require_case(conn, case)?;
        ensure_live(&c)?;
        let o = ops::require_observation(conn, observation)?;
        if o.animal_id != c.animal_id {
          return Err(Error::ForeignObservation { observation, case });
        }
        let inserted = conn.execute(
          "INSERT OR IGNORE INTO case_observations (case_id, observation_id) VALUES (?1, ?2)",
          params![case.get(), observation.get()],
        )?;
        if inserted > 0 {
          ops::recompute_case(conn, case)?;
        }
        Ok(inserted > 0)
      })
      .await
  }

  async fn unlink_observation(&self, case: CaseId, observation: ObservationId) -> Result<bool> {
    self
      .write(move |conn| {
        let removed = conn.execute(
          "DELETE FROM case_observations WHERE case_id = ?1 AND observation_id = ?2",
          params![case.get(), observation.get()],
        )?;
        if removed > 0 {
          ops::recompute_case(conn, case)?;
        }
        Ok(removed > 0)
      })
      .await
  }

  // ── Cases ─────────────────────────────────────────────────────────────────

  async fn add_case(&self, input: NewCase) -> Result<Case> {
    self
      .write(move |conn| {
        ops::require_animal(conn, input.animal_id)?;
        let f = CaseFields::from_new(&input)?;
        conn.execute(
          "INSERT INTO cases (
             animal_id, case_type, detail_json, validity, happened_after,
             human_interaction, ole_investigation, si_n_m, import_notes
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          params![
            input.animal_id.get(),
            f.case_type,
            f.detail_json,
            f.validity,
            f.happened_after,
            f.human_interaction,
            f.ole_investigation,
            f.si_n_m,
            f.import_notes,
          ],
        )?;
        ops::recompute_case(conn, CaseId(conn.last_insert_rowid()))
      })
      .await
  }

  async fn get_case(&self, id: CaseId) -> Result<Option<Case>> {
    self.read(move |conn| ops::load_case(conn, id)).await
  }

  async fn update_case(&self, case: Case) -> Result<Case> {
    self
      .write(move |conn| {
        ensure_live(&ops::require_case(conn, case.id)?)?;
        ops::require_animal(conn, case.animal_id)?;
        let f = CaseFields::from_case(&case)?;
        conn.execute(
          "UPDATE cases SET
             animal_id = ?1, case_type = ?2, detail_json = ?3, validity = ?4,
             happened_after = ?5, human_interaction = ?6, ole_investigation = ?7,
             si_n_m = ?8, import_notes = ?9
           WHERE case_id = ?10",
          params![
            case.animal_id.get(),
            f.case_type,
            f.detail_json,
            f.validity,
            f.happened_after,
            f.human_interaction,
            f.ole_investigation,
            f.si_n_m,
            f.import_notes,
            case.id.get(),
          ],
        )?;
        // Observations stay with their animal.
        conn.execute(
          "DELETE FROM case_observations WHERE case_id = ?1 AND observation_id IN (
             SELECT observation_id FROM observations WHERE animal_id != ?2
           )",
          params![case.id.get(), case.animal_id.get()],
        )?;
        ops::recompute_case(conn, case.id)
      })
      .await
  }

  async fn list_cases(&self) -> Result<Vec<Case>> {
    self
      .read(|conn| {
        ops::query_cases(
          conn,
          "WHERE c.merged_into IS NULL
           ORDER BY c.date, c.current_year, c.current_number, c.case_id",
          params![],
        )
      })
      .await
  }

  async fn animal_cases(&self, id: AnimalId) -> Result<Vec<Case>> {
    self
      .read(move |conn| {
        ops::query_cases(
          conn,
          "WHERE c.animal_id = ?1 AND c.merged_into IS NULL
           ORDER BY c.date, c.current_year, c.current_number, c.case_id",
          params![id.get()],
        )
      })
      .await
  }

  async fn case_name(&self, id: CaseId) -> Result<Option<String>> {
    self
      .read(move |conn| Ok(ops::require_case(conn, id)?.name().map(str::to_owned)))
      .await
  }

  async fn case_numbers(&self, id: CaseId) -> Result<Vec<YearCaseNumber>> {
    self
      .read(move |conn| {
        ops::require_case(conn, id)?;
        Ok(SqlLedger::new(conn).lineage_entries(id)?)
      })
      .await
  }

  async fn merge_cases(&self, source: CaseId, destination: CaseId) -> Result<Case> {
    self
      .write(move |conn| ops::merge_cases(conn, source, destination))
      .await
  }

  async fn recompute_case(&self, id: CaseId) -> Result<Case> {
    self.write(move |conn| ops::recompute_case(conn, id)).await
  }

  async fn recompute_all_cases(&self) -> Result<usize> {
    self
      .write(|conn| ops::recompute_cases(conn, ops::live_case_ids(conn)?))
      .await
  }

  async fn case_gear_retrieved(&self, id: CaseId) -> Result<Option<bool>> {
    self
      .read(move |conn| {
        ops::require_case(conn, id)?;
        let observations = ops::case_observations(conn, id)?;
        Ok(gear_retrieved(observations.iter().map(|o| o.gear_retrieved)))
      })
      .await
  }

  async fn case_gear_present(&self, id: CaseId) -> Result<bool> {
    self
      .read(move |conn| {
        ops::require_case(conn, id)?;
        let observations = ops::case_observations(conn, id)?;
        Ok(gear_present(observations.iter().map(|o| o.gear_present)))
      })
      .await
  }

  async fn implied_analyzed_gear_attributes(
    &self,
    id: CaseId,
  ) -> Result<BTreeSet<GearAttributeId>> {
    self
      .read(move |conn| {
        let case = ops::require_case(conn, id)?;
        let CaseDetail::Entanglement(detail) = &case.detail else {
          return Ok(BTreeSet::new());
        };
        let dag = SqlDag::<GearAttributeId>::new(conn);
        Ok(implied_by_set(&dag, &detail.analyzed_gear_attributes)?)
      })
      .await
  }

  async fn animal_taxon_dependencies(&self, id: AnimalId) -> Result<CacheDependency> {
    self
      .read(move |conn| {
        let animal = ops::require_animal(conn, id)?;
        let observations = ops::animal_observation_ids(conn, id)?;
        Ok(animal_taxon_dependencies(&animal, &observations))
      })
      .await
  }

  async fn animal_gender_dependencies(&self, id: AnimalId) -> Result<CacheDependency> {
    self
      .read(move |conn| {
        let animal = ops::require_animal(conn, id)?;
        let observations = ops::animal_observation_ids(conn, id)?;
        Ok(animal_gender_dependencies(&animal, &observations))
      })
      .await
  }

  async fn case_name_dependencies(&self, id: CaseId) -> Result<CacheDependency> {
    self
      .read(move |conn| {
        let case = ops::require_case(conn, id)?;
        let animal = ops::require_animal(conn, case.animal_id)?;
        let case_observations: Vec<ObservationId> =
          ops::case_observations(conn, id)?.into_iter().map(|o| o.id).collect();
        let animal_observations = ops::animal_observation_ids(conn, animal.id)?;

        let mut taxon_lineage = Vec::new();
        if let Some(taxon) = animal.taxon(ops::probable_taxon(conn, animal.id)?) {
          taxon_lineage.push(taxon);
          taxon_lineage.extend(implied_supertypes(&SqlDag::<TaxonId>::new(conn), taxon)?);
        }

        Ok(case_name_dependencies(
          &case,
          &animal,
          &case_observations,
          &animal_observations,
          &taxon_lineage,
        ))
      })
      .await
  }
}
