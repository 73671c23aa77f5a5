//! The `dag_edges` table seen through [`DagSource`].
//!
//! One edge table serves every hierarchy; the node kind selects both the edge
//! rows and the node table used for existence checks and name ordering.

use std::marker::PhantomData;

use cetus_core::{
  dag::{DagNode, DagSource, NodeKind, find_cycle},
  ids::{EntityKind, EntityRef},
};
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::Result;

/// `(table, id column)` of the nodes of `kind`.
pub fn node_table(kind: NodeKind) -> (&'static str, &'static str) {
  match kind {
    NodeKind::Taxon => ("taxa", "taxon_id"),
    NodeKind::GearAttribute => ("gear_attributes", "gear_attribute_id"),
  }
}

pub struct SqlDag<'c, N> {
  conn:  &'c Connection,
  _node: PhantomData<N>,
}

impl<'c, N: DagNode> SqlDag<'c, N> {
  pub fn new(conn: &'c Connection) -> Self { Self { conn, _node: PhantomData } }

  pub fn node_exists(&self, node: N) -> rusqlite::Result<bool> {
    let (table, id) = node_table(N::KIND);
    Ok(
      self
        .conn
        .query_row(
          &format!("SELECT 1 FROM {table} WHERE {id} = ?1"),
          params![node.id()],
          |_| Ok(()),
        )
        .optional()?
        .is_some(),
    )
  }

  /// Insert `subtype -> supertype` after checking it keeps the graph acyclic.
  /// Returns `false` if the edge was already present.
  pub fn add_edge(&self, subtype: N, supertype: N) -> Result<bool> {
    if let Some(cycle) = find_cycle(self, subtype, supertype)? {
      tracing::warn!(%cycle, "rejected supertype edge");
      return Err(cycle.into());
    }
    let inserted = self.conn.execute(
      "INSERT OR IGNORE INTO dag_edges (kind, subtype_id, supertype_id) VALUES (?1, ?2, ?3)",
      params![N::KIND.to_string(), subtype.id(), supertype.id()],
    )?;
    Ok(inserted > 0)
  }

  pub fn remove_edge(&self, subtype: N, supertype: N) -> Result<bool> {
    let removed = self.conn.execute(
      "DELETE FROM dag_edges WHERE kind = ?1 AND subtype_id = ?2 AND supertype_id = ?3",
      params![N::KIND.to_string(), subtype.id(), supertype.id()],
    )?;
    Ok(removed > 0)
  }

  /// Nodes with no supertype edge, ordered by name.
  pub fn roots(&self) -> rusqlite::Result<Vec<N>> {
    let (table, id) = node_table(N::KIND);
    let mut stmt = self.conn.prepare(&format!(
      "SELECT n.{id} FROM {table} n
       WHERE NOT EXISTS (
         SELECT 1 FROM dag_edges e WHERE e.kind = ?1 AND e.subtype_id = n.{id}
       )
       ORDER BY n.name, n.{id}"
    ))?;
    let roots = stmt
      .query_map(params![N::KIND.to_string()], |row| row.get(0).map(N::from_id))?
      .collect();
    roots
  }
}

impl<N: DagNode> DagSource<N> for SqlDag<'_, N> {
  type Error = rusqlite::Error;

  fn direct_supertypes(&self, node: N) -> rusqlite::Result<Vec<N>> {
    let mut stmt = self.conn.prepare_cached(
      "SELECT supertype_id FROM dag_edges WHERE kind = ?1 AND subtype_id = ?2
       ORDER BY supertype_id",
    )?;
    let nodes = stmt
      .query_map(params![N::KIND.to_string(), node.id()], |row| {
        row.get(0).map(N::from_id)
      })?
      .collect();
    nodes
  }

  fn direct_subtypes(&self, node: N) -> rusqlite::Result<Vec<N>> {
    let (table, id) = node_table(N::KIND);
    let mut stmt = self.conn.prepare_cached(&format!(
      "SELECT e.subtype_id FROM dag_edges e
       JOIN {table} n ON n.{id} = e.subtype_id
       WHERE e.kind = ?1 AND e.supertype_id = ?2
       ORDER BY n.name, e.subtype_id"
    ))?;
    let nodes = stmt
      .query_map(params![N::KIND.to_string(), node.id()], |row| {
        row.get(0).map(N::from_id)
      })?
      .collect();
    nodes
  }
}

/// `node` as an [`EntityRef`], for not-found errors.
pub fn node_ref<N: DagNode>(node: N) -> EntityRef {
  let kind = match N::KIND {
    NodeKind::Taxon => EntityKind::Taxon,
    NodeKind::GearAttribute => EntityKind::GearAttribute,
  };
  EntityRef { kind, id: node.id() }
}
