//! Directed acyclic graphs of "implies" relations.
//!
//! A node's *supertypes* are the nodes it implies: a species implies its genus,
//! a "long line" gear attribute implies "line". The relation must stay
//! acyclic, so every new edge is checked against the **full** implied closure
//! of its proposed supertype, not just the direct edges.
//!
//! The traversal algorithms here run over any [`DagSource`]: the in-memory
//! [`Dag`] below, or a storage backend reading edges inside a transaction.

use std::{
  collections::{BTreeMap, BTreeSet},
  convert::Infallible,
  fmt,
  hash::Hash,
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  error::CycleError,
  ids::{GearAttributeId, TaxonId},
};

// ─── Node kinds ──────────────────────────────────────────────────────────────

/// Runtime identifier for each hierarchy. Edges of every kind share one index
/// keyed by `(kind, subtype, supertype)`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
  Taxon,
  GearAttribute,
}

/// An id type that can take part in a DAG.
pub trait DagNode:
  Copy + Ord + Hash + fmt::Debug + Send + Sync + 'static
{
  const KIND: NodeKind;

  fn id(self) -> i64;

  fn from_id(id: i64) -> Self;
}

impl DagNode for TaxonId {
  const KIND: NodeKind = NodeKind::Taxon;

  fn id(self) -> i64 { self.0 }

  fn from_id(id: i64) -> Self { Self(id) }
}

impl DagNode for GearAttributeId {
  const KIND: NodeKind = NodeKind::GearAttribute;

  fn id(self) -> i64 { self.0 }

  fn from_id(id: i64) -> Self { Self(id) }
}

// ─── Traversal ───────────────────────────────────────────────────────────────

/// Read access to the edges of a graph.
pub trait DagSource<N: DagNode> {
  type Error;

  /// Nodes directly implied by `node`.
  fn direct_supertypes(&self, node: N) -> Result<Vec<N>, Self::Error>;

  /// Nodes that directly imply `node`, in the order descendants should be
  /// listed.
  fn direct_subtypes(&self, node: N) -> Result<Vec<N>, Self::Error>;
}

/// Every node reachable from `node` over supertype edges, excluding `node`.
///
/// Keeps a visited set, so it terminates even over a graph that somehow
/// contains a cycle.
pub fn implied_supertypes<N, S>(source: &S, node: N) -> Result<BTreeSet<N>, S::Error>
where
  N: DagNode,
  S: DagSource<N> + ?Sized,
{
  let mut seen = BTreeSet::new();
  let mut stack = vec![node];
  while let Some(current) = stack.pop() {
    for supertype in source.direct_supertypes(current)? {
      if supertype != node && seen.insert(supertype) {
        stack.push(supertype);
      }
    }
  }
  Ok(seen)
}

/// The cycle an edge `subtype -> supertype` would create, if any.
pub fn find_cycle<N, S>(
  source: &S,
  subtype: N,
  supertype: N,
) -> Result<Option<CycleError>, S::Error>
where
  N: DagNode,
  S: DagSource<N> + ?Sized,
{
  if subtype == supertype {
    return Ok(Some(CycleError::SelfEdge { kind: N::KIND, node: subtype.id() }));
  }
  if implied_supertypes(source, supertype)?.contains(&subtype) {
    return Ok(Some(CycleError::WouldCycle {
      kind:      N::KIND,
      subtype:   subtype.id(),
      supertype: supertype.id(),
    }));
  }
  Ok(None)
}

/// Depth-first, pre-order list of every node that implies `node`, each listed
/// once, excluding `node`.
pub fn descendants<N, S>(source: &S, node: N) -> Result<Vec<N>, S::Error>
where
  N: DagNode,
  S: DagSource<N> + ?Sized,
{
  let mut out = Vec::new();
  let mut seen = BTreeSet::from([node]);
  let mut stack: Vec<N> = source.direct_subtypes(node)?.into_iter().rev().collect();
  while let Some(current) = stack.pop() {
    if !seen.insert(current) {
      continue;
    }
    out.push(current);
    stack.extend(source.direct_subtypes(current)?.into_iter().rev());
  }
  Ok(out)
}

/// `node` followed by its [`descendants`].
pub fn with_descendants<N, S>(source: &S, node: N) -> Result<Vec<N>, S::Error>
where
  N: DagNode,
  S: DagSource<N> + ?Sized,
{
  let mut out = vec![node];
  out.extend(descendants(source, node)?);
  Ok(out)
}

/// Everything implied by a set of nodes that isn't already in the set.
pub fn implied_by_set<N, S>(
  source: &S,
  nodes: &BTreeSet<N>,
) -> Result<BTreeSet<N>, S::Error>
where
  N: DagNode,
  S: DagSource<N> + ?Sized,
{
  let mut implied = BTreeSet::new();
  for &node in nodes {
    implied.extend(implied_supertypes(source, node)?);
  }
  Ok(&implied - nodes)
}

// ─── In-memory graph ─────────────────────────────────────────────────────────

/// An in-memory DAG. Edges are only ever added through [`Dag::add_edge`], so
/// the graph is acyclic by construction.
#[derive(Debug, Clone)]
pub struct Dag<N: DagNode> {
  nodes:      BTreeSet<N>,
  supertypes: BTreeMap<N, BTreeSet<N>>,
}

impl<N: DagNode> Default for Dag<N> {
  fn default() -> Self {
    Self { nodes: BTreeSet::new(), supertypes: BTreeMap::new() }
  }
}

impl<N: DagNode> Dag<N> {
  pub fn new() -> Self { Self::default() }

  pub fn add_node(&mut self, node: N) { self.nodes.insert(node); }

  pub fn contains(&self, node: N) -> bool { self.nodes.contains(&node) }

  /// Record that `subtype` implies `supertype`, adding either node if it is
  /// new. Returns `false` if the edge was already present.
  pub fn add_edge(&mut self, subtype: N, supertype: N) -> Result<bool, CycleError> {
    let found = find_cycle(self, subtype, supertype).unwrap_or_else(|e| match e {});
    if let Some(cycle) = found {
      return Err(cycle);
    }
    self.nodes.insert(subtype);
    self.nodes.insert(supertype);
    Ok(self.supertypes.entry(subtype).or_default().insert(supertype))
  }

  /// Returns `false` if there was no such edge.
  pub fn remove_edge(&mut self, subtype: N, supertype: N) -> bool {
    self
      .supertypes
      .get_mut(&subtype)
      .is_some_and(|sups| sups.remove(&supertype))
  }

  pub fn implied_supertypes(&self, node: N) -> BTreeSet<N> {
    implied_supertypes(self, node).unwrap_or_else(|e| match e {})
  }

  pub fn descendants(&self, node: N) -> Vec<N> {
    descendants(self, node).unwrap_or_else(|e| match e {})
  }

  pub fn with_descendants(&self, node: N) -> Vec<N> {
    with_descendants(self, node).unwrap_or_else(|e| match e {})
  }

  /// Nodes that imply nothing.
  pub fn roots(&self) -> Vec<N> {
    self
      .nodes
      .iter()
      .copied()
      .filter(|n| self.supertypes.get(n).is_none_or(BTreeSet::is_empty))
      .collect()
  }

  /// Every `(subtype, supertype)` pair.
  pub fn edges(&self) -> impl Iterator<Item = (N, N)> + '_ {
    self
      .supertypes
      .iter()
      .flat_map(|(&sub, sups)| sups.iter().map(move |&sup| (sub, sup)))
  }
}

impl<N: DagNode> DagSource<N> for Dag<N> {
  type Error = Infallible;

  fn direct_supertypes(&self, node: N) -> Result<Vec<N>, Infallible> {
    Ok(
      self
        .supertypes
        .get(&node)
        .map(|sups| sups.iter().copied().collect())
        .unwrap_or_default(),
    )
  }

  fn direct_subtypes(&self, node: N) -> Result<Vec<N>, Infallible> {
    Ok(
      self
        .supertypes
        .iter()
        .filter(|(_, sups)| sups.contains(&node))
        .map(|(&sub, _)| sub)
        .collect(),
    )
  }
}
