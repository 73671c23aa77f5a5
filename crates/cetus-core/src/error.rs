//! Error types for `cetus-core`.
//!
//! Every kind here is raised synchronously to the immediate caller and never
//! retried: each one is either bad input or an invariant the caller tried to
//! break.

use thiserror::Error;

use crate::{dag::NodeKind, ids::{CaseId, EntityRef}};

/// A malformed [`UncertainDateTime`](crate::datetime::UncertainDateTime).
/// Raised at construction; an invalid value is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("{field} must be between {min} and {max}, got {value}")]
  OutOfRange {
    field: &'static str,
    value: i64,
    min:   i64,
    max:   i64,
  },

  #[error("day must be at most {max} when month is {month}, got {day}")]
  DayOutOfMonth { day: u32, month: u32, max: u32 },

  #[error("malformed sort key {0:?}")]
  MalformedSortKey(String),
}

/// Adding a supertype edge would break acyclicity. Raised before any
/// mutation, so the graph is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CycleError {
  #[error("{kind} {node} can't be a supertype of itself")]
  SelfEdge { kind: NodeKind, node: i64 },

  #[error(
    "{kind} {supertype} can't be a supertype of {subtype}, that would create \
     a cycle"
  )]
  WouldCycle {
    kind:      NodeKind,
    subtype:   i64,
    supertype: i64,
  },
}

/// A case merge that can't be carried out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
  #[error("can't merge case {from} into case {into}: they concern different animals")]
  DifferentAnimals { from: CaseId, into: CaseId },

  #[error("can't yet merge cases with serious injury and mortality info")]
  SeriousInjuryInfo,

  #[error("can't merge case {0} into itself")]
  SameCase(CaseId),

  #[error("case {case} was already merged into case {into}")]
  AlreadyMerged { case: CaseId, into: CaseId },
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(#[from] ValidationError),

  #[error("cycle error: {0}")]
  Cycle(#[from] CycleError),

  #[error("merge error: {0}")]
  Merge(#[from] MergeError),

  #[error("{0} not found")]
  NotFound(EntityRef),

  #[error("unknown case type discriminant: {0:?}")]
  UnknownCaseType(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
