//! Error type for `cetus-store-sqlite`.

use cetus_core::{
  error::{CycleError, MergeError, ValidationError},
  ids::{AnimalId, CaseId, EntityRef, ObservationId},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] cetus_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A stored column held something that doesn't decode.
  #[error("can't decode {column}: {value:?}")]
  Decode { column: &'static str, value: String },

  #[error("animal {animal} still has {cases} case(s)")]
  AnimalHasCases { animal: AnimalId, cases: usize },

  #[error("case {case} was merged into case {into}")]
  MergedCase { case: CaseId, into: CaseId },

  #[error("observation {observation} isn't of the animal of case {case}")]
  ForeignObservation { observation: ObservationId, case: CaseId },
}

impl Error {
  pub(crate) fn not_found(entity: impl Into<EntityRef>) -> Self {
    Self::Core(cetus_core::Error::NotFound(entity.into()))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::Core(cetus_core::Error::NotFound(_)))
  }

  pub fn is_cycle(&self) -> bool { matches!(self, Self::Core(cetus_core::Error::Cycle(_))) }

  pub fn is_merge(&self) -> bool { matches!(self, Self::Core(cetus_core::Error::Merge(_))) }
}

impl From<ValidationError> for Error {
  fn from(e: ValidationError) -> Self { Self::Core(e.into()) }
}

impl From<CycleError> for Error {
  fn from(e: CycleError) -> Self { Self::Core(e.into()) }
}

impl From<MergeError> for Error {
  fn from(e: MergeError) -> Self { Self::Core(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
