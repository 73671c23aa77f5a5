//! Typed identifiers for every persisted entity.
//!
//! Ids are the integer row ids assigned by the store. Each entity gets its own
//! newtype so a `CaseId` can never be handed to something expecting an
//! `AnimalId`.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The kinds of entity the core knows about.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
  Animal,
  Observation,
  Case,
  Taxon,
  GearAttribute,
  YearCaseNumber,
}

/// A reference to one entity, independent of its concrete id type.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityRef {
  pub kind: EntityKind,
  pub id:   i64,
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.kind, self.id)
  }
}

macro_rules! id_type {
  ($(#[$meta:meta])* $name:ident => $kind:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
      Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(pub i64);

    impl $name {
      pub fn get(self) -> i64 { self.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
      }
    }

    impl From<$name> for EntityRef {
      fn from(id: $name) -> Self {
        EntityRef { kind: EntityKind::$kind, id: id.0 }
      }
    }
  };
}

id_type!(
  /// Row id of an [`Animal`](crate::animal::Animal).
  AnimalId => Animal
);
id_type!(
  /// Row id of an [`Observation`](crate::animal::Observation).
  ObservationId => Observation
);
id_type!(
  /// Row id of a [`Case`](crate::case::Case).
  CaseId => Case
);
id_type!(
  /// Row id of a [`Taxon`](crate::taxon::Taxon).
  TaxonId => Taxon
);
id_type!(
  /// Row id of a [`GearAttribute`](crate::gear::GearAttribute).
  GearAttributeId => GearAttribute
);
