//! Gear attributes: the second [`dag`](crate::dag) instantiation. An attribute
//! like "long line" implies "line"; analysed entanglement gear is described by
//! a set of attributes plus everything they imply.

use serde::{Deserialize, Serialize};

use crate::ids::GearAttributeId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearAttribute {
  pub id:   GearAttributeId,
  pub name: String,
}
