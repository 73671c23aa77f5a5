//! Taxa: the taxonomic hierarchy, one instantiation of the [`dag`](crate::dag)
//! engine with `TaxonId` nodes.

use std::{cmp::Reverse, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::ids::TaxonId;

/// Taxonomic rank. Ordered from most to least specific.
///
/// Ranks carry the numeric values used for sorting: species is −1, genus 0,
/// family 1, order 2, with `infra`/`sub`/`super` offsets of −0.4, −0.2 and
/// +0.4. Ranks below zero are part of a binomial name.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Rank {
  Infraspecies,
  Subspecies,
  Species,
  Superspecies,
  Infragenus,
  Subgenus,
  Genus,
  Supergenus,
  Infrafamily,
  Subfamily,
  Family,
  Superfamily,
  Infraorder,
  Suborder,
  Order,
  Superorder,
}

impl Rank {
  /// Rank value in tenths, e.g. `-10` for species.
  fn tenths(self) -> i32 {
    let (main, offset) = match self {
      Self::Infraspecies => (-10, -4),
      Self::Subspecies => (-10, -2),
      Self::Species => (-10, 0),
      Self::Superspecies => (-10, 4),
      Self::Infragenus => (0, -4),
      Self::Subgenus => (0, -2),
      Self::Genus => (0, 0),
      Self::Supergenus => (0, 4),
      Self::Infrafamily => (10, -4),
      Self::Subfamily => (10, -2),
      Self::Family => (10, 0),
      Self::Superfamily => (10, 4),
      Self::Infraorder => (20, -4),
      Self::Suborder => (20, -2),
      Self::Order => (20, 0),
      Self::Superorder => (20, 4),
    };
    main + offset
  }

  pub fn value(self) -> f32 { self.tenths() as f32 / 10.0 }

  /// Whether a taxon of this rank is named binomially (below genus).
  pub fn is_binomial(self) -> bool { self.tenths() < 0 }
}

/// A grouping of organisms: a species, a genus, a family...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
  pub id:           TaxonId,
  /// The scientific (Latin) name of this taxon alone, e.g. `novaeangliae`.
  pub name:         String,
  /// Common English names, e.g. "humpback whale".
  pub common_names: Vec<String>,
  pub rank:         Rank,
}

/// Input to [`crate::store::IncidentStore::add_taxon`].
#[derive(Debug, Clone)]
pub struct NewTaxon {
  pub name:         String,
  pub common_names: Vec<String>,
  pub rank:         Rank,
}

impl NewTaxon {
  pub fn new(name: impl Into<String>, rank: Rank) -> Self {
    Self { name: name.into(), common_names: Vec::new(), rank }
  }
}

impl Taxon {
  /// The binomial ancestors between this taxon and its genus, least specific
  /// first. `ancestors` is the taxon's implied supertype set.
  fn binomial_chain<'a>(&self, ancestors: &'a [Taxon]) -> Vec<&'a Taxon> {
    let mut chain: Vec<&Taxon> = ancestors
      .iter()
      .filter(|t| t.rank > self.rank && t.rank <= Rank::Genus)
      .collect();
    chain.sort_by_key(|t| Reverse(t.rank));
    chain.dedup_by_key(|t| t.rank);
    chain
  }

  /// The full scientific name, e.g. `Megaptera novaeangliae`. Taxa at or above
  /// genus are just their own name.
  pub fn scientific_name(&self, ancestors: &[Taxon]) -> String {
    if !self.rank.is_binomial() {
      return self.name.clone();
    }
    let mut parts: Vec<&str> = self
      .binomial_chain(ancestors)
      .into_iter()
      .map(|t| t.name.as_str())
      .collect();
    parts.push(&self.name);
    parts.join(" ")
  }

  /// Short display form: `M. novaeangliae` for binomial taxa whose genus is
  /// known, otherwise the name followed by the rank (`Balaenopteridae
  /// family`).
  pub fn display_name(&self, ancestors: &[Taxon]) -> String {
    if self.rank.is_binomial() {
      let chain = self.binomial_chain(ancestors);
      if let Some((genus, rest)) = chain.split_first()
        && genus.rank == Rank::Genus
        && let Some(initial) = genus.name.chars().next()
      {
        let mut nomens: Vec<&str> = rest.iter().map(|t| t.name.as_str()).collect();
        nomens.push(&self.name);
        return format!("{initial}. {}", nomens.join(" "));
      }
    }
    format!("{} {}", self.name, self.rank)
  }
}

impl fmt::Display for Taxon {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.name, self.rank)
  }
}

/// Split a comma-delimited list of common names.
pub fn parse_common_names(raw: &str) -> Vec<String> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|n| !n.is_empty())
    .map(str::to_owned)
    .collect()
}
