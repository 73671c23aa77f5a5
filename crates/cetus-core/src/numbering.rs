//! Yearly case numbers.
//!
//! Every case dated in a year gets a number unique within that year, written
//! `2003#67`. Once `(year, number)` has been issued to a case it is never
//! issued to another one, even if the case is re-dated into another year or
//! merged away. The ledger of issued numbers is therefore append-only: a case
//! re-dated from 2003 to 2004 gets a fresh 2004 number, and moving it back to
//! 2003 hands it its old 2003 number again.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{datetime::UncertainDateTime, ids::CaseId};

/// One ledger row: `case_id` holds (or held) `number` in `year`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct YearCaseNumber {
  pub year:    i32,
  pub number:  u32,
  pub case_id: CaseId,
}

impl YearCaseNumber {
  /// The identifier used in case names, e.g. `2003#67`.
  pub fn identifier(&self) -> String { format!("{}#{}", self.year, self.number) }
}

impl fmt::Display for YearCaseNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:04} #{:03}", self.year, self.number)
  }
}

/// Storage for issued numbers. Implementations backed by a database must run
/// [`settle_numbering`] inside a transaction that serialises against other
/// numbering in the same year, or two cases could be minted the same number.
pub trait CaseNumberLedger {
  type Error;

  /// The lowest number `case` holds in `year`, if any. A case that absorbed
  /// others through merges may hold several.
  fn lowest_for_case(
    &self,
    case: CaseId,
    year: i32,
  ) -> Result<Option<YearCaseNumber>, Self::Error>;

  /// The highest number issued in `year` to any case.
  fn highest_in_year(&self, year: i32) -> Result<Option<u32>, Self::Error>;

  fn append(&mut self, entry: YearCaseNumber) -> Result<(), Self::Error>;
}

/// What [`settle_numbering`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
  /// The case has no date, so no current number.
  Unnumbered,
  /// The current number already matches the case's year.
  Kept(YearCaseNumber),
  /// A number the case held before in this year was reinstated.
  Reused(YearCaseNumber),
  /// A new number was issued and appended to the ledger.
  Minted(YearCaseNumber),
}

impl Settlement {
  pub fn current(&self) -> Option<YearCaseNumber> {
    match *self {
      Self::Unnumbered => None,
      Self::Kept(n) | Self::Reused(n) | Self::Minted(n) => Some(n),
    }
  }
}

/// Decide a case's current number from its (freshly recomputed) date.
///
/// * no date: no current number; past numbers stay in the ledger.
/// * current number in the date's year: unchanged.
/// * otherwise the lowest number the case already holds in that year, or a new
///   one: one more than the highest issued that year (1 for a fresh year).
pub fn settle_numbering<L>(
  ledger: &mut L,
  case: CaseId,
  current: Option<YearCaseNumber>,
  date: Option<&UncertainDateTime>,
) -> Result<Settlement, L::Error>
where
  L: CaseNumberLedger + ?Sized,
{
  let Some(date) = date else {
    return Ok(Settlement::Unnumbered);
  };
  let year = date.get_year();

  if let Some(current) = current.filter(|n| n.year == year) {
    return Ok(Settlement::Kept(current));
  }

  if let Some(existing) = ledger.lowest_for_case(case, year)? {
    return Ok(Settlement::Reused(existing));
  }

  let number = ledger.highest_in_year(year)?.map_or(1, |n| n + 1);
  let entry = YearCaseNumber { year, number, case_id: case };
  ledger.append(entry)?;
  Ok(Settlement::Minted(entry))
}

/// A ledger held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
  entries: Vec<YearCaseNumber>,
}

impl MemoryLedger {
  pub fn new() -> Self { Self::default() }

  pub fn entries(&self) -> &[YearCaseNumber] { &self.entries }

  pub fn for_case(&self, case: CaseId) -> impl Iterator<Item = &YearCaseNumber> {
    self.entries.iter().filter(move |e| e.case_id == case)
  }
}

impl CaseNumberLedger for MemoryLedger {
  type Error = std::convert::Infallible;

  fn lowest_for_case(
    &self,
    case: CaseId,
    year: i32,
  ) -> Result<Option<YearCaseNumber>, Self::Error> {
    Ok(
      self
        .for_case(case)
        .filter(|e| e.year == year)
        .min_by_key(|e| e.number)
        .copied(),
    )
  }

  fn highest_in_year(&self, year: i32) -> Result<Option<u32>, Self::Error> {
    Ok(
      self
        .entries
        .iter()
        .filter(|e| e.year == year)
        .map(|e| e.number)
        .max(),
    )
  }

  fn append(&mut self, entry: YearCaseNumber) -> Result<(), Self::Error> {
    self.entries.push(entry);
    Ok(())
  }
}
