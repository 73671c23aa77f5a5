//! The `year_case_numbers` table as a [`CaseNumberLedger`].
//!
//! A case owns its own ledger rows and, through `case_merges`, those of every
//! case merged into it (transitively): its lineage.

use cetus_core::{
  ids::CaseId,
  numbering::{CaseNumberLedger, YearCaseNumber},
};
use rusqlite::{Connection, OptionalExtension as _, params};

/// Recursive CTE binding `lineage(case_id)` to `?1` and everything merged
/// into it.
pub const LINEAGE_CTE: &str = "WITH RECURSIVE lineage(case_id) AS (
     SELECT ?1
     UNION
     SELECT m.source_id FROM case_merges m JOIN lineage l ON m.destination_id = l.case_id
   )";

pub struct SqlLedger<'c> {
  conn: &'c Connection,
}

impl<'c> SqlLedger<'c> {
  pub fn new(conn: &'c Connection) -> Self { Self { conn } }

  /// Every entry issued to `case`'s lineage, in issue order.
  pub fn lineage_entries(&self, case: CaseId) -> rusqlite::Result<Vec<YearCaseNumber>> {
    let mut stmt = self.conn.prepare(&format!(
      "{LINEAGE_CTE}
       SELECT y.year, y.number, y.case_id FROM year_case_numbers y
       JOIN lineage l ON l.case_id = y.case_id
       ORDER BY y.entry_id"
    ))?;
    let entries = stmt
      .query_map(params![case.get()], |row| {
        Ok(YearCaseNumber {
          year:    row.get(0)?,
          number:  row.get(1)?,
          case_id: CaseId(row.get(2)?),
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
  }
}

impl CaseNumberLedger for SqlLedger<'_> {
  type Error = rusqlite::Error;

  fn lowest_for_case(
    &self,
    case: CaseId,
    year: i32,
  ) -> rusqlite::Result<Option<YearCaseNumber>> {
    self
      .conn
      .query_row(
        &format!(
          "{LINEAGE_CTE}
           SELECT y.year, y.number, y.case_id FROM year_case_numbers y
           JOIN lineage l ON l.case_id = y.case_id
           WHERE y.year = ?2
           ORDER BY y.number
           LIMIT 1"
        ),
        params![case.get(), year],
        |row| {
          Ok(YearCaseNumber {
            year:    row.get(0)?,
            number:  row.get(1)?,
            case_id: CaseId(row.get(2)?),
          })
        },
      )
      .optional()
  }

  fn highest_in_year(&self, year: i32) -> rusqlite::Result<Option<u32>> {
    self.conn.query_row(
      "SELECT MAX(number) FROM year_case_numbers WHERE year = ?1",
      params![year],
      |row| row.get(0),
    )
  }

  fn append(&mut self, entry: YearCaseNumber) -> rusqlite::Result<()> {
    self.conn.execute(
      "INSERT INTO year_case_numbers (year, number, case_id) VALUES (?1, ?2, ?3)",
      params![entry.year, entry.number, entry.case_id.get()],
    )?;
    Ok(())
  }
}
