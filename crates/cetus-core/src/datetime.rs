//! Uncertain datetimes: points in time where any field below the year may be
//! unknown.
//!
//! An unknown field means "any value in range is possible", never zero. A
//! value therefore denotes a range of instants, bounded by
//! [`UncertainDateTime::earliest`] and the exclusive
//! [`UncertainDateTime::latest`].
//!
//! The persisted form is the fixed-width [sort key](UncertainDateTime::sortkey):
//! twenty characters, zero-padded digits for known fields and a filler
//! character for unknown ones, so plain string comparison orders values.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::ValidationError;

pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

/// Length of a sort key: `YYYYMMDDHHMMSSuuuuuu`.
pub const SORTKEY_LEN: usize = 20;

/// Filler for unknown fields that sorts before any digit.
pub const SORTS_BEFORE_DIGITS: char = ' ';
/// Filler for unknown fields that sorts after any digit.
pub const SORTS_AFTER_DIGITS: char = 'z';

const WIDTHS: [usize; 7] = [4, 2, 2, 2, 2, 2, 6];

/// Number of days in `month` of `year`, leap-year aware.
pub fn days_in_month(year: i32, month: u32) -> u32 {
  match month {
    2 if NaiveDate::from_ymd_opt(year, 2, 29).is_some() => 29,
    2 => 28,
    4 | 6 | 9 | 11 => 30,
    _ => 31,
  }
}

/// A datetime whose fields below the year may be unknown.
///
/// Fields are declared most-significant first, so the derived ordering compares
/// them lexicographically with an unknown field sorting before any known value.
/// That is exactly the order of `sortkey(false)`; the earliest-observation
/// selection for cases relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UncertainDateTime {
  year:        i32,
  month:       Option<u32>,
  day:         Option<u32>,
  hour:        Option<u32>,
  minute:      Option<u32>,
  second:      Option<u32>,
  microsecond: Option<u32>,
}

fn check_range(
  field: &'static str,
  value: i64,
  min: i64,
  max: i64,
) -> Result<(), ValidationError> {
  if value < min || value > max {
    return Err(ValidationError::OutOfRange { field, value, min, max });
  }
  Ok(())
}

fn check_optional(
  field: &'static str,
  value: Option<u32>,
  min: u32,
  max: u32,
) -> Result<(), ValidationError> {
  match value {
    Some(v) => check_range(field, v.into(), min.into(), max.into()),
    None => Ok(()),
  }
}

impl UncertainDateTime {
  /// Validate and build a value from its seven fields.
  pub fn new(
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
    microsecond: Option<u32>,
  ) -> Result<Self, ValidationError> {
    check_range("year", year.into(), MIN_YEAR.into(), MAX_YEAR.into())?;
    check_optional("month", month, 1, 12)?;
    match (month, day) {
      (Some(month), Some(day)) => {
        let max = days_in_month(year, month);
        if day < 1 || day > max {
          return Err(ValidationError::DayOutOfMonth { day, month, max });
        }
      }
      (None, day) => check_optional("day", day, 1, 31)?,
      (Some(_), None) => {}
    }
    check_optional("hour", hour, 0, 23)?;
    check_optional("minute", minute, 0, 59)?;
    // leap seconds aren't representable
    check_optional("second", second, 0, 59)?;
    check_optional("microsecond", microsecond, 0, 999_999)?;

    Ok(Self { year, month, day, hour, minute, second, microsecond })
  }

  /// The whole of `year`.
  pub fn year(year: i32) -> Result<Self, ValidationError> {
    Self::new(year, None, None, None, None, None, None)
  }

  /// Some time on the given calendar day.
  pub fn ymd(year: i32, month: u32, day: u32) -> Result<Self, ValidationError> {
    Self::new(year, Some(month), Some(day), None, None, None, None)
  }

  pub fn get_year(&self) -> i32 { self.year }

  pub fn month(&self) -> Option<u32> { self.month }

  pub fn day(&self) -> Option<u32> { self.day }

  pub fn hour(&self) -> Option<u32> { self.hour }

  pub fn minute(&self) -> Option<u32> { self.minute }

  pub fn second(&self) -> Option<u32> { self.second }

  pub fn microsecond(&self) -> Option<u32> { self.microsecond }

  fn fields(&self) -> [Option<u32>; 6] {
    [
      self.month,
      self.day,
      self.hour,
      self.minute,
      self.second,
      self.microsecond,
    ]
  }

  /// Fixed-width, lexicographically sortable encoding.
  ///
  /// Each unknown field is filled with a character that sorts before every
  /// digit, or after every digit with `unknown_is_later`. Against a value
  /// that knows the field, the first unknown field decides: `2004-03-?? 08h`
  /// sorts before every known day of March 2004, or after all of them with
  /// `unknown_is_later`.
  pub fn sortkey(&self, unknown_is_later: bool) -> String {
    let filler = if unknown_is_later {
      SORTS_AFTER_DIGITS
    } else {
      SORTS_BEFORE_DIGITS
    };

    let mut key = String::with_capacity(SORTKEY_LEN);
    key.push_str(&format!("{:04}", self.year));
    for (value, &width) in self.fields().into_iter().zip(&WIDTHS[1..]) {
      match value {
        Some(v) => key.push_str(&format!("{v:0width$}")),
        None => key.extend(std::iter::repeat_n(filler, width)),
      }
    }
    key
  }

  /// Parse the output of [`Self::sortkey`], with either filler.
  pub fn from_sortkey(key: &str) -> Result<Self, ValidationError> {
    let malformed = || ValidationError::MalformedSortKey(key.to_owned());
    if key.len() != SORTKEY_LEN || !key.is_ascii() {
      return Err(malformed());
    }

    let mut parts = [None; 7];
    let mut offset = 0;
    for (slot, width) in parts.iter_mut().zip(WIDTHS) {
      let chunk = &key[offset..offset + width];
      offset += width;
      *slot = parse_chunk(chunk).ok_or_else(malformed)?;
    }

    let year = parts[0].ok_or_else(malformed)?;
    let year = i32::try_from(year).map_err(|_| malformed())?;
    Self::new(
      year, parts[1], parts[2], parts[3], parts[4], parts[5], parts[6],
    )
  }

  /// The earliest instant this value could denote.
  pub fn earliest(&self) -> NaiveDateTime {
    self.concrete(
      self.month.unwrap_or(1),
      self.day.unwrap_or(1),
      self.hour.unwrap_or(0),
      self.minute.unwrap_or(0),
      self.second.unwrap_or(0),
      self.microsecond.unwrap_or(0),
    )
  }

  /// The end of the range this value could denote: every unknown field maxed
  /// out, plus one microsecond. Exclusive.
  pub fn latest(&self) -> NaiveDateTime {
    let month = self.month.unwrap_or(12);
    let last = self.concrete(
      month,
      self.day.unwrap_or_else(|| days_in_month(self.year, month)),
      self.hour.unwrap_or(23),
      self.minute.unwrap_or(59),
      self.second.unwrap_or(59),
      self.microsecond.unwrap_or(999_999),
    );
    last + Duration::microseconds(1)
  }

  /// Length of the range this value could denote.
  pub fn breadth(&self) -> Duration { self.latest() - self.earliest() }

  fn concrete(
    &self,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    microsecond: u32,
  ) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(self.year, month, day)
      .and_then(|d| d.and_hms_micro_opt(hour, minute, second, microsecond))
      .expect("fields were range-checked at construction")
  }

  /// Day-precision rendering: `2003`, `2003-05`, `2003-05-12`, or
  /// `2003-??-12` when only the day is known.
  pub fn format_date(&self) -> String {
    let mut out = format!("{:04}", self.year);
    match (self.month, self.day) {
      (Some(m), Some(d)) => out.push_str(&format!("-{m:02}-{d:02}")),
      (Some(m), None) => out.push_str(&format!("-{m:02}")),
      (None, Some(d)) => out.push_str(&format!("-??-{d:02}")),
      (None, None) => {}
    }
    out
  }
}

/// `Some(None)` for an all-filler chunk, `Some(Some(n))` for all digits.
fn parse_chunk(chunk: &str) -> Option<Option<u32>> {
  if chunk
    .chars()
    .all(|c| c == SORTS_BEFORE_DIGITS || c == SORTS_AFTER_DIGITS)
  {
    return Some(None);
  }
  if chunk.chars().all(|c| c.is_ascii_digit()) {
    return chunk.parse().ok().map(Some);
  }
  None
}

impl fmt::Display for UncertainDateTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.format_date())?;

    let time = [self.hour, self.minute, self.second];
    let Some(last_known) = time.iter().rposition(Option::is_some) else {
      return Ok(());
    };
    for (i, field) in time[..=last_known].iter().enumerate() {
      f.write_str(if i == 0 { " " } else { ":" })?;
      match field {
        Some(v) => write!(f, "{v:02}")?,
        None => f.write_str("??")?,
      }
    }
    if let (2, Some(us)) = (last_known, self.microsecond) {
      write!(f, ".{us:06}")?;
    }
    Ok(())
  }
}

impl Serialize for UncertainDateTime {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.sortkey(false))
  }
}

impl<'de> Deserialize<'de> for UncertainDateTime {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let key = String::deserialize(deserializer)?;
    Self::from_sortkey(&key).map_err(de::Error::custom)
  }
}
