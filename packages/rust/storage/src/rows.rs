//! Column readers shared by the row converters.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use libsql::Row;
use papermill_shared::{PapermillError, Result};
use serde::de::DeserializeOwned;

pub(crate) fn text(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(PapermillError::storage)
}

/// NULL columns come back as `None`.
pub(crate) fn opt_text(row: &Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

pub(crate) fn int(row: &Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx).map_err(PapermillError::storage)
}

pub(crate) fn flag(row: &Row, idx: i32) -> Result<bool> {
    Ok(int(row, idx)? != 0)
}

pub(crate) fn timestamp(row: &Row, idx: i32) -> Result<DateTime<Utc>> {
    parse_timestamp(&text(row, idx)?)
}

pub(crate) fn opt_timestamp(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    opt_text(row, idx).as_deref().map(parse_timestamp).transpose()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PapermillError::Storage(format!("invalid date '{s}': {e}")))
}

/// Column holding one of the string-backed enums.
pub(crate) fn parsed<T>(row: &Row, idx: i32) -> Result<T>
where
    T: FromStr<Err = PapermillError>,
{
    text(row, idx)?.parse()
}

pub(crate) fn opt_parsed<T>(row: &Row, idx: i32) -> Result<Option<T>>
where
    T: FromStr<Err = PapermillError>,
{
    opt_text(row, idx).map(|s| s.parse()).transpose()
}

pub(crate) fn json<T: DeserializeOwned>(row: &Row, idx: i32) -> Result<T> {
    let raw = text(row, idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| PapermillError::Storage(format!("invalid JSON column {idx}: {e}")))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(PapermillError::storage)
}
