//! Column decoding helpers shared by the query modules.

use std::str::FromStr;

use jiff::Timestamp;
use rusqlite::{types::Type, Row};

use crate::scope::Scope;

pub(crate) fn id_at(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)? as u64)
}

pub(crate) fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<Timestamp> {
    row.get::<_, String>(idx)?
        .parse::<Timestamp>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn optional_timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Timestamp>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            s.parse::<Timestamp>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

/// Decodes a text column through the type's `FromStr` implementation.
pub(crate) fn parsed_at<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub(crate) fn scope_at(row: &Row, idx: usize) -> rusqlite::Result<Scope> {
    let key: String = row.get(idx)?;
    key.parse::<Scope>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
