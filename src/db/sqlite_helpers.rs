//! SQLite helper utilities for type conversion
//!
//! SQLite only has five storage classes. This module maps them to and from
//! [`Value`] so the rest of the crate never touches sqlx rows directly.

use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::value::Value;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind one value to a sqlx query.
pub fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::String(s) => query.bind(s.as_str()),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Bool(b) => query.bind(if *b { 1i32 } else { 0i32 }),
        Value::Bytes(b) => query.bind(b.as_slice()),
        Value::Null => query.bind(None::<String>),
    }
}

/// Build a query with every argument bound in order.
pub(crate) fn bind_all<'q>(sql: &'q str, args: &'q [Value]) -> SqliteQuery<'q> {
    args.iter()
        .fold(sqlx::query(sql), |query, value| bind_value(query, value))
}

/// Column names of a row, in select order.
pub(crate) fn column_names(row: &SqliteRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Decode every column of a row.
///
/// Dispatches on the reported type name; declared types such as `DATETIME`
/// fall through to text.
pub fn decode_row(row: &SqliteRow) -> Result<Vec<Value>, sqlx::Error> {
    let mut values = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        let type_name = {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                values.push(Value::Null);
                continue;
            }
            raw.type_info().name().to_ascii_uppercase()
        };
        let value = match type_name.as_str() {
            "NULL" => Value::Null,
            "BOOLEAN" => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
            name if name.contains("INT") => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                Value::Float(row.try_get_unchecked::<f64, _>(i)?)
            }
            "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
            _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
        };
        values.push(value);
    }
    Ok(values)
}
