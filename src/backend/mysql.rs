//! MySQL over sqlx.

use std::str::FromStr;

use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue};
use sqlx::{Column, Connection, Decode, Executor, Row, Type, TypeInfo, ValueRef};

use crate::config::PoolSettings;
use crate::value::{Cell, RawRow, ResultSet, normalize};

pub(super) async fn open(descriptor: &str, settings: &PoolSettings) -> Result<MySqlPool, sqlx::Error> {
    let options = MySqlConnectOptions::from_str(descriptor)?;
    super::pool_options::<MySql>(settings)
        .connect_with(options)
        .await
}

pub(super) async fn ping(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

/// Runs as a plain `COM_QUERY`, so values arrive in the text protocol.
pub(super) async fn fetch(pool: &MySqlPool, sql: &str) -> Result<ResultSet, sqlx::Error> {
    normalize(pool.fetch(sql)).await
}

impl RawRow for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        super::sqlx_column_names(self)
    }

    fn cells(&self) -> Vec<Cell> {
        (0..self.len()).map(|idx| decode(self, idx)).collect()
    }
}

fn get<'r, T>(row: &'r MySqlRow, idx: usize) -> Option<T>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get(idx).ok()
}

fn text<'r, T>(row: &'r MySqlRow, idx: usize) -> Option<Cell>
where
    T: Decode<'r, MySql> + Type<MySql> + ToString,
{
    get::<T>(row, idx).map(|v| Cell::Text(v.to_string()))
}

fn decode(row: &MySqlRow, idx: usize) -> Cell {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Cell::Null,
        Err(_) => return Cell::Null,
        _ => {}
    }

    let cell = match row.column(idx).type_info().name() {
        // TINYINT(1)
        "BOOLEAN" => get::<bool>(row, idx).map(Cell::Bool),

        "TINYINT" => get::<i8>(row, idx).map(|v| Cell::Int(v.into())),
        "TINYINT UNSIGNED" => get::<u8>(row, idx).map(|v| Cell::Int(v.into())),
        "SMALLINT" => get::<i16>(row, idx).map(|v| Cell::Int(v.into())),
        "SMALLINT UNSIGNED" => get::<u16>(row, idx).map(|v| Cell::Int(v.into())),
        "MEDIUMINT" | "INT" => get::<i32>(row, idx).map(|v| Cell::Int(v.into())),
        "MEDIUMINT UNSIGNED" | "INT UNSIGNED" => get::<u32>(row, idx).map(|v| Cell::Int(v.into())),
        "BIGINT" => get::<i64>(row, idx).map(Cell::Int),
        "BIGINT UNSIGNED" => get::<u64>(row, idx).map(|v| match i64::try_from(v) {
            Ok(v) => Cell::Int(v),
            Err(_) => Cell::Text(v.to_string()),
        }),
        "YEAR" => row
            .try_get_unchecked::<u16, _>(idx)
            .ok()
            .map(|v| Cell::Int(v.into())),

        "FLOAT" => get::<f32>(row, idx).map(|v| Cell::Float(v.into())),
        "DOUBLE" => get::<f64>(row, idx).map(Cell::Float),
        "DECIMAL" => text::<Decimal>(row, idx),

        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            get::<String>(row, idx).map(Cell::Text)
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT" => {
            get::<Vec<u8>>(row, idx).map(Cell::Bytes)
        }

        "DATE" => text::<NaiveDate>(row, idx),
        "TIME" => text::<NaiveTime>(row, idx),
        "DATETIME" => text::<NaiveDateTime>(row, idx),
        "TIMESTAMP" => get::<DateTime<Utc>>(row, idx)
            .map(|v| Cell::Text(v.to_rfc3339()))
            .or_else(|| text::<NaiveDateTime>(row, idx)),

        "JSON" => text::<JsonValue>(row, idx),

        _ => None,
    };

    // Text protocol bytes for anything else (GEOMETRY, NULL-typed expressions).
    cell.or_else(|| row.try_get_unchecked::<Vec<u8>, _>(idx).ok().map(Cell::Bytes))
        .unwrap_or(Cell::Null)
}
