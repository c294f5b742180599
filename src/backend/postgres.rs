//! PostgreSQL over sqlx.

use std::str::FromStr;

use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgConnectOptions, PgPool, PgRow, Postgres};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column, Connection, Decode, Executor, Row, Type, TypeInfo, ValueRef};

use crate::config::PoolSettings;
use crate::value::{Cell, RawRow, ResultSet, normalize};

pub(super) async fn open(descriptor: &str, settings: &PoolSettings) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(descriptor)?;
    super::pool_options::<Postgres>(settings)
        .connect_with(options)
        .await
}

pub(super) async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

/// Runs over the simple query protocol, so every value arrives in its text
/// form. Types without a decoder below still read as Postgres prints them.
pub(super) async fn fetch(pool: &PgPool, sql: &str) -> Result<ResultSet, sqlx::Error> {
    normalize(pool.fetch(sql)).await
}

impl RawRow for PgRow {
    fn column_names(&self) -> Vec<String> {
        super::sqlx_column_names(self)
    }

    fn cells(&self) -> Vec<Cell> {
        (0..self.len()).map(|idx| decode(self, idx)).collect()
    }
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(idx).ok()
}

fn text<'r, T>(row: &'r PgRow, idx: usize) -> Option<Cell>
where
    T: Decode<'r, Postgres> + Type<Postgres> + ToString,
{
    get::<T>(row, idx).map(|v| Cell::Text(v.to_string()))
}

fn decode(row: &PgRow, idx: usize) -> Cell {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Cell::Null,
        Err(_) => return Cell::Null,
        _ => {}
    }

    let cell = match row.column(idx).type_info().name() {
        "BOOL" => get::<bool>(row, idx).map(Cell::Bool),

        "INT2" => get::<i16>(row, idx).map(|v| Cell::Int(v.into())),
        "INT4" => get::<i32>(row, idx).map(|v| Cell::Int(v.into())),
        "INT8" => get::<i64>(row, idx).map(Cell::Int),
        "OID" => get::<Oid>(row, idx).map(|v| Cell::Int(v.0.into())),

        "FLOAT4" => get::<f32>(row, idx).map(|v| Cell::Float(v.into())),
        "FLOAT8" => get::<f64>(row, idx).map(Cell::Float),
        "NUMERIC" => text::<Decimal>(row, idx),

        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            get::<String>(row, idx).map(Cell::Text)
        }
        "BYTEA" => get::<Vec<u8>>(row, idx).map(Cell::Bytes),

        "DATE" => text::<NaiveDate>(row, idx),
        "TIME" => text::<NaiveTime>(row, idx),
        "TIMESTAMP" => text::<NaiveDateTime>(row, idx),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx).map(|v| Cell::Text(v.to_rfc3339())),

        "UUID" => text::<Uuid>(row, idx),
        "JSON" | "JSONB" => text::<JsonValue>(row, idx),

        _ => None,
    };

    // Anything we have no typed decoder for goes out as its text form.
    cell.or_else(|| row.try_get_unchecked::<String, _>(idx).ok().map(Cell::Text))
        .unwrap_or(Cell::Null)
}
