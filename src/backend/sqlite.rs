//! SQLite over sqlx.
//!
//! SQLite types values, not columns, so cells are decoded by the storage
//! class of the value actually stored. The declared column type only matters
//! for `BOOLEAN`.

use std::str::FromStr;

use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::{Column, Connection, Decode, Row, Type, TypeInfo, ValueRef};

use crate::config::PoolSettings;
use crate::value::{Cell, RawRow, ResultSet, normalize};

pub(super) async fn open(descriptor: &str, settings: &PoolSettings) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(descriptor)?;
    super::pool_options::<Sqlite>(settings)
        .connect_with(options)
        .await
}

pub(super) async fn ping(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    conn.ping().await
}

pub(super) async fn fetch(pool: &SqlitePool, sql: &str) -> Result<ResultSet, sqlx::Error> {
    normalize(sqlx::query(sql).fetch(pool)).await
}

impl RawRow for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        super::sqlx_column_names(self)
    }

    fn cells(&self) -> Vec<Cell> {
        (0..self.len()).map(|idx| decode(self, idx)).collect()
    }
}

fn get<'r, T>(row: &'r SqliteRow, idx: usize) -> Option<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(idx).ok()
}

fn decode(row: &SqliteRow, idx: usize) -> Cell {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Cell::Null,
        Err(_) => return Cell::Null,
        Ok(raw) => raw,
    };
    let stored = raw.type_info();
    let declared = row.column(idx).type_info().name().to_uppercase();

    let cell = match (declared.as_str(), stored.name()) {
        ("BOOLEAN" | "BOOL", "INTEGER") => get::<bool>(row, idx).map(Cell::Bool),
        (_, "INTEGER") => get::<i64>(row, idx).map(Cell::Int),
        (_, "REAL") => get::<f64>(row, idx).map(Cell::Float),
        (_, "TEXT") => get::<String>(row, idx).map(Cell::Text),
        (_, "BLOB") => get::<Vec<u8>>(row, idx).map(Cell::Bytes),
        _ => None,
    };

    cell.or_else(|| row.try_get_unchecked::<Vec<u8>, _>(idx).ok().map(Cell::Bytes))
        .unwrap_or(Cell::Null)
}
