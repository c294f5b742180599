//! Backend-agnostic result rows.
//!
//! Every driver hands back its rows as [`Cell`]s through the [`RawRow`]
//! trait; [`normalize`] turns a cursor of those into a [`ResultSet`] whose
//! cells are [`SqlValue`]s. Byte sequences are coerced to text here, once,
//! for every backend.

use futures::{Stream, TryStreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// A scalar as decoded by a driver, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// A normalized result cell.
///
/// Serializes as the bare JSON scalar (`null`, `true`, `1`, `1.5`, `"x"`).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Cell> for SqlValue {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Null => SqlValue::Null,
            Cell::Bool(v) => SqlValue::Bool(v),
            Cell::Int(v) => SqlValue::Int(v),
            Cell::Float(v) => SqlValue::Float(v),
            Cell::Text(v) => SqlValue::Text(v),
            Cell::Bytes(v) => SqlValue::Text(match String::from_utf8(v) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            }),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// One result row: column name to value, in the cursor's column order.
///
/// Column names are unique within a row; inserting an existing name replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            columns: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: SqlValue) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v.into());
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Ordered rows produced by a read statement.
pub type ResultSet = Vec<Row>;

/// A driver row that can be read as named cells.
pub trait RawRow {
    /// Column names in declared order.
    fn column_names(&self) -> Vec<String>;

    /// One cell per column, in the same order as [`RawRow::column_names`].
    fn cells(&self) -> Vec<Cell>;
}

/// Pair a row's cells with the cursor's column names.
pub fn normalize_row(names: &[String], cells: Vec<Cell>) -> Row {
    let mut row = Row::with_capacity(names.len());
    for (name, cell) in names.iter().zip(cells) {
        row.insert(name.clone(), cell.into());
    }
    row
}

/// Drain a row cursor into a [`ResultSet`].
///
/// The cursor is consumed to the end or to its first error. On error the rows
/// collected so far are discarded and the stream is dropped, which releases
/// the connection it holds.
pub async fn normalize<S, R, E>(mut rows: S) -> Result<ResultSet, E>
where
    S: Stream<Item = Result<R, E>> + Unpin,
    R: RawRow,
{
    let mut names: Option<Vec<String>> = None;
    let mut out = ResultSet::new();

    while let Some(row) = rows.try_next().await? {
        let names = names.get_or_insert_with(|| row.column_names());
        out.push(normalize_row(names, row.cells()));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pretty_assertions::assert_eq;

    struct FakeRow(Vec<(&'static str, Cell)>);

    impl RawRow for FakeRow {
        fn column_names(&self) -> Vec<String> {
            self.0.iter().map(|(n, _)| n.to_string()).collect()
        }

        fn cells(&self) -> Vec<Cell> {
            self.0.iter().map(|(_, c)| c.clone()).collect()
        }
    }

    #[test]
    fn test_bytes_become_text() {
        assert_eq!(
            SqlValue::from(Cell::Bytes(b"hello".to_vec())),
            SqlValue::Text("hello".into())
        );
        assert_eq!(
            SqlValue::from(Cell::Bytes(vec![b'a', 0xff])),
            SqlValue::Text("a\u{fffd}".into())
        );
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let row: Row = [
            ("z", SqlValue::Int(1)),
            ("a", SqlValue::Null),
            ("m", SqlValue::Text("x".into())),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"z":1,"a":null,"m":"x"}"#
        );
    }

    #[test]
    fn test_duplicate_column_replaces_value() {
        let mut row = Row::new();
        row.insert("id", SqlValue::Int(1));
        row.insert("name", SqlValue::from("a"));
        row.insert("id", SqlValue::Int(2));

        assert_eq!(row.len(), 2);
        assert_eq!(row.get("id"), Some(&SqlValue::Int(2)));
        assert_eq!(row.column_names().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn test_null_is_present_not_absent() {
        let row = normalize_row(&["a".to_string()], vec![Cell::Null]);
        assert_eq!(row.get("a"), Some(&SqlValue::Null));
        assert_eq!(row.get("b"), None);
    }

    #[tokio::test]
    async fn test_normalize_stream() {
        let rows = stream::iter(vec![
            Ok::<_, String>(FakeRow(vec![
                ("id", Cell::Int(1)),
                ("ok", Cell::Bool(true)),
                ("blob", Cell::Bytes(b"ab".to_vec())),
            ])),
            Ok(FakeRow(vec![
                ("id", Cell::Int(2)),
                ("ok", Cell::Null),
                ("blob", Cell::Float(0.5)),
            ])),
        ]);

        let result = normalize(rows).await.unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!([
                {"id": 1, "ok": true, "blob": "ab"},
                {"id": 2, "ok": null, "blob": 0.5},
            ])
        );
    }

    #[tokio::test]
    async fn test_normalize_discards_partial_rows_on_error() {
        let rows = stream::iter(vec![
            Ok(FakeRow(vec![("id", Cell::Int(1))])),
            Err("connection reset".to_string()),
            Ok(FakeRow(vec![("id", Cell::Int(3))])),
        ]);

        assert_eq!(normalize(rows).await, Err("connection reset".to_string()));
    }

    #[tokio::test]
    async fn test_normalize_empty_cursor() {
        let rows = stream::iter(Vec::<Result<FakeRow, String>>::new());
        assert_eq!(normalize(rows).await, Ok(ResultSet::new()));
    }
}
