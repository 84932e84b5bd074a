//! Dataset model - the rectangular table the editor versions.
//!
//! A [`Dataset`] is an ordered list of [`Row`]s. Every row carries the same column names in
//! the same order as the first row. Column order matters for rendering and export but not
//! for equality.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{DatasetError, DatasetResult};

// =============================================================================
// Cell
// =============================================================================

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// Missing value.
    #[default]
    Null,
    /// Numeric value.
    Number(f64),
    /// Text value, kept verbatim.
    Text(String),
}

impl Cell {
    /// Build a text cell.
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// True for `Null` and for text that is empty.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.is_empty(),
            Cell::Number(_) => false,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Number(n) => f.write_str(&format_number(*n)),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value as f64)
    }
}

/// Canonical text form of a number: integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// =============================================================================
// Row
// =============================================================================

/// One table row: column name to cell, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Row {
    cells: Vec<(String, Cell)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cell. New columns are appended.
    pub fn insert(&mut self, column: impl Into<String>, cell: Cell) {
        let column = column.into();
        match self.cells.iter_mut().find(|(k, _)| *k == column) {
            Some((_, slot)) => *slot = cell,
            None => self.cells.push((column, cell)),
        }
    }

    /// Insert a new column at the front of the row.
    pub fn insert_first(&mut self, column: impl Into<String>, cell: Cell) {
        self.cells.insert(0, (column.into(), cell));
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.iter().find(|(k, _)| k == column).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, column: &str) -> Option<&mut Cell> {
        self.cells
            .iter_mut()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, column: &str) -> Option<Cell> {
        let pos = self.cells.iter().position(|(k, _)| k == column)?;
        Some(self.cells.remove(pos).1)
    }

    /// Column names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Rows compare as mappings: same keys with equal cells, in any order.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.cells.len() == other.cells.len()
            && self
                .cells
                .iter()
                .all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

impl<K: Into<String>> FromIterator<(K, Cell)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Cell)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct RowVisitor;

impl<'de> Visitor<'de> for RowVisitor {
    type Value = Row;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping column names to string, number or null")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
        let mut row = Row::new();
        while let Some((key, value)) = access.next_entry::<String, Cell>()? {
            row.insert(key, value);
        }
        Ok(row)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RowVisitor)
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// Where a new row or column goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    Start,
    #[default]
    End,
}

/// A rectangular table of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    /// An empty dataset (zero rows).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset, checking the rectangular invariant.
    pub fn from_rows(rows: Vec<Row>) -> DatasetResult<Self> {
        Self::check_rows(&rows)?;
        Ok(Self { rows })
    }

    /// Build a dataset from a header and positional records. Short records are padded with
    /// empty text, long ones truncated.
    pub fn from_records(columns: &[String], records: Vec<Vec<Cell>>) -> DatasetResult<Self> {
        let rows = records
            .into_iter()
            .map(|mut record| {
                record.resize(columns.len(), Cell::text(""));
                columns.iter().cloned().zip(record).collect::<Row>()
            })
            .collect();
        Self::from_rows(rows)
    }

    /// Check that every row has the first row's columns in the same order.
    pub fn check_rows(rows: &[Row]) -> DatasetResult<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let expected: Vec<&str> = first.keys().collect();

        for (i, row) in rows.iter().enumerate() {
            if row.keys().any(str::is_empty) {
                return Err(DatasetError::EmptyColumnName { row: i });
            }
            if !row.keys().eq(expected.iter().copied()) {
                return Err(DatasetError::Ragged {
                    row: i,
                    expected: expected.iter().map(|s| s.to_string()).collect(),
                    found: row.keys().map(str::to_string).collect(),
                });
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in display order (empty when there are no rows).
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|r| r.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.rows.first().is_some_and(|r| r.get(column).is_some())
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Set one cell. Returns whether the value changed.
    pub fn set_cell(&mut self, row: usize, column: &str, value: Cell) -> DatasetResult<bool> {
        let len = self.rows.len();
        let target = self
            .rows
            .get_mut(row)
            .ok_or(DatasetError::RowOutOfRange { index: row, len })?;
        let slot = target
            .get_mut(column)
            .ok_or_else(|| DatasetError::UnknownColumn(column.to_string()))?;

        if *slot == value {
            return Ok(false);
        }
        *slot = value;
        Ok(true)
    }

    /// Insert a row of empty text cells. Returns the new row's index.
    pub fn insert_row(&mut self, position: Position) -> DatasetResult<usize> {
        let columns = self.columns();
        if columns.is_empty() {
            return Err(DatasetError::Empty);
        }
        let row: Row = columns.into_iter().map(|c| (c, Cell::text(""))).collect();

        match position {
            Position::Start => {
                self.rows.insert(0, row);
                Ok(0)
            }
            Position::End => {
                self.rows.push(row);
                Ok(self.rows.len() - 1)
            }
        }
    }

    pub fn remove_row(&mut self, index: usize) -> DatasetResult<Row> {
        if index >= self.rows.len() {
            return Err(DatasetError::RowOutOfRange {
                index,
                len: self.rows.len(),
            });
        }
        Ok(self.rows.remove(index))
    }

    /// Add a column of empty text cells.
    pub fn add_column(&mut self, name: &str, position: Position) -> DatasetResult<()> {
        if self.rows.is_empty() {
            return Err(DatasetError::Empty);
        }
        if name.is_empty() {
            return Err(DatasetError::EmptyColumnName { row: 0 });
        }
        if self.has_column(name) {
            return Err(DatasetError::DuplicateColumn(name.to_string()));
        }

        for row in &mut self.rows {
            match position {
                Position::Start => row.insert_first(name, Cell::text("")),
                Position::End => row.insert(name, Cell::text("")),
            }
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> DatasetResult<()> {
        if !self.has_column(name) {
            return Err(DatasetError::UnknownColumn(name.to_string()));
        }
        for row in &mut self.rows {
            row.remove(name);
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Row>::deserialize(deserializer)?;
        Dataset::from_rows(rows).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Dataset {
        Dataset::from_rows(vec![
            Row::from_iter([("name", Cell::from("Bob")), ("age", Cell::from("30"))]),
            Row::from_iter([("name", Cell::from("Amy")), ("age", Cell::from(""))]),
        ])
        .unwrap()
    }

    #[test]
    fn test_columns_keep_order() {
        assert_eq!(people().columns(), vec!["name", "age"]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![
            Row::from_iter([("a", Cell::from("1")), ("b", Cell::from("2"))]),
            Row::from_iter([("b", Cell::from("2")), ("a", Cell::from("1"))]),
        ];
        let err = Dataset::from_rows(rows).unwrap_err();
        assert!(matches!(err, DatasetError::Ragged { row: 1, .. }));
    }

    #[test]
    fn test_empty_key_rejected() {
        let rows = vec![Row::from_iter([("", Cell::from("1"))])];
        assert_eq!(
            Dataset::from_rows(rows).unwrap_err(),
            DatasetError::EmptyColumnName { row: 0 }
        );
    }

    #[test]
    fn test_row_equality_ignores_order() {
        let a = Row::from_iter([("x", Cell::from(1.0)), ("y", Cell::Null)]);
        let b = Row::from_iter([("y", Cell::Null), ("x", Cell::from(1.0))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_json_roundtrip_preserves_order() {
        let json = r#"[{"zeta":"1","alpha":2,"mid":null}]"#;
        let data: Dataset = serde_json::from_str(json).unwrap();
        assert_eq!(data.columns(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(data.cell(0, "alpha"), Some(&Cell::Number(2.0)));
        assert_eq!(serde_json::to_string(&data).unwrap(), r#"[{"zeta":"1","alpha":2.0,"mid":null}]"#);
    }

    #[test]
    fn test_ragged_json_rejected() {
        let json = r#"[{"a":"1"},{"b":"2"}]"#;
        assert!(serde_json::from_str::<Dataset>(json).is_err());
    }

    #[test]
    fn test_set_cell_reports_change() {
        let mut data = people();
        assert!(!data.set_cell(0, "name", Cell::from("Bob")).unwrap());
        assert!(data.set_cell(0, "name", Cell::from("Rob")).unwrap());
        assert_eq!(data.cell(0, "name"), Some(&Cell::from("Rob")));
        assert!(matches!(
            data.set_cell(5, "name", Cell::Null),
            Err(DatasetError::RowOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn test_structural_edits() {
        let mut data = people();
        assert_eq!(data.insert_row(Position::Start).unwrap(), 0);
        assert_eq!(data.cell(0, "name"), Some(&Cell::from("")));

        data.add_column("id", Position::Start).unwrap();
        assert_eq!(data.columns(), vec!["id", "name", "age"]);
        assert!(Dataset::check_rows(data.rows()).is_ok());

        assert!(matches!(
            data.add_column("id", Position::End),
            Err(DatasetError::DuplicateColumn(_))
        ));

        data.remove_column("age").unwrap();
        assert_eq!(data.columns(), vec!["id", "name"]);

        let removed = data.remove_row(1).unwrap();
        assert_eq!(removed.get("name"), Some(&Cell::from("Bob")));
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_from_records_pads_short_rows() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let data = Dataset::from_records(&columns, vec![vec![Cell::from("1")]]).unwrap();
        assert_eq!(data.cell(0, "b"), Some(&Cell::from("")));
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Cell::Number(30.0).to_string(), "30");
        assert_eq!(Cell::Number(2.5).to_string(), "2.5");
        assert_eq!(Cell::Number(-4.0).to_string(), "-4");
        assert_eq!(Cell::Null.to_string(), "");
    }
}
