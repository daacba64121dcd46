//! Long-to-wide pivot of a data table.
//!
//! # Algorithm
//!
//! ```text
//! Long input                                      Wide output
//! ┌─────────────────────────────────────┐        ┌───────────────────────────────┐
//! │ GEO    REF_DATE Indicator VALUE     │        │ GEO    REF_DATE Price Volume  │
//! │ Canada 2020     Price     10        │   →    │ Canada 2020     10    5       │
//! │ Canada 2020     Volume    5         │        └───────────────────────────────┘
//! └─────────────────────────────────────┘
//! ```
//!
//! 1. Group key columns = all columns minus control, pivot and value columns.
//! 2. Rows with equal group keys form one output row.
//! 3. Every distinct pivot value in the whole table becomes a column; the
//!    cell holds the maximum value of the rows sharing (key, pivot value),
//!    or nothing if there were none.
//!
//! More than one row for the same (key, pivot value) is resolved by taking
//! the maximum. This is lossy: revision rows are indistinguishable from
//! duplicates here. Each such pair is counted in [`WideTable::collisions`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;

use crate::error::{SchemaError, SchemaResult};
use crate::parser::LongTable;

/// Name of the numeric measurement column.
pub const VALUE_COLUMN: &str = "VALUE";

/// Control columns of the export format: flags and identifiers that are
/// neither part of an entity's identity nor pivoted.
pub const CONTROL_COLUMNS: [&str; 11] = [
    "VECTOR",
    "COORDINATE",
    "DECIMALS",
    "STATUS",
    "SYMBOL",
    "TERMINATED",
    "SCALAR_FACTOR",
    "SCALAR_ID",
    "DGUID",
    "UOM",
    "UOM_ID",
];

/// Declared shape of a long table: its value column and control columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotSchema {
    pub value_column: String,
    pub control_columns: Vec<String>,
}

impl Default for PivotSchema {
    fn default() -> Self {
        Self {
            value_column: VALUE_COLUMN.to_string(),
            control_columns: CONTROL_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl PivotSchema {
    pub fn is_control(&self, column: &str) -> bool {
        self.control_columns.iter().any(|c| c == column)
    }

    /// The same schema with only the control columns that `table` has.
    pub fn present_in(&self, table: &LongTable) -> Self {
        Self {
            value_column: self.value_column.clone(),
            control_columns: self
                .control_columns
                .iter()
                .filter(|c| table.has_column(c))
                .cloned()
                .collect(),
        }
    }
}

/// One output row: the group key plus one cell per pivot value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideRecord {
    pub key: Vec<String>,
    pub values: Vec<Option<f64>>,
}

/// The result of [`pivot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideTable {
    key_columns: Vec<String>,
    pivot_column: String,
    value_column: String,
    pivot_values: Vec<String>,
    rows: Vec<WideRecord>,
    collisions: usize,
}

impl WideTable {
    /// Group key columns, in input order.
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Distinct pivot values, in order of first appearance.
    pub fn pivot_values(&self) -> &[String] {
        &self.pivot_values
    }

    pub fn pivot_column(&self) -> &str {
        &self.pivot_column
    }

    /// All output column names: key columns then pivot values.
    pub fn columns(&self) -> Vec<&str> {
        self.key_columns
            .iter()
            .chain(&self.pivot_values)
            .map(String::as_str)
            .collect()
    }

    pub fn rows(&self) -> &[WideRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of (group key, pivot value) pairs fed by more than one row.
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Key cell of `row` in key column `column`.
    pub fn key(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.key_columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.key.get(idx).map(String::as_str)
    }

    /// Aggregated value of `row` for pivot value `pivot_value`.
    pub fn value(&self, row: usize, pivot_value: &str) -> Option<f64> {
        let idx = self.pivot_values.iter().position(|p| p == pivot_value)?;
        self.rows.get(row)?.values.get(idx).copied().flatten()
    }

    /// Index of the row whose key equals `key` (in key column order).
    pub fn find_row(&self, key: &[&str]) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.key.iter().map(String::as_str).eq(key.iter().copied()))
    }

    /// Rename a key column. Returns false if there is no such column.
    pub fn rename_key_column(&mut self, from: &str, to: &str) -> bool {
        match self.key_columns.iter_mut().find(|c| c.as_str() == from) {
            Some(column) => {
                *column = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Expand back to long format: one row per group key and observed
    /// pivot value, with columns `key columns.., pivot column, value column`.
    pub fn to_long(&self) -> LongTable {
        let mut columns = self.key_columns.clone();
        columns.push(self.pivot_column.clone());
        columns.push(self.value_column.clone());

        let mut rows = Vec::new();
        for record in &self.rows {
            for (pivot_value, value) in self.pivot_values.iter().zip(&record.values) {
                if let Some(value) = value {
                    let mut row = record.key.clone();
                    row.push(pivot_value.clone());
                    row.push(value.to_string());
                    rows.push(row);
                }
            }
        }

        LongTable { columns, rows }
    }

    /// Write as CSV; absent cells are empty.
    pub fn write_csv<W: Write>(&self, writer: W) -> SchemaResult<()> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(self.columns())?;
        for record in &self.rows {
            let cells = record
                .key
                .iter()
                .cloned()
                .chain(record.values.iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
            out.write_record(cells)?;
        }
        out.flush().map_err(|e| SchemaError::Csv(e.into()))?;
        Ok(())
    }
}

/// Accumulated cell while pivoting.
#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    value: Option<f64>,
    rows: usize,
}

fn max_value(current: Option<f64>, next: Option<f64>) -> Option<f64> {
    match (current, next) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Pivot `table` on `pivot_column`.
///
/// Fails with [`SchemaError::MissingColumns`] if the pivot column, the value
/// column or any declared control column is absent, and with
/// [`SchemaError::InvalidValue`] on a non-numeric, non-empty value. Empty
/// value cells count as rows but contribute no value.
pub fn pivot(table: &LongTable, pivot_column: &str, schema: &PivotSchema) -> SchemaResult<WideTable> {
    let required = [pivot_column, schema.value_column.as_str()]
        .into_iter()
        .chain(schema.control_columns.iter().map(String::as_str));
    let missing = table.missing_columns(required);
    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns(missing));
    }

    // Both present, checked above
    let pivot_idx = table.column_index(pivot_column).unwrap_or_default();
    let value_idx = table.column_index(&schema.value_column).unwrap_or_default();

    let key_idx: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(i, c)| *i != pivot_idx && *i != value_idx && !schema.is_control(c))
        .map(|(i, _)| i)
        .collect();

    let mut pivot_values: Vec<String> = Vec::new();
    let mut pivot_lookup: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(Vec<String>, Vec<Cell>)> = Vec::new();
    let mut group_lookup: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut collisions = 0;

    for (row_idx, row) in table.rows.iter().enumerate() {
        let cell_at = |i: usize| row.get(i).map(String::as_str).unwrap_or_default();

        let raw = cell_at(value_idx).trim();
        let value = if raw.is_empty() {
            None
        } else {
            Some(raw.parse::<f64>().map_err(|_| SchemaError::InvalidValue {
                line: row_idx + 2,
                column: schema.value_column.clone(),
                value: raw.to_string(),
            })?)
        };

        let pivot_value = cell_at(pivot_idx);
        let p = *pivot_lookup.entry(pivot_value).or_insert_with(|| {
            pivot_values.push(pivot_value.to_string());
            pivot_values.len() - 1
        });

        let key: Vec<&str> = key_idx.iter().map(|&i| cell_at(i)).collect();
        let g = match group_lookup.get(&key) {
            Some(&g) => g,
            None => {
                groups.push((key.iter().map(|k| k.to_string()).collect(), Vec::new()));
                group_lookup.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };

        let cells = &mut groups[g].1;
        if cells.len() <= p {
            cells.resize(p + 1, Cell::default());
        }
        let cell = &mut cells[p];
        cell.rows += 1;
        if cell.rows == 2 {
            collisions += 1;
        }
        cell.value = max_value(cell.value, value);
    }

    let width = pivot_values.len();
    let rows = groups
        .into_iter()
        .map(|(key, cells)| {
            let mut values: Vec<Option<f64>> = cells.iter().map(|c| c.value).collect();
            values.resize(width, None);
            WideRecord { key, values }
        })
        .collect();

    Ok(WideTable {
        key_columns: key_idx.iter().map(|&i| table.columns[i].clone()).collect(),
        pivot_column: pivot_column.to_string(),
        value_column: schema.value_column.clone(),
        pivot_values,
        rows,
        collisions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_without_controls() -> PivotSchema {
        PivotSchema {
            control_columns: Vec::new(),
            ..PivotSchema::default()
        }
    }

    fn prices() -> LongTable {
        LongTable::from_rows(
            ["REF_DATE", "GEO", "Indicator", "UOM", "VALUE"],
            vec![
                vec!["2020", "Canada", "Price", "Dollars", "10"],
                vec!["2020", "Canada", "Volume", "Tonnes", "5"],
                vec!["2020", "Ontario", "Price", "Dollars", "8"],
                vec!["2021", "Canada", "Price", "Dollars", "11.5"],
                vec!["2021", "Canada", "Volume", "Tonnes", "6"],
            ],
        )
    }

    fn uom_schema() -> PivotSchema {
        PivotSchema {
            control_columns: vec!["UOM".to_string()],
            ..PivotSchema::default()
        }
    }

    #[test]
    fn test_two_rows_become_one_wide_row() {
        let table = LongTable::from_rows(
            ["GEO", "REF_DATE", "Indicator", "VALUE"],
            vec![
                vec!["Canada", "2020", "Price", "10"],
                vec!["Canada", "2020", "Volume", "5"],
            ],
        );
        let wide = pivot(&table, "Indicator", &schema_without_controls()).unwrap();

        assert_eq!(wide.columns(), vec!["GEO", "REF_DATE", "Price", "Volume"]);
        assert_eq!(wide.len(), 1);
        assert_eq!(wide.key(0, "GEO"), Some("Canada"));
        assert_eq!(wide.value(0, "Price"), Some(10.0));
        assert_eq!(wide.value(0, "Volume"), Some(5.0));
        assert_eq!(wide.collisions(), 0);
    }

    #[test]
    fn test_control_columns_are_excluded() {
        let wide = pivot(&prices(), "Indicator", &uom_schema()).unwrap();

        assert_eq!(wide.key_columns(), ["REF_DATE", "GEO"]);
        assert_eq!(wide.pivot_values(), ["Price", "Volume"]);
        assert_eq!(wide.len(), 3);
    }

    #[test]
    fn test_missing_combination_is_absent() {
        let wide = pivot(&prices(), "Indicator", &uom_schema()).unwrap();
        let ontario = wide.find_row(&["2020", "Ontario"]).unwrap();

        assert_eq!(wide.value(ontario, "Price"), Some(8.0));
        assert_eq!(wide.value(ontario, "Volume"), None);
        assert_eq!(wide.rows()[ontario].values.len(), 2);
    }

    #[test]
    fn test_duplicates_take_max_and_are_counted() {
        let table = LongTable::from_rows(
            ["GEO", "Indicator", "VALUE"],
            vec![
                vec!["Canada", "Price", "10"],
                vec!["Canada", "Price", "7"],
                vec!["Canada", "Volume", "1"],
            ],
        );
        let wide = pivot(&table, "Indicator", &schema_without_controls()).unwrap();

        assert_eq!(wide.value(0, "Price"), Some(10.0));
        assert_eq!(wide.collisions(), 1);
    }

    #[test]
    fn test_collisions_count_pairs_not_rows() {
        let table = LongTable::from_rows(
            ["GEO", "Indicator", "VALUE"],
            vec![
                vec!["Canada", "Price", "1"],
                vec!["Canada", "Price", "3"],
                vec!["Canada", "Price", "2"],
                vec!["Quebec", "Price", "4"],
                vec!["Quebec", "Price", "4"],
            ],
        );
        let wide = pivot(&table, "Indicator", &schema_without_controls()).unwrap();

        assert_eq!(wide.value(0, "Price"), Some(3.0));
        assert_eq!(wide.collisions(), 2);
    }

    #[test]
    fn test_empty_values_are_absent() {
        let table = LongTable::from_rows(
            ["GEO", "Indicator", "VALUE"],
            vec![vec!["Canada", "Price", ""], vec!["Canada", "Volume", "2"]],
        );
        let wide = pivot(&table, "Indicator", &schema_without_controls()).unwrap();

        assert_eq!(wide.value(0, "Price"), None);
        assert_eq!(wide.value(0, "Volume"), Some(2.0));
    }

    #[test]
    fn test_missing_pivot_and_control_columns() {
        let err = pivot(&prices(), "Products", &PivotSchema::default()).unwrap_err();
        match err {
            SchemaError::MissingColumns(missing) => {
                assert_eq!(missing[0], "Products");
                assert!(missing.contains(&"VECTOR".to_string()));
                assert!(!missing.contains(&"UOM".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_value() {
        let table = LongTable::from_rows(["GEO", "Indicator", "VALUE"], vec![vec!["Canada", "Price", "n/a"]]);
        let err = pivot(&table, "Indicator", &schema_without_controls()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidValue { line: 2, .. }));
    }

    #[test]
    fn test_present_in_keeps_only_existing_controls() {
        let schema = PivotSchema::default().present_in(&prices());
        assert_eq!(schema.control_columns, vec!["UOM"]);
        assert!(pivot(&prices(), "Indicator", &schema).is_ok());
    }

    #[test]
    fn test_round_trip_without_duplicates() {
        let table = LongTable::from_rows(
            ["REF_DATE", "GEO", "Indicator", "VALUE"],
            vec![
                vec!["2020", "Canada", "Price", "10"],
                vec!["2020", "Canada", "Volume", "5.5"],
                vec!["2020", "Ontario", "Price", "8"],
                vec!["2021", "Canada", "Volume", "6"],
            ],
        );
        let wide = pivot(&table, "Indicator", &schema_without_controls()).unwrap();
        let long = wide.to_long();

        let mut expected = table.rows.clone();
        let mut actual = long.rows.clone();
        expected.sort();
        actual.sort();
        assert_eq!(long.columns, table.columns);
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_rename_key_column() {
        let mut wide = pivot(&prices(), "Indicator", &uom_schema()).unwrap();
        assert!(wide.rename_key_column("REF_DATE", "Date"));
        assert!(!wide.rename_key_column("Missing", "X"));
        assert_eq!(wide.columns()[0], "Date");
    }

    #[test]
    fn test_write_csv() {
        let wide = pivot(&prices(), "Indicator", &uom_schema()).unwrap();
        let mut out = Vec::new();
        wide.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("REF_DATE,GEO,Price,Volume\n"));
        assert!(text.contains("2020,Ontario,8,\n"));
        assert!(text.contains("2021,Canada,11.5,6\n"));
    }
}
