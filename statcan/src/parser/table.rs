//! The long-format data table: one row per (entity, measured quantity).

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use super::decode_content;
use crate::error::{IngestResult, SchemaError, SchemaResult};

/// A long-format table with string cells, columns in file order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LongTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// A borrowed view of one long-format row.
#[derive(Debug, Clone, Copy)]
pub struct LongRecord<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl<'a> LongRecord<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx).map(String::as_str)
    }

    pub fn values(&self) -> &'a [String] {
        self.values
    }
}

impl LongTable {
    /// Build a table from in-memory rows.
    pub fn from_rows<C, R>(columns: C, rows: Vec<R>) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Decode and parse CSV bytes. Every row must have the header's width.
    pub fn from_bytes(bytes: &[u8]) -> IngestResult<Self> {
        let decoded = decode_content(bytes)?;
        Ok(Self::from_csv_str(&decoded.text)?)
    }

    /// Read a data file from disk.
    pub fn read<P: AsRef<Path>>(path: P) -> IngestResult<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(crate::error::DecodeError::from)?;
        Self::from_bytes(&bytes)
    }

    /// Parse already-decoded CSV text.
    pub fn from_csv_str(text: &str) -> SchemaResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());

        let columns = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Names from `wanted` that are not columns of this table.
    pub fn missing_columns<'n>(&self, wanted: impl IntoIterator<Item = &'n str>) -> Vec<String> {
        wanted
            .into_iter()
            .filter(|name| !self.has_column(name))
            .map(str::to_string)
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = LongRecord<'_>> + '_ {
        self.rows.iter().map(move |values| LongRecord {
            columns: &self.columns,
            values,
        })
    }

    /// Write the table as CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> SchemaResult<()> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(&self.columns)?;
        for row in &self.rows {
            out.write_record(row)?;
        }
        out.flush().map_err(|e| SchemaError::Csv(e.into()))?;
        Ok(())
    }
}
