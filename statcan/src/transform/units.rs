//! Units of measure per pivot value.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{SchemaError, SchemaResult};
use crate::parser::LongTable;

/// Column holding the unit of measure of each long row.
pub const UOM_COLUMN: &str = "UOM";

/// Units observed for each pivot value, sorted by pivot value.
///
/// A pivot value can carry more than one unit when an export mixes scales;
/// units are kept in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UnitsOfMeasure {
    units: BTreeMap<String, Vec<String>>,
}

impl UnitsOfMeasure {
    /// Collect distinct (pivot value, unit) pairs from a long table.
    ///
    /// A table without a unit column yields an empty lookup.
    pub fn from_table(table: &LongTable, pivot_column: &str) -> SchemaResult<Self> {
        let pivot_idx = table
            .column_index(pivot_column)
            .ok_or_else(|| SchemaError::MissingColumns(vec![pivot_column.to_string()]))?;
        let Some(uom_idx) = table.column_index(UOM_COLUMN) else {
            return Ok(Self::default());
        };

        let mut units: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in &table.rows {
            let (Some(member), Some(unit)) = (row.get(pivot_idx), row.get(uom_idx)) else {
                continue;
            };
            let seen = units.entry(member.clone()).or_default();
            if !seen.contains(unit) {
                seen.push(unit.clone());
            }
        }
        Ok(Self { units })
    }

    /// All units recorded for `member`.
    pub fn get(&self, member: &str) -> Option<&[String]> {
        self.units.get(member).map(Vec::as_slice)
    }

    /// The first unit recorded for `member`.
    pub fn unit(&self, member: &str) -> Option<&str> {
        self.get(member)?.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.units.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
