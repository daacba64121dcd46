//! Transformation module.
//!
//! - Pivot: long-to-wide reshaping with max aggregation
//! - Units: unit of measure per pivot value
//! - Dates: reference period parsing
//! - Pipeline: the ingestion session tying fetch, metadata and pivot together

pub mod dates;
pub mod pipeline;
pub mod pivot;
pub mod units;

pub use dates::{parse_ref_date, parse_ref_dates, REF_DATE_COLUMN};
pub use pipeline::{DataOptions, Dataset, Session};
pub use pivot::{pivot, PivotSchema, WideRecord, WideTable, CONTROL_COLUMNS, VALUE_COLUMN};
pub use units::{UnitsOfMeasure, UOM_COLUMN};
