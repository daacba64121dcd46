//! Error types for the ingestion pipeline.
//!
//! Each failure the pipeline can surface has its own type:
//!
//! - [`DecodeError`] - text encoding could not be determined or applied
//! - [`MalformedSectionError`] - metadata begins with data instead of a header
//! - [`MissingSectionError`] - a required metadata section was never classified
//! - [`SchemaError`] - the data table does not match the declared columns
//! - [`UrlFormatError`] - a locator is not a `<id>[-lang].<ext>` dataset url
//! - [`FetchError`] - network or storage failure in the fetch collaborator
//!
//! [`IngestError`] wraps all of them so `?` works across module boundaries.

use thiserror::Error;

use crate::metadata::SectionRole;

// =============================================================================
// Metadata Errors
// =============================================================================

/// Errors while detecting or applying a text encoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Failed to read the file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The detector returned no usable encoding label.
    #[error("Could not determine text encoding (detected '{0}')")]
    UnknownEncoding(String),

    /// The content is not valid in the detected encoding.
    #[error("Content is not valid {0}")]
    Invalid(&'static str),
}

/// A metadata file starting with a data row rather than a section header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Line {line}: data found before any section header: '{content}'")]
pub struct MalformedSectionError {
    pub line: usize,
    pub content: String,
}

/// A semantic role was requested but no section matched its signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Metadata has no {0} section")]
pub struct MissingSectionError(pub SectionRole);

/// Any failure while turning raw metadata bytes into a metadata object.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Malformed(#[from] MalformedSectionError),

    #[error(transparent)]
    MissingSection(#[from] MissingSectionError),
}

// =============================================================================
// Data Errors
// =============================================================================

/// The long-format table does not match the declared pivot schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Pivot, value or control column(s) absent from the table.
    #[error("Missing column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// A value cell that does not parse as a number.
    #[error("Line {line}: non-numeric value '{value}' in column '{column}'")]
    InvalidValue {
        line: usize,
        column: String,
        value: String,
    },

    /// Structurally invalid CSV (e.g. ragged rows).
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),
}

// =============================================================================
// Locator / Fetch Errors
// =============================================================================

/// A locator that does not look like a dataset bundle url.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Does not seem to be a valid dataset url: {0}")]
pub struct UrlFormatError(pub String);

/// Network or storage failures in the fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success HTTP status.
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Request timed out.
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// The downloaded archive could not be read.
    #[error("Invalid zip archive: {0}")]
    Archive(String),

    /// Expected entries were not in the archive.
    #[error("Missing file(s) in archive: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    /// Local storage error.
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// Neither a cache dir nor a home directory is available.
    #[error("Cannot determine home directory; set STATCAN_CACHE_DIR")]
    NoHomeDir,

    /// The repo directories could not be created.
    #[error("Cannot create repo: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Ingest Errors (top-level)
// =============================================================================

/// Top-level error returned by [`crate::transform::pipeline::Session`].
///
/// A dataset request either fully succeeds or fails with exactly one of these.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Malformed metadata: {0}")]
    MalformedSection(#[from] MalformedSectionError),

    #[error("Missing section: {0}")]
    MissingSection(#[from] MissingSectionError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Url format error: {0}")]
    UrlFormat(#[from] UrlFormatError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<MetadataError> for IngestError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Decode(e) => IngestError::Decode(e),
            MetadataError::Malformed(e) => IngestError::MalformedSection(e),
            MetadataError::MissingSection(e) => IngestError::MissingSection(e),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for metadata parsing.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Result type for table and pivot operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for session operations.
pub type IngestResult<T> = Result<T, IngestError>;
