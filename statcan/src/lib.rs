//! # statcan - Statistics Canada table ingestion
//!
//! Turns a table bundle (a zip holding `<id>.csv` and `<id>_MetaData.csv`)
//! into typed metadata and a wide table with one column per member of the
//! table's last dimension.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Bundle URL  │────▶│   Fetch     │────▶│  Metadata   │────▶│   Pivot     │
//! │ (<id>-eng)  │     │ (zip, repo) │     │ (sections)  │     │ (long→wide) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use statcan::{Config, DataOptions, Session};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::from_config(&Config::from_env().unwrap()).unwrap();
//!     let url = "https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip";
//!     let dataset = session.dataset(url, DataOptions::default()).await.unwrap();
//!     println!("{:?}", dataset.table.columns());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per failure kind
//! - [`resource`] - Bundle url parsing and dataset identity
//! - [`parser`] - Encoding detection, metadata sections, long tables
//! - [`metadata`] - Section classification and the metadata object
//! - [`transform`] - Pivot, units, dates and the ingestion session
//! - [`cache`] - Metadata cache and on-disk repo
//! - [`fetch`] - Download, extraction and liveness checks
//! - [`config`] - Environment configuration
//! - [`logs`] - Log broadcasting

// Core modules
pub mod config;
pub mod error;
pub mod logs;

// Parsing
pub mod metadata;
pub mod parser;
pub mod resource;

// Transformation
pub mod transform;

// Storage and network
pub mod cache;
pub mod fetch;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    DecodeError,
    FetchError,
    IngestError,
    IngestResult,
    MalformedSectionError,
    MetadataError,
    MissingSectionError,
    SchemaError,
    UrlFormatError,
};

// =============================================================================
// Re-exports - Parsing and metadata
// =============================================================================

pub use metadata::{
    classify,
    classify_all,
    CubeInfo,
    DatasetMetadata,
    Dimension,
    DimensionMember,
    SectionRole,
    SemanticSection,
};
pub use parser::{decode_content, detect_encoding, parse_sections, LongTable, MetadataText, Section};
pub use resource::{ResourceId, ResourceUrl};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    pivot,
    DataOptions,
    Dataset,
    PivotSchema,
    Session,
    UnitsOfMeasure,
    WideTable,
};

// =============================================================================
// Re-exports - Storage, network, config
// =============================================================================

pub use cache::{LoadState, MetadataCache, Repo};
pub use config::Config;
pub use fetch::{check_liveness, Fetcher, HttpFetcher, Liveness, Probe};
