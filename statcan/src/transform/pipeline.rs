//! High-level ingestion API: locator in, metadata or wide table out.
//!
//! # Example
//!
//! ```rust,ignore
//! use statcan::{Config, DataOptions, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::from_config(&Config::from_env()?)?;
//!     let url = "https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip";
//!
//!     let dataset = session.dataset(url, DataOptions::default()).await?;
//!     println!("{} rows pivoted on {}", dataset.table.len(), dataset.table.pivot_column());
//!     Ok(())
//! }
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::dates::{parse_ref_dates, REF_DATE_COLUMN};
use super::pivot::{pivot, PivotSchema, WideTable};
use super::units::UnitsOfMeasure;
use crate::cache::{CachedMetadata, LoadState, MetadataCache};
use crate::config::Config;
use crate::error::{IngestError, IngestResult, UrlFormatError};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::logs::{log_error, log_info, log_success, log_warning};
use crate::metadata::DatasetMetadata;
use crate::parser::LongTable;
use crate::resource::{ResourceId, ResourceUrl};

/// Output name of the reference period column when renaming.
pub const DATE_COLUMN: &str = "Date";
/// Geography column in the export format.
pub const GEO_COLUMN: &str = "GEO";
/// Output name of the geography column when renaming.
pub const GEO_RENAMED: &str = "Geo";

/// Options for building a wide dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataOptions {
    /// Rename `REF_DATE` to `Date` and `GEO` to `Geo`
    pub rename_columns: bool,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self { rename_columns: true }
    }
}

/// A pivoted dataset with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    /// Identity of the source bundle; `None` for local files
    pub resource: Option<ResourceId>,
    pub metadata: Arc<DatasetMetadata>,
    pub table: WideTable,
    pub units_of_measure: UnitsOfMeasure,
}

impl Dataset {
    /// Pivot `table` on the pivot column named by `metadata`.
    ///
    /// Only the control columns of `schema` that the table actually has are
    /// excluded from the group key.
    pub fn assemble(
        resource: Option<ResourceId>,
        metadata: Arc<DatasetMetadata>,
        table: &LongTable,
        schema: &PivotSchema,
        options: &DataOptions,
    ) -> IngestResult<Self> {
        let pivot_column = metadata.pivot_column()?;
        let units_of_measure = UnitsOfMeasure::from_table(table, pivot_column)?;
        let mut wide = pivot(table, pivot_column, &schema.present_in(table))?;

        if wide.collisions() > 0 {
            log_warning(format!(
                "{} (key, {}) pair(s) had more than one row; kept the maximum",
                wide.collisions(),
                pivot_column
            ));
        }

        if options.rename_columns {
            wide.rename_key_column(REF_DATE_COLUMN, DATE_COLUMN);
            wide.rename_key_column(GEO_COLUMN, GEO_RENAMED);
        }

        Ok(Self {
            resource,
            metadata,
            table: wide,
            units_of_measure,
        })
    }

    /// Offline variant: read a data file and a metadata file from disk.
    pub fn from_files(
        data: impl AsRef<Path>,
        metadata: impl AsRef<Path>,
        schema: &PivotSchema,
        options: &DataOptions,
    ) -> IngestResult<Self> {
        let metadata = Arc::new(DatasetMetadata::read(metadata)?);
        let table = LongTable::read(data)?;
        Self::assemble(None, metadata, &table, schema, options)
    }

    pub fn collisions(&self) -> usize {
        self.table.collisions()
    }

    /// Reference periods of every row, if the table has a reference period
    /// column and every value in it parses as a date.
    pub fn ref_dates(&self) -> Option<Vec<NaiveDate>> {
        let idx = self
            .table
            .key_columns()
            .iter()
            .position(|c| c == REF_DATE_COLUMN || c == DATE_COLUMN)?;
        parse_ref_dates(self.table.rows().iter().map(|r| r.key[idx].as_str()))
    }
}

/// An ingestion session: fetcher, metadata cache and pivot schema.
///
/// Sessions are cheap to share by reference; all methods take `&self`.
#[derive(Debug)]
pub struct Session<F: Fetcher = HttpFetcher> {
    fetcher: F,
    cache: MetadataCache,
    schema: PivotSchema,
}

impl Session<HttpFetcher> {
    pub fn from_config(config: &Config) -> IngestResult<Self> {
        Ok(Self::new(HttpFetcher::from_config(config)?))
    }
}

impl<F: Fetcher> Session<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cache: MetadataCache::new(),
            schema: PivotSchema::default(),
        }
    }

    pub fn with_schema(mut self, schema: PivotSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn schema(&self) -> &PivotSchema {
        &self.schema
    }

    /// Metadata for `locator`, fetched and parsed at most once per file version.
    pub async fn metadata(&self, locator: &str) -> IngestResult<Arc<DatasetMetadata>> {
        let url = ResourceUrl::parse(locator)?;
        self.metadata_for(&url).await
    }

    async fn metadata_for(&self, url: &ResourceUrl) -> IngestResult<Arc<DatasetMetadata>> {
        let fetcher = &self.fetcher;
        let load = move || async move {
            let files = fetcher.fetch(url).await?;
            log_info(format!("Parsing metadata {}", files.metadata.display()));
            Ok::<_, IngestError>(CachedMetadata::load(files.metadata)?)
        };

        self.cache.get_or_load(&url.id(), load).await.map_err(|e| {
            log_error(format!("Metadata for {} failed: {}", url.id(), e));
            e
        })
    }

    /// The data table of `locator` in long format, unpivoted.
    pub async fn long_data(&self, locator: &str) -> IngestResult<LongTable> {
        let url = ResourceUrl::parse(locator)?;
        let files = self.fetcher.fetch(&url).await?;
        LongTable::read(&files.data)
    }

    /// Fetch, parse and pivot `locator`.
    ///
    /// Either everything succeeds or exactly one error is returned; no
    /// partial table is produced.
    pub async fn dataset(&self, locator: &str, options: DataOptions) -> IngestResult<Dataset> {
        let url = ResourceUrl::parse(locator)?;
        let metadata = self.metadata_for(&url).await?;
        let files = self.fetcher.fetch(&url).await?;
        let table = LongTable::read(&files.data)?;

        let dataset = Dataset::assemble(Some(url.id()), metadata, &table, &self.schema, &options)?;
        log_success(format!(
            "{}: {} long rows -> {} wide rows",
            url.id().cache_key(),
            table.len(),
            dataset.table.len()
        ));
        Ok(dataset)
    }

    /// Forget the cached metadata of `locator`. Returns whether there was any.
    pub fn invalidate(&self, locator: &str) -> Result<bool, UrlFormatError> {
        let url = ResourceUrl::parse(locator)?;
        Ok(self.cache.invalidate(&url.id()))
    }

    /// Invalidate and reload the metadata of `locator`.
    pub async fn refresh(&self, locator: &str) -> IngestResult<Arc<DatasetMetadata>> {
        let url = ResourceUrl::parse(locator)?;
        self.cache.invalidate(&url.id());
        self.metadata_for(&url).await
    }

    pub fn state(&self, locator: &str) -> Result<LoadState, UrlFormatError> {
        let url = ResourceUrl::parse(locator)?;
        Ok(self.cache.state(&url.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchResult, SchemaError};
    use crate::fetch::FetchedFiles;
    use crate::metadata::SectionRole;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const RAIL_ENG: &str = "https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip";
    const RAIL_FRA: &str = "https://www150.statcan.gc.ca/n1/tbl/csv/23100274-fra.zip?lang=fr";

    const METADATA: &str = r#""Cube Title","Product Id"
"Rail industry indicators","23100274"

"Note ID","Note"
"1","Preliminary"

"Dimension ID","Dimension name","Dimension Notes"
"1","Geography",""
"2","Indicator","1"

"Dimension ID","Member Name","Member ID"
"2","Price","1"
"2","Volume","2"
"#;

    const DATA: &str = "\
REF_DATE,GEO,DGUID,Indicator,UOM,UOM_ID,SCALAR_FACTOR,SCALAR_ID,VECTOR,COORDINATE,VALUE,STATUS,SYMBOL,TERMINATED,DECIMALS
2020,Canada,2016A000011124,Price,Dollars,81,units,0,v1,1.1,10,,,,0
2020,Canada,2016A000011124,Volume,Tonnes,204,units,0,v2,1.2,5,,,,0
2020,Ontario,2016A000235,Price,Dollars,81,units,0,v3,2.1,8,,,,0
2021-06,Canada,2016A000011124,Price,Dollars,81,units,0,v1,1.1,11.5,,,,0
";

    /// Serves files from a temp dir; only product 23100274 exists.
    struct FakeFetcher {
        dir: TempDir,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(data: &str, metadata: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("23100274.csv"), data).unwrap();
            std::fs::write(dir.path().join("23100274_MetaData.csv"), metadata).unwrap();
            Self { dir, calls: AtomicUsize::new(0) }
        }
    }

    impl Fetcher for FakeFetcher {
        async fn fetch(&self, url: &ResourceUrl) -> FetchResult<FetchedFiles> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if url.product_id != "23100274" {
                return Err(FetchError::Status { url: url.locator.clone(), status: 404 });
            }
            Ok(FetchedFiles {
                data: self.dir.path().join(&url.data_file),
                metadata: self.dir.path().join(&url.metadata_file),
            })
        }
    }

    fn session() -> Session<FakeFetcher> {
        Session::new(FakeFetcher::new(DATA, METADATA))
    }

    #[tokio::test]
    async fn test_dataset_is_pivoted_on_last_dimension() {
        let dataset = session().dataset(RAIL_ENG, DataOptions::default()).await.unwrap();
        let table = &dataset.table;

        assert_eq!(table.pivot_column(), "Indicator");
        assert_eq!(table.columns(), vec!["Date", "Geo", "Price", "Volume"]);
        assert_eq!(table.len(), 3);
        let canada = table.find_row(&["2020", "Canada"]).unwrap();
        assert_eq!(table.value(canada, "Volume"), Some(5.0));
        assert_eq!(dataset.collisions(), 0);
        assert_eq!(dataset.units_of_measure.unit("Volume"), Some("Tonnes"));
        assert_eq!(dataset.resource.as_ref().unwrap().product_id(), "23100274");
    }

    #[tokio::test]
    async fn test_keep_names_and_ref_dates() {
        let options = DataOptions { rename_columns: false };
        let dataset = session().dataset(RAIL_ENG, options).await.unwrap();

        assert_eq!(dataset.table.key_columns(), ["REF_DATE", "GEO"]);
        let dates = dataset.ref_dates().unwrap();
        assert_eq!(dates[2], NaiveDate::from_ymd_opt(2021, 6, 1).unwrap());
    }

    #[tokio::test]
    async fn test_duplicates_are_counted() {
        let data = format!("{DATA}2020,Canada,2016A000011124,Price,Dollars,81,units,0,v1,1.1,12,,,,0\n");
        let session = Session::new(FakeFetcher::new(&data, METADATA));
        let dataset = session.dataset(RAIL_ENG, DataOptions::default()).await.unwrap();

        let canada = dataset.table.find_row(&["2020", "Canada"]).unwrap();
        assert_eq!(dataset.table.value(canada, "Price"), Some(12.0));
        assert_eq!(dataset.collisions(), 1);
    }

    #[tokio::test]
    async fn test_language_variants_share_one_load() {
        let session = session();
        let (eng, fra) = tokio::join!(session.metadata(RAIL_ENG), session.metadata(RAIL_FRA));

        assert!(Arc::ptr_eq(&eng.unwrap(), &fra.unwrap()));
        assert_eq!(session.fetcher().calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(RAIL_FRA).unwrap(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_invalidate_and_refresh() {
        let session = session();
        session.metadata(RAIL_ENG).await.unwrap();

        assert!(session.invalidate(RAIL_FRA).unwrap());
        assert_eq!(session.state(RAIL_ENG).unwrap(), LoadState::Unloaded);

        session.refresh(RAIL_ENG).await.unwrap();
        assert_eq!(session.state(RAIL_ENG).unwrap(), LoadState::Loaded);
        assert_eq!(session.fetcher().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_locator() {
        let err = session().dataset("https://host/readme.txt.bak", DataOptions::default()).await;
        assert!(matches!(err, Err(IngestError::UrlFormat(_))));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded() {
        let session = session();
        let missing = "https://www150.statcan.gc.ca/n1/tbl/csv/99999999-eng.zip";

        let err = session.metadata(missing).await.unwrap_err();
        assert!(matches!(err, IngestError::Fetch(FetchError::Status { status: 404, .. })));
        assert!(matches!(session.state(missing).unwrap(), LoadState::Failed(_)));
    }

    #[tokio::test]
    async fn test_missing_dimensions_section() {
        let metadata = "\"Cube Title\",\"Product Id\"\n\"Rail\",\"23100274\"\n";
        let session = Session::new(FakeFetcher::new(DATA, metadata));
        let err = session.dataset(RAIL_ENG, DataOptions::default()).await.unwrap_err();

        match err {
            IngestError::MissingSection(e) => assert_eq!(e.0, SectionRole::Dimensions),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_data_without_pivot_column() {
        let data = "REF_DATE,GEO,VALUE\n2020,Canada,1\n";
        let session = Session::new(FakeFetcher::new(data, METADATA));
        let err = session.dataset(RAIL_ENG, DataOptions::default()).await.unwrap_err();

        assert!(matches!(err, IngestError::Schema(SchemaError::MissingColumns(_))));
    }

    #[tokio::test]
    async fn test_long_data_is_unpivoted() {
        let table = session().long_data(RAIL_ENG).await.unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.has_column("VECTOR"));
    }

    #[test]
    fn test_from_files() {
        let fetcher = FakeFetcher::new(DATA, METADATA);
        let dataset = Dataset::from_files(
            fetcher.dir.path().join("23100274.csv"),
            fetcher.dir.path().join("23100274_MetaData.csv"),
            &PivotSchema::default(),
            &DataOptions::default(),
        )
        .unwrap();

        assert!(dataset.resource.is_none());
        assert_eq!(dataset.table.pivot_values(), ["Price", "Volume"]);
    }
}
