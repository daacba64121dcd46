//! Bundle retrieval: download, extract and install into the [`Repo`].

pub mod liveness;

pub use liveness::{check_liveness, Liveness, Probe};

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::Repo;
use crate::config::Config;
use crate::error::{FetchError, FetchResult, IngestResult};
use crate::logs::{log_info, log_success};
use crate::resource::ResourceUrl;

/// Local paths of an installed bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedFiles {
    pub data: PathBuf,
    pub metadata: PathBuf,
}

/// Turns a bundle url into local data and metadata files.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &ResourceUrl) -> impl Future<Output = FetchResult<FetchedFiles>> + Send;
}

/// Downloads bundles over HTTP and keeps them in a [`Repo`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    repo: Repo,
}

impl HttpFetcher {
    pub fn new(repo: Repo, timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { client, repo })
    }

    pub fn from_config(config: &Config) -> IngestResult<Self> {
        let repo = Repo::from_config(config)?;
        Ok(Self::new(repo, config.timeout)?)
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn download(&self, url: &ResourceUrl) -> FetchResult<Vec<u8>> {
        let response = self
            .client
            .get(&url.locator)
            .send()
            .await
            .map_err(|e| request_error(&url.locator, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.locator.clone(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_error(&url.locator, e))?;
        Ok(bytes.to_vec())
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &ResourceUrl) -> FetchResult<FetchedFiles> {
        if let Some(files) = self.repo.cached_files(url) {
            log_info(format!("Using cached bundle {}", url.id().cache_key()));
            return Ok(files);
        }

        log_info(format!("Downloading {}", url.locator));
        let archive = self.download(url).await?;
        log_info(format!("Received {} bytes for {}", archive.len(), url.id().cache_key()));
        tokio::fs::write(self.repo.download_path(url), &archive).await?;

        let wanted = [url.data_file.as_str(), url.metadata_file.as_str()];
        let mut entries = extract_zip(&archive, &wanted)?;
        let data = entries.remove(&url.data_file).unwrap_or_default();
        let metadata = entries.remove(&url.metadata_file).unwrap_or_default();

        let files = self.repo.install(url, &data, &metadata)?;
        log_success(format!("Installed {}", url.id().cache_key()));
        Ok(files)
    }
}

pub(crate) fn request_error(locator: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(locator.to_string())
    } else {
        FetchError::Http(e.to_string())
    }
}

/// Extract the named entries from a zip archive, matching on the file name
/// regardless of directory. Fails with [`FetchError::MissingFiles`] unless
/// every name is found.
pub fn extract_zip(data: &[u8], filenames: &[&str]) -> FetchResult<HashMap<String, Vec<u8>>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(data)).map_err(|e| FetchError::Archive(e.to_string()))?;
    let mut result = HashMap::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| FetchError::Archive(e.to_string()))?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let filename = name.rsplit('/').next().unwrap_or(&name).to_string();

        if filenames.contains(&filename.as_str()) {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            result.insert(filename, contents);
        }
    }

    let missing: Vec<String> = filenames
        .iter()
        .filter(|f| !result.contains_key(**f))
        .map(|f| f.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(FetchError::MissingFiles(missing));
    }

    Ok(result)
}
