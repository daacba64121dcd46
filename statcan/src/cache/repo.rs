//! On-disk layout of downloaded and extracted bundles.
//!
//! ```text
//! <root>/repo/
//! ├── downloaded/   raw bundle archives, e.g. 23100274-eng.zip
//! ├── extracted/    one directory per product id
//! │   └── 23100274/
//! │       ├── 23100274.csv
//! │       └── 23100274_MetaData.csv
//! └── dataset/      pivoted outputs
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{ConfigError, FetchResult};
use crate::fetch::FetchedFiles;
use crate::resource::{ResourceId, ResourceUrl};

const REPO_DIR: &str = "repo";

/// Local store for dataset bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    root: PathBuf,
    downloaded: PathBuf,
    extracted: PathBuf,
    dataset: PathBuf,
}

impl Repo {
    /// Open (creating if needed) the repo under `root`.
    pub fn at(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().join(REPO_DIR);
        let repo = Self {
            downloaded: root.join("downloaded"),
            extracted: root.join("extracted"),
            dataset: root.join("dataset"),
            root,
        };
        for dir in [&repo.downloaded, &repo.extracted, &repo.dataset] {
            fs::create_dir_all(dir)?;
        }
        Ok(repo)
    }

    /// Repo in the current working directory.
    pub fn here() -> io::Result<Self> {
        Self::at(std::env::current_dir()?)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::at(config.repo_root()?)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn downloaded(&self) -> &Path {
        &self.downloaded
    }

    pub fn extracted(&self) -> &Path {
        &self.extracted
    }

    /// Where a raw bundle archive is kept.
    pub fn download_path(&self, url: &ResourceUrl) -> PathBuf {
        self.downloaded.join(&url.file)
    }

    /// Default location of a pivoted dataset.
    pub fn dataset_path(&self, id: &ResourceId) -> PathBuf {
        self.dataset.join(format!("{}.csv", id.cache_key()))
    }

    /// Extraction directory for `id`, created if missing.
    pub fn ensure_directory(&self, id: &ResourceId) -> io::Result<PathBuf> {
        let dir = self.extracted.join(id.cache_key());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Installed files for `url`, only if both are present.
    pub fn cached_files(&self, url: &ResourceUrl) -> Option<FetchedFiles> {
        let dir = self.extracted.join(url.id().cache_key());
        let files = FetchedFiles {
            data: dir.join(&url.data_file),
            metadata: dir.join(&url.metadata_file),
        };
        (files.data.is_file() && files.metadata.is_file()).then_some(files)
    }

    /// Install a data/metadata pair.
    ///
    /// Both files are first written to hidden partial files, then renamed
    /// into place with the metadata file last, so [`Repo::cached_files`]
    /// never sees a half-written pair. On failure everything written by this
    /// call is removed.
    pub fn install(&self, url: &ResourceUrl, data: &[u8], metadata: &[u8]) -> FetchResult<FetchedFiles> {
        let dir = self.ensure_directory(&url.id())?;
        let target = FetchedFiles {
            data: dir.join(&url.data_file),
            metadata: dir.join(&url.metadata_file),
        };

        let token = uuid::Uuid::new_v4().simple().to_string();
        let partial = |name: &str| dir.join(format!(".{}.{}.partial", name, token));
        let staged = [
            (partial(&url.data_file), data, &target.data),
            (partial(&url.metadata_file), metadata, &target.metadata),
        ];

        let mut renamed: Vec<&Path> = Vec::new();
        let result = staged
            .iter()
            .try_for_each(|(tmp, bytes, _)| fs::write(tmp, bytes))
            .and_then(|_| {
                staged.iter().try_for_each(|(tmp, _, dest)| {
                    fs::rename(tmp, dest)?;
                    renamed.push(dest.as_path());
                    Ok(())
                })
            });

        if let Err(e) = result {
            for (tmp, _, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
            for dest in renamed {
                let _ = fs::remove_file(dest);
            }
            return Err(e.into());
        }

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn url() -> ResourceUrl {
        ResourceUrl::parse("https://www150.statcan.gc.ca/n1/tbl/csv/23100274-eng.zip").unwrap()
    }

    #[test]
    fn test_layout() {
        let tmp = tempdir().unwrap();
        let repo = Repo::at(tmp.path()).unwrap();

        assert!(tmp.path().join("repo/downloaded").is_dir());
        assert!(tmp.path().join("repo/extracted").is_dir());
        assert!(tmp.path().join("repo/dataset").is_dir());
        assert_eq!(repo.download_path(&url()), tmp.path().join("repo/downloaded/23100274-eng.zip"));
        assert_eq!(repo.dataset_path(&url().id()), tmp.path().join("repo/dataset/23100274.csv"));
    }

    #[test]
    fn test_languages_share_a_directory() {
        let tmp = tempdir().unwrap();
        let repo = Repo::at(tmp.path()).unwrap();
        let fra = ResourceUrl::parse("https://www150.statcan.gc.ca/n1/tbl/csv/23100274-fra.zip").unwrap();

        assert_eq!(
            repo.ensure_directory(&url().id()).unwrap(),
            repo.ensure_directory(&fra.id()).unwrap()
        );
    }

    #[test]
    fn test_install_then_cached() {
        let tmp = tempdir().unwrap();
        let repo = Repo::at(tmp.path()).unwrap();
        assert!(repo.cached_files(&url()).is_none());

        let files = repo.install(&url(), b"VALUE\n1\n", b"\"Cube Title\"\n").unwrap();
        assert_eq!(fs::read(&files.data).unwrap(), b"VALUE\n1\n");
        assert_eq!(repo.cached_files(&url()), Some(files.clone()));

        let leftovers: Vec<_> = fs::read_dir(files.data.parent().unwrap())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_half_installed_is_not_cached() {
        let tmp = tempdir().unwrap();
        let repo = Repo::at(tmp.path()).unwrap();
        let dir = repo.ensure_directory(&url().id()).unwrap();
        fs::write(dir.join("23100274.csv"), "VALUE\n").unwrap();

        assert!(repo.cached_files(&url()).is_none());
    }

    #[test]
    fn test_failed_install_cleans_up() {
        let tmp = tempdir().unwrap();
        let repo = Repo::at(tmp.path()).unwrap();
        let dir = repo.ensure_directory(&url().id()).unwrap();
        // A directory in place of the metadata file makes the last rename fail
        fs::create_dir(dir.join("23100274_MetaData.csv")).unwrap();
        fs::write(dir.join("23100274_MetaData.csv/keep"), "x").unwrap();

        assert!(repo.install(&url(), b"VALUE\n", b"meta").is_err());
        assert!(!dir.join("23100274.csv").exists());
        let partials = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(partials, 0);
    }
}
