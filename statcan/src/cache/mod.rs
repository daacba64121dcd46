//! Metadata cache - one parsed metadata object per dataset
//!
//! Entries are keyed by [`ResourceId`], so language and query variants of a
//! url share one entry. An entry remembers the length and modification time
//! of the file it was parsed from and is reloaded when either changes.
//! Concurrent loads of the same id run the loader once, and a replacement
//! load never starts while an earlier one for the same id is still running.

pub mod repo;

pub use repo::Repo;

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::OnceCell;

use crate::error::{DecodeError, MetadataResult};
use crate::metadata::DatasetMetadata;
use crate::resource::ResourceId;

/// Load state of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    /// The last load failed; the next request retries.
    Failed(String),
}

/// Identity of a file's contents as far as the filesystem tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileVersion {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileVersion {
    pub fn of(path: impl AsRef<Path>) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// A parsed metadata object and the file version it came from.
#[derive(Debug, Clone)]
pub struct CachedMetadata {
    pub metadata: Arc<DatasetMetadata>,
    pub source: PathBuf,
    pub version: FileVersion,
}

impl CachedMetadata {
    /// Parse the metadata file at `path`.
    pub fn load(path: impl Into<PathBuf>) -> MetadataResult<Self> {
        let source = path.into();
        let version = FileVersion::of(&source).map_err(DecodeError::from)?;
        let metadata = DatasetMetadata::read(&source)?;
        Ok(Self {
            metadata: Arc::new(metadata),
            source,
            version,
        })
    }

    /// False once the source file changed or disappeared.
    pub fn is_current(&self) -> bool {
        FileVersion::of(&self.source).is_ok_and(|v| v == self.version)
    }
}

#[derive(Default)]
struct Slot {
    cell: OnceCell<CachedMetadata>,
    loading: AtomicBool,
    failure: Mutex<Option<String>>,
    /// Set by `invalidate`; the next request replaces the slot.
    stale: AtomicBool,
    /// Shared by a slot and its replacements, held for the whole load.
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Slot {
    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    fn needs_reload(&self) -> bool {
        self.is_stale() || self.cell.get().is_some_and(|entry| !entry.is_current())
    }
}

/// Resets the loading flag even if the load future is dropped.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide metadata cache.
#[derive(Default)]
pub struct MetadataCache {
    slots: Mutex<HashMap<ResourceId, Arc<Slot>>>,
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache").field("entries", &self.len()).finish()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current slot for `id`, replacing an invalidated slot or a loaded
    /// entry whose file changed. The replacement keeps the old load gate.
    fn slot(&self, id: &ResourceId) -> Arc<Slot> {
        let mut slots = lock(&self.slots);
        let gate = match slots.get(id) {
            Some(slot) if !slot.needs_reload() => return Arc::clone(slot),
            Some(slot) => Arc::clone(&slot.gate),
            None => Arc::default(),
        };
        let slot = Arc::new(Slot {
            gate,
            ..Slot::default()
        });
        slots.insert(id.clone(), Arc::clone(&slot));
        slot
    }

    fn live_slot(&self, id: &ResourceId) -> Option<Arc<Slot>> {
        lock(&self.slots).get(id).filter(|slot| !slot.is_stale()).cloned()
    }

    /// Return the cached metadata for `id`, running `load` if there is none.
    ///
    /// Callers arriving while a load is in flight wait for it instead of
    /// loading again. After `invalidate`, the next load waits for the one in
    /// flight to finish before it starts. A failed load leaves the entry empty.
    pub async fn get_or_load<F, Fut, E>(&self, id: &ResourceId, load: F) -> Result<Arc<DatasetMetadata>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedMetadata, E>>,
        E: fmt::Display,
    {
        let slot = self.slot(id);
        let Slot {
            cell,
            loading,
            failure,
            gate,
            ..
        } = &*slot;
        let entry = cell
            .get_or_try_init(|| async move {
                let _loading = LoadingGuard::start(loading);
                let _gate = gate.lock().await;
                *lock(failure) = None;
                let result = load().await;
                if let Err(e) = &result {
                    *lock(failure) = Some(e.to_string());
                }
                result
            })
            .await?;
        Ok(Arc::clone(&entry.metadata))
    }

    /// Cached metadata for `id`, if loaded and still current.
    pub fn get(&self, id: &ResourceId) -> Option<Arc<DatasetMetadata>> {
        let slot = self.live_slot(id)?;
        let entry = slot.cell.get()?;
        entry.is_current().then(|| Arc::clone(&entry.metadata))
    }

    pub fn state(&self, id: &ResourceId) -> LoadState {
        let Some(slot) = self.live_slot(id) else {
            return LoadState::Unloaded;
        };
        if slot.cell.initialized() {
            LoadState::Loaded
        } else if slot.loading.load(Ordering::SeqCst) {
            LoadState::Loading
        } else if let Some(reason) = lock(&slot.failure).clone() {
            LoadState::Failed(reason)
        } else {
            LoadState::Unloaded
        }
    }

    /// Mark the entry for `id` stale. Returns whether there was a live one.
    ///
    /// A load already in flight completes for its waiters, but its result
    /// is not kept. The next load for `id` starts once it has finished.
    pub fn invalidate(&self, id: &ResourceId) -> bool {
        match lock(&self.slots).get(id) {
            Some(slot) => !slot.stale.swap(true, Ordering::SeqCst),
            None => false,
        }
    }

    pub fn clear(&self) {
        for slot in lock(&self.slots).values() {
            slot.stale.store(true, Ordering::SeqCst);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        lock(&self.slots).values().filter(|slot| !slot.is_stale()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
