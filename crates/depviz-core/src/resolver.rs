//! Memoized package metadata, safe for concurrent requests

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{Error, LoadError, Result};
use crate::model::{PackageId, PackageMetadata};

/// Reads package structure from local storage.
///
/// Implementations block on the filesystem; the resolver runs them on the blocking pool.
pub trait SourceLoader: Send + Sync {
    /// Load one package. `LoadError::NotFound` means a fetch may make it available.
    fn load(&self, id: &PackageId) -> std::result::Result<PackageMetadata, LoadError>;
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Arc<PackageMetadata>),
    /// Nothing usable locally. Not an error: the caller decides whether to fetch.
    FetchRequired,
}

/// Process-wide metadata store. Thread-safe for concurrent access.
pub struct MetadataResolver {
    loader: Arc<dyn SourceLoader>,
    packages: DashMap<PackageId, Arc<PackageMetadata>>,
    /// One mutex per identifier so only one request loads or fetches a package at a time.
    locks: DashMap<PackageId, Arc<Mutex<()>>>,
}

impl MetadataResolver {
    pub fn new(loader: Arc<dyn SourceLoader>) -> Self {
        MetadataResolver {
            loader,
            packages: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Memoized metadata, if this identifier was resolved before.
    pub fn cached(&self, id: &PackageId) -> Option<Arc<PackageMetadata>> {
        self.packages.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Number of memoized packages.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Take the per-identifier lock.
    ///
    /// Hold the guard across resolve, fetch and re-resolve so concurrent requests for the
    /// same package wait for the first one instead of repeating its work.
    pub async fn lock(&self, id: &PackageId) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(id.clone()).or_default().value().clone();
        mutex.lock_owned().await
    }

    /// Resolve metadata, loading it from local storage on a miss.
    pub async fn resolve(&self, id: &PackageId) -> Result<Resolution> {
        if let Some(metadata) = self.cached(id) {
            return Ok(Resolution::Found(metadata));
        }

        debug!("not in cache, importing {:?}", id.as_str());

        let loader = Arc::clone(&self.loader);
        let owned_id = id.clone();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&owned_id)).await?;

        match loaded {
            Ok(metadata) => {
                let metadata = Arc::new(metadata);
                self.packages.insert(id.clone(), Arc::clone(&metadata));
                Ok(Resolution::Found(metadata))
            }
            Err(LoadError::NotFound(reason)) => {
                debug!("{} not available locally: {}", id, reason);
                Ok(Resolution::FetchRequired)
            }
            Err(source) => Err(Error::Load {
                id: id.clone(),
                source,
            }),
        }
    }
}
