//! On-disk cache of rendered images

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::model::{PackageId, Variant};

/// Images keyed by package and variant under `<root>/<id segments>/`.
///
/// Only the canonical variant is ever read or written.
#[derive(Debug, Clone)]
pub struct RenderCache {
    root: PathBuf,
    max_age: Option<Duration>,
}

impl RenderCache {
    pub fn new(root: impl Into<PathBuf>, max_age: Option<Duration>) -> Self {
        RenderCache {
            root: root.into(),
            max_age,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.cache_dir, config.cache_max_age)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every image of one package.
    pub fn entry_dir(&self, id: &PackageId) -> PathBuf {
        id.to_path(&self.root)
    }

    pub fn entry_path(&self, id: &PackageId, variant: &Variant) -> PathBuf {
        self.entry_dir(id).join(variant.file_name())
    }

    /// Cached image, if the variant is canonical and a fresh entry exists.
    pub async fn get(&self, id: &PackageId, variant: &Variant) -> Option<Bytes> {
        if !variant.is_canonical() {
            return None;
        }
        let path = self.entry_path(id, variant);

        let metadata = tokio::fs::metadata(&path).await.ok()?;
        if let (Some(max_age), Ok(modified)) = (self.max_age, metadata.modified()) {
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age > max_age {
                debug!("cache entry {} expired", path.display());
                return None;
            }
        }

        match tokio::fs::read(&path).await {
            Ok(data) if !data.is_empty() => {
                debug!("cache hit {}", path.display());
                Some(Bytes::from(data))
            }
            Ok(_) => None,
            Err(e) => {
                debug!("cache read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist `image` for a canonical variant and hand it back unchanged.
    ///
    /// The file is written beside its final location and renamed into place, so readers
    /// never observe a partial image.
    pub async fn put(&self, id: &PackageId, variant: &Variant, image: Bytes) -> Result<Bytes> {
        if !variant.is_canonical() {
            return Ok(image);
        }

        let dir = self.entry_dir(id);
        let path = self.entry_path(id, variant);
        let data = image.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &data)).await??;

        info!("cached image for {} ({} bytes)", id, image.len());
        Ok(image)
    }

    /// Remove every cached image.
    pub fn clear(&self) -> std::io::Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn cache(temp_dir: &TempDir) -> RenderCache {
        RenderCache::new(temp_dir.path().join("cache"), Some(Duration::from_secs(60 * 60)))
    }

    #[tokio::test]
    async fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(&temp_dir);
        let id = PackageId::new("github.com/u/tool");
        let image = Bytes::from_static(b"\x89PNG fake image");

        assert!(cache.get(&id, &Variant::default()).await.is_none());
        let returned = cache.put(&id, &Variant::default(), image.clone()).await.unwrap();
        assert_eq!(returned, image);
        assert_eq!(cache.get(&id, &Variant::default()).await.unwrap(), image);

        assert!(temp_dir.path().join("cache/github.com/u/tool/dot.png").is_file());
        assert!(cache.get(&id, &Variant::canonical(true)).await.is_none());
    }

    #[tokio::test]
    async fn test_non_canonical_variants_bypass() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(&temp_dir);
        let id = PackageId::new("x/a");
        cache
            .put(&id, &Variant::default(), Bytes::from_static(b"full"))
            .await
            .unwrap();

        let shallow = Variant {
            depth: 3,
            ..Variant::default()
        };
        let reversed = Variant {
            reversed: Some("x/b".into()),
            ..Variant::default()
        };
        assert!(cache.get(&id, &shallow).await.is_none());
        assert!(cache.get(&id, &reversed).await.is_none());

        let returned = cache
            .put(&id, &shallow, Bytes::from_static(b"partial"))
            .await
            .unwrap();
        assert_eq!(returned, Bytes::from_static(b"partial"));
        assert_eq!(
            cache.get(&id, &Variant::default()).await.unwrap(),
            Bytes::from_static(b"full")
        );
    }

    #[tokio::test]
    async fn test_expired_entries_miss() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(&temp_dir);
        let id = PackageId::new("x/a");
        cache
            .put(&id, &Variant::default(), Bytes::from_static(b"old"))
            .await
            .unwrap();

        let path = cache.entry_path(&id, &Variant::default());
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(2 * 60 * 60))
            .unwrap();
        assert!(cache.get(&id, &Variant::default()).await.is_none());

        let forever = RenderCache::new(cache.root(), None);
        assert!(forever.get(&id, &Variant::default()).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(cache(&temp_dir));
        let id = PackageId::new("x/a");

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let cache = cache.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let image = Bytes::from(vec![i; 64 * 1024]);
                cache.put(&id, &Variant::default(), image).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = cache.get(&id, &Variant::default()).await.unwrap();
        assert_eq!(stored.len(), 64 * 1024);
        assert!(stored.iter().all(|b| *b == stored[0]));
        let leftovers = std::fs::read_dir(cache.entry_dir(&id)).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache(&temp_dir);
        cache
            .put(&"x/a".into(), &Variant::default(), Bytes::from_static(b"img"))
            .await
            .unwrap();

        cache.clear().unwrap();
        assert!(!cache.root().exists());
        cache.clear().unwrap();
    }
}
