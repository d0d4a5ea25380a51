//! Downloading package sources into the local workspace

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::error::FetchError;
use crate::locator::{RepoLocator, RepoRoot};
use crate::model::PackageId;
use crate::vcs::{CloneStrategy, Vcs, VcsKind};

/// Staging directories are created beside the clone destination with this prefix.
const STAGING_PREFIX: &str = ".depviz-clone-";

/// Ensures a package's repository is present and current under `$GOPATH/src`.
pub struct PackageFetcher {
    locator: Arc<dyn RepoLocator>,
    vcs: Arc<dyn Vcs>,
    src_root: PathBuf,
    full_history_prefixes: Vec<String>,
    /// One mutex per repository root. Packages of the same repository share a checkout.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PackageFetcher {
    pub fn new(config: &Config, locator: Arc<dyn RepoLocator>, vcs: Arc<dyn Vcs>) -> Self {
        PackageFetcher {
            locator,
            vcs,
            src_root: config.gopath_src(),
            full_history_prefixes: config.full_history_prefixes.clone(),
            locks: DashMap::new(),
        }
    }

    /// Shallow clones for git, except for hosts that cannot serve them.
    pub fn strategy(&self, id: &PackageId, root: &RepoRoot) -> CloneStrategy {
        let needs_history = self
            .full_history_prefixes
            .iter()
            .any(|prefix| id.has_prefix(prefix));
        if root.vcs == VcsKind::Git && !needs_history {
            CloneStrategy::Shallow
        } else {
            CloneStrategy::Full
        }
    }

    /// Clone or update the repository containing `id`, then check out its default revision.
    ///
    /// Work on one repository is serialized, whichever of its packages asked for it.
    pub async fn fetch(&self, id: &PackageId) -> Result<(), FetchError> {
        if id.is_cgo() {
            return Ok(());
        }

        let root = self.locator.locate(id).await?;
        if root.root.is_empty() || root.repo.is_empty() {
            return Err(FetchError::EmptyRoot);
        }

        let mutex = self.locks.entry(root.root.clone()).or_default().value().clone();
        let _guard = mutex.lock().await;

        let strategy = self.strategy(id, &root);
        let local_path = PackageId::new(root.root.as_str()).to_path(&self.src_root);
        let parent = local_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.src_root.clone());

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|source| FetchError::CreateDir {
                path: parent.clone(),
                source,
            })?;

        match tokio::fs::metadata(&local_path).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("create {}", root.repo);
                self.clone_into(&root, &parent, &local_path, strategy).await?;
            }
            Err(source) => {
                return Err(FetchError::Stat {
                    path: local_path,
                    source,
                });
            }
            Ok(_) => {
                info!("update {}", root.repo);
                self.vcs
                    .update(root.vcs, &local_path)
                    .await
                    .map_err(FetchError::Update)?;
            }
        }

        self.vcs
            .sync_default(root.vcs, &local_path)
            .await
            .map_err(FetchError::Sync)
    }

    /// Clone into a staging directory and move it to `dest` only once the clone succeeded.
    ///
    /// A failed or abandoned clone never leaves a partial checkout at `dest`; the staging
    /// directory is removed when it goes out of scope.
    async fn clone_into(
        &self,
        root: &RepoRoot,
        parent: &Path,
        dest: &Path,
        strategy: CloneStrategy,
    ) -> Result<(), FetchError> {
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .map_err(|source| FetchError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        let checkout = staging.path().join("checkout");

        self.vcs
            .clone_repo(root.vcs, &root.repo, &checkout, strategy)
            .await
            .map_err(FetchError::Clone)?;

        tokio::fs::rename(&checkout, dest)
            .await
            .map_err(|source| FetchError::Install {
                path: dest.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LocateError, VcsError};
    use crate::test_utils::{FakeLocator, FakeVcs, MemoryLoader};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fetcher(temp_dir: &TempDir, locator: FakeLocator, vcs: Arc<FakeVcs>) -> PackageFetcher {
        let config = Config::new(temp_dir.path(), "/usr/local/go");
        PackageFetcher::new(&config, Arc::new(locator), vcs)
    }

    #[tokio::test]
    async fn test_cgo_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        let locator = FakeLocator::new();
        let calls = locator.calls();
        fetcher(&temp_dir, locator, vcs.clone())
            .fetch(&PackageId::new("C"))
            .await
            .unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(vcs.commands().is_empty());
    }

    #[tokio::test]
    async fn test_clone_then_update() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        let fetcher = fetcher(&temp_dir, FakeLocator::new(), vcs.clone());
        let id = PackageId::new("github.com/a/b/sub");

        fetcher.fetch(&id).await.unwrap();
        assert!(temp_dir.path().join("src/github.com/a").is_dir());
        fetcher.fetch(&id).await.unwrap();

        assert_eq!(
            vcs.commands(),
            vec![
                "clone shallow github.com/a/b".to_string(),
                "sync github.com/a/b".to_string(),
                "update github.com/a/b".to_string(),
                "sync github.com/a/b".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_history_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        let fetcher = fetcher(&temp_dir, FakeLocator::new(), vcs.clone());

        fetcher.fetch(&PackageId::new("gopkg.in/yaml.v2")).await.unwrap();
        assert_eq!(vcs.commands()[0], "clone full gopkg.in/yaml.v2");
    }

    #[tokio::test]
    async fn test_locate_failure_is_wrapped() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        let locator = FakeLocator::new();
        locator.reject("example.com/nope");
        let err = fetcher(&temp_dir, locator, vcs)
            .fetch(&PackageId::new("example.com/nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Locate(LocateError::Unrecognized(_))));
    }

    #[tokio::test]
    async fn test_clone_failure_names_the_step() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        vcs.fail_clones();
        let err = fetcher(&temp_dir, FakeLocator::new(), vcs)
            .fetch(&PackageId::new("github.com/a/b"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Clone(VcsError::Unsupported(_))));
        assert!(err.to_string().starts_with("vcs create"));
    }

    fn staging_dirs(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(STAGING_PREFIX))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_no_checkout() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        let fetcher = fetcher(&temp_dir, FakeLocator::new(), vcs.clone());
        let id = PackageId::new("github.com/a/b");

        vcs.fail_clones();
        assert!(fetcher.fetch(&id).await.is_err());
        assert!(!temp_dir.path().join("src/github.com/a/b").exists());
        assert!(staging_dirs(&temp_dir.path().join("src/github.com/a")).is_empty());

        // The next attempt clones again instead of updating a broken checkout.
        vcs.succeed_clones();
        fetcher.fetch(&id).await.unwrap();
        assert_eq!(vcs.clone_count(), 2);
        assert!(temp_dir.path().join("src/github.com/a/b/.git").is_dir());
    }

    #[tokio::test]
    async fn test_abandoned_clone_leaves_no_checkout() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        let fetcher = fetcher(&temp_dir, FakeLocator::new(), vcs.clone());
        let id = PackageId::new("github.com/a/b");

        vcs.slow_clones(Duration::from_millis(500));
        let abandoned = tokio::time::timeout(Duration::from_millis(20), fetcher.fetch(&id)).await;
        assert!(abandoned.is_err());
        assert!(!temp_dir.path().join("src/github.com/a/b").exists());
        assert!(staging_dirs(&temp_dir.path().join("src/github.com/a")).is_empty());

        vcs.slow_clones(Duration::ZERO);
        fetcher.fetch(&id).await.unwrap();
        assert_eq!(vcs.clone_count(), 2);
    }

    #[tokio::test]
    async fn test_packages_of_one_repository_share_a_checkout() {
        let temp_dir = TempDir::new().unwrap();
        let vcs = Arc::new(FakeVcs::new(temp_dir.path().join("src"), Arc::new(MemoryLoader::new())));
        let fetcher = fetcher(&temp_dir, FakeLocator::new(), vcs.clone());
        vcs.slow_clones(Duration::from_millis(100));

        let id_a = PackageId::new("github.com/u/r/a");
        let id_b = PackageId::new("github.com/u/r/b");
        let (a, b) = tokio::join!(fetcher.fetch(&id_a), fetcher.fetch(&id_b));
        a.unwrap();
        b.unwrap();

        assert_eq!(vcs.clone_count(), 1);
        assert_eq!(
            vcs.commands(),
            vec![
                "clone shallow github.com/u/r".to_string(),
                "sync github.com/u/r".to_string(),
                "update github.com/u/r".to_string(),
                "sync github.com/u/r".to_string(),
            ]
        );
    }
}
