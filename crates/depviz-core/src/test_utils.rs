//! Test doubles for the engine's external capabilities

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, LoadError, LocateError, Result, VcsError};
use crate::layout::Layout;
use crate::locator::{RepoLocator, RepoRoot};
use crate::model::{PackageId, PackageMetadata};
use crate::resolver::SourceLoader;
use crate::vcs::{CloneStrategy, Vcs, VcsKind};

/// Build metadata from string slices.
pub fn metadata(id: &str, files: &[&str], imports: &[&str]) -> PackageMetadata {
    PackageMetadata {
        id: PackageId::new(id),
        files: files.iter().map(|f| f.to_string()).collect(),
        imports: imports.iter().map(|i| PackageId::new(*i)).collect(),
        standard: false,
    }
}

/// In-memory package store that counts loads.
#[derive(Default)]
pub struct MemoryLoader {
    packages: Mutex<HashMap<PackageId, PackageMetadata>>,
    failing: Mutex<HashSet<PackageId>>,
    loads: Mutex<HashMap<PackageId, usize>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, metadata: PackageMetadata) {
        self.packages
            .lock()
            .unwrap()
            .insert(metadata.id.clone(), metadata);
    }

    pub fn add(&self, id: &str, files: &[&str], imports: &[&str]) {
        self.insert(metadata(id, files, imports));
    }

    pub fn add_standard(&self, id: &str, imports: &[&str]) {
        let mut m = metadata(id, &["std.go"], imports);
        m.standard = true;
        self.insert(m);
    }

    /// Make loads of `id` fail with an I/O error.
    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(PackageId::new(id));
    }

    pub fn load_count(&self, id: &str) -> usize {
        self.loads
            .lock()
            .unwrap()
            .get(&PackageId::new(id))
            .copied()
            .unwrap_or(0)
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, id: &PackageId) -> std::result::Result<PackageMetadata, LoadError> {
        *self.loads.lock().unwrap().entry(id.clone()).or_insert(0) += 1;

        if self.failing.lock().unwrap().contains(id) {
            return Err(LoadError::Io {
                path: PathBuf::from(id.as_str()),
                source: std::io::Error::other("simulated failure"),
            });
        }

        self.packages
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(id.to_string()))
    }
}

/// Maps `host/user/repo/...` to `host/user/repo`, git, without the network.
#[derive(Default)]
pub struct FakeLocator {
    calls: Arc<AtomicUsize>,
    rejected: Mutex<HashSet<String>>,
}

impl FakeLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn reject(&self, path: &str) {
        self.rejected.lock().unwrap().insert(path.to_string());
    }
}

#[async_trait]
impl RepoLocator for FakeLocator {
    async fn locate(&self, id: &PackageId) -> std::result::Result<RepoRoot, LocateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rejected.lock().unwrap().contains(id.as_str()) {
            return Err(LocateError::Unrecognized(id.to_string()));
        }
        let root = id.segments().take(3).collect::<Vec<_>>().join("/");
        Ok(RepoRoot {
            repo: format!("https://{}", root),
            root,
            vcs: VcsKind::Git,
        })
    }
}

/// Records commands and publishes queued packages into a `MemoryLoader` on clone.
///
/// Like `git clone`, a clone refuses an existing destination and creates `.git` before
/// it finishes.
pub struct FakeVcs {
    src_root: PathBuf,
    loader: Arc<MemoryLoader>,
    pending: Mutex<HashMap<String, Vec<PackageMetadata>>>,
    commands: Mutex<Vec<String>>,
    fail_clones: AtomicBool,
    clone_delay: Mutex<Duration>,
}

impl FakeVcs {
    pub fn new(src_root: impl Into<PathBuf>, loader: Arc<MemoryLoader>) -> Self {
        FakeVcs {
            src_root: src_root.into(),
            loader,
            pending: Mutex::new(HashMap::new()),
            commands: Mutex::new(Vec::new()),
            fail_clones: AtomicBool::new(false),
            clone_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Make `metadata` loadable once the repository `root` is cloned.
    pub fn publish_on_clone(&self, root: &str, metadata: PackageMetadata) {
        self.pending
            .lock()
            .unwrap()
            .entry(root.to_string())
            .or_default()
            .push(metadata);
    }

    /// Clones leave a partial `.git` behind and then fail.
    pub fn fail_clones(&self) {
        self.fail_clones.store(true, Ordering::SeqCst);
    }

    pub fn succeed_clones(&self) {
        self.fail_clones.store(false, Ordering::SeqCst);
    }

    /// Clones take `delay` between creating the destination and finishing.
    pub fn slow_clones(&self, delay: Duration) {
        *self.clone_delay.lock().unwrap() = delay;
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clone_count(&self) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.starts_with("clone"))
            .count()
    }

    fn root_of(&self, dest: &Path) -> String {
        dest.strip_prefix(&self.src_root)
            .unwrap_or(dest)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn clone_repo(
        &self,
        _kind: VcsKind,
        repo: &str,
        dest: &Path,
        strategy: CloneStrategy,
    ) -> std::result::Result<(), VcsError> {
        let root = repo.strip_prefix("https://").unwrap_or(repo).to_string();
        let strategy = match strategy {
            CloneStrategy::Shallow => "shallow",
            CloneStrategy::Full => "full",
        };
        self.commands
            .lock()
            .unwrap()
            .push(format!("clone {} {}", strategy, root));

        if dest.exists() {
            return Err(VcsError::Unsupported(format!(
                "destination {} already exists",
                dest.display()
            )));
        }
        std::fs::create_dir_all(dest.join(".git")).map_err(|source| VcsError::Spawn {
            program: "fake".to_string(),
            source,
        })?;

        let delay = *self.clone_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_clones.load(Ordering::SeqCst) {
            return Err(VcsError::Unsupported("fake".to_string()));
        }

        let published = self.pending.lock().unwrap().remove(&root).unwrap_or_default();
        for metadata in published {
            self.loader.insert(metadata);
        }
        Ok(())
    }

    async fn update(&self, _kind: VcsKind, dest: &Path) -> std::result::Result<(), VcsError> {
        let root = self.root_of(dest);
        self.commands.lock().unwrap().push(format!("update {}", root));
        Ok(())
    }

    async fn sync_default(&self, _kind: VcsKind, dest: &Path) -> std::result::Result<(), VcsError> {
        let root = self.root_of(dest);
        self.commands.lock().unwrap().push(format!("sync {}", root));
        Ok(())
    }
}

/// Layout that echoes the DOT text back as the "image".
#[derive(Default)]
pub struct EchoLayout {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl EchoLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Layout for EchoLayout {
    async fn render(&self, dot: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Render("layout failed".to_string()));
        }
        Ok(dot.as_bytes().to_vec())
    }
}

/// Tree builder over `loader` whose downloads go through a `FakeVcs` rooted at `gopath/src`.
pub fn tree_builder(
    gopath: &Path,
    loader: Arc<MemoryLoader>,
) -> (crate::tree::TreeBuilder, Arc<FakeVcs>) {
    use crate::config::Config;
    use crate::fetcher::PackageFetcher;
    use crate::freshness::FreshnessOracle;
    use crate::resolver::MetadataResolver;

    let config = Config::new(gopath, "/usr/local/go");
    let vcs = Arc::new(FakeVcs::new(config.gopath_src(), loader.clone()));
    let fetcher = PackageFetcher::new(&config, Arc::new(FakeLocator::new()), vcs.clone());
    let builder = crate::tree::TreeBuilder::new(
        Arc::new(MetadataResolver::new(loader)),
        FreshnessOracle::from_config(&config),
        Arc::new(fetcher),
        config.fetch_policy,
    );
    (builder, vcs)
}
