//! Staleness checks for locally stored packages

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::Config;
use crate::model::PackageId;

/// Name of the version-control metadata directory that carries the freshness timestamp.
const VCS_DIR: &str = ".git";

/// Decides from local timestamps whether a package must be downloaded again.
#[derive(Debug, Clone)]
pub struct FreshnessOracle {
    src_root: PathBuf,
    window: Duration,
}

impl FreshnessOracle {
    pub fn new(src_root: impl Into<PathBuf>, window: Duration) -> Self {
        FreshnessOracle {
            src_root: src_root.into(),
            window,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.gopath_src(), config.staleness)
    }

    /// A package is stale when its repository metadata is missing or older than the window.
    ///
    /// Packages without git metadata (absent, or under another VCS) are always stale so that
    /// a fetch is attempted instead of building from a partial tree.
    pub fn is_stale(&self, id: &PackageId) -> bool {
        match self.age(id) {
            Some(age) => age > self.window,
            None => true,
        }
    }

    /// Time since the package's repository metadata was last modified.
    pub fn age(&self, id: &PackageId) -> Option<Duration> {
        let vcs_dir = self.vcs_dir(id)?;
        let modified = std::fs::metadata(&vcs_dir)
            .and_then(|m| m.modified())
            .ok()?;
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default(),
        )
    }

    /// Nearest `.git` directory between the package directory and the source root.
    ///
    /// Sub-packages share the metadata of the repository that contains them.
    fn vcs_dir(&self, id: &PackageId) -> Option<PathBuf> {
        let package_dir = id.to_path(&self.src_root);
        package_dir
            .ancestors()
            .take_while(|dir| *dir != self.src_root.as_path() && dir.starts_with(&self.src_root))
            .map(|dir: &Path| dir.join(VCS_DIR))
            .find(|candidate| candidate.is_dir())
    }
}
