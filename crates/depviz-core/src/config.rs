//! Runtime configuration shared by every component

use std::path::PathBuf;
use std::time::Duration;

/// Packages whose local copy is older than this are refetched.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache directory name under the user's home.
pub const CACHE_DIR: &str = ".depviz";

/// When a package missing from local storage is downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Fetch only when the Freshness Oracle reports the local copy as stale.
    #[default]
    WhenStale,
    /// Fetch every time resolution signals a fetch is required.
    Always,
}

/// Paths and tunables for a depviz instance. Passed explicitly, never global.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace holding fetched packages under `src/`.
    pub gopath: PathBuf,
    /// Go installation holding the standard distribution under `src/`.
    pub goroot: PathBuf,
    /// Root of the rendered image cache.
    pub cache_dir: PathBuf,
    pub cgo_enabled: bool,
    pub goos: String,
    pub goarch: String,
    pub staleness: Duration,
    pub fetch_policy: FetchPolicy,
    /// Import path prefixes that must be cloned with full history.
    pub full_history_prefixes: Vec<String>,
    /// Graphviz executable and output format.
    pub dot_binary: PathBuf,
    pub image_format: String,
    /// Cached images older than this are regenerated. `None` keeps them forever.
    pub cache_max_age: Option<Duration>,
}

impl Config {
    pub fn new(gopath: impl Into<PathBuf>, goroot: impl Into<PathBuf>) -> Self {
        let gopath = gopath.into();
        Config {
            cache_dir: default_cache_dir(),
            gopath,
            goroot: goroot.into(),
            cgo_enabled: false,
            goos: go_os(std::env::consts::OS).to_string(),
            goarch: go_arch(std::env::consts::ARCH).to_string(),
            staleness: STALENESS_WINDOW,
            fetch_policy: FetchPolicy::default(),
            full_history_prefixes: vec!["gopkg.in".to_string()],
            dot_binary: PathBuf::from("dot"),
            image_format: "png".to_string(),
            cache_max_age: Some(STALENESS_WINDOW),
        }
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn with_cgo(mut self, enabled: bool) -> Self {
        self.cgo_enabled = enabled;
        self
    }

    /// `$GOPATH/src`, where fetched packages live.
    pub fn gopath_src(&self) -> PathBuf {
        self.gopath.join("src")
    }

    /// `$GOROOT/src`, the standard distribution.
    pub fn goroot_src(&self) -> PathBuf {
        self.goroot.join("src")
    }
}

/// `$HOME/.depviz`, or `./.depviz` when no home directory is set.
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_DIR)
}

fn go_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Translate a Rust architecture name into Go's spelling.
fn go_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}
