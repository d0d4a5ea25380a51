//! Mapping import paths to remote repositories

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::LocateError;
use crate::model::PackageId;
use crate::vcs::VcsKind;

/// Where the repository containing a package lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRoot {
    /// Import path prefix that corresponds to the repository root.
    pub root: String,
    /// Clone URL.
    pub repo: String,
    pub vcs: VcsKind,
}

/// Resolves an import path to its repository.
#[async_trait]
pub trait RepoLocator: Send + Sync {
    async fn locate(&self, id: &PackageId) -> Result<RepoRoot, LocateError>;
}

static VALID_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-~+]*(/[A-Za-z0-9_.\-~+]+)*$").expect("valid import path regex")
});

/// Reject paths that could never name a remote package.
fn validate(id: &PackageId) -> Result<(), LocateError> {
    let path = id.as_str();
    if !VALID_PATH.is_match(path) || id.segments().any(|s| s == "." || s == "..") {
        return Err(LocateError::Invalid(path.to_string()));
    }
    Ok(())
}

/// A hosting site whose import paths map to repositories without a network lookup.
struct KnownHost {
    prefix: &'static str,
    pattern: Regex,
    vcs: VcsKind,
    repo: fn(&str) -> String,
}

fn https_repo(root: &str) -> String {
    format!("https://{}", root)
}

fn googlesource_repo(root: &str) -> String {
    let name = root.trim_start_matches("golang.org/x/");
    format!("https://go.googlesource.com/{}", name)
}

/// Static table of well-known hosts.
pub struct KnownHostLocator {
    hosts: Vec<KnownHost>,
}

impl KnownHostLocator {
    pub fn new() -> Self {
        let host = |prefix: &'static str, pattern: &str, vcs: VcsKind, repo: fn(&str) -> String| KnownHost {
            prefix,
            pattern: Regex::new(pattern).expect("valid host regex"),
            vcs,
            repo,
        };

        KnownHostLocator {
            hosts: vec![
                host(
                    "github.com/",
                    r"^(?P<root>github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                    VcsKind::Git,
                    https_repo,
                ),
                host(
                    "gitlab.com/",
                    r"^(?P<root>gitlab\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                    VcsKind::Git,
                    https_repo,
                ),
                host(
                    "bitbucket.org/",
                    r"^(?P<root>bitbucket\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                    VcsKind::Git,
                    https_repo,
                ),
                host(
                    "golang.org/x/",
                    r"^(?P<root>golang\.org/x/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
                    VcsKind::Git,
                    googlesource_repo,
                ),
                host(
                    "gopkg.in/",
                    r"^(?P<root>gopkg\.in/(?:[A-Za-z0-9][-A-Za-z0-9]*/)?[A-Za-z][-.A-Za-z0-9]*\.v[0-9]+(?:-unstable)?)(/[A-Za-z0-9][-.A-Za-z0-9]*)*$",
                    VcsKind::Git,
                    https_repo,
                ),
            ],
        }
    }
}

impl Default for KnownHostLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoLocator for KnownHostLocator {
    async fn locate(&self, id: &PackageId) -> Result<RepoRoot, LocateError> {
        validate(id)?;
        let path = id.as_str();

        let host = self
            .hosts
            .iter()
            .find(|h| path.starts_with(h.prefix))
            .ok_or_else(|| LocateError::Unrecognized(path.to_string()))?;

        let root = host
            .pattern
            .captures(path)
            .and_then(|c| c.name("root"))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| LocateError::Invalid(path.to_string()))?;

        Ok(RepoRoot {
            repo: (host.repo)(&root),
            root,
            vcs: host.vcs,
        })
    }
}

static GO_IMPORT_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s[^>]*name\s*=\s*["']go-import["'][^>]*content\s*=\s*["']([^"']+)["']"#)
        .expect("valid meta regex")
});

/// Pick the `go-import` meta tag whose prefix covers `path`, preferring the longest.
pub fn parse_go_import(html: &str, path: &str) -> Option<RepoRoot> {
    GO_IMPORT_META
        .captures_iter(html)
        .filter_map(|c| {
            let mut fields = c.get(1)?.as_str().split_whitespace();
            let prefix = fields.next()?;
            let vcs = VcsKind::from_name(fields.next()?)?;
            let repo = fields.next()?;
            let covers = path == prefix || path.starts_with(&format!("{}/", prefix));
            covers.then(|| RepoRoot {
                root: prefix.to_string(),
                repo: repo.to_string(),
                vcs,
            })
        })
        .max_by_key(|r| r.root.len())
}

/// Discovers repositories through `?go-get=1` meta tags, for vanity import paths.
pub struct MetaTagLocator {
    client: reqwest::Client,
}

impl MetaTagLocator {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        MetaTagLocator { client }
    }
}

impl Default for MetaTagLocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepoLocator for MetaTagLocator {
    async fn locate(&self, id: &PackageId) -> Result<RepoRoot, LocateError> {
        validate(id)?;
        let path = id.as_str();
        let url = format!("https://{}?go-get=1", path);
        debug!("fetching go-import meta from {}", url);

        let http_error = |source: reqwest::Error| LocateError::Http {
            path: path.to_string(),
            source,
        };
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(http_error)?
            .text()
            .await
            .map_err(http_error)?;

        parse_go_import(&body, path).ok_or_else(|| LocateError::Unrecognized(path.to_string()))
    }
}

/// Tries each locator in turn and returns the first match.
pub struct ChainLocator {
    locators: Vec<Arc<dyn RepoLocator>>,
}

impl ChainLocator {
    pub fn new(locators: Vec<Arc<dyn RepoLocator>>) -> Self {
        ChainLocator { locators }
    }
}

impl Default for ChainLocator {
    /// Known hosts first, then a network lookup.
    fn default() -> Self {
        ChainLocator::new(vec![
            Arc::new(KnownHostLocator::new()),
            Arc::new(MetaTagLocator::new()),
        ])
    }
}

#[async_trait]
impl RepoLocator for ChainLocator {
    async fn locate(&self, id: &PackageId) -> Result<RepoRoot, LocateError> {
        let mut last_error = LocateError::Unrecognized(id.to_string());
        for locator in &self.locators {
            match locator.locate(id).await {
                Ok(root) => return Ok(root),
                Err(LocateError::Invalid(path)) => return Err(LocateError::Invalid(path)),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}
