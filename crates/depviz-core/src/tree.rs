//! Depth-bounded dependency trees

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::FetchPolicy;
use crate::error::{Error, Result};
use crate::fetcher::PackageFetcher;
use crate::freshness::FreshnessOracle;
use crate::model::{DependencyNode, PackageId, PackageMetadata};
use crate::resolver::{MetadataResolver, Resolution};

/// Result of visiting one import.
enum Branch {
    Node(DependencyNode),
    /// Standard-distribution package; the parent drops it.
    Standard,
}

type BranchFuture<'a> = Pin<Box<dyn Future<Output = Result<Branch>> + Send + 'a>>;

/// Composes dependency trees from resolved metadata, fetching packages on demand.
pub struct TreeBuilder {
    resolver: Arc<MetadataResolver>,
    oracle: FreshnessOracle,
    fetcher: Arc<PackageFetcher>,
    policy: FetchPolicy,
}

impl TreeBuilder {
    pub fn new(
        resolver: Arc<MetadataResolver>,
        oracle: FreshnessOracle,
        fetcher: Arc<PackageFetcher>,
        policy: FetchPolicy,
    ) -> Self {
        TreeBuilder {
            resolver,
            oracle,
            fetcher,
            policy,
        }
    }

    pub fn resolver(&self) -> &Arc<MetadataResolver> {
        &self.resolver
    }

    /// Metadata for `id`, downloading the package at most once if it is not available locally.
    ///
    /// The per-identifier lock is held from the first resolution until the package is
    /// memoized, so concurrent callers share a single fetch.
    pub async fn ensure(&self, id: &PackageId) -> Result<Arc<PackageMetadata>> {
        if let Some(metadata) = self.resolver.cached(id) {
            return Ok(metadata);
        }

        let _guard = self.resolver.lock(id).await;
        if let Resolution::Found(metadata) = self.resolver.resolve(id).await? {
            return Ok(metadata);
        }

        let should_fetch = match self.policy {
            FetchPolicy::Always => true,
            FetchPolicy::WhenStale => self.oracle.is_stale(id),
        };
        if should_fetch {
            info!("downloading {}", id);
            self.fetcher
                .fetch(id)
                .await
                .map_err(|source| Error::Fetch {
                    id: id.clone(),
                    source,
                })?;
        } else {
            debug!("{} is fresh, not downloading", id);
        }

        match self.resolver.resolve(id).await? {
            Resolution::Found(metadata) => Ok(metadata),
            Resolution::FetchRequired => Err(Error::NotFound(format!(
                "cannot find package {} after download",
                id
            ))),
        }
    }

    /// Build the tree rooted at `id`. No root-to-leaf path is longer than `max_depth` edges.
    ///
    /// A standard-distribution root yields a node with no children and no files.
    pub async fn build(&self, id: &PackageId, max_depth: usize) -> Result<DependencyNode> {
        let mut path = Vec::new();
        match self.branch(id.clone(), 0, max_depth, &mut path).await? {
            Branch::Node(node) => Ok(node),
            Branch::Standard => Ok(DependencyNode::new(id.clone())),
        }
    }

    fn branch<'a>(
        &'a self,
        id: PackageId,
        depth: usize,
        max_depth: usize,
        path: &'a mut Vec<PackageId>,
    ) -> BranchFuture<'a> {
        Box::pin(async move {
            if depth > max_depth || id.is_cgo() {
                return Ok(Branch::Node(DependencyNode::new(id)));
            }

            if path.contains(&id) {
                path.push(id);
                return Err(Error::Cycle(path.clone()));
            }

            let metadata = self.ensure(&id).await?;
            if metadata.standard {
                return Ok(Branch::Standard);
            }

            let mut node = DependencyNode::new(id);
            node.attach_files(&metadata);

            if depth < max_depth {
                path.push(node.id.clone());
                for import in &metadata.imports {
                    match self.branch(import.clone(), depth + 1, max_depth, path).await? {
                        Branch::Node(child) => node.add_child(child),
                        Branch::Standard => continue,
                    }
                }
                path.pop();
            }

            Ok(Branch::Node(node))
        })
    }
}
