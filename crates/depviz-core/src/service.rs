//! The render pipeline: throttle, cache, build, serialize, lay out

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::cache::RenderCache;
use crate::config::Config;
use crate::dot::{self, DotOptions};
use crate::error::{Error, Result};
use crate::fetcher::PackageFetcher;
use crate::freshness::FreshnessOracle;
use crate::layout::{GraphvizLayout, Layout};
use crate::locator::ChainLocator;
use crate::model::{PackageId, Variant};
use crate::relations::RelationIndex;
use crate::resolver::{MetadataResolver, SourceLoader};
use crate::throttle::Throttle;
use crate::tree::TreeBuilder;
use crate::vcs::CommandVcs;

/// One graph to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub id: PackageId,
    pub variant: Variant,
}

impl RenderRequest {
    pub fn new(id: impl Into<PackageId>, variant: Variant) -> Self {
        RenderRequest {
            id: id.into(),
            variant,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub image: Bytes,
    /// Served from the render cache without building anything.
    pub cached: bool,
}

/// Shared by every request of a process.
pub struct RenderService {
    builder: TreeBuilder,
    cache: RenderCache,
    throttle: Throttle,
    layout: Arc<dyn Layout>,
}

impl RenderService {
    pub fn new(builder: TreeBuilder, cache: RenderCache, throttle: Throttle, layout: Arc<dyn Layout>) -> Self {
        RenderService {
            builder,
            cache,
            throttle,
            layout,
        }
    }

    /// Production wiring: network locator, `git`/`hg` commands and Graphviz.
    pub fn from_config(config: &Config, loader: Arc<dyn SourceLoader>) -> Self {
        let fetcher = PackageFetcher::new(
            config,
            Arc::new(ChainLocator::default()),
            Arc::new(CommandVcs::new()),
        );
        let builder = TreeBuilder::new(
            Arc::new(MetadataResolver::new(loader)),
            FreshnessOracle::from_config(config),
            Arc::new(fetcher),
            config.fetch_policy,
        );
        Self::new(
            builder,
            RenderCache::from_config(config),
            Throttle::default(),
            Arc::new(GraphvizLayout::from_config(config)),
        )
    }

    pub fn builder(&self) -> &TreeBuilder {
        &self.builder
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// DOT text for a request, fetching packages as needed. Not throttled or cached.
    pub async fn graph(&self, request: &RenderRequest) -> Result<String> {
        let variant = &request.variant;
        let options = DotOptions {
            max_depth: variant.depth,
            leaf: variant.leaf,
            reversed: variant.reversed.is_some(),
        };

        let tree = match &variant.reversed {
            Some(target) => {
                let index = RelationIndex::build(&self.builder, &request.id).await?;
                index.reverse_tree(target, variant.depth).ok_or_else(|| {
                    Error::NotFound(format!(
                        "{} is not imported from {} or has no tracked files",
                        target, request.id
                    ))
                })?
            }
            None => {
                let tree = self.builder.build(&request.id, variant.depth).await?;
                if !tree.has_files() {
                    return Err(Error::NotFound(format!("no .go files in {}", request.id)));
                }
                tree
            }
        };

        Ok(dot::render(&tree, &options))
    }

    /// Image for a request. A failure to persist a fresh image is logged, not returned.
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderOutput> {
        self.throttle.acquire().await;

        if let Some(image) = self.cache.get(&request.id, &request.variant).await {
            debug!("serving {} from cache", request.id);
            return Ok(RenderOutput {
                image,
                cached: true,
            });
        }

        let graph = self.graph(request).await?;
        let image = Bytes::from(self.layout.render(&graph).await?);

        if request.variant.is_canonical() {
            info!("generated image for {} is cacheable", request.id);
            if let Err(e) = self
                .cache
                .put(&request.id, &request.variant, image.clone())
                .await
            {
                warn!("unable to cache image for {}: {}", request.id, e);
            }
        }

        Ok(RenderOutput {
            image,
            cached: false,
        })
    }
}
