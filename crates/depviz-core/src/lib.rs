//! Depviz Core: package resolution, dependency trees, rendering and caching

pub mod cache;
pub mod config;
pub mod dot;
pub mod error;
pub mod fetcher;
pub mod freshness;
pub mod layout;
pub mod locator;
pub mod model;
pub mod relations;
pub mod resolver;
pub mod service;
pub mod throttle;
pub mod tree;
pub mod vcs;


#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cache::RenderCache;
pub use config::{Config, FetchPolicy};
pub use dot::{render as render_dot, DotOptions};
pub use error::{Error, ErrorKind, FetchError, LoadError, Result};
pub use fetcher::PackageFetcher;
pub use freshness::FreshnessOracle;
pub use layout::{GraphvizLayout, Layout};
pub use model::{DependencyNode, FileLeaf, PackageId, PackageMetadata, Variant, DEFAULT_MAX_DEPTH};
pub use relations::RelationIndex;
pub use resolver::{MetadataResolver, Resolution, SourceLoader};
pub use service::{RenderOutput, RenderRequest, RenderService};
pub use throttle::Throttle;
pub use tree::TreeBuilder;
