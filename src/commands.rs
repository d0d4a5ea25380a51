//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use depviz_core::{Config, RenderCache, RenderRequest, RenderService, Variant};
use depviz_indexer::GoPathLoader;
use depviz_server::{DepvizServer, ServerConfig, ServerState};

/// Assemble the runtime configuration and make sure the cache directory exists.
pub fn build_config(
    gopath: Option<PathBuf>,
    goroot: PathBuf,
    cgo: bool,
    cache_dir: Option<PathBuf>,
) -> anyhow::Result<Config> {
    let gopath = gopath
        .filter(|p| !p.as_os_str().is_empty())
        .context("GOPATH is not set; pass --gopath or export GOPATH")?;

    let mut config = Config::new(gopath, goroot).with_cgo(cgo);
    if let Some(cache_dir) = cache_dir {
        config = config.with_cache_dir(cache_dir);
    }

    std::fs::create_dir_all(&config.cache_dir)
        .with_context(|| format!("create cache dir {}", config.cache_dir.display()))?;

    tracing::info!("GOPATH: {}", config.gopath.display());
    tracing::info!("GOROOT: {}", config.goroot.display());
    tracing::info!("cache: {}", config.cache_dir.display());
    Ok(config)
}

fn service(config: &Config) -> RenderService {
    let loader = Arc::new(GoPathLoader::from_config(config));
    RenderService::from_config(config, loader)
}

pub async fn serve(config: Config, listen: String) -> anyhow::Result<()> {
    tracing::info!("Starting depviz server on {}", listen);

    let state = ServerState::with_image_format(service(&config), &config.image_format);
    let server = DepvizServer::new(state, ServerConfig { listen });
    server.start().await
}

pub async fn render(
    config: Config,
    package: String,
    leaf: bool,
    depth: usize,
    reversed: Option<String>,
    output: PathBuf,
) -> anyhow::Result<()> {
    let request = RenderRequest::new(
        package,
        Variant {
            leaf,
            depth,
            reversed: reversed.map(Into::into),
        },
    );

    let rendered = service(&config)
        .render(&request)
        .await
        .with_context(|| format!("render {}", request.id))?;
    tokio::fs::write(&output, &rendered.image)
        .await
        .with_context(|| format!("write {}", output.display()))?;

    tracing::info!(
        "wrote {} ({} bytes{})",
        output.display(),
        rendered.image.len(),
        if rendered.cached { ", cached" } else { "" }
    );
    Ok(())
}

pub fn clear(config: Config) -> anyhow::Result<()> {
    tracing::info!("Clearing cache: {}", config.cache_dir.display());

    RenderCache::from_config(&config).clear()?;

    tracing::info!("Cache cleared");
    Ok(())
}
