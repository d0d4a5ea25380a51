//! HTTP server rendering package dependency graphs

pub mod handlers;
pub mod router;


use std::sync::Arc;

use depviz_core::RenderService;
use tokio::net::TcpListener;

pub use router::create_router;

/// State shared by every request handler
pub struct ServerState {
    pub service: RenderService,
    /// `Content-Type` of rendered images
    pub content_type: &'static str,
}

impl ServerState {
    pub fn new(service: RenderService) -> Self {
        Self::with_image_format(service, "png")
    }

    pub fn with_image_format(service: RenderService, format: &str) -> Self {
        let content_type = match format {
            "png" => "image/png",
            "svg" => "image/svg+xml",
            "gif" => "image/gif",
            "jpg" | "jpeg" => "image/jpeg",
            "pdf" => "application/pdf",
            _ => "application/octet-stream",
        };
        ServerState {
            service,
            content_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, such as `localhost:3245`
    pub listen: String,
}

pub struct DepvizServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl DepvizServer {
    pub fn new(state: ServerState, config: ServerConfig) -> Self {
        DepvizServer {
            state: Arc::new(state),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Serve until Ctrl-C. In-flight requests are allowed to finish.
    pub async fn start(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        tracing::info!("listening on {}", listener.local_addr()?);

        axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
