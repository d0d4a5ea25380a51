//! Turning DOT text into an image

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};

/// External graph layout engine.
#[async_trait]
pub trait Layout: Send + Sync {
    async fn render(&self, dot: &str) -> Result<Vec<u8>>;
}

/// Graphviz `dot`, fed on stdin. The child is killed if the future is dropped.
#[derive(Debug, Clone)]
pub struct GraphvizLayout {
    binary: PathBuf,
    format: String,
}

impl GraphvizLayout {
    pub fn new(binary: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        GraphvizLayout {
            binary: binary.into(),
            format: format.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.dot_binary, config.image_format.clone())
    }
}

impl Default for GraphvizLayout {
    fn default() -> Self {
        Self::new("dot", "png")
    }
}

#[async_trait]
impl Layout for GraphvizLayout {
    async fn render(&self, dot: &str) -> Result<Vec<u8>> {
        debug!("running {} -T{}", self.binary.display(), self.format);

        let mut child = Command::new(&self.binary)
            .arg(format!("-T{}", self.format))
            .env_clear()
            .env("PATH", "/usr/bin:/bin")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Render(format!("spawn {}: {}", self.binary.display(), e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Render("layout stdin unavailable".to_string()))?;
        let feed = async move {
            let result = stdin.write_all(dot.as_bytes()).await;
            drop(stdin);
            result
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| Error::Render(format!("wait for layout: {}", e)))?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(Error::Render(format!(
                "{} exited with {}, output: {}",
                self.binary.display(),
                output.status,
                stderr
            )));
        }
        if output.stdout.is_empty() {
            return Err(Error::Render(format!("layout produced no output: {}", stderr)));
        }
        if let Err(e) = fed {
            return Err(Error::Render(format!("write graph to layout: {}", e)));
        }

        Ok(output.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary() {
        let layout = GraphvizLayout::new("/nonexistent/dot", "png");
        let err = layout.render("digraph {}").await.unwrap_err();
        assert!(matches!(err, Error::Render(ref m) if m.starts_with("spawn")));
    }

    #[tokio::test]
    async fn test_failing_tool() {
        let layout = GraphvizLayout::new("false", "png");
        let err = layout.render("digraph {}").await.unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[tokio::test]
    async fn test_empty_output_is_an_error() {
        let layout = GraphvizLayout::new("true", "png");
        let err = layout.render("digraph {}").await.unwrap_err();
        assert!(err.to_string().contains("no output"));
    }
}
