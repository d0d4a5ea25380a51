//! Integration tests for depviz
//!
//! Real GOPATH loading and the HTTP router, with repository downloads and the
//! graph layout step replaced by in-process fakes.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use depviz_core::error::VcsError;
use depviz_core::test_utils::{EchoLayout, FakeLocator};
use depviz_core::vcs::{CloneStrategy, Vcs, VcsKind};
use depviz_core::{
    Config, FreshnessOracle, MetadataResolver, PackageFetcher, RenderCache, RenderService, Throttle,
    TreeBuilder,
};
use depviz_indexer::{BuildContext, GoPathLoader, ParserPool};
use depviz_server::{create_router, ServerState};
use tempfile::TempDir;
use tower::ServiceExt;

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Writes a Go source tree into the destination of every clone.
#[derive(Default)]
struct SourceVcs {
    repos: Mutex<Vec<(String, String, String)>>,
    cloned: Mutex<Vec<String>>,
}

impl SourceVcs {
    /// On clone of `https://{root}`, write `file` with `content` into the repository.
    fn serve(&self, root: &str, file: &str, content: &str) {
        self.repos
            .lock()
            .unwrap()
            .push((format!("https://{}", root), file.to_string(), content.to_string()));
    }

    fn cloned(&self) -> Vec<String> {
        self.cloned.lock().unwrap().clone()
    }
}

#[async_trait]
impl Vcs for SourceVcs {
    async fn clone_repo(
        &self,
        _kind: VcsKind,
        repo: &str,
        dest: &Path,
        _strategy: CloneStrategy,
    ) -> Result<(), VcsError> {
        self.cloned.lock().unwrap().push(repo.to_string());
        fs::create_dir_all(dest.join(".git")).unwrap();
        for (url, file, content) in self.repos.lock().unwrap().iter() {
            if url == repo {
                write(dest, file, content);
            }
        }
        Ok(())
    }

    async fn update(&self, _kind: VcsKind, _dest: &Path) -> Result<(), VcsError> {
        Ok(())
    }

    async fn sync_default(&self, _kind: VcsKind, _dest: &Path) -> Result<(), VcsError> {
        Ok(())
    }
}

/// goroot with `fmt`, a GOPATH with app -> lib -> util, app -> fmt.
fn create_workspace() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(root, "goroot/src/fmt/print.go", "package fmt\n\nimport \"os\"\n");
    write(root, "goroot/src/os/file.go", "package os\n");

    write(
        root,
        "gopath/src/github.com/u/app/main.go",
        "package main\n\nimport (\n\t\"fmt\"\n\t\"github.com/u/lib\"\n)\n\nfunc main() { fmt.Println(lib.X) }\n",
    );
    write(
        root,
        "gopath/src/github.com/u/app/flags.go",
        "package main\n\nimport \"flag\"\n",
    );
    write(root, "goroot/src/flag/flag.go", "package flag\n");
    write(
        root,
        "gopath/src/github.com/u/lib/lib.go",
        "package lib\n\nimport \"github.com/u/util\"\n\nvar X = util.Y\n",
    );
    write(root, "gopath/src/github.com/u/util/util.go", "package util\n\nvar Y = 1\n");

    temp_dir
}

struct Harness {
    router: Router,
    vcs: Arc<SourceVcs>,
    layout: Arc<EchoLayout>,
}

fn harness(workspace: &TempDir) -> Harness {
    let root = workspace.path();
    let config = Config::new(root.join("gopath"), root.join("goroot"))
        .with_cache_dir(root.join("cache"));

    let loader = GoPathLoader::new(
        config.goroot_src(),
        config.gopath_src(),
        BuildContext::new("linux", "amd64", false),
        ParserPool::new(2),
    );
    let vcs = Arc::new(SourceVcs::default());
    let fetcher = PackageFetcher::new(&config, Arc::new(FakeLocator::new()), vcs.clone());
    let builder = TreeBuilder::new(
        Arc::new(MetadataResolver::new(Arc::new(loader))),
        FreshnessOracle::from_config(&config),
        Arc::new(fetcher),
        config.fetch_policy,
    );

    let layout = Arc::new(EchoLayout::new());
    let service = RenderService::new(
        builder,
        RenderCache::from_config(&config),
        Throttle::default(),
        layout.clone(),
    );
    Harness {
        router: create_router(Arc::new(ServerState::new(service))),
        vcs,
        layout,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&body).into_owned())
}

#[tokio::test]
async fn test_render_local_package() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, dot) = get(&h.router, "/github.com/u/app").await;

    assert_eq!(status, StatusCode::OK);
    assert!(dot.starts_with("digraph depviz {"));
    assert!(dot.contains(r#""github.com/u/app" -> "github.com/u/lib";"#));
    assert!(dot.contains(r#""github.com/u/lib" -> "github.com/u/util";"#));
    // Standard packages never appear.
    assert!(!dot.contains(r#""fmt""#));
    assert!(!dot.contains(r#""flag""#));
    assert!(h.vcs.cloned().is_empty());

    assert!(workspace.path().join("cache/github.com/u/app/dot.png").is_file());
}

#[tokio::test]
async fn test_second_request_is_served_from_cache() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (first, _) = get(&h.router, "/github.com/u/app").await;
    let (second, _) = get(&h.router, "/github.com/u/app").await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(h.layout.calls(), 1);
}

#[tokio::test]
async fn test_depth_limits_the_graph() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, dot) = get(&h.router, "/github.com/u/app?depth=1").await;

    assert_eq!(status, StatusCode::OK);
    assert!(dot.contains(r#""github.com/u/app" -> "github.com/u/lib";"#));
    assert!(!dot.contains(r#"-> "github.com/u/util""#));
    // Only the default depth is cached.
    assert!(!workspace.path().join("cache/github.com/u/app").exists());
}

#[tokio::test]
async fn test_leaf_graph_lists_files() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, dot) = get(&h.router, "/github.com/u/app?leaf=true").await;

    assert_eq!(status, StatusCode::OK);
    assert!(dot.contains("subgraph cluster_"));
    assert!(dot.contains(r#""github.com/u/app/main.go""#));
    assert!(dot.contains(r#""github.com/u/app/flags.go""#));
    assert!(workspace.path().join("cache/github.com/u/app/dot_leaf.png").is_file());
}

#[tokio::test]
async fn test_reverse_query() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, dot) = get(&h.router, "/github.com/u/app?reversed=github.com/u/util").await;

    assert_eq!(status, StatusCode::OK);
    assert!(dot.contains(r#""github.com/u/lib" -> "github.com/u/util";"#));
    assert!(dot.contains(r#""github.com/u/app" -> "github.com/u/lib";"#));
}

#[tokio::test]
async fn test_reverse_query_for_unrelated_package() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, body) = get(&h.router, "/github.com/u/lib?reversed=github.com/u/app").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("not_found"));
}

#[tokio::test]
async fn test_missing_dependency_is_downloaded() {
    let workspace = create_workspace();
    write(
        workspace.path(),
        "gopath/src/github.com/u/tool/main.go",
        "package main\n\nimport \"github.com/remote/kit/log\"\n",
    );
    let h = harness(&workspace);
    h.vcs.serve(
        "github.com/remote/kit",
        "log/log.go",
        "package log\n\nimport \"fmt\"\n",
    );

    let (status, dot) = get(&h.router, "/github.com/u/tool").await;

    assert_eq!(status, StatusCode::OK);
    assert!(dot.contains(r#""github.com/u/tool" -> "github.com/remote/kit/log";"#));
    assert_eq!(h.vcs.cloned(), vec!["https://github.com/remote/kit".to_string()]);
    assert!(
        workspace
            .path()
            .join("gopath/src/github.com/remote/kit/log/log.go")
            .is_file()
    );
}

#[tokio::test]
async fn test_unknown_package_is_not_found() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, body) = get(&h.router, "/github.com/nobody/nothing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("github.com/nobody/nothing"));
    assert_eq!(h.vcs.cloned(), vec!["https://github.com/nobody/nothing".to_string()]);
}

#[tokio::test]
async fn test_standard_package_has_no_graph() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, body) = get(&h.router, "/fmt").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("no .go files in fmt"));
}

#[tokio::test]
async fn test_root_and_favicon() {
    let workspace = create_workspace();
    let h = harness(&workspace);

    let (status, body) = get(&h.router, "/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("please provide a valid package path"));

    let (status, _) = get(&h.router, "/favicon.ico").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.layout.calls(), 0);
}
