//! Version-control commands used to download packages

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::error::VcsError;

/// Version-control system backing a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
    Mercurial,
    Bazaar,
    Subversion,
}

impl VcsKind {
    /// Parse the short name used in `go-import` meta tags.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "git" => Some(VcsKind::Git),
            "hg" => Some(VcsKind::Mercurial),
            "bzr" => Some(VcsKind::Bazaar),
            "svn" => Some(VcsKind::Subversion),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Mercurial => "hg",
            VcsKind::Bazaar => "bzr",
            VcsKind::Subversion => "svn",
        }
    }
}

/// How much history a fresh clone downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStrategy {
    Shallow,
    Full,
}

/// Clone, update and revision-sync primitives.
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn clone_repo(
        &self,
        kind: VcsKind,
        repo: &str,
        dest: &Path,
        strategy: CloneStrategy,
    ) -> Result<(), VcsError>;

    async fn update(&self, kind: VcsKind, dest: &Path) -> Result<(), VcsError>;

    /// Check out the repository's default revision.
    async fn sync_default(&self, kind: VcsKind, dest: &Path) -> Result<(), VcsError>;
}

/// Runs the `git` and `hg` command-line tools.
///
/// Child processes are killed when the owning future is dropped, so an abandoned request
/// does not leave a clone running.
#[derive(Debug, Clone, Default)]
pub struct CommandVcs;

impl CommandVcs {
    pub fn new() -> Self {
        CommandVcs
    }

    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String, VcsError> {
        let command_line = format!("{} {}", program, args.join(" "));
        info!("{}", command_line);

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let output = command.output().await.map_err(|source| VcsError::Spawn {
            program: program.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(VcsError::Failed {
                command: command_line,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Branch `origin/HEAD` points at, falling back to `master`.
    async fn git_default_branch(&self, dest: &Path) -> String {
        match self
            .run("git", &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"], Some(dest))
            .await
        {
            Ok(head) => head
                .strip_prefix("origin/")
                .unwrap_or(&head)
                .to_string(),
            Err(_) => "master".to_string(),
        }
    }
}

#[async_trait]
impl Vcs for CommandVcs {
    async fn clone_repo(
        &self,
        kind: VcsKind,
        repo: &str,
        dest: &Path,
        strategy: CloneStrategy,
    ) -> Result<(), VcsError> {
        let dest = dest.to_string_lossy();
        let dest = dest.as_ref();
        match (kind, strategy) {
            (VcsKind::Git, CloneStrategy::Shallow) => {
                self.run("git", &["clone", "--depth=1", repo, dest], None).await?;
            }
            (VcsKind::Git, CloneStrategy::Full) => {
                self.run("git", &["clone", repo, dest], None).await?;
            }
            (VcsKind::Mercurial, _) => {
                self.run("hg", &["clone", "-U", repo, dest], None).await?;
            }
            (other, _) => return Err(VcsError::Unsupported(other.name().to_string())),
        }
        Ok(())
    }

    async fn update(&self, kind: VcsKind, dest: &Path) -> Result<(), VcsError> {
        match kind {
            VcsKind::Git => self.run("git", &["pull", "--ff-only"], Some(dest)).await?,
            VcsKind::Mercurial => self.run("hg", &["pull"], Some(dest)).await?,
            other => return Err(VcsError::Unsupported(other.name().to_string())),
        };
        Ok(())
    }

    async fn sync_default(&self, kind: VcsKind, dest: &Path) -> Result<(), VcsError> {
        match kind {
            VcsKind::Git => {
                let branch = self.git_default_branch(dest).await;
                self.run("git", &["checkout", "--quiet", branch.as_str()], Some(dest)).await?;
            }
            VcsKind::Mercurial => {
                self.run("hg", &["update", "default"], Some(dest)).await?;
            }
            other => return Err(VcsError::Unsupported(other.name().to_string())),
        }
        Ok(())
    }
}
