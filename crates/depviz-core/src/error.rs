//! Error types for depviz operations.
//!
//! Errors are grouped the way the HTTP surface reports them:
//!
//! - **not found**: the package has no resolvable source or no tracked files
//! - **fetch**: locating, cloning, updating or syncing a repository failed
//! - **render**: the layout tool failed or produced nothing
//! - **cache**: a cache directory or file could not be written
//!
//! Everything else (cycles, panicked blocking tasks) is internal.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::PackageId;

/// Result type for depviz operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for a render request.
#[derive(Debug, Error)]
pub enum Error {
    /// No package, or no source files, for the identifier.
    #[error("package not found: {0}")]
    NotFound(String),

    /// The import relation looped back onto the current path.
    #[error("import cycle detected: {}", format_cycle(.0))]
    Cycle(Vec<PackageId>),

    #[error("download package {id}: {source}")]
    Fetch {
        id: PackageId,
        #[source]
        source: FetchError,
    },

    #[error("load package {id}: {source}")]
    Load {
        id: PackageId,
        #[source]
        source: LoadError,
    },

    #[error("render graph: {0}")]
    Render(String),

    #[error("cache I/O error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn format_cycle(path: &[PackageId]) -> String {
    path.iter()
        .map(PackageId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure category, used for logging and the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Fetch,
    Render,
    Cache,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Render => "render",
            ErrorKind::Cache => "cache",
            ErrorKind::Internal => "internal",
        }
    }

    /// The request itself was at fault (4xx rather than 5xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ErrorKind::NotFound)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::Load { .. } => ErrorKind::Internal,
            Error::Render(_) => ErrorKind::Render,
            Error::Cache(_) => ErrorKind::Cache,
            Error::Cycle(_) | Error::Join(_) => ErrorKind::Internal,
        }
    }
}

/// Failure of one step of a package download.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("repo root for import path: {0}")]
    Locate(#[from] LocateError),

    #[error("empty repo root")]
    EmptyRoot,

    #[error("mkdir all {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vcs create: {0}")]
    Clone(#[source] VcsError),

    #[error("move clone into {}: {source}", .path.display())]
    Install {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vcs download: {0}")]
    Update(#[source] VcsError),

    #[error("vcs tag sync: {0}")]
    Sync(#[source] VcsError),
}

/// Failure to map an import path to a repository.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("unrecognized import path {0:?}")]
    Unrecognized(String),

    #[error("invalid import path {0:?}")]
    Invalid(String),

    #[error("fetch go-import meta for {path}: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure of a version-control command.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("{0} repositories are not supported")]
    Unsupported(String),

    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Failure to read a package from local storage.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Nothing usable at the expected location. Triggers a fetch.
    #[error("cannot find package {0:?}")]
    NotFound(String),

    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert!(Error::NotFound("x".into()).kind().is_client_error());

        let fetch = Error::Fetch {
            id: PackageId::new("a/b"),
            source: FetchError::EmptyRoot,
        };
        assert_eq!(fetch.kind(), ErrorKind::Fetch);
        assert!(!fetch.kind().is_client_error());
        assert_eq!(fetch.to_string(), "download package a/b: empty repo root");
    }

    #[test]
    fn test_cycle_message() {
        let err = Error::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "import cycle detected: a -> b -> a");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
