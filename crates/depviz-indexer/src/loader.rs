//! Reading Go packages from `$GOROOT/src` and `$GOPATH/src`

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use depviz_core::{Config, LoadError, PackageId, PackageMetadata, SourceLoader};
use tracing::{debug, warn};

use crate::constraints::BuildContext;
use crate::imports::{self, GoFileSummary};
use crate::parser_pool::{create_parser_pool, ParseRequest, ParserPool};

/// Loads package structure the way the Go tool locates packages in GOPATH mode.
///
/// The standard distribution is searched first; a hit there marks the package standard.
pub struct GoPathLoader {
    goroot_src: PathBuf,
    gopath_src: PathBuf,
    context: BuildContext,
    pool: ParserPool,
}

impl GoPathLoader {
    pub fn new(
        goroot_src: impl Into<PathBuf>,
        gopath_src: impl Into<PathBuf>,
        context: BuildContext,
        pool: ParserPool,
    ) -> Self {
        GoPathLoader {
            goroot_src: goroot_src.into(),
            gopath_src: gopath_src.into(),
            context,
            pool,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.goroot_src(),
            config.gopath_src(),
            BuildContext::from_config(config),
            create_parser_pool(),
        )
    }

    /// Whether a directory entry is a candidate source file, judged by name alone.
    fn is_source_name(&self, name: &str) -> bool {
        name.ends_with(".go")
            && !name.ends_with("_test.go")
            && !name.starts_with('_')
            && !name.starts_with('.')
            && self.context.matches_file_name(name)
    }

    fn summarize(&self, path: &Path) -> Result<Option<GoFileSummary>, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match self.context.matches_header(&content) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                return Ok(None);
            }
        }

        let parsed = self
            .pool
            .parse_blocking(ParseRequest {
                content,
                path: path.to_path_buf(),
            })
            .map_err(|e| LoadError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let summary = imports::extract(&parsed.tree, &parsed.content);

        if summary.imports_cgo() && !self.context.cgo_enabled {
            debug!("skipping cgo file {}", path.display());
            return Ok(None);
        }
        Ok(Some(summary))
    }

    /// Buildable files and their imports in `dir`, or `None` if the directory does not exist.
    fn scan(&self, id: &PackageId, dir: &Path, standard: bool) -> Result<Option<PackageMetadata>, LoadError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(LoadError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LoadError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_file && self.is_source_name(&name) {
                names.push(name);
            }
        }
        names.sort();

        let mut files = Vec::new();
        let mut imports = BTreeSet::new();
        for name in names {
            let Some(summary) = self.summarize(&dir.join(&name))? else {
                continue;
            };
            if summary.package.as_deref() == Some("documentation") {
                continue;
            }
            imports.extend(summary.imports.into_iter().map(PackageId::new));
            files.push(name);
        }

        if files.is_empty() {
            return Err(LoadError::NotFound(format!(
                "no buildable Go source files in {}",
                dir.display()
            )));
        }

        Ok(Some(PackageMetadata {
            id: id.clone(),
            files,
            imports: imports.into_iter().collect(),
            standard,
        }))
    }
}

impl SourceLoader for GoPathLoader {
    fn load(&self, id: &PackageId) -> Result<PackageMetadata, LoadError> {
        if id.is_cgo() || id.segments().next().is_none() {
            return Err(LoadError::NotFound(id.to_string()));
        }

        for (root, standard) in [(&self.goroot_src, true), (&self.gopath_src, false)] {
            let dir = id.to_path(root);
            if let Some(metadata) = self.scan(id, &dir, standard)? {
                debug!(
                    "loaded {} from {} ({} files, {} imports)",
                    id,
                    dir.display(),
                    metadata.files.len(),
                    metadata.imports.len()
                );
                return Ok(metadata);
            }
        }

        Err(LoadError::NotFound(format!(
            "cannot find package {:?} in {} or {}",
            id.as_str(),
            self.goroot_src.display(),
            self.gopath_src.display()
        )))
    }
}
