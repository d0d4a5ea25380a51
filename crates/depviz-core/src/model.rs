//! Core data structures for package graphs

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Depth used when a request does not ask for one. Only this depth is cacheable.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// A Go import path such as `github.com/user/repo/sub`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId(String);

impl PackageId {
    /// The cgo pseudo-package. Never loaded, fetched or expanded.
    pub const CGO: &'static str = "C";

    pub fn new(path: impl Into<String>) -> Self {
        PackageId(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_cgo(&self) -> bool {
        self.0 == Self::CGO
    }

    /// Last path segment, used as the namespace of file leaves.
    pub fn short_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Non-empty path components.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Join the identifier onto a base directory, one path segment per component.
    ///
    /// `.` and `..` components are dropped so a crafted identifier cannot escape `base`.
    pub fn to_path(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        for segment in self.segments().filter(|s| *s != "." && *s != "..") {
            path.push(segment);
        }
        path
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageId {
    fn from(s: &str) -> Self {
        PackageId::new(s)
    }
}

impl From<String> for PackageId {
    fn from(s: String) -> Self {
        PackageId(s)
    }
}

/// Structural metadata of a single package, memoized by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: PackageId,
    /// Buildable source files, sorted.
    pub files: Vec<String>,
    /// Direct imports, sorted and deduplicated.
    pub imports: Vec<PackageId>,
    /// Part of the standard distribution (`$GOROOT/src`).
    pub standard: bool,
}

/// A source file shown under its owning package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLeaf {
    pub file_name: String,
    /// Short name of the owning package.
    pub namespace: String,
}

/// One package within a single traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub id: PackageId,
    pub children: Vec<DependencyNode>,
    pub files: Vec<FileLeaf>,
}

impl DependencyNode {
    pub fn new(id: PackageId) -> Self {
        DependencyNode {
            id,
            children: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: DependencyNode) {
        self.children.push(child);
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Attach every file of `metadata` as a leaf entry.
    pub fn attach_files(&mut self, metadata: &PackageMetadata) {
        let namespace = metadata.id.short_name().to_string();
        self.files.extend(metadata.files.iter().map(|f| FileLeaf {
            file_name: f.clone(),
            namespace: namespace.clone(),
        }));
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.height() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Pre-order search for the first node with the given identifier.
    pub fn find(&self, id: &PackageId) -> Option<&DependencyNode> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

/// How the rendered graph is scoped. Also the cache key suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    /// Include one node per source file.
    pub leaf: bool,
    pub depth: usize,
    /// Render the importers of this package instead of the root's imports.
    pub reversed: Option<PackageId>,
}

impl Variant {
    pub fn canonical(leaf: bool) -> Self {
        Variant {
            leaf,
            depth: DEFAULT_MAX_DEPTH,
            reversed: None,
        }
    }

    /// Only full-depth forward graphs are cached.
    pub fn is_canonical(&self) -> bool {
        self.depth == DEFAULT_MAX_DEPTH && self.reversed.is_none()
    }

    /// Image file name inside a package's cache directory.
    pub fn file_name(&self) -> &'static str {
        if self.leaf { "dot_leaf.png" } else { "dot.png" }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Variant::canonical(false)
    }
}
