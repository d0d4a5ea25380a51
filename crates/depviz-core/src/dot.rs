//! DOT serialization of dependency trees

use std::collections::HashSet;

use crate::model::{DependencyNode, DEFAULT_MAX_DEPTH};

/// How a tree is written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotOptions {
    /// Edges deeper than this are not emitted.
    pub max_depth: usize,
    /// Emit one node per source file, clustered under its package.
    pub leaf: bool,
    /// The tree's children are importers of their parent (a reverse tree).
    pub reversed: bool,
}

impl Default for DotOptions {
    fn default() -> Self {
        DotOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            leaf: false,
            reversed: false,
        }
    }
}

/// Quote an identifier as a DOT string.
pub fn quote(id: &str) -> String {
    let mut quoted = String::with_capacity(id.len() + 2);
    quoted.push('"');
    for c in id.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

struct DotWriter<'o> {
    options: &'o DotOptions,
    out: String,
    edges: HashSet<(String, String)>,
    packages: HashSet<String>,
    clusters: usize,
}

impl DotWriter<'_> {
    fn package(&mut self, node: &DependencyNode) {
        if !self.packages.insert(node.id.to_string()) {
            return;
        }
        let id = quote(node.id.as_str());

        if !self.options.leaf || node.files.is_empty() {
            self.out.push_str(&format!("  {};\n", id));
            return;
        }

        self.out.push_str(&format!("  subgraph cluster_{} {{\n", self.clusters));
        self.clusters += 1;
        self.out.push_str(&format!("    label = {};\n", id));
        self.out.push_str(&format!("    {};\n", id));
        for leaf in &node.files {
            let file_id = quote(&format!("{}/{}", node.id, leaf.file_name));
            self.out.push_str(&format!(
                "    {} [label={}, shape=note, group={}];\n",
                file_id,
                quote(&leaf.file_name),
                quote(&leaf.namespace)
            ));
        }
        self.out.push_str("  }\n");
    }

    fn edge(&mut self, from: &str, to: &str) {
        if self.edges.insert((from.to_string(), to.to_string())) {
            self.out
                .push_str(&format!("  {} -> {};\n", quote(from), quote(to)));
        }
    }

    fn walk(&mut self, node: &DependencyNode, depth: usize) {
        self.package(node);
        if depth >= self.options.max_depth {
            return;
        }
        for child in &node.children {
            if self.options.reversed {
                self.edge(child.id.as_str(), node.id.as_str());
            } else {
                self.edge(node.id.as_str(), child.id.as_str());
            }
            self.walk(child, depth + 1);
        }
    }
}

/// Serialize `root` as a `digraph`. Edges always point from importer to imported package.
pub fn render(root: &DependencyNode, options: &DotOptions) -> String {
    let mut writer = DotWriter {
        options,
        out: String::from("digraph depviz {\n  node [shape=box];\n"),
        edges: HashSet::new(),
        packages: HashSet::new(),
        clusters: 0,
    };
    writer.walk(root, 0);
    writer.out.push_str("}\n");
    writer.out
}
