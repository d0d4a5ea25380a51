//! Package clause and import extraction from Go syntax trees

use tree_sitter::{Node, Tree};

/// What a single Go file declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoFileSummary {
    pub package: Option<String>,
    /// Import paths in source order, duplicates kept.
    pub imports: Vec<String>,
}

impl GoFileSummary {
    pub fn imports_cgo(&self) -> bool {
        self.imports.iter().any(|i| i == "C")
    }
}

/// Walk the top-level declarations of a parsed file.
pub fn extract(tree: &Tree, source: &str) -> GoFileSummary {
    let mut summary = GoFileSummary::default();
    let root = tree.root_node();
    let mut cursor = root.walk();

    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "package_clause" => {
                let mut inner = child.walk();
                summary.package = child
                    .named_children(&mut inner)
                    .find(|n| n.kind() == "package_identifier")
                    .and_then(|n| text(n, source))
                    .map(str::to_string);
            }
            "import_declaration" => collect_specs(child, source, &mut summary.imports),
            _ => {}
        }
    }

    summary
}

fn collect_specs(node: Node, source: &str, imports: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "import_spec" => {
                if let Some(path) = child
                    .child_by_field_name("path")
                    .and_then(|p| text(p, source))
                    .and_then(unquote)
                {
                    imports.push(path);
                }
            }
            "import_spec_list" => collect_specs(child, source, imports),
            _ => {}
        }
    }
}

fn text<'s>(node: Node, source: &'s str) -> Option<&'s str> {
    node.utf8_text(source.as_bytes()).ok()
}

/// Strip the quotes from an interpreted or raw string literal.
pub fn unquote(literal: &str) -> Option<String> {
    let literal = literal.trim();
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| literal.strip_prefix('`').and_then(|s| s.strip_suffix('`')))?;
    if inner.is_empty() {
        return None;
    }
    Some(inner.replace("\\\\", "\\").replace("\\\"", "\""))
}
