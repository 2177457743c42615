use crate::index::{CallSite, DeclaredSymbol, ImportRecord, Location};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A file that could not be indexed. Recoverable: the file is skipped.
#[derive(Error, Debug)]
pub enum ParseFailure {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load Python grammar: {0}")]
    Language(String),
    #[error("parser produced no syntax tree for {0}")]
    NoTree(PathBuf),
    #[error("syntax error in {path} at line {line}")]
    Syntax { path: PathBuf, line: usize },
}

impl ParseFailure {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ParseFailure::Io { path, .. }
            | ParseFailure::NoTree(path)
            | ParseFailure::Syntax { path, .. } => Some(path),
            ParseFailure::Language(_) => None,
        }
    }
}

/// Result of parsing a source file
#[derive(Debug, Default)]
pub struct ParseResult {
    /// Dotted module path of the file
    pub module: String,

    /// Functions, classes and methods declared in the file
    pub declarations: Vec<DeclaredSymbol>,

    /// Invocation-shaped and reference nodes, unresolved
    pub call_sites: Vec<CallSite>,

    /// Import statements
    pub imports: Vec<ImportRecord>,

    /// Identifier-like tokens seen inside string literals
    pub string_literals: HashSet<String>,

    /// Names listed in the module's `__all__`
    pub exported_names: Vec<String>,

    /// Names referenced inside `if __name__ == "__main__":`
    pub main_guard_names: Vec<String>,
}

impl ParseResult {
    pub fn new(module: String) -> Self {
        Self {
            module,
            ..Self::default()
        }
    }
}

/// Trait for language-specific parsers
pub trait Parser {
    /// Parse a source file and extract declarations, call-sites and imports
    fn parse(
        &mut self,
        path: &Path,
        module: &str,
        contents: &str,
    ) -> Result<ParseResult, ParseFailure>;
}

/// Helper to convert a tree-sitter node span to a Location
pub fn node_location(file: &Path, node: tree_sitter::Node) -> Location {
    let start = node.start_position();
    let end = node.end_position();
    Location::new(
        file.to_path_buf(),
        start.row + 1,    // tree-sitter uses 0-indexed lines
        start.column + 1, // tree-sitter uses 0-indexed columns
        end.row + 1,
    )
}

/// Extract text from a node
pub fn node_text<'a>(node: tree_sitter::Node, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}

/// Whether two handles refer to the same node
pub fn same_node(a: Option<tree_sitter::Node>, b: tree_sitter::Node) -> bool {
    a.map(|a| a.id() == b.id()).unwrap_or(false)
}

/// Iterator over all descendant nodes
pub fn descendants(node: tree_sitter::Node) -> impl Iterator<Item = tree_sitter::Node> {
    DescendantIterator::new(node)
}

/// First line (1-indexed) holding an error or missing node
pub fn first_error_line(root: tree_sitter::Node) -> Option<usize> {
    descendants(root)
        .find(|n| n.is_error() || n.is_missing())
        .map(|n| n.start_position().row + 1)
}

struct DescendantIterator<'a> {
    cursor: tree_sitter::TreeCursor<'a>,
    done: bool,
}

impl<'a> DescendantIterator<'a> {
    fn new(node: tree_sitter::Node<'a>) -> Self {
        Self {
            cursor: node.walk(),
            done: false,
        }
    }
}

impl<'a> Iterator for DescendantIterator<'a> {
    type Item = tree_sitter::Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let node = self.cursor.node();

        // Try to go to first child
        if self.cursor.goto_first_child() {
            return Some(node);
        }

        // Try to go to next sibling
        loop {
            if self.cursor.goto_next_sibling() {
                return Some(node);
            }

            // Go up to parent
            if !self.cursor.goto_parent() {
                self.done = true;
                return Some(node);
            }
        }
    }
}
