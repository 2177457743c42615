use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Method,
}

impl SymbolKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
        }
    }
}

/// Visibility by naming convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    /// `_name` and `__name` are private; dunder names are not
    pub fn from_name(name: &str) -> Self {
        if name.starts_with('_') && !is_dunder(name) {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}

/// `__init__`, `__call__`, ...
pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Location in source code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path
    pub file: PathBuf,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
    /// Last line of the node (1-indexed)
    pub end_line: usize,
}

impl Location {
    pub fn new(file: PathBuf, line: usize, column: usize, end_line: usize) -> Self {
        Self {
            file,
            line,
            column,
            end_line,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// A function, class or method declared in the source tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredSymbol {
    /// Simple name (e.g. "load_config")
    pub name: String,

    /// Dotted qualified name (e.g. "app.settings.Loader.load_config")
    pub qualified_name: String,

    pub kind: SymbolKind,

    pub visibility: Visibility,

    pub location: Location,

    /// Enclosing class name, for methods
    pub enclosing_class: Option<String>,

    /// Decorator expressions, without the leading `@`
    pub decorators: Vec<String>,

    /// Invoked by the runtime or a test runner by convention
    pub is_entry_point: bool,

    /// Listed in the module's `__all__`
    pub exported: bool,
}

impl DeclaredSymbol {
    pub fn new(
        name: String,
        qualified_name: String,
        kind: SymbolKind,
        location: Location,
    ) -> Self {
        let visibility = Visibility::from_name(&name);
        Self {
            name,
            qualified_name,
            kind,
            visibility,
            location,
            enclosing_class: None,
            decorators: Vec::new(),
            is_entry_point: false,
            exported: false,
        }
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// Check if this symbol matches a retain pattern
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        if let Some(suffix) = pattern.strip_prefix('*') {
            self.name.ends_with(suffix)
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            self.name.starts_with(prefix)
        } else {
            self.name == pattern || self.qualified_name == pattern
        }
    }

    /// Get a display string for this symbol
    pub fn display(&self) -> String {
        format!(
            "{} {} ({})",
            self.kind.display_name(),
            self.qualified_name,
            self.location
        )
    }
}
