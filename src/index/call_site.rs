use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Shape of a reference to a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallKind {
    /// `name(...)`
    Call,

    /// `obj.name(...)`
    MethodCall,

    /// `Name(...)` or `module.Name(...)`
    Construction,

    /// `name` used as a value (callback, base class, default argument)
    Reference,

    /// `obj.name` without a call
    AttributeReference,

    /// `@name` or `@name(...)`
    Decorator,

    /// `from module import name`
    Import,
}

impl CallKind {
    /// Attribute forms resolve by suffix match (`x.name`)
    pub fn is_attribute(&self) -> bool {
        matches!(self, CallKind::MethodCall | CallKind::AttributeReference)
    }

    pub fn is_invocation(&self) -> bool {
        matches!(
            self,
            CallKind::Call | CallKind::MethodCall | CallKind::Construction
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CallKind::Call => "call",
            CallKind::MethodCall => "method call",
            CallKind::Construction => "construction",
            CallKind::Reference => "reference",
            CallKind::AttributeReference => "attribute reference",
            CallKind::Decorator => "decorator",
            CallKind::Import => "import",
        }
    }
}

/// A location where a name is invoked or referenced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Qualified name of the innermost enclosing function/class, or `<module>`
    pub caller: String,

    /// The referenced name (last segment for attribute forms)
    pub name: String,

    /// Receiver expression for attribute forms (`self`, `client`, `os.path`)
    pub receiver: Option<String>,

    pub kind: CallKind,

    pub file: PathBuf,

    pub line: usize,
}

impl CallSite {
    pub fn new(caller: String, name: String, kind: CallKind, file: PathBuf, line: usize) -> Self {
        Self {
            caller,
            name,
            receiver: None,
            kind,
            file,
            line,
        }
    }

    pub fn with_receiver(mut self, receiver: Option<String>) -> Self {
        self.receiver = receiver;
        self
    }

    /// Source-like rendering for reports
    pub fn display(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("{}.{}", receiver, self.name),
            None => self.name.clone(),
        }
    }
}

/// An `import` or `from ... import` statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Full dotted module path (`google.cloud.storage`); empty for `from . import x`
    pub module: String,

    /// Names imported by a `from` import
    pub names: Vec<String>,

    /// `from .x import y`
    pub relative: bool,

    pub file: PathBuf,

    pub line: usize,
}

impl ImportRecord {
    /// First segment of the module path
    pub fn top_level(&self) -> Option<&str> {
        if self.relative {
            return None;
        }
        self.module.split('.').next().filter(|s| !s.is_empty())
    }
}
