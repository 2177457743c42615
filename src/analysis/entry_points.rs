use crate::config::Config;
use crate::index::{DeclaredSymbol, SymbolIndex};
use tracing::{debug, info};

/// Decorators that ship with the language and register nothing
const BUILTIN_DECORATORS: &[&str] = &[
    "property",
    "staticmethod",
    "classmethod",
    "abstractmethod",
    "abc.abstractmethod",
    "wraps",
    "functools.wraps",
    "cache",
    "functools.cache",
    "lru_cache",
    "functools.lru_cache",
    "cached_property",
    "functools.cached_property",
    "dataclass",
    "dataclasses.dataclass",
    "total_ordering",
    "functools.total_ordering",
    "contextmanager",
    "contextlib.contextmanager",
    "asynccontextmanager",
    "contextlib.asynccontextmanager",
    "final",
    "typing.final",
    "override",
    "typing.override",
];

/// How a symbol can be reached without a visible call-site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPointKind {
    /// Invoked by the runtime, the test runner or the user's configuration.
    /// Never reported.
    Hard(String),

    /// Plausibly reached through a framework registry or public API.
    /// Reported with lowered confidence.
    Soft(String),
}

/// Classifies declared symbols as entry points
pub struct EntryPointDetector<'a> {
    config: &'a Config,
}

impl<'a> EntryPointDetector<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn classify(&self, decl: &DeclaredSymbol) -> Option<EntryPointKind> {
        if decl.is_entry_point {
            return Some(EntryPointKind::Hard("invoked by convention".to_string()));
        }

        if self
            .config
            .is_configured_entry_point(&decl.name, &decl.qualified_name)
        {
            return Some(EntryPointKind::Hard("configured entry point".to_string()));
        }

        if self.config.should_retain(&decl.name) || self.config.should_retain(&decl.qualified_name)
        {
            return Some(EntryPointKind::Hard("matches a retain pattern".to_string()));
        }

        // `@overload` stubs and `@x.setter`/`@x.deleter` share the name of a real declaration
        if decl.decorators.iter().any(|d| is_alias_decorator(d)) {
            return Some(EntryPointKind::Hard("accessor or overload".to_string()));
        }

        if let Some(decorator) = decl.decorators.iter().find(|d| is_registry_decorator(d)) {
            return Some(EntryPointKind::Soft(format!("registered by @{}", decorator)));
        }

        if decl.exported {
            return Some(EntryPointKind::Soft("exported in __all__".to_string()));
        }

        None
    }

    /// Count entry points across the index, for logging
    pub fn count(&self, index: &SymbolIndex) -> (usize, usize) {
        let mut hard = 0;
        let mut soft = 0;
        for decl in index.symbols() {
            match self.classify(decl) {
                Some(EntryPointKind::Hard(reason)) => {
                    debug!("Entry point: {} ({})", decl.qualified_name, reason);
                    hard += 1;
                }
                Some(EntryPointKind::Soft(_)) => soft += 1,
                None => {}
            }
        }
        info!("Detected {} entry points ({} soft)", hard, soft);
        (hard, soft)
    }
}

fn decorator_name(decorator: &str) -> &str {
    decorator.split('(').next().unwrap_or(decorator).trim()
}

fn is_alias_decorator(decorator: &str) -> bool {
    let name = decorator_name(decorator);
    name == "overload"
        || name == "typing.overload"
        || name.ends_with(".setter")
        || name.ends_with(".deleter")
        || name.ends_with(".getter")
}

fn is_registry_decorator(decorator: &str) -> bool {
    !BUILTIN_DECORATORS.contains(&decorator_name(decorator))
}
