mod builder;
mod call_site;
mod parallel_builder;
mod symbol;

pub use builder::IndexBuilder;
pub use call_site::{CallKind, CallSite, ImportRecord};
pub use parallel_builder::ParallelIndexBuilder;
pub use symbol::{is_dunder, DeclaredSymbol, Location, SymbolKind, Visibility};

use crate::parser::{ParseFailure, ParseResult};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, warn};

/// A file left out of the index
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Counters describing an index
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub symbols: usize,
    pub call_sites: usize,
    pub imports: usize,
    pub string_literals: usize,
}

/// Declared symbols, their call-sites and imports, plus the reference graph.
///
/// Nodes are qualified names: one per declared symbol and one `<module>`
/// node per indexed file. Edges run from the enclosing caller to every symbol
/// whose simple name matches the call-site name.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    inner: DiGraph<String, CallKind>,

    /// Map from qualified name to node index
    node_map: HashMap<String, NodeIndex>,

    /// Declared symbols keyed by qualified name
    symbols: BTreeMap<String, DeclaredSymbol>,

    /// Map from simple name to qualified names (for resolution)
    name_index: HashMap<String, Vec<String>>,

    call_sites: Vec<CallSite>,

    /// Distinct call-site names
    called_names: HashSet<String>,

    imports: Vec<ImportRecord>,

    string_literals: HashSet<String>,

    files_indexed: usize,

    skipped: Vec<SkippedFile>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(name) {
            return idx;
        }
        let idx = self.inner.add_node(name.to_string());
        self.node_map.insert(name.to_string(), idx);
        idx
    }

    /// Merge one parsed file. Stub files contribute uses but no declarations.
    pub(crate) fn absorb(&mut self, parsed: ParseResult, is_stub: bool) {
        self.files_indexed += 1;
        self.ensure_node(&format!("{}.<module>", parsed.module));

        if !is_stub {
            for decl in parsed.declarations {
                self.add_symbol(decl);
            }
        }

        for site in parsed.call_sites {
            self.called_names.insert(site.name.clone());
            self.call_sites.push(site);
        }
        self.imports.extend(parsed.imports);
        self.string_literals.extend(parsed.string_literals);
    }

    pub(crate) fn add_symbol(&mut self, decl: DeclaredSymbol) {
        self.ensure_node(&decl.qualified_name);
        self.name_index
            .entry(decl.name.clone())
            .or_default()
            .push(decl.qualified_name.clone());
        self.symbols.insert(decl.qualified_name.clone(), decl);
    }

    pub(crate) fn record_failure(&mut self, failure: ParseFailure) {
        warn!("Skipping file: {}", failure);
        let path = failure.path().map(|p| p.to_path_buf()).unwrap_or_default();
        self.skipped.push(SkippedFile {
            path,
            reason: failure.to_string(),
        });
    }

    /// Resolve every call-site by simple name and add the graph edges
    pub(crate) fn resolve(&mut self) {
        let mut edges = Vec::new();
        for site in &self.call_sites {
            let Some(targets) = self.name_index.get(&site.name) else {
                continue;
            };
            for target in targets {
                edges.push((site.caller.clone(), target.clone(), site.kind));
            }
        }

        for (caller, target, kind) in edges {
            let from = self.ensure_node(&caller);
            let to = self.ensure_node(&target);
            self.inner.add_edge(from, to, kind);
        }

        debug!(
            "Resolved {} call-sites into {} edges",
            self.call_sites.len(),
            self.inner.edge_count()
        );
    }

    /// All declared symbols, ordered by qualified name
    pub fn symbols(&self) -> impl Iterator<Item = &DeclaredSymbol> {
        self.symbols.values()
    }

    pub fn get(&self, qualified_name: &str) -> Option<&DeclaredSymbol> {
        self.symbols.get(qualified_name)
    }

    /// Find declarations by simple name
    pub fn find_by_name(&self, name: &str) -> Vec<&DeclaredSymbol> {
        self.name_index
            .get(name)
            .map(|names| names.iter().filter_map(|q| self.symbols.get(q)).collect())
            .unwrap_or_default()
    }

    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    /// Distinct names seen at call-sites
    pub fn called_names(&self) -> impl Iterator<Item = &str> {
        self.called_names.iter().map(String::as_str)
    }

    /// Whether any call-site names this symbol (exact or `x.name`)
    pub fn is_referenced(&self, qualified_name: &str) -> bool {
        let Some(&idx) = self.node_map.get(qualified_name) else {
            return false;
        };
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .next()
            .is_some()
    }

    /// Callers of a symbol with the call kind of each edge
    pub fn callers_of(&self, qualified_name: &str) -> Vec<(&str, CallKind)> {
        let Some(&idx) = self.node_map.get(qualified_name) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .filter_map(|edge| {
                let caller = self.inner.node_weight(edge.source())?;
                Some((caller.as_str(), *edge.weight()))
            })
            .collect()
    }

    pub fn imports(&self) -> &[ImportRecord] {
        &self.imports
    }

    /// Top-level package names of all non-relative imports
    pub fn top_level_imports(&self) -> BTreeSet<String> {
        self.imports
            .iter()
            .filter_map(|import| import.top_level())
            .map(str::to_string)
            .collect()
    }

    pub fn contains_string_literal(&self, name: &str) -> bool {
        self.string_literals.contains(name)
    }

    pub fn skipped_files(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files_indexed: self.files_indexed,
            files_skipped: self.skipped.len(),
            symbols: self.symbols.len(),
            call_sites: self.call_sites.len(),
            imports: self.imports.len(),
            string_literals: self.string_literals.len(),
        }
    }
}
