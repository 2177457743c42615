use super::common::{first_error_line, node_location, node_text, same_node, ParseFailure, ParseResult, Parser};
use crate::index::{is_dunder, CallKind, CallSite, DeclaredSymbol, ImportRecord, SymbolKind};
use std::collections::HashSet;
use std::path::Path;
use tree_sitter::{Node, Parser as TsParser};
use tracing::trace;

/// Method names invoked by unittest/pytest rather than by project code
const TEST_FIXTURE_METHODS: &[&str] = &[
    "setUp",
    "tearDown",
    "setUpClass",
    "tearDownClass",
    "asyncSetUp",
    "asyncTearDown",
    "setup_method",
    "teardown_method",
    "setup_class",
    "teardown_class",
];

const TEST_FIXTURE_FUNCTIONS: &[&str] = &[
    "setUpModule",
    "tearDownModule",
    "setup_module",
    "teardown_module",
    "setup_function",
    "teardown_function",
];

/// Python source code parser using tree-sitter
pub struct PythonParser {
    parser: TsParser,
}

impl PythonParser {
    pub fn new() -> Result<Self, ParseFailure> {
        let mut parser = TsParser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseFailure::Language(e.to_string()))?;
        Ok(Self { parser })
    }
}

impl Parser for PythonParser {
    fn parse(
        &mut self,
        path: &Path,
        module: &str,
        contents: &str,
    ) -> Result<ParseResult, ParseFailure> {
        let tree = self
            .parser
            .parse(contents, None)
            .ok_or_else(|| ParseFailure::NoTree(path.to_path_buf()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(ParseFailure::Syntax {
                path: path.to_path_buf(),
                line: first_error_line(root).unwrap_or(1),
            });
        }

        let is_conftest = path
            .file_name()
            .map(|n| n == "conftest.py")
            .unwrap_or(false);

        let mut walker = Walker {
            path,
            source: contents,
            module,
            is_conftest,
            scopes: Vec::new(),
            seen_qualified: HashSet::new(),
            result: ParseResult::new(module.to_string()),
        };
        walker.visit_children(root);

        let mut result = walker.result;
        apply_module_markers(&mut result);

        trace!(
            "{}: {} declarations, {} call-sites, {} imports",
            path.display(),
            result.declarations.len(),
            result.call_sites.len(),
            result.imports.len()
        );
        Ok(result)
    }
}

/// Mark module-level declarations named in `__all__` or the main guard
fn apply_module_markers(result: &mut ParseResult) {
    let exported: HashSet<&str> = result.exported_names.iter().map(String::as_str).collect();
    let guarded: HashSet<&str> = result.main_guard_names.iter().map(String::as_str).collect();

    for decl in &mut result.declarations {
        if decl.kind == SymbolKind::Method {
            continue;
        }
        if exported.contains(decl.name.as_str()) {
            decl.exported = true;
        }
        if guarded.contains(decl.name.as_str()) {
            decl.is_entry_point = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Class,
    Function,
}

struct Scope {
    kind: ScopeKind,
    name: String,
    qualified_name: String,
}

struct Walker<'a> {
    path: &'a Path,
    source: &'a str,
    module: &'a str,
    is_conftest: bool,
    scopes: Vec<Scope>,
    seen_qualified: HashSet<String>,
    result: ParseResult,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node_text(node, self.source)
    }

    fn caller(&self) -> String {
        match self.scopes.last() {
            Some(scope) => scope.qualified_name.clone(),
            None => format!("{}.<module>", self.module),
        }
    }

    fn record(&mut self, name: &str, kind: CallKind, receiver: Option<String>, node: Node) {
        if name == "self" || name == "cls" {
            return;
        }
        let site = CallSite::new(
            self.caller(),
            name.to_string(),
            kind,
            self.path.to_path_buf(),
            node.start_position().row + 1,
        )
        .with_receiver(receiver);
        self.result.call_sites.push(site);
    }

    fn visit_children(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "decorated_definition" => self.visit_decorated(node),
            "function_definition" => self.visit_function(node, Vec::new()),
            "class_definition" => self.visit_class(node, Vec::new()),
            "call" => self.visit_call(node, None),
            "attribute" => self.visit_attribute(node),
            "identifier" => {
                let name = self.text(node);
                self.record(name, CallKind::Reference, None, node);
            }
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "future_import_statement" | "global_statement" | "nonlocal_statement" | "comment" => {}
            "if_statement" => self.visit_if(node),
            "expression_statement" => {
                // Bare strings are docstrings
                if node.named_child_count() == 1
                    && node.named_child(0).map(|c| c.kind() == "string").unwrap_or(false)
                {
                    return;
                }
                self.visit_children(node);
            }
            "string" => self.visit_string(node),
            "assignment" | "augmented_assignment" => self.visit_assignment(node),
            "for_statement" | "for_in_clause" => {
                let left = node.child_by_field_name("left");
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                for child in children {
                    if same_node(left, child) {
                        self.visit_target(child);
                    } else {
                        self.visit(child);
                    }
                }
            }
            "named_expression" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value);
                }
            }
            "as_pattern" => {
                let alias = node.child_by_field_name("alias");
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                for child in children {
                    if !same_node(alias, child) && child.kind() != "as_pattern_target" {
                        self.visit(child);
                    }
                }
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value);
                }
            }
            "parameters" | "lambda_parameters" => self.visit_parameters(node),
            _ => self.visit_children(node),
        }
    }

    fn visit_decorated(&mut self, node: Node) {
        let mut decorators = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in &children {
            if child.kind() == "decorator" {
                let text = self.text(*child).trim_start_matches('@').trim();
                decorators.push(text.to_string());
                if let Some(expr) = child.named_child(0) {
                    self.visit_decorator_expression(expr);
                }
            }
        }

        if let Some(definition) = node.child_by_field_name("definition") {
            match definition.kind() {
                "function_definition" => self.visit_function(definition, decorators),
                "class_definition" => self.visit_class(definition, decorators),
                _ => self.visit(definition),
            }
        }
    }

    fn visit_decorator_expression(&mut self, expr: Node) {
        match expr.kind() {
            "identifier" => {
                let name = self.text(expr);
                self.record(name, CallKind::Decorator, None, expr);
            }
            "attribute" => {
                if let Some(object) = expr.child_by_field_name("object") {
                    self.visit(object);
                    if let Some(attr) = expr.child_by_field_name("attribute") {
                        let receiver = Some(self.text(object).to_string());
                        let name = self.text(attr);
                        self.record(name, CallKind::Decorator, receiver, attr);
                    }
                }
            }
            "call" => self.visit_call(expr, Some(CallKind::Decorator)),
            _ => self.visit(expr),
        }
    }

    fn declare(&mut self, node: Node, kind: SymbolKind, decorators: Vec<String>) -> Option<Scope> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.text(name_node).to_string();

        let parent = self.scopes.last();
        let kind = match (kind, parent.map(|s| s.kind)) {
            (SymbolKind::Function, Some(ScopeKind::Class)) => SymbolKind::Method,
            (kind, _) => kind,
        };
        let enclosing_class = parent
            .filter(|s| s.kind == ScopeKind::Class)
            .map(|s| s.name.clone());
        let at_module_level = parent.is_none();

        let base = match parent {
            Some(scope) => format!("{}.{}", scope.qualified_name, name),
            None if self.module.is_empty() => name.clone(),
            None => format!("{}.{}", self.module, name),
        };
        let location = node_location(self.path, node);
        let qualified_name = if self.seen_qualified.contains(&base) {
            format!("{}#{}", base, location.line)
        } else {
            base
        };
        self.seen_qualified.insert(qualified_name.clone());

        let mut decl = DeclaredSymbol::new(name.clone(), qualified_name.clone(), kind, location);
        decl.is_entry_point = self.is_conventional_entry_point(
            &name,
            kind,
            enclosing_class.as_deref(),
            at_module_level,
        );
        decl.enclosing_class = enclosing_class;
        decl.decorators = decorators;
        self.result.declarations.push(decl);

        Some(Scope {
            kind: if kind == SymbolKind::Class {
                ScopeKind::Class
            } else {
                ScopeKind::Function
            },
            name,
            qualified_name,
        })
    }

    /// Names the Python runtime or the test runner invokes on its own
    fn is_conventional_entry_point(
        &self,
        name: &str,
        kind: SymbolKind,
        enclosing_class: Option<&str>,
        at_module_level: bool,
    ) -> bool {
        if self.is_conftest || is_dunder(name) {
            return true;
        }
        match kind {
            SymbolKind::Class => name.starts_with("Test"),
            SymbolKind::Function => {
                (at_module_level && name == "main")
                    || name.starts_with("test")
                    || name.starts_with("pytest_")
                    || TEST_FIXTURE_FUNCTIONS.contains(&name)
            }
            SymbolKind::Method => {
                let in_test_class = enclosing_class
                    .map(|c| c.starts_with("Test") || c.ends_with("Test") || c.ends_with("Tests"))
                    .unwrap_or(false);
                name.starts_with("test")
                    || (in_test_class && TEST_FIXTURE_METHODS.contains(&name))
                    || TEST_FIXTURE_METHODS[..4].contains(&name)
            }
        }
    }

    fn visit_function(&mut self, node: Node, decorators: Vec<String>) {
        // Defaults and annotations are evaluated in the enclosing scope
        if let Some(params) = node.child_by_field_name("parameters") {
            self.visit_parameters(params);
        }
        if let Some(ret) = node.child_by_field_name("return_type") {
            self.visit(ret);
        }

        let Some(scope) = self.declare(node, SymbolKind::Function, decorators) else {
            return;
        };
        self.scopes.push(scope);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body);
        }
        self.scopes.pop();
    }

    fn visit_class(&mut self, node: Node, decorators: Vec<String>) {
        if let Some(bases) = node.child_by_field_name("superclasses") {
            self.visit_children(bases);
        }

        let Some(scope) = self.declare(node, SymbolKind::Class, decorators) else {
            return;
        };
        self.scopes.push(scope);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_children(body);
        }
        self.scopes.pop();
    }

    fn visit_parameters(&mut self, node: Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for param in children {
            match param.kind() {
                "typed_parameter" => {
                    if let Some(ty) = param.child_by_field_name("type") {
                        self.visit(ty);
                    }
                }
                "default_parameter" | "typed_default_parameter" => {
                    if let Some(ty) = param.child_by_field_name("type") {
                        self.visit(ty);
                    }
                    if let Some(value) = param.child_by_field_name("value") {
                        self.visit(value);
                    }
                }
                _ => {}
            }
        }
    }

    /// `forced` overrides the kind for decorator calls (`@app.route("/")`)
    fn visit_call(&mut self, node: Node, forced: Option<CallKind>) {
        if let Some(function) = node.child_by_field_name("function") {
            match function.kind() {
                "identifier" => {
                    let name = self.text(function);
                    let kind = forced.unwrap_or_else(|| invocation_kind(name, CallKind::Call));
                    self.record(name, kind, None, function);
                }
                "attribute" => {
                    if let Some(object) = function.child_by_field_name("object") {
                        self.visit(object);
                        if let Some(attr) = function.child_by_field_name("attribute") {
                            let name = self.text(attr);
                            let receiver = Some(self.text(object).to_string());
                            let kind =
                                forced.unwrap_or_else(|| invocation_kind(name, CallKind::MethodCall));
                            self.record(name, kind, receiver, attr);
                        }
                    }
                }
                _ => self.visit(function),
            }
        }

        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit_children(arguments);
        }
    }

    fn visit_attribute(&mut self, node: Node) {
        if let Some(object) = node.child_by_field_name("object") {
            self.visit(object);
            if let Some(attr) = node.child_by_field_name("attribute") {
                let name = self.text(attr);
                let receiver = Some(self.text(object).to_string());
                self.record(name, CallKind::AttributeReference, receiver, attr);
            }
        }
    }

    fn visit_import(&mut self, node: Node) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let module_node = if name.kind() == "aliased_import" {
                name.child_by_field_name("name")
            } else {
                Some(name)
            };
            if let Some(module_node) = module_node {
                self.result.imports.push(ImportRecord {
                    module: self.text(module_node).to_string(),
                    names: Vec::new(),
                    relative: false,
                    file: self.path.to_path_buf(),
                    line: node.start_position().row + 1,
                });
            }
        }
    }

    fn visit_import_from(&mut self, node: Node) {
        let (module, relative) = match node.child_by_field_name("module_name") {
            Some(m) if m.kind() == "relative_import" => {
                let mut cursor = m.walk();
                let dotted = m
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "dotted_name")
                    .map(|c| self.text(c).to_string())
                    .unwrap_or_default();
                (dotted, true)
            }
            Some(m) => (self.text(m).to_string(), false),
            None => (String::new(), false),
        };

        let mut imported = Vec::new();
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let target = if name.kind() == "aliased_import" {
                name.child_by_field_name("name")
            } else {
                Some(name)
            };
            let Some(target) = target else { continue };
            let text = self.text(target);
            let last = text.rsplit('.').next().unwrap_or(text);
            imported.push(last.to_string());
            self.record(last, CallKind::Import, Some(module.clone()), target);
        }

        let mut wildcard_cursor = node.walk();
        if node
            .named_children(&mut wildcard_cursor)
            .any(|c| c.kind() == "wildcard_import")
        {
            imported.push("*".to_string());
        }

        self.result.imports.push(ImportRecord {
            module,
            names: imported,
            relative,
            file: self.path.to_path_buf(),
            line: node.start_position().row + 1,
        });
    }

    fn visit_if(&mut self, node: Node) {
        let is_main_guard = node
            .child_by_field_name("condition")
            .map(|c| is_main_guard_condition(self.text(c)))
            .unwrap_or(false);

        if !is_main_guard {
            self.visit_children(node);
            return;
        }

        let start = self.result.call_sites.len();
        self.visit_children(node);
        let guarded: Vec<String> = self.result.call_sites[start..]
            .iter()
            .map(|site| site.name.clone())
            .collect();
        self.result.main_guard_names.extend(guarded);
    }

    fn visit_string(&mut self, node: Node) {
        let mut content = String::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "string_content" => content.push_str(self.text(child)),
                "interpolation" => self.visit_children(child),
                _ => {}
            }
        }

        for token in literal_tokens(&content) {
            self.result.string_literals.insert(token.to_string());
        }
    }

    fn visit_assignment(&mut self, node: Node) {
        let left = node.child_by_field_name("left");
        if let Some(left) = left {
            if left.kind() == "identifier" && self.text(left) == "__all__" {
                if let Some(right) = node.child_by_field_name("right") {
                    self.collect_exports(right);
                }
                return;
            }
            self.visit_target(left);
        }
        if let Some(ty) = node.child_by_field_name("type") {
            self.visit(ty);
        }
        if let Some(right) = node.child_by_field_name("right") {
            self.visit(right);
        }
    }

    /// Assignment targets bind names; only the expressions around them are uses
    fn visit_target(&mut self, node: Node) {
        match node.kind() {
            "identifier" => {}
            "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern" => {
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                for child in children {
                    self.visit_target(child);
                }
            }
            "attribute" => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(object);
                }
            }
            _ => self.visit(node),
        }
    }

    fn collect_exports(&mut self, node: Node) {
        for child in super::common::descendants(node) {
            if child.kind() == "string_content" {
                let name = self.text(child).to_string();
                self.result.exported_names.push(name);
            }
        }
    }
}

fn invocation_kind(name: &str, default: CallKind) -> CallKind {
    if name.chars().next().map(char::is_uppercase).unwrap_or(false) {
        CallKind::Construction
    } else {
        default
    }
}

/// `__name__ == "__main__"` in either operand order and quote style
fn is_main_guard_condition(condition: &str) -> bool {
    let normalized: String = condition
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '\'' { '"' } else { c })
        .collect();
    normalized == "__name__==\"__main__\"" || normalized == "\"__main__\"==__name__"
}

/// Identifier-like tokens of a single-word string (`"pkg.handlers:on_event"`)
fn literal_tokens(content: &str) -> Vec<&str> {
    if content.is_empty() || content.chars().any(char::is_whitespace) {
        return Vec::new();
    }
    content
        .split(['.', ':', '/'])
        .filter(|t| is_identifier(t))
        .collect()
}

fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}
