//! Static analysis of Python candidates on top of tree-sitter.
//!
//! Three independent checks back the validation pipeline:
//! - [`syntax_errors`]: parser-level errors (`ERROR` / missing nodes).
//! - [`structural_errors`]: constructs the parser accepts but the Python 3
//!   compiler rejects (`return` outside a function, Python 2 `print`
//!   statements, misordered parameters and arguments, ...).
//! - [`imported_modules`]: top-level module names referenced by `import` and
//!   `from ... import` statements.
//!
//! Everything here is pure: no filesystem or process access.

use std::cell::RefCell;
use std::collections::BTreeSet;

use anyhow::{Result, anyhow};
use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A language version mismatch surfaces as a failed parse below.
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });
}

/// Maximum number of parser errors reported in one message.
const MAX_REPORTED: usize = 3;

/// A parsed candidate; keeps the source alongside its tree.
pub struct ParsedSource<'a> {
    source: &'a str,
    tree: Tree,
}

impl<'a> ParsedSource<'a> {
    pub fn parse(source: &'a str) -> Result<Self> {
        let tree = PYTHON_PARSER
            .with(|p| p.borrow_mut().parse(source, None))
            .ok_or_else(|| anyhow!("python parser produced no tree"))?;
        Ok(Self { source, tree })
    }

    fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        &self.source[node.start_byte()..node.end_byte()]
    }
}

/// Location-tagged diagnostic produced by a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// One-based line.
    pub line: usize,
    /// One-based column.
    pub column: usize,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

fn diagnostic(node: Node<'_>, message: impl Into<String>) -> Diagnostic {
    let pos = node.start_position();
    Diagnostic {
        line: pos.row + 1,
        column: pos.column + 1,
        message: message.into(),
    }
}

/// Parser-level errors, in source order, capped at a few entries.
pub fn syntax_errors(parsed: &ParsedSource<'_>) -> Vec<Diagnostic> {
    let root = parsed.root();
    if !root.has_error() {
        return Vec::new();
    }
    let mut found = Vec::new();
    collect_syntax_errors(parsed, root, &mut found);
    if found.is_empty() {
        found.push(diagnostic(root, "invalid syntax"));
    }
    found
}

fn collect_syntax_errors(parsed: &ParsedSource<'_>, node: Node<'_>, found: &mut Vec<Diagnostic>) {
    if found.len() >= MAX_REPORTED {
        return;
    }
    if node.is_missing() {
        found.push(diagnostic(node, format!("expected '{}'", node.kind())));
        return;
    }
    if node.is_error() {
        let snippet = first_line(parsed.text(node));
        let message = if snippet.is_empty() {
            "invalid syntax".to_string()
        } else {
            format!("invalid syntax near '{snippet}'")
        };
        found.push(diagnostic(node, message));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_syntax_errors(parsed, child, found);
    }
}

fn first_line(text: &str) -> &str {
    let line = text.trim().lines().next().unwrap_or("");
    match line.char_indices().nth(40) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    in_function: bool,
    in_async_function: bool,
    in_loop: bool,
}

/// Structural errors the Python compiler would reject even though the tree parses.
pub fn structural_errors(parsed: &ParsedSource<'_>) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    visit_children(parsed, parsed.root(), Scope::default(), true, &mut found);
    found
}

fn check_node(
    parsed: &ParsedSource<'_>,
    node: Node<'_>,
    scope: Scope,
    module_level: bool,
    found: &mut Vec<Diagnostic>,
) {
    if !node.is_named() {
        return;
    }
    match node.kind() {
        "function_definition" => {
            check_parameters(parsed, node, found);
            let is_async = has_keyword_child(node, "async");
            let inner = Scope {
                in_function: true,
                in_async_function: is_async,
                in_loop: false,
            };
            visit_fields(parsed, node, &["body"], inner, false, found);
            visit_except(parsed, node, &["body"], scope, module_level, found);
            return;
        }
        "lambda" => {
            check_parameters(parsed, node, found);
            let inner = Scope {
                in_function: true,
                in_async_function: false,
                in_loop: false,
            };
            visit_children(parsed, node, inner, false, found);
            return;
        }
        "class_definition" => {
            visit_fields(parsed, node, &["body"], Scope::default(), false, found);
            visit_except(parsed, node, &["body"], scope, module_level, found);
            return;
        }
        "for_statement" | "while_statement" => {
            let in_loop = Scope {
                in_loop: true,
                ..scope
            };
            visit_fields(parsed, node, &["body"], in_loop, module_level, found);
            visit_except(parsed, node, &["body"], scope, module_level, found);
            return;
        }
        "return_statement" if !scope.in_function => {
            found.push(diagnostic(node, "'return' outside function"));
        }
        "yield" if !scope.in_function => {
            found.push(diagnostic(node, "'yield' outside function"));
        }
        "await" if !scope.in_async_function => {
            let message = if scope.in_function {
                "'await' outside async function"
            } else {
                "'await' outside function"
            };
            found.push(diagnostic(node, message));
        }
        "break_statement" if !scope.in_loop => {
            found.push(diagnostic(node, "'break' outside loop"));
        }
        "continue_statement" if !scope.in_loop => {
            found.push(diagnostic(node, "'continue' not properly in loop"));
        }
        "nonlocal_statement" if module_level => {
            found.push(diagnostic(
                node,
                "nonlocal declaration not allowed at module level",
            ));
        }
        "print_statement" => {
            found.push(diagnostic(
                node,
                "Missing parentheses in call to 'print'. Did you mean print(...)?",
            ));
        }
        "exec_statement" => {
            found.push(diagnostic(
                node,
                "Missing parentheses in call to 'exec'. Did you mean exec(...)?",
            ));
        }
        "argument_list" => check_arguments(node, found),
        _ => {}
    }
    visit_children(parsed, node, scope, module_level, found);
}

fn visit_children(
    parsed: &ParsedSource<'_>,
    node: Node<'_>,
    scope: Scope,
    module_level: bool,
    found: &mut Vec<Diagnostic>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        check_node(parsed, child, scope, module_level, found);
    }
}

/// Visit the named fields of `node` under `scope`.
fn visit_fields(
    parsed: &ParsedSource<'_>,
    node: Node<'_>,
    fields: &[&str],
    scope: Scope,
    module_level: bool,
    found: &mut Vec<Diagnostic>,
) {
    for field in fields {
        if let Some(child) = node.child_by_field_name(field) {
            check_node(parsed, child, scope, module_level, found);
        }
    }
}

/// Visit every named child of `node` that is not one of `fields`, under `scope`.
fn visit_except(
    parsed: &ParsedSource<'_>,
    node: Node<'_>,
    fields: &[&str],
    scope: Scope,
    module_level: bool,
    found: &mut Vec<Diagnostic>,
) {
    let skipped: Vec<usize> = fields
        .iter()
        .filter_map(|field| node.child_by_field_name(field))
        .map(|child| child.id())
        .collect();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if skipped.contains(&child.id()) {
            continue;
        }
        check_node(parsed, child, scope, module_level, found);
    }
}

fn has_keyword_child(node: Node<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == keyword);
    found
}

fn check_parameters(parsed: &ParsedSource<'_>, function: Node<'_>, found: &mut Vec<Diagnostic>) {
    let Some(parameters) = function.child_by_field_name("parameters") else {
        return;
    };
    let mut seen = BTreeSet::new();
    let mut seen_default = false;
    let mut keyword_only = false;
    let mut cursor = parameters.walk();
    for parameter in parameters.named_children(&mut cursor) {
        match parameter_kind(parameter) {
            ParameterKind::Default => seen_default = true,
            ParameterKind::Star => keyword_only = true,
            ParameterKind::Plain if seen_default && !keyword_only => {
                found.push(diagnostic(
                    parameter,
                    "non-default argument follows default argument",
                ));
            }
            ParameterKind::Plain | ParameterKind::Other => {}
        }
        let Some(name_node) = parameter_name(parameter) else {
            continue;
        };
        let name = parsed.text(name_node);
        if !seen.insert(name) {
            found.push(diagnostic(
                name_node,
                format!("duplicate argument '{name}' in function definition"),
            ));
        }
    }
}

enum ParameterKind {
    Plain,
    Default,
    /// `*`, `*args` or `*args: T`; everything after it is keyword-only.
    Star,
    Other,
}

fn parameter_kind(parameter: Node<'_>) -> ParameterKind {
    match parameter.kind() {
        "identifier" => ParameterKind::Plain,
        "typed_parameter" => match parameter.named_child(0).map(|n| n.kind()) {
            Some("list_splat_pattern") => ParameterKind::Star,
            Some("identifier") => ParameterKind::Plain,
            _ => ParameterKind::Other,
        },
        "default_parameter" | "typed_default_parameter" => ParameterKind::Default,
        "list_splat_pattern" | "keyword_separator" => ParameterKind::Star,
        _ => ParameterKind::Other,
    }
}

fn check_arguments(arguments: Node<'_>, found: &mut Vec<Diagnostic>) {
    let mut seen_keyword = false;
    let mut seen_double_splat = false;
    let mut cursor = arguments.walk();
    for argument in arguments.named_children(&mut cursor) {
        match argument.kind() {
            "comment" => {}
            "keyword_argument" => seen_keyword = true,
            "dictionary_splat" => seen_double_splat = true,
            "list_splat" if seen_double_splat => found.push(diagnostic(
                argument,
                "iterable argument unpacking follows keyword argument unpacking",
            )),
            "list_splat" => {}
            _ if seen_double_splat => found.push(diagnostic(
                argument,
                "positional argument follows keyword argument unpacking",
            )),
            _ if seen_keyword => found.push(diagnostic(
                argument,
                "positional argument follows keyword argument",
            )),
            _ => {}
        }
    }
}

fn parameter_name(parameter: Node<'_>) -> Option<Node<'_>> {
    match parameter.kind() {
        "identifier" => Some(parameter),
        "default_parameter" | "typed_default_parameter" => parameter.child_by_field_name("name"),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            let first = parameter.named_child(0)?;
            parameter_name(first)
        }
        _ => None,
    }
}

/// Top-level module names imported by the candidate, deduplicated in source order.
///
/// Relative imports and `__future__` imports are skipped: they never resolve
/// against the interpreter environment.
pub fn imported_modules(parsed: &ParsedSource<'_>) -> Vec<String> {
    let mut modules = Vec::new();
    collect_imports(parsed, parsed.root(), &mut modules);
    let mut seen = BTreeSet::new();
    modules.retain(|m| seen.insert(m.clone()));
    modules
}

fn collect_imports(parsed: &ParsedSource<'_>, node: Node<'_>, out: &mut Vec<String>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                let dotted = match child.kind() {
                    "dotted_name" => Some(child),
                    "aliased_import" => child.child_by_field_name("name"),
                    _ => None,
                };
                if let Some(dotted) = dotted {
                    push_top_level(parsed.text(dotted), out);
                }
            }
            return;
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name")
                && module.kind() == "dotted_name"
            {
                push_top_level(parsed.text(module), out);
            }
            return;
        }
        "future_import_statement" => return,
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_imports(parsed, child, out);
    }
}

fn push_top_level(dotted: &str, out: &mut Vec<String>) {
    let top = dotted.split('.').next().unwrap_or("").trim();
    if !top.is_empty() {
        out.push(top.to_string());
    }
}
