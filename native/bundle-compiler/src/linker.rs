//! Linker Module
//!
//! Resolves the import graph of a parsed bundle, wraps every module in a
//! factory writing to its own exports object, and emits one AMD-style
//! `define(...)` unit. The linked text is then re-parsed with oxc and
//! printed once per code variant.

use indexmap::{IndexMap, IndexSet};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::operator::BinaryOperator;
use std::collections::HashMap;
use tracing::debug;

use crate::bundle::{file_stem, BundleId};
use crate::compiler::CodeVariant;
use crate::error::{SourceLocation, SyntaxError};
use crate::script::{ImportBinding, ImportKind, ImportRecord, ScriptAnalysis};
use crate::text_util::{dashed_to_camel_case, escape_for_javascript_string, is_valid_js_identifier};

const INTEROP_HELPER: &str = "function __interopDefault(m) { return m && typeof m === \"object\" && \"default\" in m ? m.default : m; }";

// ═══════════════════════════════════════════════════════════════════════════════
// PARSED MODULES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub enum ModuleBody {
    Script(ScriptAnalysis),
    /// Render-function module generated from markup.
    Template(ScriptAnalysis),
    /// Stylesheet text, exported as a string.
    Style(String),
}

#[derive(Debug, Clone)]
pub struct ParsedModule {
    pub path: String,
    pub body: ModuleBody,
}

impl ParsedModule {
    pub fn analysis(&self) -> Option<&ScriptAnalysis> {
        match &self.body {
            ModuleBody::Script(a) | ModuleBody::Template(a) => Some(a),
            ModuleBody::Style(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkedBundle {
    /// Linked source before variant emission.
    pub code: String,
    /// External specifiers, first-seen depth-first order.
    pub dependencies: IndexSet<String>,
    /// Module paths in emission (post-) order.
    pub module_order: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

fn join_relative(from: &str, specifier: &str) -> Option<String> {
    let mut parts: Vec<&str> = from.split('/').collect();
    parts.pop();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            s => parts.push(s),
        }
    }
    Some(parts.join("/"))
}

/// Resolve a relative specifier inside the bundle: exact path, then the
/// `.js`, `.html`, `.css` suffixes, then `/index.js`.
pub fn resolve_relative(
    from: &str,
    specifier: &str,
    modules: &IndexMap<String, ParsedModule>,
) -> Option<String> {
    let base = join_relative(from, specifier)?;
    [
        base.clone(),
        format!("{}.js", base),
        format!("{}.html", base),
        format!("{}.css", base),
        format!("{}/index.js", base),
    ]
    .into_iter()
    .find(|candidate| modules.contains_key(candidate))
}

/// `x/foo/foo.js` -> `x/foo/foo.html`
fn implicit_template_path(entry_path: &str) -> String {
    match entry_path.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}.html", dir, file_stem(entry_path)),
        None => format!("{}.html", file_stem(entry_path)),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

struct GraphWalker<'m> {
    modules: &'m IndexMap<String, ParsedModule>,
    entry_path: &'m str,
    implicit_template: Option<String>,
    state: HashMap<String, VisitState>,
    order: Vec<String>,
    dependencies: IndexSet<String>,
    /// (module path, import index) -> resolved module path
    resolved: HashMap<(String, usize), String>,
}

impl<'m> GraphWalker<'m> {
    fn visit(&mut self, path: &str) -> Result<(), SyntaxError> {
        match self.state.get(path) {
            Some(VisitState::Done) => return Ok(()),
            // cycles are rejected at the import that closes them
            Some(VisitState::Visiting) => return Ok(()),
            None => {}
        }
        self.state.insert(path.to_string(), VisitState::Visiting);

        let modules = self.modules;
        let Some(module) = modules.get(path) else {
            return Ok(());
        };
        if let Some(analysis) = module.analysis() {
            for (index, record) in analysis.imports.iter().enumerate() {
                if record.is_relative() {
                    let Some(target) = resolve_relative(path, &record.specifier, modules) else {
                        return Err(SyntaxError::new(
                            path,
                            SourceLocation::from_offset(&analysis.source, record.start as usize),
                            format!(
                                "Could not resolve '{}' from '{}'",
                                record.specifier, path
                            ),
                        ));
                    };
                    if self.state.get(&target) == Some(&VisitState::Visiting) {
                        return Err(SyntaxError::new(
                            path,
                            SourceLocation::from_offset(&analysis.source, record.start as usize),
                            format!(
                                "Circular import of '{}' from '{}'",
                                record.specifier, path
                            ),
                        ));
                    }
                    self.resolved.insert((path.to_string(), index), target.clone());
                    self.visit(&target)?;
                } else {
                    self.dependencies.insert(record.specifier.clone());
                }
            }
        }

        if path == self.entry_path {
            if let Some(template) = self.implicit_template.clone() {
                self.visit(&template)?;
            }
        }

        self.state.insert(path.to_string(), VisitState::Done);
        self.order.push(path.to_string());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMISSION
// ═══════════════════════════════════════════════════════════════════════════════

fn property_key(name: &str) -> String {
    if is_valid_js_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", escape_for_javascript_string(name))
    }
}

fn member(target: &str, name: &str) -> String {
    if is_valid_js_identifier(name) {
        format!("{}.{}", target, name)
    } else {
        format!("{}[\"{}\"]", target, escape_for_javascript_string(name))
    }
}

/// Replacement text for one import or re-export statement.
fn render_import(record: &ImportRecord, target: &str, external: bool, needs_interop: &mut bool) -> String {
    match &record.kind {
        ImportKind::SideEffect => String::new(),
        ImportKind::Bindings { bindings } => {
            let mut lines = Vec::new();
            let mut named = Vec::new();
            for binding in bindings {
                match binding {
                    ImportBinding::Default { local } => {
                        if external {
                            *needs_interop = true;
                            lines.push(format!("const {} = __interopDefault({});", local, target));
                        } else {
                            lines.push(format!("const {} = {}.default;", local, target));
                        }
                    }
                    ImportBinding::Named { imported, local } => {
                        if imported == local {
                            named.push(local.clone());
                        } else {
                            named.push(format!("{}: {}", property_key(imported), local));
                        }
                    }
                    ImportBinding::Namespace { local } => {
                        lines.push(format!("const {} = {};", local, target));
                    }
                }
            }
            if !named.is_empty() {
                lines.push(format!("const {{ {} }} = {};", named.join(", "), target));
            }
            lines.join("\n")
        }
        ImportKind::ReExport { names } => names
            .iter()
            .map(|(imported, exported)| {
                format!("{} = {};", member("__exports", exported), member(target, imported))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ImportKind::ReExportAll => format!(
            "Object.keys({t}).forEach(function (k) {{ if (k !== \"default\") __exports[k] = {t}[k]; }});",
            t = target
        ),
        ImportKind::ReExportNamespace { exported } => {
            format!("{} = {};", member("__exports", exported), target)
        }
    }
}

/// Parameter names for the external dependencies of the define call.
fn dependency_params(dependencies: &IndexSet<String>) -> IndexMap<String, String> {
    let mut used = std::collections::HashSet::new();
    let mut params = IndexMap::new();
    for (i, dep) in dependencies.iter().enumerate() {
        let camel = dashed_to_camel_case(dep);
        let base = if is_valid_js_identifier(&camel) {
            format!("__{}", camel)
        } else {
            format!("__dep{}", i)
        };
        let mut name = base.clone();
        let mut n = 1;
        while !used.insert(name.clone()) {
            n += 1;
            name = format!("{}{}", base, n);
        }
        params.insert(dep.clone(), name);
    }
    params
}

/// Link the parsed modules of a bundle into one `define(...)` unit.
pub fn link(
    bundle_id: &BundleId,
    entry_path: &str,
    modules: &IndexMap<String, ParsedModule>,
) -> Result<LinkedBundle, SyntaxError> {
    let entry_analysis = modules.get(entry_path).and_then(ParsedModule::analysis);

    let template_path = implicit_template_path(entry_path);
    let implicit_template = match entry_analysis {
        Some(entry) if template_path != entry_path && modules.contains_key(&template_path) => {
            let explicitly_imported = entry.imports.iter().any(|r| {
                r.is_relative()
                    && resolve_relative(entry_path, &r.specifier, modules).as_deref()
                        == Some(template_path.as_str())
            });
            (!explicitly_imported).then_some(template_path)
        }
        _ => None,
    };

    let mut walker = GraphWalker {
        modules,
        entry_path,
        implicit_template: implicit_template.clone(),
        state: HashMap::new(),
        order: Vec::new(),
        dependencies: IndexSet::new(),
        resolved: HashMap::new(),
    };
    walker.visit(entry_path)?;

    let module_vars: HashMap<&str, String> = walker
        .order
        .iter()
        .enumerate()
        .map(|(i, path)| (path.as_str(), format!("__m{}", i)))
        .collect();
    let params = dependency_params(&walker.dependencies);

    let mut needs_interop = false;
    let mut bodies = Vec::with_capacity(walker.order.len());
    for path in &walker.order {
        let Some(module) = modules.get(path) else { continue };
        let var = &module_vars[path.as_str()];
        let body = match &module.body {
            ModuleBody::Style(css) => format!(
                "__exports.default = \"{}\";",
                escape_for_javascript_string(css)
            ),
            ModuleBody::Script(analysis) | ModuleBody::Template(analysis) => {
                analysis.render(|i, record| {
                    let (target, external) = match walker.resolved.get(&(path.clone(), i)) {
                        Some(resolved) => (
                            module_vars
                                .get(resolved.as_str())
                                .cloned()
                                .unwrap_or_else(|| "{}".to_string()),
                            false,
                        ),
                        None => (
                            params
                                .get(&record.specifier)
                                .cloned()
                                .unwrap_or_else(|| "undefined".to_string()),
                            true,
                        ),
                    };
                    render_import(record, &target, external, &mut needs_interop)
                })
            }
        };
        bodies.push(format!(
            "const {var} = {{}};\n(function (__exports) {{\n{body}\n}})({var});",
            var = var,
            body = body.trim_end()
        ));
    }

    let dep_list = walker
        .dependencies
        .iter()
        .map(|d| format!("\"{}\"", escape_for_javascript_string(d)))
        .collect::<Vec<_>>()
        .join(", ");
    let param_list = params.values().cloned().collect::<Vec<_>>().join(", ");

    let mut out = String::new();
    out.push_str(&format!(
        "define(\"{}\", [{}], function ({}) {{\n\"use strict\";\n",
        escape_for_javascript_string(&bundle_id.module_id()),
        dep_list,
        param_list
    ));
    if needs_interop {
        out.push_str(INTEROP_HELPER);
        out.push('\n');
    }
    if !params.is_empty() {
        out.push_str(&format!(
            "if (process.env.NODE_ENV !== \"production\") {{\n[{}].forEach(function (dep, i) {{ if (dep === undefined) {{ throw new Error(\"Module {} is missing dependency \" + [{}][i]); }} }});\n}}\n",
            param_list,
            escape_for_javascript_string(&bundle_id.module_id()),
            dep_list
        ));
    }
    for body in &bodies {
        out.push_str(body);
        out.push('\n');
    }

    let entry_var = module_vars.get(entry_path).cloned().unwrap_or_else(|| "{}".to_string());
    let entry_has_default = entry_analysis.map_or(false, |a| a.has_default_export);
    if let Some(template) = &implicit_template {
        if entry_has_default {
            if let Some(template_var) = module_vars.get(template.as_str()) {
                out.push_str(&format!("{}.default.template = {}.default;\n", entry_var, template_var));
            }
        }
    }
    if entry_has_default {
        out.push_str(&format!("return {}.default;\n", entry_var));
    } else {
        out.push_str(&format!("return {};\n", entry_var));
    }
    out.push_str("});\n");

    debug!(
        bundle = %bundle_id,
        modules = walker.order.len(),
        dependencies = walker.dependencies.len(),
        "linked bundle"
    );

    Ok(LinkedBundle {
        code: out,
        dependencies: walker.dependencies,
        module_order: walker.order,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// VARIANT EMISSION
// ═══════════════════════════════════════════════════════════════════════════════

fn is_node_env(member: &StaticMemberExpression) -> bool {
    member.property.name == "NODE_ENV"
        && matches!(&member.object, Expression::StaticMemberExpression(env)
            if env.property.name == "env"
                && matches!(&env.object, Expression::Identifier(p) if p.name == "process"))
}

fn is_production_literal(expr: &Expression) -> bool {
    matches!(expr, Expression::StringLiteral(s) if s.value == "production")
}

/// `process.env.NODE_ENV !== "production"` (either operand order).
fn is_dev_only_test(expr: &Expression) -> bool {
    let Expression::BinaryExpression(bin) = expr else {
        return false;
    };
    if !matches!(bin.operator, BinaryOperator::StrictInequality | BinaryOperator::Inequality) {
        return false;
    }
    let env_side = |e: &Expression| matches!(e, Expression::StaticMemberExpression(m) if is_node_env(m));
    (env_side(&bin.left) && is_production_literal(&bin.right))
        || (env_side(&bin.right) && is_production_literal(&bin.left))
}

#[derive(Default)]
struct EnvScanner {
    env_reads: Vec<Span>,
    dev_blocks: Vec<Span>,
}

impl<'a> Visit<'a> for EnvScanner {
    fn visit_if_statement(&mut self, it: &IfStatement<'a>) {
        if it.alternate.is_none() && is_dev_only_test(&it.test) {
            self.dev_blocks.push(it.span);
        }
        walk::walk_if_statement(self, it);
    }

    fn visit_member_expression(&mut self, it: &MemberExpression<'a>) {
        if let MemberExpression::StaticMemberExpression(member) = it {
            if is_node_env(member) {
                self.env_reads.push(it.span());
                return;
            }
        }
        walk::walk_member_expression(self, it);
    }
}

fn contains(outer: Span, inner: Span) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

/// Produce the code of one variant from linked source.
///
/// DEV inlines `"development"` for the env read and keeps readable output.
/// PROD drops development-only blocks, inlines `"production"`, and minifies.
pub fn emit_variant(code: &str, variant: CodeVariant) -> Result<String, String> {
    let source_type = SourceType::default().with_module(false);
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type).parse();
    if let Some(err) = ret.errors.first() {
        return Err(format!("linked output failed to parse: {}", err.message));
    }

    let mut scanner = EnvScanner::default();
    scanner.visit_program(&ret.program);

    let mut replacements: Vec<(u32, u32, String)> = Vec::new();
    match variant {
        CodeVariant::Dev => {
            for span in &scanner.env_reads {
                replacements.push((span.start, span.end, "\"development\"".to_string()));
            }
        }
        CodeVariant::Prod => {
            let outermost: Vec<Span> = scanner
                .dev_blocks
                .iter()
                .copied()
                .filter(|b| !scanner.dev_blocks.iter().any(|o| o != b && contains(*o, *b)))
                .collect();
            for block in &outermost {
                replacements.push((block.start, block.end, String::new()));
            }
            for span in &scanner.env_reads {
                if !outermost.iter().any(|b| contains(*b, *span)) {
                    replacements.push((span.start, span.end, "\"production\"".to_string()));
                }
            }
        }
    }

    // Sort reverse to apply safely
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    let mut result = code.to_string();
    for (start, end, replacement) in replacements {
        result.replace_range((start as usize)..(end as usize), &replacement);
    }

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &result, source_type).parse();
    if let Some(err) = ret.errors.first() {
        return Err(format!("{} output failed to parse: {}", variant, err.message));
    }
    let printed = match variant {
        CodeVariant::Dev => Codegen::new().build(&ret.program).code,
        CodeVariant::Prod => {
            Codegen::new()
                .with_options(CodegenOptions::minify())
                .build(&ret.program)
                .code
        }
    };
    Ok(printed)
}
