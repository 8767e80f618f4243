//! Script analysis and module rewriting.
//!
//! A script is parsed once with oxc. The pass records its imports, the
//! span edits that turn ES module syntax into writes on an `__exports`
//! object, the decorator metadata, and lint findings. Import statements are
//! left as placeholders until the linker knows how each specifier resolves.

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::scope::ScopeFlags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::RuleConfig;
use crate::decorators::{extract_decorators, ClassDecorators, MemberKind, RecognizedDecorator};
use crate::error::{SourceLocation, SyntaxError};
use crate::lint::{run_rules, LintFinding};
use crate::text_util::{escape_for_javascript_string, is_valid_js_identifier};

/// Local used for anonymous default exports.
pub const DEFAULT_LOCAL: &str = "__default";

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImportBinding {
    Default { local: String },
    Named { imported: String, local: String },
    Namespace { local: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImportKind {
    /// `import a, { b as c } from '...'`
    Bindings { bindings: Vec<ImportBinding> },
    /// `import '...'`
    SideEffect,
    /// `export { a as b } from '...'` as (imported, exported) pairs
    ReExport { names: Vec<(String, String)> },
    /// `export * from '...'`
    ReExportAll,
    /// `export * as ns from '...'`
    ReExportNamespace { exported: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub specifier: String,
    pub kind: ImportKind,
    pub start: u32,
}

impl ImportRecord {
    pub fn is_relative(&self) -> bool {
        self.specifier.starts_with("./") || self.specifier.starts_with("../")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPAN EDITS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum EditKind {
    Text(String),
    /// Filled in by the linker from `imports[index]`.
    Import(usize),
}

#[derive(Debug, Clone)]
struct SpanEdit {
    start: u32,
    end: u32,
    seq: usize,
    kind: EditKind,
}

#[derive(Default)]
struct EditList {
    edits: Vec<SpanEdit>,
}

impl EditList {
    fn replace(&mut self, start: u32, end: u32, text: impl Into<String>) {
        let seq = self.edits.len();
        self.edits.push(SpanEdit {
            start,
            end,
            seq,
            kind: EditKind::Text(text.into()),
        });
    }

    fn insert(&mut self, at: u32, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    fn import(&mut self, span: Span, index: usize) {
        let seq = self.edits.len();
        self.edits.push(SpanEdit {
            start: span.start,
            end: span.end,
            seq,
            kind: EditKind::Import(index),
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ScriptAnalysis {
    pub file: String,
    pub source: String,
    pub imports: Vec<ImportRecord>,
    pub has_default_export: bool,
    pub decorators: Vec<RecognizedDecorator>,
    pub lint_findings: Vec<LintFinding>,
    edits: Vec<SpanEdit>,
}

fn export_name(name: &ModuleExportName) -> String {
    name.name().to_string()
}

/// `__exports.name` or `__exports["na-me"]`.
fn export_target(name: &str) -> String {
    if is_valid_js_identifier(name) {
        format!("__exports.{}", name)
    } else {
        format!("__exports[\"{}\"]", escape_for_javascript_string(name))
    }
}

fn collect_binding_pattern(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => {
            names.push(id.name.to_string());
        }
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_pattern(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_pattern(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for pattern in arr.elements.iter().flatten() {
                collect_binding_pattern(pattern, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_pattern(&rest.argument, names);
            }
        }
        _ => {}
    }
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for decl in &var.declarations {
                collect_binding_pattern(&decl.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
    names
}

fn import_bindings(decl: &ImportDeclaration) -> ImportKind {
    let Some(specifiers) = &decl.specifiers else {
        return ImportKind::SideEffect;
    };
    if specifiers.is_empty() {
        return ImportKind::SideEffect;
    }
    let bindings = specifiers
        .iter()
        .map(|spec| match spec {
            ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding::Named {
                imported: export_name(&s.imported),
                local: s.local.name.to_string(),
            },
            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => ImportBinding::Default {
                local: s.local.name.to_string(),
            },
            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => ImportBinding::Namespace {
                local: s.local.name.to_string(),
            },
        })
        .collect();
    ImportKind::Bindings { bindings }
}

/// Static metadata assignments replacing the decorators of one class.
fn class_metadata(class_name: &str, class: &ClassDecorators) -> String {
    let mut public_props: Vec<(String, u8)> = Vec::new();
    let mut public_methods: Vec<String> = Vec::new();
    let mut tracked: Vec<String> = Vec::new();
    let mut wired: Vec<String> = Vec::new();

    for site in &class.sites {
        match &site.decorator {
            RecognizedDecorator::Api(api) => {
                let config = match api.kind {
                    MemberKind::Method => {
                        public_methods.push(api.target.clone());
                        continue;
                    }
                    MemberKind::Property => 0,
                    MemberKind::Getter => 1,
                    MemberKind::Setter => 2,
                };
                match public_props.iter_mut().find(|(name, _)| *name == api.target) {
                    Some(entry) => entry.1 |= config,
                    None => public_props.push((api.target.clone(), config)),
                }
            }
            RecognizedDecorator::Track(track) => tracked.push(track.target.clone()),
            RecognizedDecorator::Wire(wire) => {
                let pairs = |map: &std::collections::BTreeMap<String, String>, quote: bool| {
                    map.iter()
                        .map(|(k, v)| {
                            let value = if quote {
                                format!("\"{}\"", escape_for_javascript_string(v))
                            } else {
                                v.clone()
                            };
                            format!("{}: {}", object_key(k), value)
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let method = if wire.kind == MemberKind::Method {
                    ", method: 1"
                } else {
                    ""
                };
                wired.push(format!(
                    "{}: {{ adapter: {}, params: {}, static: {}{} }}",
                    object_key(&wire.target),
                    site.adapter_source.as_deref().unwrap_or("undefined"),
                    braces(&pairs(&wire.params, true)),
                    braces(&pairs(&wire.static_fields, false)),
                    method
                ));
            }
        }
    }

    let mut out = String::new();
    if !public_props.is_empty() {
        let props: Vec<String> = public_props
            .iter()
            .map(|(name, config)| format!("{}: {{ config: {} }}", object_key(name), config))
            .collect();
        out.push_str(&format!("\n{}.publicProps = {{ {} }};", class_name, props.join(", ")));
    }
    if !public_methods.is_empty() {
        let methods: Vec<String> = public_methods
            .iter()
            .map(|m| format!("\"{}\"", escape_for_javascript_string(m)))
            .collect();
        out.push_str(&format!("\n{}.publicMethods = [{}];", class_name, methods.join(", ")));
    }
    if !tracked.is_empty() {
        let fields: Vec<String> = tracked.iter().map(|t| format!("{}: 1", object_key(t))).collect();
        out.push_str(&format!("\n{}.track = {{ {} }};", class_name, fields.join(", ")));
    }
    if !wired.is_empty() {
        out.push_str(&format!("\n{}.wire = {{ {} }};", class_name, wired.join(", ")));
    }
    out
}

fn braces(inner: &str) -> String {
    if inner.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", inner)
    }
}

fn object_key(name: &str) -> String {
    if is_valid_js_identifier(name) {
        name.to_string()
    } else {
        format!("\"{}\"", escape_for_javascript_string(name))
    }
}

/// `<message> (<line>:<column>)` with the 0-based column the module
/// tooling reports.
fn script_error(source: &str, file: &str, offset: usize, message: &str) -> SyntaxError {
    let location = SourceLocation::from_offset(source, offset);
    SyntaxError::new(
        file,
        location,
        format!(
            "{} ({}:{})",
            message,
            location.line,
            location.column.saturating_sub(1)
        ),
    )
}

/// First `await` evaluated at module level. Bodies of functions and arrows
/// are not entered.
#[derive(Default)]
struct TopLevelAwait {
    found: Option<Span>,
}

impl TopLevelAwait {
    fn record(&mut self, span: Span) {
        if self.found.is_none() {
            self.found = Some(span);
        }
    }
}

impl<'a> Visit<'a> for TopLevelAwait {
    fn visit_function(&mut self, _func: &Function<'a>, _flags: ScopeFlags) {}

    fn visit_arrow_function_expression(&mut self, _func: &ArrowFunctionExpression<'a>) {}

    fn visit_await_expression(&mut self, expr: &AwaitExpression<'a>) {
        self.record(expr.span);
        walk::walk_await_expression(self, expr);
    }

    fn visit_for_of_statement(&mut self, stmt: &ForOfStatement<'a>) {
        if stmt.r#await {
            self.record(stmt.span);
        }
        walk::walk_for_of_statement(self, stmt);
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        if decl.kind == VariableDeclarationKind::AwaitUsing {
            self.record(decl.span);
        }
        walk::walk_variable_declaration(self, decl);
    }
}

/// Parse and analyze one script file. `rules` is `None` when linting is off.
pub fn analyze_script(
    source: &str,
    file: &str,
    rules: Option<&[RuleConfig]>,
) -> Result<ScriptAnalysis, SyntaxError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if let Some(first) = ret.errors.first() {
        let offset = first
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset())
            .unwrap_or(0);
        return Err(script_error(source, file, offset, &first.message));
    }
    let program = ret.program;

    let mut top_level_await = TopLevelAwait::default();
    top_level_await.visit_program(&program);
    if let Some(span) = top_level_await.found {
        return Err(script_error(
            source,
            file,
            span.start as usize,
            "Top-level await is not supported in component modules",
        ));
    }

    let mut edits = EditList::default();
    let mut imports: Vec<ImportRecord> = Vec::new();
    let mut has_default_export = false;
    // class span start -> (statement end, binding name)
    let mut top_level_classes: HashMap<u32, (u32, String)> = HashMap::new();

    for stmt in &program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                edits.import(decl.span, imports.len());
                imports.push(ImportRecord {
                    specifier: decl.source.value.to_string(),
                    kind: import_bindings(decl),
                    start: decl.span.start,
                });
            }

            Statement::ExportDefaultDeclaration(decl) => {
                has_default_export = true;
                let inner = decl.declaration.span();
                let (inner_start, name) = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        (func.span.start, func.id.as_ref().map(|id| id.name.to_string()))
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        let name = class.id.as_ref().map(|id| id.name.to_string());
                        top_level_classes.insert(
                            class.span.start,
                            (
                                decl.span.end,
                                name.clone().unwrap_or_else(|| DEFAULT_LOCAL.to_string()),
                            ),
                        );
                        (class.span.start, name)
                    }
                    other => (other.span().start, None),
                };
                match name {
                    Some(name) => {
                        edits.replace(decl.span.start, inner_start, "");
                        edits.insert(decl.span.end, format!("\n__exports.default = {};", name));
                    }
                    None => {
                        edits.replace(
                            decl.span.start,
                            inner_start,
                            format!("const {} = ", DEFAULT_LOCAL),
                        );
                        // the trailing `;` of the export, if any, is replaced
                        edits.replace(
                            inner.end,
                            decl.span.end,
                            format!(";\n__exports.default = {};", DEFAULT_LOCAL),
                        );
                    }
                }
            }

            Statement::ExportNamedDeclaration(decl) => {
                if let Some(from) = &decl.source {
                    let names = decl
                        .specifiers
                        .iter()
                        .map(|s| (export_name(&s.local), export_name(&s.exported)))
                        .collect();
                    edits.import(decl.span, imports.len());
                    imports.push(ImportRecord {
                        specifier: from.value.to_string(),
                        kind: ImportKind::ReExport { names },
                        start: decl.span.start,
                    });
                } else if let Some(declaration) = &decl.declaration {
                    if let Declaration::ClassDeclaration(class) = declaration {
                        if let Some(id) = &class.id {
                            top_level_classes
                                .insert(class.span.start, (decl.span.end, id.name.to_string()));
                        }
                    }
                    edits.replace(decl.span.start, declaration.span().start, "");
                    let assignments: String = declared_names(declaration)
                        .iter()
                        .map(|name| format!("\n{} = {};", export_target(name), name))
                        .collect();
                    edits.insert(decl.span.end, assignments);
                } else {
                    let assignments: Vec<String> = decl
                        .specifiers
                        .iter()
                        .map(|s| {
                            format!(
                                "{} = {};",
                                export_target(&export_name(&s.exported)),
                                export_name(&s.local)
                            )
                        })
                        .collect();
                    if decl.specifiers.iter().any(|s| export_name(&s.exported) == "default") {
                        has_default_export = true;
                    }
                    edits.replace(decl.span.start, decl.span.end, assignments.join("\n"));
                }
            }

            Statement::ExportAllDeclaration(decl) => {
                let kind = match &decl.exported {
                    Some(name) => ImportKind::ReExportNamespace {
                        exported: export_name(name),
                    },
                    None => ImportKind::ReExportAll,
                };
                edits.import(decl.span, imports.len());
                imports.push(ImportRecord {
                    specifier: decl.source.value.to_string(),
                    kind,
                    start: decl.span.start,
                });
            }

            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    top_level_classes.insert(class.span.start, (class.span.end, id.name.to_string()));
                }
            }

            _ => {}
        }
    }

    let classes = extract_decorators(&program, source, file);
    for class in &classes {
        for site in &class.sites {
            edits.replace(site.span.start, site.span.end, "");
        }
        let Some((insert_at, name)) = top_level_classes.get(&class.class_span.start) else {
            return Err(script_error(
                source,
                file,
                class.class_span.start as usize,
                &format!(
                    "Decorators are only supported on top-level class declarations; '{}' is nested or anonymous",
                    class.class_name.as_deref().unwrap_or("<anonymous>")
                ),
            ));
        };
        edits.insert(*insert_at, class_metadata(name, class));
    }
    let decorators = classes.iter().flat_map(|c| c.decorators().cloned()).collect();

    let lint_findings = match rules {
        Some(rules) => run_rules(&program, rules, source, file),
        None => Vec::new(),
    };

    debug!(
        file,
        imports = imports.len(),
        decorated_classes = classes.len(),
        findings = lint_findings.len(),
        "analyzed script"
    );

    Ok(ScriptAnalysis {
        file: file.to_string(),
        source: source.to_string(),
        imports,
        has_default_export,
        decorators,
        lint_findings,
        edits: edits.edits,
    })
}

impl ScriptAnalysis {
    /// Apply the recorded edits. `render_import` supplies the replacement
    /// text for each import placeholder.
    pub fn render<F>(&self, mut render_import: F) -> String
    where
        F: FnMut(usize, &ImportRecord) -> String,
    {
        let mut edits = self.edits.clone();
        // Last edit first; on a shared start the wider replacement goes
        // first so zero-width inserts land in front of it.
        edits.sort_by(|a, b| {
            b.start
                .cmp(&a.start)
                .then(b.end.cmp(&a.end))
                .then(b.seq.cmp(&a.seq))
        });

        let mut result = self.source.clone();
        for edit in edits {
            let text = match &edit.kind {
                EditKind::Text(text) => text.clone(),
                EditKind::Import(index) => match self.imports.get(*index) {
                    Some(record) => render_import(*index, record),
                    None => String::new(),
                },
            };
            let (start, end) = (edit.start as usize, edit.end as usize);
            if start <= end && end <= result.len() {
                result.replace_range(start..end, &text);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use pretty_assertions::assert_eq;

    const FILE: &str = "x/foo/foo.js";

    fn render_placeholder(_index: usize, record: &ImportRecord) -> String {
        format!("/* import {} */", record.specifier)
    }

    #[test]
    fn test_syntax_error_location() {
        let err = analyze_script("class A\n  foo() {}\n", FILE, None).unwrap_err();
        assert_eq!(err.file, FILE);
        assert_eq!(err.line, 2);
        assert!(err.message.ends_with("(2:2)"), "{}", err.message);
    }

    #[test]
    fn test_top_level_await_is_rejected() {
        let err = analyze_script("const a = 1;\nconst data = await fetch('/x');\n", FILE, None).unwrap_err();
        assert_eq!(err.file, FILE);
        assert_eq!(err.line, 2);
        assert_eq!(
            err.message,
            "Top-level await is not supported in component modules (2:13)"
        );

        let err = analyze_script("for await (const x of xs) {}\n", FILE, None).unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_await_inside_functions_is_allowed() {
        let source = "export async function load() { return await fetch('/x'); }\n\
                      export const run = async () => { for await (const x of xs) {} };\n\
                      export default class Foo { async connected() { await load(); } }\n";
        assert!(analyze_script(source, FILE, None).is_ok());
    }

    #[test]
    fn test_import_records() {
        let source = "import { LightningElement, api as pub } from 'lwc';\nimport helper from './helper';\nimport 'x/polyfill';\nexport * from './shared';\nexport { a as b } from './more';\n";
        let analysis = analyze_script(source, FILE, None).unwrap();
        let specifiers: Vec<&str> = analysis.imports.iter().map(|i| i.specifier.as_str()).collect();
        assert_eq!(specifiers, vec!["lwc", "./helper", "x/polyfill", "./shared", "./more"]);
        assert_eq!(
            analysis.imports[0].kind,
            ImportKind::Bindings {
                bindings: vec![
                    ImportBinding::Named {
                        imported: "LightningElement".to_string(),
                        local: "LightningElement".to_string()
                    },
                    ImportBinding::Named {
                        imported: "api".to_string(),
                        local: "pub".to_string()
                    },
                ]
            }
        );
        assert_eq!(analysis.imports[2].kind, ImportKind::SideEffect);
        assert_eq!(analysis.imports[3].kind, ImportKind::ReExportAll);
        assert_eq!(
            analysis.imports[4].kind,
            ImportKind::ReExport {
                names: vec![("a".to_string(), "b".to_string())]
            }
        );
        assert!(analysis.imports[1].is_relative());
        assert!(!analysis.has_default_export);
    }

    #[test]
    fn test_exports_become_assignments() {
        let source = "export const a = 1, { b } = { b: 2 };\nexport function f() {}\nconst c = 3;\nexport { c as d };\nexport default class Foo {}\n";
        let analysis = analyze_script(source, FILE, None).unwrap();
        assert!(analysis.has_default_export);
        let out = analysis.render(render_placeholder);
        assert_eq!(
            out,
            "const a = 1, { b } = { b: 2 };\n__exports.a = a;\n__exports.b = b;\nfunction f() {}\n__exports.f = f;\nconst c = 3;\n__exports.d = c;\nclass Foo {}\n__exports.default = Foo;\n"
        );
    }

    #[test]
    fn test_anonymous_default_export() {
        let analysis = analyze_script("export default { a: 1 };\n", FILE, None).unwrap();
        assert_eq!(
            analysis.render(render_placeholder),
            "const __default = { a: 1 };\n__exports.default = __default;\n"
        );
    }

    #[test]
    fn test_decorators_replaced_by_metadata() {
        let source = r#"import { LightningElement, api, track, wire } from 'lwc';
import { getRecord } from 'x-record-api';
export default class Foo extends LightningElement {
    @api recordId;
    @track state = {};
    @wire(getRecord, { id: '$recordId' }) record;
    @api focus() {}
}
"#;
        let analysis = analyze_script(source, FILE, None).unwrap();
        assert_eq!(analysis.decorators.len(), 4);
        let out = analysis.render(render_placeholder);
        assert!(!out.contains('@'), "{}", out);
        assert!(out.contains("/* import lwc */"));
        assert!(out.contains("class Foo extends LightningElement {"));
        assert!(!out.contains("export default"));
        assert!(out.contains("Foo.publicProps = { recordId: { config: 0 } };"));
        assert!(out.contains("Foo.publicMethods = [\"focus\"];"));
        assert!(out.contains("Foo.track = { state: 1 };"));
        assert!(out.contains(
            "Foo.wire = { record: { adapter: getRecord, params: { id: \"recordId\" }, static: {} } };"
        ));
        assert!(out.contains("}\n__exports.default = Foo;\nFoo.publicProps"));
    }

    #[test]
    fn test_decorated_nested_class_is_rejected() {
        let source = r#"import { api } from 'lwc';
export function make() {
    return class Inner {
        @api value;
    };
}
"#;
        let err = analyze_script(source, FILE, None).unwrap_err();
        assert_eq!(err.file, FILE);
        assert_eq!(err.line, 3);
        assert!(err.message.contains("'Inner'"), "{}", err.message);
        assert!(err.message.ends_with("(3:11)"), "{}", err.message);

        let err = analyze_script("import { api } from 'lwc';\nconst Foo = class { @api value; };\n", FILE, None)
            .unwrap_err();
        assert!(err.message.contains("'<anonymous>'"), "{}", err.message);
    }

    #[test]
    fn test_undecorated_nested_class_is_kept() {
        let source = "export function make() {\n    return class Inner { value = 1; };\n}\n";
        let out = analyze_script(source, FILE, None).unwrap().render(render_placeholder);
        assert!(out.contains("return class Inner { value = 1; };"), "{}", out);
    }

    #[test]
    fn test_lint_runs_only_with_rules() {
        let source = "console.log('error');";
        let analysis = analyze_script(source, FILE, None).unwrap();
        assert!(analysis.lint_findings.is_empty());

        let rules = CompilerConfig::default().rules;
        let analysis = analyze_script(source, FILE, Some(&rules)).unwrap();
        assert_eq!(analysis.lint_findings.len(), 1);
        assert_eq!(analysis.lint_findings[0].message, "Unexpected console statement.");
    }
}
