//! Decorator metadata extraction.
//!
//! Walks class bodies and recognizes `@api`, `@track` and `@wire(adapter,
//! config)`. The results feed both the compile result and the static class
//! metadata the script rewriter emits in place of the decorators.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::{GetSpan, Span};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Module the decorator functions are imported from.
pub const FRAMEWORK_MODULE: &str = "lwc";

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberKind {
    Property,
    Method,
    Getter,
    Setter,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAdapter {
    pub name: String,
    /// Module specifier the adapter comes from, or the declaring file for
    /// local adapters.
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDecoration {
    pub target: String,
    pub kind: MemberKind,
    pub adapter: WireAdapter,
    /// Config key -> reactive component property (`'$recordId'` -> `recordId`).
    pub params: BTreeMap<String, String>,
    /// Config key -> source text of a non-reactive value.
    #[serde(rename = "static")]
    pub static_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDecoration {
    pub target: String,
    pub kind: MemberKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDecoration {
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecognizedDecorator {
    Api(ApiDecoration),
    Track(TrackDecoration),
    Wire(WireDecoration),
}

impl RecognizedDecorator {
    pub fn as_wire(&self) -> Option<&WireDecoration> {
        match self {
            RecognizedDecorator::Wire(w) => Some(w),
            _ => None,
        }
    }
}

/// One recognized decorator and where it sits in the source.
#[derive(Debug, Clone)]
pub struct DecoratorSite {
    pub decorator: RecognizedDecorator,
    pub span: Span,
    /// Source text of the `@wire` adapter argument.
    pub adapter_source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClassDecorators {
    pub class_name: Option<String>,
    pub class_span: Span,
    pub sites: Vec<DecoratorSite>,
}

impl ClassDecorators {
    pub fn decorators(&self) -> impl Iterator<Item = &RecognizedDecorator> {
        self.sites.iter().map(|s| &s.decorator)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IMPORT MAP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum ImportedBinding {
    Named { imported: String, specifier: String },
    Default { specifier: String },
    Namespace { specifier: String },
}

impl ImportedBinding {
    fn specifier(&self) -> &str {
        match self {
            ImportedBinding::Named { specifier, .. }
            | ImportedBinding::Default { specifier }
            | ImportedBinding::Namespace { specifier } => specifier,
        }
    }
}

fn collect_imports(program: &Program) -> HashMap<String, ImportedBinding> {
    let mut imports = HashMap::new();
    for stmt in &program.body {
        let Statement::ImportDeclaration(decl) = stmt else { continue };
        let specifier = decl.source.value.to_string();
        let Some(specifiers) = &decl.specifiers else { continue };
        for spec in specifiers {
            let (local, binding) = match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => (
                    s.local.name.to_string(),
                    ImportedBinding::Named {
                        imported: s.imported.name().to_string(),
                        specifier: specifier.clone(),
                    },
                ),
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => (
                    s.local.name.to_string(),
                    ImportedBinding::Default {
                        specifier: specifier.clone(),
                    },
                ),
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => (
                    s.local.name.to_string(),
                    ImportedBinding::Namespace {
                        specifier: specifier.clone(),
                    },
                ),
            };
            imports.insert(local, binding);
        }
    }
    imports
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTRACTOR
// ═══════════════════════════════════════════════════════════════════════════════

struct DecoratorCollector<'s> {
    source: &'s str,
    file: &'s str,
    imports: HashMap<String, ImportedBinding>,
    classes: Vec<ClassDecorators>,
}

/// `recordId`, `record.id` or `this.recordId` as a property path of the
/// component; `None` for anything that is not a plain member chain.
fn reactive_path(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(id) => Some(id.name.to_string()),
        Expression::StaticMemberExpression(member) => match &member.object {
            Expression::ThisExpression(_) => Some(member.property.name.to_string()),
            object => {
                reactive_path(object).map(|head| format!("{}.{}", head, member.property.name))
            }
        },
        _ => None,
    }
}

impl<'s> DecoratorCollector<'s> {
    fn text(&self, span: Span) -> &'s str {
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
    }

    /// `api`, `track` or `wire` when `name` refers to the framework export.
    fn framework_decorator(&self, name: &str) -> Option<&'static str> {
        let canonical = match self.imports.get(name) {
            Some(ImportedBinding::Named { imported, specifier }) if specifier == FRAMEWORK_MODULE => {
                imported.as_str()
            }
            Some(_) => return None,
            None => name,
        };
        match canonical {
            "api" => Some("api"),
            "track" => Some("track"),
            "wire" => Some("wire"),
            _ => None,
        }
    }

    fn resolve_adapter(&self, expr: &Expression) -> Option<WireAdapter> {
        match expr {
            Expression::Identifier(id) => {
                let name = id.name.to_string();
                Some(match self.imports.get(&name) {
                    Some(ImportedBinding::Named { imported, specifier }) => WireAdapter {
                        name: imported.clone(),
                        reference: specifier.clone(),
                    },
                    Some(binding) => WireAdapter {
                        name: "default".to_string(),
                        reference: binding.specifier().to_string(),
                    },
                    None => WireAdapter {
                        name,
                        reference: self.file.to_string(),
                    },
                })
            }
            Expression::StaticMemberExpression(member) => {
                let property = member.property.name.to_string();
                match &member.object {
                    Expression::Identifier(object) => match self.imports.get(object.name.as_str()) {
                        Some(ImportedBinding::Namespace { specifier }) => Some(WireAdapter {
                            name: property,
                            reference: specifier.clone(),
                        }),
                        _ => Some(WireAdapter {
                            name: self.text(member.span).to_string(),
                            reference: self.file.to_string(),
                        }),
                    },
                    _ => Some(WireAdapter {
                        name: self.text(member.span).to_string(),
                        reference: self.file.to_string(),
                    }),
                }
            }
            Expression::StringLiteral(lit) => Some(WireAdapter {
                name: lit.value.to_string(),
                reference: lit.value.to_string(),
            }),
            _ => None,
        }
    }

    fn wire_config(
        &self,
        expr: Option<&Expression>,
        target: &str,
    ) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
        let mut params = BTreeMap::new();
        let mut static_fields = BTreeMap::new();
        let Some(expr) = expr else {
            return (params, static_fields);
        };
        let Expression::ObjectExpression(object) = expr else {
            warn!(file = self.file, target, "@wire config is not an object literal; ignored");
            return (params, static_fields);
        };
        for property in &object.properties {
            let ObjectPropertyKind::ObjectProperty(prop) = property else { continue };
            if prop.computed {
                continue;
            }
            let Some(key) = prop.key.static_name() else { continue };
            let reactive = match &prop.value {
                Expression::StringLiteral(lit) if lit.value.starts_with('$') => {
                    Some(lit.value.as_str()[1..].to_string())
                }
                value => reactive_path(value),
            };
            match reactive {
                Some(path) => {
                    params.insert(key.to_string(), path);
                }
                None => {
                    static_fields.insert(key.to_string(), self.text(prop.value.span()).to_string());
                }
            }
        }
        (params, static_fields)
    }

    fn member_sites(
        &self,
        decorators: &[Decorator],
        target: &str,
        kind: MemberKind,
    ) -> Vec<DecoratorSite> {
        let mut sites = Vec::new();
        for decorator in decorators {
            let (callee, arguments) = match &decorator.expression {
                Expression::Identifier(id) => (id.name.as_str(), None),
                Expression::CallExpression(call) => match &call.callee {
                    Expression::Identifier(id) => (id.name.as_str(), Some(&call.arguments)),
                    _ => continue,
                },
                _ => continue,
            };

            let recognized = match self.framework_decorator(callee) {
                Some("api") => RecognizedDecorator::Api(ApiDecoration {
                    target: target.to_string(),
                    kind,
                }),
                Some("track") => RecognizedDecorator::Track(TrackDecoration {
                    target: target.to_string(),
                }),
                Some("wire") => {
                    let args: Vec<&Expression> = arguments
                        .map(|a| a.iter().filter_map(|arg| arg.as_expression()).collect())
                        .unwrap_or_default();
                    let Some(adapter_expr) = args.first() else {
                        warn!(file = self.file, target, "@wire without an adapter; skipped");
                        continue;
                    };
                    let Some(adapter) = self.resolve_adapter(adapter_expr) else {
                        warn!(file = self.file, target, "@wire adapter is not a reference; skipped");
                        continue;
                    };
                    let (params, static_fields) = self.wire_config(args.get(1).copied(), target);
                    let wire_kind = if kind == MemberKind::Method {
                        MemberKind::Method
                    } else {
                        MemberKind::Property
                    };
                    sites.push(DecoratorSite {
                        decorator: RecognizedDecorator::Wire(WireDecoration {
                            target: target.to_string(),
                            kind: wire_kind,
                            adapter,
                            params,
                            static_fields,
                        }),
                        span: decorator.span,
                        adapter_source: Some(self.text(adapter_expr.span()).to_string()),
                    });
                    continue;
                }
                _ => continue,
            };
            sites.push(DecoratorSite {
                decorator: recognized,
                span: decorator.span,
                adapter_source: None,
            });
        }
        sites
    }
}

impl<'a, 's> Visit<'a> for DecoratorCollector<'s> {
    fn visit_class(&mut self, class: &Class<'a>) {
        let mut sites = Vec::new();
        for element in &class.body.body {
            let (decorators, key, kind) = match element {
                ClassElement::PropertyDefinition(prop) => {
                    (&prop.decorators, &prop.key, MemberKind::Property)
                }
                ClassElement::AccessorProperty(prop) => {
                    (&prop.decorators, &prop.key, MemberKind::Property)
                }
                ClassElement::MethodDefinition(method) => {
                    let kind = match method.kind {
                        MethodDefinitionKind::Get => MemberKind::Getter,
                        MethodDefinitionKind::Set => MemberKind::Setter,
                        MethodDefinitionKind::Method => MemberKind::Method,
                        MethodDefinitionKind::Constructor => continue,
                    };
                    (&method.decorators, &method.key, kind)
                }
                _ => continue,
            };
            if decorators.is_empty() {
                continue;
            }
            let Some(target) = key.static_name() else {
                warn!(file = self.file, "decorated member with a computed key; skipped");
                continue;
            };
            sites.extend(self.member_sites(decorators, &target, kind));
        }

        if !sites.is_empty() {
            self.classes.push(ClassDecorators {
                class_name: class.id.as_ref().map(|id| id.name.to_string()),
                class_span: class.span,
                sites,
            });
        }
        walk::walk_class(self, class);
    }
}

/// Collect the recognized decorators of every class in `program`, in
/// source order. Identical usages on different members are all kept.
pub fn extract_decorators(program: &Program, source: &str, file: &str) -> Vec<ClassDecorators> {
    let mut collector = DecoratorCollector {
        source,
        file,
        imports: collect_imports(program),
        classes: Vec::new(),
    };
    collector.visit_program(program);
    collector.classes
}

/// Flattened wire decorations of a decorator extraction.
pub fn wire_decorations(classes: &[ClassDecorators]) -> Vec<WireDecoration> {
    classes
        .iter()
        .flat_map(|c| c.decorators())
        .filter_map(RecognizedDecorator::as_wire)
        .cloned()
        .collect()
}
