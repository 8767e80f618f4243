//! Template Module
//!
//! Parses component markup with html5ever into a small template IR and
//! generates the render-function module that the linker wraps like any
//! other script.
//!
//! Markup syntax:
//! - `{a.b}` in text or as a whole attribute value binds a component field
//! - `if:true={x}` / `if:false={x}` render a node conditionally
//! - `for:each={items} for:item="item" for:index="i"` repeat a node
//! - `on<event>={handler}` attach a listener
//! - `<ns-some-name>` references the custom element module `ns/someName`

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{SourceLocation, SyntaxError};
use crate::text_util::{
    dashed_to_camel_case, escape_for_javascript_string, is_valid_js_identifier,
    validate_attribute_name,
};
use crate::visitor::{walk_element, TemplateVisitor};

/// html5ever moves `<template>` children into a detached content fragment.
/// Template tags are renamed to this marker before parsing so their children
/// stay in the tree.
const FRAGMENT_TAG: &str = "bc-template";

const HTML_SPEC_ERRORS_URL: &str = "https://html.spec.whatwg.org/multipage/parsing.html";

lazy_static! {
    static ref VOID_ELEMENTS: HashSet<&'static str> = [
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ]
    .into_iter()
    .collect();

    /// Roots of foreign content, where a trailing solidus is legal.
    static ref FOREIGN_ROOTS: HashSet<&'static str> = ["svg", "math"].into_iter().collect();

    static ref COMMENT_RE: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();

    static ref TAG_RE: Regex = Regex::new(
        r#"</?([a-zA-Z][a-zA-Z0-9:_-]*)((?:\s+[^\s/>"'=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*(/?)>"#
    )
    .unwrap();

    static ref ATTR_RE: Regex = Regex::new(
        r#"([^\s/>"'=]+)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?"#
    )
    .unwrap();

    static ref TEMPLATE_TAG_RE: Regex = Regex::new(r"(?i)<(/?)template([\s/>])").unwrap();

    static ref EXPRESSION_PATH_RE: Regex =
        Regex::new(r"^[a-zA-Z_$][a-zA-Z0-9_$]*(\.[a-zA-Z_$][a-zA-Z0-9_$]*)*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE IR TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateIR {
    pub file: String,
    pub nodes: Vec<TemplateNode>,
    /// Custom elements in first-seen document order, deduplicated by module.
    pub custom_elements: Vec<CustomElementRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
    Expression(ExpressionNode),
    Fragment(FragmentNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttributeIR>,
    pub listeners: Vec<Listener>,
    pub directives: Directives,
    pub children: Vec<TemplateNode>,
}

impl ElementNode {
    pub fn is_custom_element(&self) -> bool {
        custom_element_module(&self.tag).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
}

/// A `{path}` binding rendered as dynamic text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub path: String,
}

/// A nested `<template>` carrying directives; renders its children only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentNode {
    pub directives: Directives,
    pub children: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeIR {
    pub name: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum AttributeValue {
    Static(String),
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub event: String,
    pub handler: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directives {
    pub condition: Option<IfDirective>,
    pub iteration: Option<ForEachDirective>,
    pub key: Option<AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IfDirective {
    pub path: String,
    /// `true` for `if:true`, `false` for `if:false`.
    pub when: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForEachDirective {
    pub path: String,
    pub item: String,
    pub index: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomElementRef {
    pub tag: String,
    pub module: String,
}

/// `x-foo-bar` -> `x/fooBar`. Returns `None` for non custom element tags.
pub fn custom_element_module(tag: &str) -> Option<String> {
    if tag == FRAGMENT_TAG {
        return None;
    }
    let (namespace, rest) = tag.split_once('-')?;
    if namespace.is_empty() || rest.is_empty() {
        return None;
    }
    Some(format!("{}/{}", namespace, dashed_to_camel_case(rest)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP PRE-SCAN
// ═══════════════════════════════════════════════════════════════════════════════

fn html_syntax_error(file: &str, source: &str, offset: usize, category: &str) -> SyntaxError {
    SyntaxError::new(
        file,
        SourceLocation::from_offset(source, offset),
        format!(
            "Invalid HTML syntax: {}. For more information, please visit {}#parse-error-{}",
            category, HTML_SPEC_ERRORS_URL, category
        ),
    )
}

/// Replace comments with spaces, keeping byte offsets and line breaks.
fn blank_comments(html: &str) -> String {
    COMMENT_RE
        .replace_all(html, |caps: &regex::Captures| {
            caps[0]
                .bytes()
                .map(|b| if b == b'\n' { '\n' } else { ' ' })
                .collect::<String>()
        })
        .to_string()
}

/// Detect the parse errors html5ever recovers from silently but that a
/// component template must not contain.
fn scan_markup(html: &str, file: &str) -> Result<(), SyntaxError> {
    let blanked = blank_comments(html);
    let mut foreign_depth = 0usize;

    for caps in TAG_RE.captures_iter(&blanked) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps[1].to_ascii_lowercase();

        if whole.as_str().starts_with("</") {
            if FOREIGN_ROOTS.contains(name.as_str()) {
                foreign_depth = foreign_depth.saturating_sub(1);
            }
            continue;
        }

        if let Some(attrs) = caps.get(2) {
            let mut seen = HashSet::new();
            for attr in ATTR_RE.captures_iter(attrs.as_str()) {
                if !seen.insert(attr[1].to_ascii_lowercase()) {
                    let offset = attrs.start() + attr.get(0).map_or(0, |m| m.start());
                    return Err(html_syntax_error(file, html, offset, "duplicate-attribute"));
                }
            }
        }

        let self_closing = caps.get(3).map_or(false, |m| !m.as_str().is_empty());
        if FOREIGN_ROOTS.contains(name.as_str()) {
            if !self_closing {
                foreign_depth += 1;
            }
            continue;
        }

        if self_closing && foreign_depth == 0 && !VOID_ELEMENTS.contains(name.as_str()) {
            return Err(html_syntax_error(
                file,
                html,
                whole.start(),
                "non-void-html-element-start-tag-with-trailing-solidus",
            ));
        }
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOM CONVERSION
// ═══════════════════════════════════════════════════════════════════════════════

struct TemplateBuilder<'s> {
    file: &'s str,
    raw: &'s str,
}

impl<'s> TemplateBuilder<'s> {
    fn error(&self, needle: &str, message: String) -> SyntaxError {
        let location = self
            .raw
            .find(needle)
            .map(|offset| SourceLocation::from_offset(self.raw, offset))
            .unwrap_or_default();
        SyntaxError::new(self.file, location, message)
    }

    fn expression_path(&self, raw_value: &str) -> Result<String, SyntaxError> {
        let path = raw_value.trim();
        if EXPRESSION_PATH_RE.is_match(path) {
            Ok(path.to_string())
        } else {
            Err(self.error(
                raw_value,
                format!(
                    "Invalid expression {{{}}} - only identifiers and member expressions are supported",
                    path
                ),
            ))
        }
    }

    /// `Some(path)` for a value of the form `{path}`.
    fn braced_path(&self, value: &str) -> Result<Option<String>, SyntaxError> {
        let trimmed = value.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('{') && trimmed.ends_with('}') {
            return self
                .expression_path(&trimmed[1..trimmed.len() - 1])
                .map(Some);
        }
        Ok(None)
    }

    fn convert_children(&self, handle: &Handle) -> Result<Vec<TemplateNode>, SyntaxError> {
        let mut nodes = Vec::new();
        for child in handle.children.borrow().iter() {
            nodes.extend(self.convert_node(child)?);
        }
        Ok(nodes)
    }

    fn convert_node(&self, handle: &Handle) -> Result<Vec<TemplateNode>, SyntaxError> {
        match &handle.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if text.trim().is_empty() {
                    return Ok(vec![]);
                }
                self.split_text(&text)
            }
            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.to_string();
                let attributes = attrs.borrow();
                let mut raw_attrs = Vec::with_capacity(attributes.len());
                for attr in attributes.iter() {
                    let attr_name = match &attr.name.prefix {
                        Some(prefix) => format!("{}:{}", prefix, attr.name.local),
                        None => attr.name.local.to_string(),
                    };
                    raw_attrs.push((attr_name, attr.value.to_string()));
                }
                drop(attributes);

                let (attributes, listeners, directives) = self.convert_attributes(&tag, raw_attrs)?;
                let children = self.convert_children(handle)?;

                if tag == FRAGMENT_TAG {
                    Ok(vec![TemplateNode::Fragment(FragmentNode {
                        directives,
                        children,
                    })])
                } else {
                    Ok(vec![TemplateNode::Element(ElementNode {
                        tag,
                        attributes,
                        listeners,
                        directives,
                        children,
                    })])
                }
            }
            NodeData::Comment { .. }
            | NodeData::Doctype { .. }
            | NodeData::ProcessingInstruction { .. }
            | NodeData::Document => Ok(vec![]),
        }
    }

    fn convert_attributes(
        &self,
        tag: &str,
        raw_attrs: Vec<(String, String)>,
    ) -> Result<(Vec<AttributeIR>, Vec<Listener>, Directives), SyntaxError> {
        let display_tag = if tag == FRAGMENT_TAG { "template" } else { tag };
        let mut attributes = Vec::new();
        let mut listeners = Vec::new();
        let mut directives = Directives::default();
        let mut for_each: Option<String> = None;
        let mut for_item: Option<String> = None;
        let mut for_index: Option<String> = None;

        for (name, value) in raw_attrs {
            let bound = self.braced_path(&value)?;

            if let Some((prefix, _)) = name.split_once(':') {
                let expect_expression = |bound: Option<String>| {
                    bound.ok_or_else(|| {
                        self.error(
                            &name,
                            format!("{} directive expects an expression like {{value}}", name),
                        )
                    })
                };
                let expect_identifier = |value: &str| {
                    if is_valid_js_identifier(value) {
                        Ok(value.to_string())
                    } else {
                        Err(self.error(
                            &name,
                            format!("{} directive expects an identifier, found '{}'", name, value),
                        ))
                    }
                };
                match name.as_str() {
                    "if:true" | "if:false" => {
                        directives.condition = Some(IfDirective {
                            path: expect_expression(bound)?,
                            when: name == "if:true",
                        });
                    }
                    "for:each" => for_each = Some(expect_expression(bound)?),
                    "for:item" => for_item = Some(expect_identifier(&value)?),
                    "for:index" => for_index = Some(expect_identifier(&value)?),
                    // Namespaced attributes of foreign elements, e.g. xlink:href
                    _ if prefix == "xlink" || prefix == "xml" => attributes.push(AttributeIR {
                        name: name.clone(),
                        value: attribute_value(value, bound),
                    }),
                    _ => {
                        return Err(self.error(
                            &name,
                            format!("Unknown directive '{}' on <{}>", name, display_tag),
                        ))
                    }
                }
                continue;
            }

            if !validate_attribute_name(&name) {
                return Err(self.error(
                    &name,
                    format!("Invalid attribute name '{}' on <{}>", name, display_tag),
                ));
            }

            if value.contains('{') && bound.is_none() {
                return Err(self.error(
                    &value,
                    format!(
                        "Ambiguous attribute value {}=\"{}\": an expression must be the whole value",
                        name, value
                    ),
                ));
            }

            if name == "key" {
                if bound.is_some() || !value.is_empty() {
                    directives.key = Some(attribute_value(value, bound));
                }
                continue;
            }

            if let (Some(event), Some(handler)) = (name.strip_prefix("on"), bound.as_ref()) {
                if !event.is_empty() {
                    listeners.push(Listener {
                        event: event.to_string(),
                        handler: handler.clone(),
                    });
                    continue;
                }
            }

            attributes.push(AttributeIR {
                name,
                value: attribute_value(value, bound),
            });
        }

        match (for_each, for_item) {
            (Some(path), Some(item)) => {
                directives.iteration = Some(ForEachDirective {
                    path,
                    item,
                    index: for_index,
                });
            }
            (Some(_), None) => {
                return Err(self.error(
                    "for:each",
                    format!("for:each directive on <{}> requires a for:item attribute", display_tag),
                ))
            }
            (None, Some(_)) => {
                return Err(self.error(
                    "for:item",
                    format!("for:item directive on <{}> requires a for:each attribute", display_tag),
                ))
            }
            (None, None) => {}
        }

        Ok((attributes, listeners, directives))
    }

    fn split_text(&self, text: &str) -> Result<Vec<TemplateNode>, SyntaxError> {
        let mut nodes = Vec::new();
        let mut rest = text;

        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}').map(|c| open + c) else {
                break;
            };
            if open > 0 {
                nodes.push(TemplateNode::Text(TextNode {
                    value: rest[..open].to_string(),
                }));
            }
            nodes.push(TemplateNode::Expression(ExpressionNode {
                path: self.expression_path(&rest[open + 1..close])?,
            }));
            rest = &rest[close + 1..];
        }

        if !rest.is_empty() {
            nodes.push(TemplateNode::Text(TextNode {
                value: rest.to_string(),
            }));
        }
        Ok(nodes)
    }
}

fn attribute_value(value: String, bound: Option<String>) -> AttributeValue {
    match bound {
        Some(path) => AttributeValue::Expression(path),
        None => AttributeValue::Static(value),
    }
}

/// Find `<body>` under the parsed document.
fn find_body(handle: &Handle) -> Option<Handle> {
    for child in handle.children.borrow().iter() {
        if let NodeData::Element { name, .. } = &child.data {
            match &*name.local {
                "body" => return Some(child.clone()),
                "html" => {
                    if let Some(body) = find_body(child) {
                        return Some(body);
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn is_element(handle: &Handle, tag: &str) -> bool {
    matches!(&handle.data, NodeData::Element { name, .. } if &*name.local == tag)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CUSTOM ELEMENT COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct CustomElementCollector {
    seen: HashSet<String>,
    found: Vec<CustomElementRef>,
}

impl TemplateVisitor for CustomElementCollector {
    fn visit_element(&mut self, element: &ElementNode) {
        if let Some(module) = custom_element_module(&element.tag) {
            if self.seen.insert(module.clone()) {
                self.found.push(CustomElementRef {
                    tag: element.tag.clone(),
                    module,
                });
            }
        }
        walk_element(self, element);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse component markup. The root `<template>` wrapper is optional.
pub fn parse_template(html: &str, file: &str) -> Result<TemplateIR, SyntaxError> {
    scan_markup(html, file)?;

    let marked = TEMPLATE_TAG_RE.replace_all(html, format!("<${{1}}{}${{2}}", FRAGMENT_TAG).as_str());

    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut marked.as_bytes())
        .map_err(|e| {
            SyntaxError::new(
                file,
                SourceLocation::default(),
                format!("Failed to read template: {}", e),
            )
        })?;

    let builder = TemplateBuilder { file, raw: html };
    let nodes = match find_body(&dom.document) {
        Some(body) => {
            let children = body.children.borrow();
            let elements: Vec<&Handle> = children
                .iter()
                .filter(|c| matches!(c.data, NodeData::Element { .. }))
                .collect();
            match elements.as_slice() {
                [root] if is_element(root, FRAGMENT_TAG) => builder.convert_children(root)?,
                _ => builder.convert_children(&body)?,
            }
        }
        None => {
            debug!(file, "template has no body after parsing");
            Vec::new()
        }
    };

    let mut ir = TemplateIR {
        file: file.to_string(),
        nodes,
        custom_elements: Vec::new(),
    };
    let mut collector = CustomElementCollector::default();
    collector.visit_root(&ir);
    ir.custom_elements = collector.found;

    debug!(
        file,
        nodes = ir.nodes.len(),
        custom_elements = ir.custom_elements.len(),
        "parsed template"
    );
    Ok(ir)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER FUNCTION CODEGEN
// ═══════════════════════════════════════════════════════════════════════════════

struct RenderContext<'a> {
    key: usize,
    scope: Vec<String>,
    locals: &'a IndexMap<String, String>,
}

impl<'a> RenderContext<'a> {
    fn next_key(&mut self) -> usize {
        let key = self.key;
        self.key += 1;
        key
    }

    /// Loop variables resolve locally, everything else reads the component.
    fn resolve(&self, path: &str) -> String {
        let head = path.split('.').next().unwrap_or(path);
        if self.scope.iter().any(|s| s == head) {
            path.to_string()
        } else {
            format!("$cmp.{}", path)
        }
    }

    fn condition(&self, directive: &IfDirective) -> String {
        if directive.when {
            self.resolve(&directive.path)
        } else {
            format!("!{}", self.resolve(&directive.path))
        }
    }
}

fn js_string(value: &str) -> String {
    format!("\"{}\"", escape_for_javascript_string(value))
}

fn object_key(name: &str) -> String {
    if is_valid_js_identifier(name) {
        name.to_string()
    } else {
        js_string(name)
    }
}

fn render_object(entries: &[(String, String)]) -> String {
    if entries.is_empty() {
        return "{}".to_string();
    }
    let body = entries
        .iter()
        .map(|(k, v)| format!("{}: {}", object_key(k), v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{ {} }}", body)
}

fn render_children(nodes: &[TemplateNode], ctx: &mut RenderContext) -> Vec<String> {
    nodes.iter().flat_map(|n| render_node(n, ctx)).collect()
}

/// Render one node into array items (plain or `...spread`).
fn render_node(node: &TemplateNode, ctx: &mut RenderContext) -> Vec<String> {
    match node {
        TemplateNode::Text(text) => vec![format!("api_text({})", js_string(&text.value))],
        TemplateNode::Expression(expr) => vec![format!("api_dynamic({})", ctx.resolve(&expr.path))],
        TemplateNode::Element(element) => {
            let directives = &element.directives;
            match &directives.iteration {
                Some(iteration) => {
                    let source = ctx.resolve(&iteration.path);
                    let params = loop_params(iteration);
                    ctx.scope.extend(params.iter().cloned());
                    let rendered = render_element(element, ctx);
                    let item = match &directives.condition {
                        Some(cond) => format!("{} ? {} : null", ctx.condition(cond), rendered),
                        None => rendered,
                    };
                    ctx.scope.truncate(ctx.scope.len() - params.len());
                    vec![format!(
                        "...api_iterator({}, function ({}) {{ return [{}]; }})",
                        source,
                        params.join(", "),
                        item
                    )]
                }
                None => {
                    let rendered = render_element(element, ctx);
                    match &directives.condition {
                        Some(cond) => vec![format!("{} ? {} : null", ctx.condition(cond), rendered)],
                        None => vec![rendered],
                    }
                }
            }
        }
        TemplateNode::Fragment(fragment) => {
            let directives = &fragment.directives;
            match &directives.iteration {
                Some(iteration) => {
                    let source = ctx.resolve(&iteration.path);
                    let params = loop_params(iteration);
                    ctx.scope.extend(params.iter().cloned());
                    let items = render_children(&fragment.children, ctx).join(", ");
                    let body = match &directives.condition {
                        Some(cond) => format!("{} ? [{}] : []", ctx.condition(cond), items),
                        None => format!("[{}]", items),
                    };
                    ctx.scope.truncate(ctx.scope.len() - params.len());
                    vec![format!(
                        "...api_iterator({}, function ({}) {{ return {}; }})",
                        source,
                        params.join(", "),
                        body
                    )]
                }
                None => match &directives.condition {
                    Some(cond) => {
                        let test = ctx.condition(cond);
                        let items = render_children(&fragment.children, ctx).join(", ");
                        vec![format!("...({} ? [{}] : [])", test, items)]
                    }
                    None => render_children(&fragment.children, ctx),
                },
            }
        }
    }
}

fn loop_params(iteration: &ForEachDirective) -> Vec<String> {
    let mut params = vec![iteration.item.clone()];
    if let Some(index) = &iteration.index {
        params.push(index.clone());
    }
    params
}

fn render_value(value: &AttributeValue, ctx: &RenderContext) -> String {
    match value {
        AttributeValue::Static(s) => js_string(s),
        AttributeValue::Expression(path) => ctx.resolve(path),
    }
}

fn render_element(element: &ElementNode, ctx: &mut RenderContext) -> String {
    let key = ctx.next_key();
    let key_value = match &element.directives.key {
        Some(value) => render_value(value, ctx),
        None => key.to_string(),
    };

    let mut data = vec![("key".to_string(), key_value)];
    let custom = custom_element_module(&element.tag);

    let attrs: Vec<(String, String)> = element
        .attributes
        .iter()
        .map(|a| {
            let name = if custom.is_some() {
                dashed_to_camel_case(&a.name)
            } else {
                a.name.clone()
            };
            (name, render_value(&a.value, ctx))
        })
        .collect();
    if !attrs.is_empty() {
        let field = if custom.is_some() { "props" } else { "attrs" };
        data.push((field.to_string(), render_object(&attrs)));
    }

    if !element.listeners.is_empty() {
        let on: Vec<(String, String)> = element
            .listeners
            .iter()
            .map(|l| (l.event.clone(), ctx.resolve(&l.handler)))
            .collect();
        data.push(("on".to_string(), render_object(&on)));
    }

    let children = render_children(&element.children, ctx).join(", ");
    let data = render_object(&data);

    match custom.and_then(|module| ctx.locals.get(&module)) {
        Some(local) => format!(
            "api_custom_element({}, {}, {}, [{}])",
            js_string(&element.tag),
            local,
            data,
            children
        ),
        None => format!(
            "api_element({}, {}, [{}])",
            js_string(&element.tag),
            data,
            children
        ),
    }
}

/// Local binding names for the custom element modules of a template.
fn custom_element_locals(ir: &TemplateIR) -> IndexMap<String, String> {
    let mut used = HashSet::new();
    let mut locals = IndexMap::new();
    for element in &ir.custom_elements {
        let base = format!("_{}", dashed_to_camel_case(&element.module));
        let mut local = base.clone();
        let mut n = 1;
        while !used.insert(local.clone()) {
            n += 1;
            local = format!("{}{}", base, n);
        }
        locals.insert(element.module.clone(), local);
    }
    locals
}

/// Generate the ES module source for a parsed template. Custom elements
/// become default imports; the render function is the default export.
pub fn generate_template_module(ir: &TemplateIR) -> String {
    let locals = custom_element_locals(ir);
    let mut out = String::new();

    for (module, local) in &locals {
        out.push_str(&format!("import {} from {};\n", local, js_string(module)));
    }

    let mut ctx = RenderContext {
        key: 0,
        scope: Vec::new(),
        locals: &locals,
    };
    let items = render_children(&ir.nodes, &mut ctx);

    out.push_str("function tmpl($api, $cmp, $slotset, $ctx) {\n");
    out.push_str(
        "  const { h: api_element, t: api_text, d: api_dynamic, c: api_custom_element, i: api_iterator } = $api;\n",
    );
    out.push_str(&format!("  return [{}];\n", items.join(", ")));
    out.push_str("}\n");
    out.push_str("export default tmpl;\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FILE: &str = "x/foo/foo.html";

    #[test]
    fn test_custom_element_module() {
        assert_eq!(custom_element_module("x-test"), Some("x/test".to_string()));
        assert_eq!(custom_element_module("x-foo-bar"), Some("x/fooBar".to_string()));
        assert_eq!(custom_element_module("div"), None);
        assert_eq!(custom_element_module(FRAGMENT_TAG), None);
    }

    #[test]
    fn test_parse_simple_template() {
        let ir = parse_template(
            "<template>\n  <div class=\"greeting\">Hello, {name}!</div>\n</template>\n",
            FILE,
        )
        .unwrap();
        assert_eq!(ir.nodes.len(), 1);
        let TemplateNode::Element(div) = &ir.nodes[0] else {
            panic!("expected element, got {:?}", ir.nodes[0]);
        };
        assert_eq!(div.tag, "div");
        assert_eq!(
            div.attributes,
            vec![AttributeIR {
                name: "class".to_string(),
                value: AttributeValue::Static("greeting".to_string())
            }]
        );
        assert_eq!(
            div.children,
            vec![
                TemplateNode::Text(TextNode {
                    value: "Hello, ".to_string()
                }),
                TemplateNode::Expression(ExpressionNode {
                    path: "name".to_string()
                }),
                TemplateNode::Text(TextNode {
                    value: "!".to_string()
                }),
            ]
        );
        assert!(ir.custom_elements.is_empty());
    }

    #[test]
    fn test_directives_and_listeners() {
        let html = r#"<template>
  <ul>
    <template for:each={contacts} for:item="contact" for:index="i">
      <li key={contact.id} onclick={handleSelect}>{contact.name}</li>
    </template>
  </ul>
  <p if:false={loaded}>Loading</p>
</template>"#;
        let ir = parse_template(html, FILE).unwrap();
        assert_eq!(ir.nodes.len(), 2);

        let TemplateNode::Element(ul) = &ir.nodes[0] else { panic!("expected ul") };
        let TemplateNode::Fragment(fragment) = &ul.children[0] else { panic!("expected fragment") };
        assert_eq!(
            fragment.directives.iteration,
            Some(ForEachDirective {
                path: "contacts".to_string(),
                item: "contact".to_string(),
                index: Some("i".to_string()),
            })
        );
        let TemplateNode::Element(li) = &fragment.children[0] else { panic!("expected li") };
        assert_eq!(
            li.directives.key,
            Some(AttributeValue::Expression("contact.id".to_string()))
        );
        assert_eq!(
            li.listeners,
            vec![Listener {
                event: "click".to_string(),
                handler: "handleSelect".to_string()
            }]
        );

        let TemplateNode::Element(p) = &ir.nodes[1] else { panic!("expected p") };
        assert_eq!(
            p.directives.condition,
            Some(IfDirective {
                path: "loaded".to_string(),
                when: false
            })
        );
    }

    #[test]
    fn test_custom_elements_are_deduplicated() {
        let html = "<template><x-test></x-test><div><x-test></x-test><x-foo-bar></x-foo-bar></div></template>";
        let ir = parse_template(html, FILE).unwrap();
        let modules: Vec<&str> = ir.custom_elements.iter().map(|c| c.module.as_str()).collect();
        assert_eq!(modules, vec!["x/test", "x/fooBar"]);
    }

    #[test]
    fn test_trailing_solidus_on_non_void_element() {
        let html = "<template>\n    <div/>\n</template>\n";
        let err = parse_template(html, FILE).unwrap_err();
        assert!(err.message.contains(
            "Invalid HTML syntax: non-void-html-element-start-tag-with-trailing-solidus. For more information, please visit https://html.spec.whatwg.org/multipage/parsing.html#parse-error-non-void-html-element-start-tag-with-trailing-solidus"
        ));
        assert_eq!((err.line, err.column), (2, 5));
        assert_eq!(err.file, FILE);
    }

    #[test]
    fn test_trailing_solidus_allowed_for_void_and_svg() {
        let html = r#"<template><br/><input value="a"/><svg><path d="M0 0"/></svg><!-- <div/> --></template>"#;
        assert!(parse_template(html, FILE).is_ok());
    }

    #[test]
    fn test_duplicate_attribute() {
        let err = parse_template(r#"<template><div title="a" title="b"></div></template>"#, FILE)
            .unwrap_err();
        assert!(err.message.contains("duplicate-attribute"));
    }

    #[test]
    fn test_invalid_expression_and_directive() {
        let err = parse_template("<template><p>{a + b}</p></template>", FILE).unwrap_err();
        assert!(err.message.contains("Invalid expression {a + b}"));

        let err = parse_template("<template><p foo:bar=\"x\"></p></template>", FILE).unwrap_err();
        assert!(err.message.contains("Unknown directive 'foo:bar'"));

        let err =
            parse_template("<template><p for:each={items}></p></template>", FILE).unwrap_err();
        assert!(err.message.contains("requires a for:item"));

        let err =
            parse_template("<template><p title=\"a {b}\"></p></template>", FILE).unwrap_err();
        assert!(err.message.contains("Ambiguous attribute value"));
    }

    #[test]
    fn test_generate_template_module() {
        let html = r#"<template>
  <template if:true={visible}><span>{label}</span></template>
  <x-test record-id={recordId}></x-test>
  <template for:each={items} for:item="item"><b key={item.id}>{item.name}</b></template>
</template>"#;
        let ir = parse_template(html, FILE).unwrap();
        let code = generate_template_module(&ir);

        assert!(code.starts_with("import _xTest from \"x/test\";\n"));
        assert!(code.contains("function tmpl($api, $cmp, $slotset, $ctx) {"));
        assert!(code.contains(
            "...($cmp.visible ? [api_element(\"span\", { key: 0 }, [api_dynamic($cmp.label)])] : [])"
        ));
        assert!(code.contains(
            "api_custom_element(\"x-test\", _xTest, { key: 1, props: { recordId: $cmp.recordId } }, [])"
        ));
        assert!(code.contains(
            "...api_iterator($cmp.items, function (item) { return [api_element(\"b\", { key: item.id }, [api_dynamic(item.name)])]; })"
        ));
        assert!(code.trim_end().ends_with("export default tmpl;"));
    }

    #[test]
    fn test_text_is_escaped() {
        let ir = parse_template("<template><p>it's \"quoted\"</p></template>", FILE).unwrap();
        let code = generate_template_module(&ir);
        assert!(code.contains(r#"api_text("it\'s \"quoted\"")"#));
    }
}
