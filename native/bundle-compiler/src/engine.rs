//! Transform engine boundary.
//!
//! The orchestrator talks to an engine through a serializable request and a
//! `status`-tagged response. [`NativeEngine`] is the in-process engine; tests
//! and embedders can plug in others.

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::bundle::{file_extension, BundleId, BundleType};
use crate::compiler::CodeVariant;
use crate::config::RuleConfig;
use crate::decorators::RecognizedDecorator;
use crate::error::{CompileError, SourceLocation, SyntaxError};
use crate::linker::{emit_variant, link, ModuleBody, ParsedModule};
use crate::lint::LintFinding;
use crate::script::analyze_script;
use crate::template::{generate_template_module, parse_template};

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST / RESPONSE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRequest {
    pub entry_path: String,
    pub files: IndexMap<String, String>,
    pub bundle_type: BundleType,
    /// Run lint rules while parsing scripts.
    pub lint: bool,
    pub rules: Vec<RuleConfig>,
    pub variants: Vec<CodeVariant>,
}

impl EngineRequest {
    pub fn bundle_id(&self) -> BundleId {
        BundleId::from_entry_path(&self.entry_path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnginePayload {
    pub codes: BTreeMap<CodeVariant, String>,
    /// External specifiers, first-seen order.
    pub dependencies: Vec<String>,
    pub decorators: Vec<RecognizedDecorator>,
    /// Findings in bundle file order.
    pub lint_findings: Vec<LintFinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Syntax,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl EngineFailure {
    pub fn internal(message: impl Into<String>) -> Self {
        EngineFailure {
            kind: FailureKind::Internal,
            message: message.into(),
            file: None,
            location: None,
        }
    }
}

impl From<SyntaxError> for EngineFailure {
    fn from(err: SyntaxError) -> Self {
        EngineFailure {
            kind: FailureKind::Syntax,
            location: Some(err.location()),
            file: Some(err.file),
            message: err.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EngineResponse {
    Ok(EnginePayload),
    Error(EngineFailure),
}

impl EngineResponse {
    /// Normalize into the compiler's error space. Only syntax failures that
    /// carry a file and a location surface as `CompileError::Syntax`.
    pub fn into_result(self, engine: &str) -> Result<EnginePayload, CompileError> {
        match self {
            EngineResponse::Ok(payload) => Ok(payload),
            EngineResponse::Error(EngineFailure {
                kind: FailureKind::Syntax,
                message,
                file: Some(file),
                location: Some(location),
            }) => Err(CompileError::Syntax(SyntaxError::new(&file, location, message))),
            EngineResponse::Error(failure) => Err(CompileError::engine(engine, failure.message)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

pub trait TransformEngine: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, request: &EngineRequest) -> EngineResponse;
}

/// In-process engine built on oxc and html5ever.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl NativeEngine {
    pub const NAME: &'static str = "native";

    fn run(&self, request: &EngineRequest) -> Result<EnginePayload, EngineFailure> {
        let bundle_id = request.bundle_id();
        let rules = request.lint.then_some(request.rules.as_slice());

        let files: Vec<(&String, &String)> = request.files.iter().collect();
        let parsed: Vec<Result<Option<ParsedModule>, EngineFailure>> = files
            .par_iter()
            .map(|(path, text)| parse_file(path, text, rules))
            .collect();

        let mut modules = IndexMap::new();
        let mut decorators = Vec::new();
        let mut lint_findings = Vec::new();
        for result in parsed {
            let Some(module) = result? else { continue };
            if let ModuleBody::Script(analysis) = &module.body {
                decorators.extend(analysis.decorators.iter().cloned());
                lint_findings.extend(analysis.lint_findings.iter().cloned());
            }
            modules.insert(module.path.clone(), module);
        }

        if !modules.contains_key(&request.entry_path) {
            return Err(EngineFailure::internal(format!(
                "entry '{}' is not a script, template or stylesheet",
                request.entry_path
            )));
        }

        let linked = link(&bundle_id, &request.entry_path, &modules)?;

        let mut codes = BTreeMap::new();
        for variant in &request.variants {
            if codes.contains_key(variant) {
                continue;
            }
            let code = emit_variant(&linked.code, *variant).map_err(EngineFailure::internal)?;
            codes.insert(*variant, code);
        }

        Ok(EnginePayload {
            codes,
            dependencies: linked.dependencies.into_iter().collect(),
            decorators,
            lint_findings,
        })
    }
}

fn parse_file(
    path: &str,
    text: &str,
    rules: Option<&[RuleConfig]>,
) -> Result<Option<ParsedModule>, EngineFailure> {
    let body = match file_extension(path) {
        "js" | "mjs" => ModuleBody::Script(analyze_script(text, path, rules)?),
        "html" => {
            let ir = parse_template(text, path)?;
            let code = generate_template_module(&ir);
            let analysis = analyze_script(&code, path, None).map_err(|e| {
                EngineFailure::internal(format!(
                    "generated render module for '{}' does not parse: {}",
                    path, e.message
                ))
            })?;
            ModuleBody::Template(analysis)
        }
        "css" => ModuleBody::Style(text.to_string()),
        other => {
            debug!(file = path, extension = other, "ignoring file with unknown extension");
            return Ok(None);
        }
    };
    Ok(Some(ParsedModule {
        path: path.to_string(),
        body,
    }))
}

impl TransformEngine for NativeEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn transform(&self, request: &EngineRequest) -> EngineResponse {
        match self.run(request) {
            Ok(payload) => EngineResponse::Ok(payload),
            Err(failure) => EngineResponse::Error(failure),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPATCH
// ═══════════════════════════════════════════════════════════════════════════════

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `engine` on a dedicated worker thread and wait at most `timeout`.
///
/// A timed-out worker is abandoned; its late answer is dropped.
pub fn dispatch(
    engine: Arc<dyn TransformEngine>,
    request: EngineRequest,
    timeout: Duration,
) -> Result<EnginePayload, CompileError> {
    let name = engine.name().to_string();
    let (tx, rx) = mpsc::sync_channel(1);
    let started = Instant::now();

    thread::Builder::new()
        .name(format!("{}-engine", name))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.transform(&request)));
            let _ = tx.send(outcome);
        })
        .map_err(|e| CompileError::engine(&name, format!("failed to start worker: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(response)) => {
            debug!(engine = %name, elapsed_ms = started.elapsed().as_millis() as u64, "engine answered");
            response.into_result(&name)
        }
        Ok(Err(payload)) => {
            let message = panic_message(payload.as_ref());
            warn!(engine = %name, %message, "engine panicked");
            Err(CompileError::engine(&name, format!("engine panicked: {}", message)))
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(engine = %name, timeout_ms = timeout.as_millis() as u64, "engine timed out");
            Err(CompileError::engine(
                &name,
                format!("no response within {} ms", timeout.as_millis()),
            ))
        }
        Err(RecvTimeoutError::Disconnected) => Err(CompileError::engine(
            &name,
            "worker exited without a response",
        )),
    }
}
