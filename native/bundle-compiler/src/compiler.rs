//! Compiler Orchestrator
//!
//! validate → dispatch to the transform engine → extract wire decorations →
//! lint policy → assemble the result. Any failure short-circuits.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bundle::{BundleType, SourceBundle};
use crate::config::CompilerConfig;
use crate::decorators::{RecognizedDecorator, WireDecoration};
use crate::engine::{dispatch, EngineRequest, NativeEngine, TransformEngine};
use crate::error::{CompileError, DiagnosticsReport};
use crate::lint::apply_policy;
use crate::text_util::JsonEscapedFunctionWriter;

// ═══════════════════════════════════════════════════════════════════════════════
// CODE VARIANTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CodeVariant {
    Dev,
    Prod,
}

impl CodeVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeVariant::Dev => "DEV",
            CodeVariant::Prod => "PROD",
        }
    }
}

impl fmt::Display for CodeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(CodeVariant::Dev),
            "prod" | "production" => Ok(CodeVariant::Prod),
            other => Err(format!("unknown code variant '{}'", other)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESULT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub codes: BTreeMap<CodeVariant, String>,
    pub bundle_dependencies: IndexSet<String>,
    pub wire_decorations: Vec<WireDecoration>,
    pub decorators: Vec<RecognizedDecorator>,
    pub compiler_report: DiagnosticsReport,
}

impl CompileResult {
    pub fn code(&self, variant: CodeVariant) -> Option<&str> {
        self.codes.get(&variant).map(String::as_str)
    }

    /// SHA-256 hex digest of one variant's code.
    pub fn code_hash(&self, variant: CodeVariant) -> Option<String> {
        let code = self.code(variant)?;
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        Some(format!("{:x}", hasher.finalize()))
    }

    /// The variant's code escaped for embedding as a JSON function body.
    pub fn json_function_code(&self, variant: CodeVariant) -> Option<String> {
        let code = self.code(variant)?;
        let mut writer = JsonEscapedFunctionWriter::new(String::with_capacity(code.len()));
        for line in code.split_inclusive('\n') {
            writer.write_str(line).ok()?;
        }
        writer.finish().ok()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Compiles component bundles. Cheap to clone; safe to share across threads.
#[derive(Clone)]
pub struct Compiler {
    config: Arc<CompilerConfig>,
    engine: Arc<dyn TransformEngine>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("config", &self.config)
            .field("engine", &self.engine.name())
            .finish()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Default configuration, native engine.
    pub fn new() -> Self {
        Compiler {
            config: CompilerConfig::shared_default(),
            engine: Arc::new(NativeEngine),
        }
    }

    pub fn with_config(mut self, config: Arc<CompilerConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn TransformEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compile<I, P, S>(
        &self,
        entry_path: &str,
        sources: I,
        bundle_type: BundleType,
    ) -> Result<CompileResult, CompileError>
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<str>,
        S: Into<String>,
    {
        let bundle = SourceBundle::new(entry_path, sources, bundle_type)?;
        self.compile_bundle(&bundle)
    }

    pub fn compile_bundle(&self, bundle: &SourceBundle) -> Result<CompileResult, CompileError> {
        let bundle_id = bundle.id();
        let policy = self.config.policy_for(bundle.bundle_type);
        info!(
            bundle = %bundle_id,
            bundle_type = %bundle.bundle_type,
            files = bundle.files.len(),
            "compiling bundle"
        );

        let request = EngineRequest {
            entry_path: bundle.entry_path.clone(),
            files: bundle.files.clone(),
            bundle_type: bundle.bundle_type,
            lint: policy.enforce,
            rules: self.config.enabled_rules(),
            variants: self.config.variants.clone(),
        };
        debug!(bundle = %bundle_id, engine = self.engine.name(), lint = policy.enforce, "dispatching to engine");
        let payload = dispatch(Arc::clone(&self.engine), request, self.config.engine_timeout())?;

        if payload.codes.is_empty() || payload.codes.values().all(|c| c.is_empty()) {
            return Err(CompileError::engine(
                self.engine.name(),
                "engine reported success without any code",
            ));
        }

        let wire_decorations: Vec<WireDecoration> = payload
            .decorators
            .iter()
            .filter_map(RecognizedDecorator::as_wire)
            .cloned()
            .collect();

        let compiler_report = apply_policy(&bundle_id, policy, payload.lint_findings)?;

        info!(
            bundle = %bundle_id,
            variants = payload.codes.len(),
            dependencies = payload.dependencies.len(),
            wires = wire_decorations.len(),
            diagnostics = compiler_report.diagnostics.len(),
            "compiled bundle"
        );

        Ok(CompileResult {
            codes: payload.codes,
            bundle_dependencies: payload.dependencies.into_iter().collect(),
            wire_decorations,
            decorators: payload.decorators,
            compiler_report,
        })
    }
}

/// Compile one bundle with the default configuration.
pub fn compile<I, P, S>(
    entry_path: &str,
    sources: I,
    bundle_type: BundleType,
) -> Result<CompileResult, CompileError>
where
    I: IntoIterator<Item = (P, S)>,
    P: AsRef<str>,
    S: Into<String>,
{
    Compiler::new().compile(entry_path, sources, bundle_type)
}
