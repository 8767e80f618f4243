//! # Component Bundle Compiler
//!
//! Turns the markup, script and stylesheet files of one UI component bundle
//! into a single `define(...)` module per code variant (DEV, PROD).
//!
//! ## Pipeline
//!
//! 1. **Bundle**: `SourceBundle` validates the entry and normalizes paths.
//! 2. **Transform**: the engine parses every file (oxc for scripts,
//!    html5ever for markup), resolves imports and custom-element references,
//!    links the modules and emits each variant.
//! 3. **Decorators**: `@api`, `@track` and `@wire` usages become class
//!    metadata and `WireDecoration` records.
//! 4. **Lint**: rule findings are folded into the result according to the
//!    trust policy of the bundle type (ignored, diagnostics, or fatal).
//!
//! ```ignore
//! let result = bundle_compiler::compile(
//!     "x/foo/foo.js",
//!     [("x/foo/foo.js", js), ("x/foo/foo.html", html)],
//!     BundleType::Platform,
//! )?;
//! println!("{}", result.code(CodeVariant::Prod).unwrap_or_default());
//! ```

pub mod bundle;
pub mod compiler;
pub mod config;
pub mod decorators;
pub mod engine;
pub mod error;
pub mod linker;
pub mod lint;
pub mod loader;
pub mod script;
pub mod template;
pub mod text_util;
pub mod visitor;

#[cfg(feature = "napi")]
mod node;


pub use bundle::{BundleId, BundleType, SourceBundle};
pub use compiler::{compile, CodeVariant, CompileResult, Compiler};
pub use config::{CompilerConfig, ConfigError, LintPolicy, PolicyMode, RuleConfig};
pub use decorators::{RecognizedDecorator, WireAdapter, WireDecoration};
pub use engine::{EngineFailure, EnginePayload, EngineRequest, EngineResponse, NativeEngine, TransformEngine};
pub use error::{CompileError, Diagnostic, DiagnosticsReport, Severity, SourceLocation, SyntaxError};
pub use lint::RuleId;
pub use loader::{load_bundle_dir, LoaderError};

#[cfg(feature = "napi")]
pub use node::compile_bundle;
