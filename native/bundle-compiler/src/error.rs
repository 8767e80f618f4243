//! Error and diagnostic types shared by every compiler stage.
//!
//! Fatal conditions are `CompileError` variants and abort the compile.
//! Non-fatal rule violations travel as `Diagnostic`s inside the result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE LOCATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// 1-based line/column position inside a bundle file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl Default for SourceLocation {
    fn default() -> Self {
        SourceLocation { line: 1, column: 1 }
    }
}

impl SourceLocation {
    /// Resolve a byte offset into `source` to a line/column pair.
    /// Columns count characters, not bytes.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let mut line = 1;
        let mut line_start = 0;
        for (i, b) in source.as_bytes()[..offset].iter().enumerate() {
            if *b == b'\n' {
                line += 1;
                line_start = i + 1;
            }
        }
        let column = source
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0)
            + 1;
        SourceLocation {
            line,
            column: column as u32,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIAGNOSTICS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    /// Rule id that produced the diagnostic, e.g. `no-console`.
    pub code: String,
    pub message: String,
    pub file: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsReport {
    pub fn clean() -> Self {
        DiagnosticsReport {
            success: true,
            diagnostics: Vec::new(),
        }
    }

    /// A report is successful unless one of its diagnostics is an error.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let success = !diagnostics.iter().any(|d| d.severity == Severity::Error);
        DiagnosticsReport {
            success,
            diagnostics,
        }
    }
}

impl Default for DiagnosticsReport {
    fn default() -> Self {
        Self::clean()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// A markup or script file failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{message} [{file}:{line}:{column}]")]
pub struct SyntaxError {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(file: &str, location: SourceLocation, message: impl Into<String>) -> Self {
        SyntaxError {
            file: file.to_string(),
            line: location.line,
            column: location.column,
            message: message.into(),
        }
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum CompileError {
    /// Local bundle validation failed; the engine is never reached.
    #[error("Invalid bundle: {reason}")]
    InvalidBundle { reason: String },

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    /// A lint violation under a fatal policy. `message` is the full,
    /// user-facing text.
    #[error("{message}")]
    Lint {
        file: String,
        component: String,
        message: String,
    },

    /// The transform engine crashed, timed out or answered garbage.
    #[error("Transform engine '{engine}' failed: {message}")]
    Engine { engine: String, message: String },
}

impl CompileError {
    pub fn invalid_bundle(reason: impl Into<String>) -> Self {
        Self::InvalidBundle {
            reason: reason.into(),
        }
    }

    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Stable kind name, mirrored by the napi binding and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidBundle { .. } => "InvalidBundleError",
            Self::Syntax(_) => "SyntaxError",
            Self::Lint { .. } => "LintError",
            Self::Engine { .. } => "EngineError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_offset() {
        let src = "class A {\n  foo;\n}";
        assert_eq!(
            SourceLocation::from_offset(src, 0),
            SourceLocation { line: 1, column: 1 }
        );
        assert_eq!(
            SourceLocation::from_offset(src, 12),
            SourceLocation { line: 2, column: 3 }
        );
        // Past the end clamps
        assert_eq!(SourceLocation::from_offset(src, 999).line, 3);
    }

    #[test]
    fn test_report_success_tracks_error_severity() {
        let warning = Diagnostic {
            severity: Severity::Warning,
            code: "no-console".to_string(),
            message: "Unexpected console statement.".to_string(),
            file: "x/foo/foo.js".to_string(),
            location: SourceLocation::default(),
        };
        assert!(DiagnosticsReport::from_diagnostics(vec![warning.clone()]).success);

        let error = Diagnostic {
            severity: Severity::Error,
            ..warning
        };
        assert!(!DiagnosticsReport::from_diagnostics(vec![error]).success);
    }

    #[test]
    fn test_lint_error_display_is_message() {
        let err = CompileError::Lint {
            file: "foo.js".to_string(),
            component: "x:foo".to_string(),
            message: "exact text".to_string(),
        };
        assert_eq!(err.to_string(), "exact text");
        assert_eq!(err.kind(), "LintError");
    }
}
