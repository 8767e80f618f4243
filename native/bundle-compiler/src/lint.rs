//! Lint rules and the trust-based diagnostics gate.

use oxc_ast::ast::*;
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::bundle::{file_name, BundleId};
use crate::config::{LintPolicy, PolicyMode, RuleConfig};
use crate::error::{CompileError, Diagnostic, DiagnosticsReport, Severity, SourceLocation};

// ═══════════════════════════════════════════════════════════════════════════════
// RULES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    NoConsole,
    NoDebugger,
    NoEval,
    NoAlert,
}

impl RuleId {
    pub const ALL: [RuleId; 4] = [
        RuleId::NoConsole,
        RuleId::NoDebugger,
        RuleId::NoEval,
        RuleId::NoAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::NoConsole => "no-console",
            RuleId::NoDebugger => "no-debugger",
            RuleId::NoEval => "no-eval",
            RuleId::NoAlert => "no-alert",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            RuleId::NoConsole | RuleId::NoAlert => Severity::Warning,
            RuleId::NoDebugger | RuleId::NoEval => Severity::Error,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintFinding {
    pub rule: RuleId,
    pub message: String,
    pub severity: Severity,
    pub file: String,
    pub location: SourceLocation,
}

impl From<LintFinding> for Diagnostic {
    fn from(finding: LintFinding) -> Self {
        Diagnostic {
            severity: finding.severity,
            code: finding.rule.to_string(),
            message: finding.message,
            file: finding.file,
            location: finding.location,
        }
    }
}

struct RuleVisitor<'r> {
    rules: &'r [RuleConfig],
    source: &'r str,
    file: &'r str,
    findings: Vec<LintFinding>,
}

impl<'r> RuleVisitor<'r> {
    fn report(&mut self, rule: RuleId, offset: u32, message: &str) {
        let Some(config) = self.rules.iter().find(|r| r.id == rule && r.enabled) else {
            return;
        };
        self.findings.push(LintFinding {
            rule,
            message: message.to_string(),
            severity: config.severity,
            file: self.file.to_string(),
            location: SourceLocation::from_offset(self.source, offset as usize),
        });
    }
}

fn alert_message(name: &str) -> Option<&'static str> {
    match name {
        "alert" => Some("Unexpected alert."),
        "confirm" => Some("Unexpected confirm."),
        "prompt" => Some("Unexpected prompt."),
        _ => None,
    }
}

impl<'a, 'r> Visit<'a> for RuleVisitor<'r> {
    fn visit_member_expression(&mut self, it: &MemberExpression<'a>) {
        if let Expression::Identifier(object) = it.object() {
            if object.name == "console" {
                self.report(RuleId::NoConsole, it.span().start, "Unexpected console statement.");
            }
        }
        walk::walk_member_expression(self, it);
    }

    fn visit_debugger_statement(&mut self, it: &DebuggerStatement) {
        self.report(RuleId::NoDebugger, it.span.start, "Unexpected 'debugger' statement.");
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        match &it.callee {
            Expression::Identifier(callee) => {
                if callee.name == "eval" {
                    self.report(RuleId::NoEval, it.span.start, "eval can be harmful.");
                } else if let Some(message) = alert_message(&callee.name) {
                    self.report(RuleId::NoAlert, it.span.start, message);
                }
            }
            Expression::StaticMemberExpression(member) => {
                if let Expression::Identifier(object) = &member.object {
                    if object.name == "window" {
                        if member.property.name == "eval" {
                            self.report(RuleId::NoEval, it.span.start, "eval can be harmful.");
                        } else if let Some(message) = alert_message(&member.property.name) {
                            self.report(RuleId::NoAlert, it.span.start, message);
                        }
                    }
                }
            }
            _ => {}
        }
        walk::walk_call_expression(self, it);
    }
}

/// Run the enabled rules over one parsed script.
pub fn run_rules(program: &Program, rules: &[RuleConfig], source: &str, file: &str) -> Vec<LintFinding> {
    if rules.iter().all(|r| !r.enabled) {
        return Vec::new();
    }
    let mut visitor = RuleVisitor {
        rules,
        source,
        file,
        findings: Vec::new(),
    };
    visitor.visit_program(program);
    visitor.findings.sort_by_key(|f| (f.location.line, f.location.column));
    visitor.findings
}

// ═══════════════════════════════════════════════════════════════════════════════
// POLICY GATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fold lint findings into the compile outcome according to the policy.
///
/// Findings must be in bundle file order; under a fatal policy only the
/// first file with violations is reported.
pub fn apply_policy(
    bundle_id: &BundleId,
    policy: LintPolicy,
    findings: Vec<LintFinding>,
) -> Result<DiagnosticsReport, CompileError> {
    if !policy.enforce {
        debug!(bundle = %bundle_id, skipped = findings.len(), "lint not enforced");
        return Ok(DiagnosticsReport::clean());
    }

    match policy.mode {
        PolicyMode::Fatal => {
            let Some(first_file) = findings.first().map(|f| f.file.clone()) else {
                return Ok(DiagnosticsReport::clean());
            };
            let messages: Vec<&str> = findings
                .iter()
                .filter(|f| f.file == first_file)
                .map(|f| f.message.as_str())
                .collect();
            info!(bundle = %bundle_id, file = %first_file, violations = messages.len(), "lint violations are fatal");
            Err(CompileError::Lint {
                message: format!(
                    "Invalid syntax encountered in the '{}' file of the '{}' component: \n{}",
                    file_name(&first_file),
                    bundle_id,
                    messages.join("\n")
                ),
                file: first_file,
                component: bundle_id.to_string(),
            })
        }
        PolicyMode::Diagnostic => {
            debug!(bundle = %bundle_id, diagnostics = findings.len(), "lint findings reported");
            Ok(DiagnosticsReport::from_diagnostics(
                findings.into_iter().map(Diagnostic::from).collect(),
            ))
        }
    }
}
