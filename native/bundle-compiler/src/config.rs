//! Compiler configuration.
//!
//! Loaded once (YAML or defaults) and shared read-only between compiles.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::bundle::BundleType;
use crate::compiler::CodeVariant;
use crate::error::Severity;
use crate::lint::RuleId;

pub const DEFAULT_ENGINE_TIMEOUT_MS: u64 = 30_000;

lazy_static! {
    static ref DEFAULT_CONFIG: Arc<CompilerConfig> = Arc::new(CompilerConfig::default());
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ═══════════════════════════════════════════════════════════════════════════════
// LINT POLICY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyMode {
    /// The first file with violations aborts the compile.
    #[default]
    Fatal,
    /// Violations are reported and the compile continues.
    Diagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintPolicy {
    pub enforce: bool,
    #[serde(default)]
    pub mode: PolicyMode,
}

impl LintPolicy {
    pub const DISABLED: LintPolicy = LintPolicy {
        enforce: false,
        mode: PolicyMode::Diagnostic,
    };

    pub fn default_for(bundle_type: BundleType) -> Self {
        match bundle_type {
            BundleType::Internal => LintPolicy::DISABLED,
            BundleType::Platform => LintPolicy {
                enforce: true,
                mode: PolicyMode::Fatal,
            },
            BundleType::ThirdParty => LintPolicy {
                enforce: true,
                mode: PolicyMode::Diagnostic,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    pub id: RuleId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub severity: Severity,
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    pub policies: BTreeMap<BundleType, LintPolicy>,
    pub rules: Vec<RuleConfig>,
    pub engine_timeout_ms: u64,
    pub variants: Vec<CodeVariant>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let policies = [
            BundleType::Internal,
            BundleType::Platform,
            BundleType::ThirdParty,
        ]
        .into_iter()
        .map(|t| (t, LintPolicy::default_for(t)))
        .collect();

        let rules = RuleId::ALL
            .iter()
            .map(|id| RuleConfig {
                id: *id,
                enabled: true,
                severity: id.default_severity(),
            })
            .collect();

        CompilerConfig {
            policies,
            rules,
            engine_timeout_ms: DEFAULT_ENGINE_TIMEOUT_MS,
            variants: vec![CodeVariant::Dev, CodeVariant::Prod],
        }
    }
}

impl CompilerConfig {
    /// The process-wide default configuration.
    pub fn shared_default() -> Arc<CompilerConfig> {
        Arc::clone(&DEFAULT_CONFIG)
    }

    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: CompilerConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.variants.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one code variant must be emitted".to_string(),
            ));
        }
        if self.engine_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engineTimeoutMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Policy for a bundle type; types missing from the table fall back to
    /// the built-in policy.
    pub fn policy_for(&self, bundle_type: BundleType) -> LintPolicy {
        self.policies
            .get(&bundle_type)
            .copied()
            .unwrap_or_else(|| LintPolicy::default_for(bundle_type))
    }

    pub fn enabled_rules(&self) -> Vec<RuleConfig> {
        self.rules.iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn engine_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.engine_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_policies() {
        let config = CompilerConfig::default();
        assert!(!config.policy_for(BundleType::Internal).enforce);
        assert_eq!(
            config.policy_for(BundleType::Platform),
            LintPolicy {
                enforce: true,
                mode: PolicyMode::Fatal
            }
        );
        assert_eq!(
            config.policy_for(BundleType::ThirdParty).mode,
            PolicyMode::Diagnostic
        );
        assert_eq!(config.variants, vec![CodeVariant::Dev, CodeVariant::Prod]);
        assert_eq!(config.enabled_rules().len(), RuleId::ALL.len());
    }

    #[test]
    fn test_from_yaml_partial_override() {
        let yaml = r#"
engineTimeoutMs: 500
variants: [DEV]
policies:
  internal:
    enforce: true
    mode: diagnostic
rules:
  - id: no-console
    severity: error
  - id: no-debugger
    enabled: false
    severity: error
"#;
        let config = CompilerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.engine_timeout_ms, 500);
        assert_eq!(config.variants, vec![CodeVariant::Dev]);
        assert_eq!(
            config.policy_for(BundleType::Internal),
            LintPolicy {
                enforce: true,
                mode: PolicyMode::Diagnostic
            }
        );
        // Missing from the table: built-in policy
        assert_eq!(config.policy_for(BundleType::Platform).mode, PolicyMode::Fatal);

        let enabled = config.enabled_rules();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, RuleId::NoConsole);
        assert_eq!(enabled[0].severity, Severity::Error);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let err = CompilerConfig::from_yaml_str("variants: []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = CompilerConfig::from_yaml_str("engineTimeoutMs: 0").unwrap_err();
        assert!(err.to_string().contains("engineTimeoutMs"));

        let err = CompilerConfig::from_yaml_str("variants: [STAGING]").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let config = CompilerConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(CompilerConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_from_file_missing() {
        let err = CompilerConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
