//! Engine configuration
//!
//! Loaded from TOML. Every section and every key is optional; an empty file
//! yields the defaults (default interceptor order, three retries, no password
//! policy, development logging).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::{EngineError, Result};
use crate::executor::DEFAULT_MAX_RETRIES;
use crate::interceptor::{validate_order, InterceptorKind};
use crate::logging_facility::Profile;
use crate::pwpolicy::{PasswordPolicy, PolicyRule, TemplateCatalog};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    pub password_policy: PasswordPolicyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    pub interceptors: Vec<InterceptorKind>,
    pub max_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interceptors: InterceptorKind::DEFAULT_ORDER.to_vec(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// `[password_policy]`; `rules` default to [`PasswordPolicy::default_policy`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordPolicyConfig {
    pub enabled: bool,
    pub rules: Vec<PolicyRule>,
    /// Overrides of the built-in templates, keyed by placeholder
    pub templates: HashMap<String, String>,
}

impl Default for PasswordPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rules: PasswordPolicy::default_policy().rules().to_vec(),
            templates: HashMap::new(),
        }
    }
}

impl PasswordPolicyConfig {
    /// The configured policy, or `None` when disabled
    pub fn to_policy(&self) -> Option<PasswordPolicy> {
        if !self.enabled {
            return None;
        }
        let templates = TemplateCatalog::builtin().merged(self.templates.clone());
        Some(PasswordPolicy::with_templates(
            self.rules.clone(),
            Arc::new(templates),
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub profile: Profile,
}

impl LoggingConfig {
    /// Install the global subscriber for the configured profile
    pub fn init(&self) {
        crate::logging_facility::init(self.profile);
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` on malformed TOML, unknown keys or an invalid
    /// interceptor order.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(input)?;
        validate_order(&config.executor.interceptors)?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the file cannot be read, plus everything
    /// [`from_toml_str`](Self::from_toml_str) rejects.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| EngineError::InvalidConfiguration {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&input)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.executor.interceptors, InterceptorKind::DEFAULT_ORDER.to_vec());
        assert!(config.password_policy.to_policy().is_none());
        assert_eq!(config.logging.profile, Profile::Development);
    }

    #[test]
    fn test_full_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            [executor]
            interceptors = ["context_management", "transaction"]
            max_retries = 1

            [password_policy]
            enabled = true
            rules = [{ kind = "digit", min_digit = 2 }]

            [password_policy.templates]
            DIGIT = "At least {minDigit} digits"

            [logging]
            profile = "production"
            "#,
        )
        .unwrap();

        assert_eq!(config.executor.max_retries, 1);
        assert_eq!(config.logging.profile, Profile::Production);

        let policy = config.password_policy.to_policy().unwrap();
        let report = policy.evaluate("abc1");
        assert!(!report.compliant);
        assert_eq!(report.outcomes[0].description, "At least 2 digits");
    }

    #[test]
    fn test_enabled_policy_without_rules_uses_default_rules() {
        let config = EngineConfig::from_toml_str("[password_policy]\nenabled = true").unwrap();
        let policy = config.password_policy.to_policy().unwrap();
        assert_eq!(policy.rules(), PasswordPolicy::default_policy().rules());
    }

    #[test]
    fn test_invalid_interceptor_order_is_rejected() {
        let err = EngineConfig::from_toml_str(
            "[executor]\ninterceptors = [\"transaction\", \"context_management\"]",
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("[executor]\nretries = 2").unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nmax_retries = 7").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.executor.max_retries, 7);

        let missing = EngineConfig::load(file.path().with_extension("missing"));
        assert!(matches!(
            missing,
            Err(EngineError::InvalidConfiguration { .. })
        ));
    }
}
