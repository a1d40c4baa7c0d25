//! Password policy engine
//!
//! A [`PasswordPolicy`] is an ordered list of [`PolicyRule`]s. Evaluation runs
//! every rule (no short-circuit across rules) and returns a full
//! [`PolicyReport`] so callers can show every violation at once. Evaluation is
//! a pure function of the candidate and the rule set.

pub mod rule;
pub mod template;

use std::fmt;
use std::sync::Arc;

pub use rule::{PolicyRule, SPECIAL_CHARACTERS};
pub use template::{render, MessageTemplates, TemplateCatalog};

/// Outcome of one rule against one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub rule: PolicyRule,
    pub passed: bool,
    pub description: String,
}

/// Full compliance report, in rule order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyReport {
    pub compliant: bool,
    pub outcomes: Vec<RuleOutcome>,
}

impl PolicyReport {
    pub fn violations(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }
}

impl fmt::Display for PolicyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<&str> = self.violations().map(|o| o.rule.placeholder()).collect();
        if failed.is_empty() {
            f.write_str("compliant")
        } else {
            write!(f, "violated {}", failed.join(", "))
        }
    }
}

#[derive(Clone)]
pub struct PasswordPolicy {
    rules: Vec<PolicyRule>,
    templates: Arc<dyn MessageTemplates>,
}

impl PasswordPolicy {
    /// Policy with the built-in English templates
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self::with_templates(rules, Arc::new(TemplateCatalog::builtin()))
    }

    pub fn with_templates(rules: Vec<PolicyRule>, templates: Arc<dyn MessageTemplates>) -> Self {
        Self { rules, templates }
    }

    /// Ten characters with at least one lowercase, uppercase, digit and special character
    pub fn default_policy() -> Self {
        Self::new(vec![
            PolicyRule::Length { min_length: 10 },
            PolicyRule::Lowercase { min_lowercase: 1 },
            PolicyRule::Uppercase { min_uppercase: 1 },
            PolicyRule::Digit { min_digit: 1 },
            PolicyRule::Special { min_special: 1 },
        ])
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn evaluate(&self, candidate: &str) -> PolicyReport {
        let outcomes: Vec<RuleOutcome> = self
            .rules
            .iter()
            .map(|rule| RuleOutcome {
                rule: *rule,
                passed: rule.evaluate(candidate),
                description: self.describe(rule),
            })
            .collect();
        PolicyReport {
            compliant: outcomes.iter().all(|o| o.passed),
            outcomes,
        }
    }

    fn describe(&self, rule: &PolicyRule) -> String {
        match self.templates.template(rule.placeholder()) {
            Some(template) => render(template, &rule.parameters()),
            None => rule.placeholder().to_string(),
        }
    }
}

impl fmt::Debug for PasswordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordPolicy")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_rule_is_reported_even_after_a_failure() {
        let policy = PasswordPolicy::new(vec![
            PolicyRule::Digit { min_digit: 2 },
            PolicyRule::Length { min_length: 3 },
            PolicyRule::Uppercase { min_uppercase: 1 },
        ]);

        let report = policy.evaluate("abc1");

        assert!(!report.compliant);
        let passed: Vec<bool> = report.outcomes.iter().map(|o| o.passed).collect();
        assert_eq!(passed, vec![false, true, false]);
    }

    #[test]
    fn test_descriptions_are_rendered_from_templates() {
        let policy = PasswordPolicy::new(vec![PolicyRule::Digit { min_digit: 2 }]);
        let report = policy.evaluate("a1b2");

        assert!(report.compliant);
        assert_eq!(report.outcomes[0].description, "Minimum number of digits: 2");
    }

    #[test]
    fn test_missing_template_falls_back_to_placeholder() {
        let policy = PasswordPolicy::with_templates(
            vec![PolicyRule::Special { min_special: 1 }],
            Arc::new(TemplateCatalog::new()),
        );
        assert_eq!(policy.evaluate("x").outcomes[0].description, "SPECIAL");
    }

    #[test]
    fn test_default_policy() {
        let policy = PasswordPolicy::default_policy();
        assert!(policy.evaluate("Passw0rd!xyz").compliant);

        let report = policy.evaluate("password");
        let failed: Vec<&str> = report.violations().map(|o| o.rule.placeholder()).collect();
        assert_eq!(failed, vec!["LENGTH", "UPPERCASE", "DIGIT", "SPECIAL"]);
        assert_eq!(report.to_string(), "violated LENGTH, UPPERCASE, DIGIT, SPECIAL");
    }

    #[test]
    fn test_empty_policy_is_always_compliant() {
        assert!(PasswordPolicy::new(vec![]).evaluate("").compliant);
    }
}
