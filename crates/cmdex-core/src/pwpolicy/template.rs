//! Message templates for rule descriptions
//!
//! Template text is supplied from outside (configuration, a resource bundle);
//! the core only substitutes `{parameterName}` slots with a rule's parameters.

use std::collections::{BTreeMap, HashMap};

/// Source of a human-readable template per rule placeholder
pub trait MessageTemplates: Send + Sync {
    fn template(&self, placeholder: &str) -> Option<&str>;
}

/// Placeholder → template map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateCatalog {
    templates: HashMap<String, String>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// English defaults for the built-in rule kinds
    pub fn builtin() -> Self {
        Self::new()
            .with("LENGTH", "Minimum password length: {minLength}")
            .with("LOWERCASE", "Minimum number of lowercase characters: {minLowerCase}")
            .with("UPPERCASE", "Minimum number of uppercase characters: {minUpperCase}")
            .with("DIGIT", "Minimum number of digits: {minDigit}")
            .with("SPECIAL", "Minimum number of special characters: {minSpecial}")
    }

    pub fn with(mut self, placeholder: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(placeholder.into(), template.into());
        self
    }

    /// Layer `overrides` on top of this catalog
    pub fn merged(mut self, overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        self.templates.extend(overrides);
        self
    }
}

impl MessageTemplates for TemplateCatalog {
    fn template(&self, placeholder: &str) -> Option<&str> {
        self.templates.get(placeholder).map(String::as_str)
    }
}

/// Substitute `{name}` slots; unknown slots are left verbatim
pub fn render(template: &str, parameters: &BTreeMap<&'static str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let slot = &after[..close];
                match parameters.get(slot) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(slot);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<&'static str, String> {
        BTreeMap::from([("minDigit", "2".to_string())])
    }

    #[test]
    fn test_render_substitutes_known_slots() {
        assert_eq!(render("at least {minDigit} digits", &params()), "at least 2 digits");
    }

    #[test]
    fn test_render_keeps_unknown_and_unclosed_slots() {
        assert_eq!(render("{minLength} / {minDigit}", &params()), "{minLength} / 2");
        assert_eq!(render("oops {minDigit", &params()), "oops {minDigit");
    }

    #[test]
    fn test_catalog_override() {
        let catalog = TemplateCatalog::builtin()
            .merged([("DIGIT".to_string(), "Ziffern: {minDigit}".to_string())]);
        assert_eq!(catalog.template("DIGIT"), Some("Ziffern: {minDigit}"));
        assert!(catalog.template("LENGTH").is_some());
        assert_eq!(catalog.template("UNKNOWN"), None);
    }
}
