//! Password policy rule kinds

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use unicode_general_category::{get_general_category, GeneralCategory};

/// Characters counted by [`PolicyRule::Special`]
pub const SPECIAL_CHARACTERS: &str = " !\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// A parameterized predicate over a candidate password
///
/// Each kind carries its own configuration, fixed at construction. In
/// configuration files rules are tagged by `kind`:
///
/// ```toml
/// rules = [{ kind = "digit", min_digit = 2 }]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyRule {
    Length { min_length: u32 },
    Lowercase { min_lowercase: u32 },
    Uppercase { min_uppercase: u32 },
    Digit { min_digit: u32 },
    Special { min_special: u32 },
}

impl PolicyRule {
    /// Key under which the message template for this rule is looked up
    pub fn placeholder(&self) -> &'static str {
        match self {
            PolicyRule::Length { .. } => "LENGTH",
            PolicyRule::Lowercase { .. } => "LOWERCASE",
            PolicyRule::Uppercase { .. } => "UPPERCASE",
            PolicyRule::Digit { .. } => "DIGIT",
            PolicyRule::Special { .. } => "SPECIAL",
        }
    }

    /// Template substitution parameters, ordered by name
    pub fn parameters(&self) -> BTreeMap<&'static str, String> {
        let (name, value) = match *self {
            PolicyRule::Length { min_length } => ("minLength", min_length),
            PolicyRule::Lowercase { min_lowercase } => ("minLowerCase", min_lowercase),
            PolicyRule::Uppercase { min_uppercase } => ("minUpperCase", min_uppercase),
            PolicyRule::Digit { min_digit } => ("minDigit", min_digit),
            PolicyRule::Special { min_special } => ("minSpecial", min_special),
        };
        BTreeMap::from([(name, value.to_string())])
    }

    /// Whether `candidate` satisfies this rule
    ///
    /// Counts Unicode scalar values, not bytes. Counting rules stop scanning
    /// as soon as the minimum is reached. A minimum of 0 passes for any
    /// candidate, including the empty one. Digits are decimal digits
    /// (category `Nd`) of any script; other numerics such as `½` or `Ⅻ` do
    /// not count.
    pub fn evaluate(&self, candidate: &str) -> bool {
        match *self {
            PolicyRule::Length { min_length } => at_least(candidate, min_length, |_| true),
            PolicyRule::Lowercase { min_lowercase } => {
                at_least(candidate, min_lowercase, char::is_lowercase)
            }
            PolicyRule::Uppercase { min_uppercase } => {
                at_least(candidate, min_uppercase, char::is_uppercase)
            }
            PolicyRule::Digit { min_digit } => at_least(candidate, min_digit, is_decimal_digit),
            PolicyRule::Special { min_special } => {
                at_least(candidate, min_special, |c| SPECIAL_CHARACTERS.contains(c))
            }
        }
    }
}

fn is_decimal_digit(c: char) -> bool {
    get_general_category(c) == GeneralCategory::DecimalNumber
}

fn at_least(candidate: &str, min: u32, counts: impl Fn(char) -> bool) -> bool {
    if min == 0 {
        return true;
    }
    let mut seen = 0u32;
    for c in candidate.chars() {
        if counts(c) {
            seen += 1;
            if seen >= min {
                return true;
            }
        }
    }
    false
}
