//! Rule import/export as plain text.
//!
//! Players share rules by copying blocks like
//!
//! ```text
//! template: Power
//! condition: (gt (sig Signals.Demand) 500)
//! action: (act Signals.Set 'Generators' 100)
//! ```
//!
//! See [`codec`] for the full grammar.

pub mod codec;

use serde::{Deserialize, Serialize};

pub use codec::{parse_from_text, render_rules_to_text};

/// One rule in text form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub condition: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precondition: Option<String>,
}

impl RuleRecord {
    pub fn new(condition: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            action: action.into(),
            template_family: None,
            precondition: None,
        }
    }

    pub fn with_template(mut self, family: impl Into<String>) -> Self {
        self.template_family = Some(family.into());
        self
    }

    pub fn with_precondition(mut self, precondition: impl Into<String>) -> Self {
        self.precondition = Some(precondition.into());
        self
    }
}

/// What to do with a rule whose expressions do not parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPolicy {
    /// Fail the whole import with the offending line
    #[default]
    Strict,
    /// Drop the rule and count it
    SkipInvalid,
    /// Import without validating expressions
    AllowErrors,
}

/// Result of a successful import
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub rules: Vec<RuleRecord>,
    /// Rules dropped under [`ImportPolicy::SkipInvalid`]
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serde() {
        let record = RuleRecord::new("(eq 1 1)", "(act Debug.Log 'x')").with_template("Power");
        let text = toml::to_string(&record).unwrap();
        assert!(!text.contains("precondition"));
        let back: RuleRecord = toml::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
