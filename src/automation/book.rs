//! Per-host collection of rules.

use std::rc::Rc;

use crate::automation::rule::{RuleState, ScriptedRule};
use crate::core::error::{EngineError, ScriptError};
use crate::core::types::HostId;
use crate::script::service::ScriptingService;
use crate::templating::{self, ImportPolicy, ImportReport, RuleRecord};

/// A rule kept as text because it failed to compile
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRule {
    pub record: RuleRecord,
    pub error: ScriptError,
}

/// Rules attached to one host
pub struct RuleBook {
    host: HostId,
    rules: Vec<Rc<ScriptedRule>>,
    invalid: Vec<InvalidRule>,
}

impl RuleBook {
    pub fn new(host: HostId) -> Self {
        Self {
            host,
            rules: Vec::new(),
            invalid: Vec::new(),
        }
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    pub fn rules(&self) -> &[Rc<ScriptedRule>] {
        &self.rules
    }

    /// Rules imported with [`ImportPolicy::AllowErrors`] that did not compile
    pub fn invalid_rules(&self) -> &[InvalidRule] {
        &self.invalid
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.invalid.is_empty()
    }

    /// Compile, activate and keep a rule
    pub fn add_rule(
        &mut self,
        service: &ScriptingService,
        record: &RuleRecord,
    ) -> Result<Rc<ScriptedRule>, ScriptError> {
        let rule = Rc::new(ScriptedRule::from_record(service, self.host, record)?);
        self.rules.push(Rc::clone(&rule));
        rule.activate(service)?;
        Ok(rule)
    }

    /// Import rule text for this host.
    ///
    /// Uses the service's configured policy when `policy` is `None`.
    pub fn import_text(
        &mut self,
        service: &ScriptingService,
        text: &str,
        policy: Option<ImportPolicy>,
    ) -> Result<ImportReport, EngineError> {
        let policy = policy.unwrap_or(service.config().import_policy);
        let parser = service.parser(self.host);
        let report = templating::parse_from_text(text, Some(&parser), policy)?;

        for record in &report.rules {
            match ScriptedRule::from_record(service, self.host, record) {
                Ok(rule) => {
                    let rule = Rc::new(rule);
                    self.rules.push(Rc::clone(&rule));
                    if let Err(err) = rule.activate(service) {
                        tracing::warn!(host = %self.host, error = %err, "imported rule failed on activation");
                    }
                }
                Err(error) => self.invalid.push(InvalidRule {
                    record: record.clone(),
                    error,
                }),
            }
        }
        tracing::info!(
            host = %self.host,
            imported = report.rules.len(),
            skipped = report.skipped,
            invalid = self.invalid.len(),
            "imported rules"
        );
        Ok(report)
    }

    /// Text of every rule, valid or not, in insertion order of each kind
    pub fn export_text(&self) -> String {
        let records: Vec<RuleRecord> = self
            .rules
            .iter()
            .map(|rule| rule.to_record())
            .chain(self.invalid.iter().map(|invalid| invalid.record.clone()))
            .collect();
        templating::render_rules_to_text(&records)
    }

    /// Evaluate every active rule, for conditions whose signals do not push changes.
    ///
    /// Returns the number of rules that failed during this tick.
    pub fn tick(&self) -> usize {
        self.rules
            .iter()
            .filter(|rule| rule.state() == RuleState::Active)
            .filter(|rule| rule.check().is_err())
            .count()
    }

    /// Drop rules whose execute-once action ran
    pub fn remove_completed(&mut self, service: &ScriptingService) -> usize {
        let before = self.rules.len();
        self.rules.retain(|rule| {
            if rule.state() == RuleState::Completed {
                rule.deactivate(service);
                false
            } else {
                true
            }
        });
        before - self.rules.len()
    }

    /// Deactivate and drop every rule
    pub fn clear(&mut self, service: &ScriptingService) {
        for rule in self.rules.drain(..) {
            rule.deactivate(service);
        }
        self.invalid.clear();
    }
}
