//! A single "if condition then action" rule attached to a host.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::error::ScriptError;
use crate::core::types::{HostId, ListenerId};
use crate::script::dispatcher::SignalDispatcher;
use crate::script::expr::{ActionExpr, ActionOutcome, Eval, Expr};
use crate::script::provider::SignalListener;
use crate::script::service::ScriptingService;
use crate::script::value::ScriptValueType;
use crate::templating::RuleRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// Parsed but not subscribed to any signal
    Inactive,
    Active,
    /// A script error broke the rule; see [`ScriptedRule::error`]
    Failed,
    /// An execute-once action ran
    Completed,
}

pub struct ScriptedRule {
    id: ListenerId,
    host: HostId,
    condition: Expr,
    action: ActionExpr,
    template_family: Option<String>,
    /// Template metadata only; checked at compile time, never evaluated
    precondition: Option<String>,
    state: Cell<RuleState>,
    /// Condition result of the last completed evaluation
    last_condition: Cell<bool>,
    error: RefCell<Option<ScriptError>>,
    /// Set on activation
    dispatcher: RefCell<Option<Rc<SignalDispatcher>>>,
}

impl ScriptedRule {
    pub fn new(host: HostId, condition: Expr, action: ActionExpr) -> Result<Self, ScriptError> {
        if condition.value_type() != Some(ScriptValueType::Number) {
            return Err(ScriptError::parsing(format!(
                "Rule condition must be a number expression: {}",
                condition
            )));
        }
        Ok(Self {
            id: ListenerId::next(),
            host,
            condition,
            action,
            template_family: None,
            precondition: None,
            state: Cell::new(RuleState::Inactive),
            last_condition: Cell::new(false),
            error: RefCell::new(None),
            dispatcher: RefCell::new(None),
        })
    }

    /// Compile a text record for `host`
    pub fn from_record(
        service: &ScriptingService,
        host: HostId,
        record: &RuleRecord,
    ) -> Result<Self, ScriptError> {
        let parser = service.parser(host);
        if let Some(precondition) = &record.precondition {
            parser.parse_condition(precondition)?;
        }
        let condition = parser.parse_condition(&record.condition)?;
        let action = parser.parse_action(&record.action)?;
        let mut rule = Self::new(host, condition, action)?;
        rule.template_family = record.template_family.clone();
        rule.precondition = record.precondition.clone();
        Ok(rule)
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    pub fn state(&self) -> RuleState {
        self.state.get()
    }

    pub fn condition(&self) -> &Expr {
        &self.condition
    }

    pub fn action(&self) -> &ActionExpr {
        &self.action
    }

    /// Template family this rule was imported from
    pub fn template_family(&self) -> Option<&str> {
        self.template_family.as_deref()
    }

    /// Precondition text carried over from the rule template.
    ///
    /// It must parse as a condition for the rule to compile, but it does not
    /// gate the rule; hosts decide whether to offer the template.
    pub fn precondition(&self) -> Option<&str> {
        self.precondition.as_deref()
    }

    /// Error that put the rule into [`RuleState::Failed`]
    pub fn error(&self) -> Option<ScriptError> {
        self.error.borrow().clone()
    }

    /// Player-facing summary, e.g. `If Demand > 5 then Set global signal(Generators, 1)`
    pub fn describe(&self) -> String {
        format!(
            "If {} then {}",
            self.condition.describe(),
            self.action.describe()
        )
    }

    pub fn to_record(&self) -> RuleRecord {
        RuleRecord {
            condition: self.condition.serialize(),
            action: self.action.serialize(),
            template_family: self.template_family.clone(),
            precondition: self.precondition.clone(),
        }
    }

    /// Install the action, subscribe to every signal the condition reads,
    /// then evaluate once.
    pub fn activate(self: &Rc<Self>, service: &ScriptingService) -> Result<(), ScriptError> {
        if self.state.get() != RuleState::Inactive {
            return Ok(());
        }
        service.install_action(&self.action.name, self.host)?;
        *self.dispatcher.borrow_mut() = Some(service.dispatcher());
        let listener: Rc<dyn SignalListener> = self.clone();
        for signal in self.condition.signal_names() {
            if let Err(err) = service.register_signal_change_callback(&signal, self.host, Rc::clone(&listener)) {
                self.unsubscribe(service);
                return Err(err);
            }
        }
        self.state.set(RuleState::Active);
        self.last_condition.set(false);
        tracing::debug!(rule = %self.id, host = %self.host, "rule activated");
        self.check()
    }

    /// Undo [`ScriptedRule::activate`]. Failed and completed rules keep their state.
    pub fn deactivate(&self, service: &ScriptingService) {
        self.unsubscribe(service);
        if self.state.get() == RuleState::Active {
            self.state.set(RuleState::Inactive);
        }
    }

    fn unsubscribe(&self, service: &ScriptingService) {
        for signal in self.condition.signal_names() {
            service.unregister_signal_change_callback(&signal, self.host, self.id);
        }
        service.uninstall_action(&self.action.name, self.host);
    }

    /// Re-evaluate the condition and fire the action on a false to true edge
    pub fn check(&self) -> Result<(), ScriptError> {
        if self.state.get() != RuleState::Active {
            return Ok(());
        }

        let value = match self.condition.evaluate() {
            Ok(Eval::Ready(value)) => value,
            Ok(Eval::Interrupted(reason)) => {
                tracing::trace!(rule = %self.id, %reason, "condition interrupted");
                return Ok(());
            }
            Err(err) => return Err(self.fail(err)),
        };
        let holds = value.is_truthy().map_err(|err| self.fail(err))?;
        let held = self.last_condition.replace(holds);
        if !holds || held {
            return Ok(());
        }

        let failures_before = self.listener_failures();
        match self.action.execute() {
            Ok(Eval::Ready(ActionOutcome::Done)) => Ok(()),
            Ok(Eval::Ready(ActionOutcome::DoneOnce)) => {
                tracing::debug!(rule = %self.id, "execute-once rule completed");
                self.state.set(RuleState::Completed);
                Ok(())
            }
            Ok(Eval::Interrupted(reason)) => {
                // nothing happened yet; retry on the next change
                tracing::trace!(rule = %self.id, %reason, "action interrupted");
                self.last_condition.set(false);
                Ok(())
            }
            Err(err) if self.listener_failures() != failures_before => {
                // a listener downstream of our action failed and owns the error
                tracing::debug!(rule = %self.id, error = %err, "downstream rule failed");
                Err(err)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn listener_failures(&self) -> u64 {
        self.dispatcher
            .borrow()
            .as_ref()
            .map_or(0, |dispatcher| dispatcher.listener_failures())
    }

    fn fail(&self, err: ScriptError) -> ScriptError {
        let err = err.into_runtime();
        tracing::warn!(rule = %self.id, host = %self.host, error = %err, "rule failed");
        self.state.set(RuleState::Failed);
        *self.error.borrow_mut() = Some(err.clone());
        err
    }
}

impl SignalListener for ScriptedRule {
    fn listener_id(&self) -> ListenerId {
        self.id
    }

    fn on_signal_changed(&self, signal_name: &str) -> Result<(), ScriptError> {
        tracing::trace!(rule = %self.id, signal = signal_name, "signal changed");
        self.check()
    }
}
