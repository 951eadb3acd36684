//! Expression tree and evaluator.
//!
//! Trees are produced by [`crate::script::parser::ExpressionParser`], are
//! immutable, and are bound to exactly one host for their lifetime. Every
//! signal and action reference already carries the provider closure it was
//! resolved to at parse time, so evaluation never touches the registry.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::core::error::ScriptError;
use crate::core::types::HostId;
use crate::script::defs::{ActionDef, SignalDef};
use crate::script::value::{ScriptValue, ScriptValueType};

/// Outcome of an evaluation that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eval<T> {
    Ready(T),
    /// The check cannot be completed right now; retry on a later tick.
    /// Only produced before any side effect happened.
    Interrupted(String),
}

impl<T> Eval<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Eval::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Eval::Ready(value) => Some(value),
            Eval::Interrupted(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Eval<U> {
        match self {
            Eval::Ready(value) => Eval::Ready(f(value)),
            Eval::Interrupted(reason) => Eval::Interrupted(reason),
        }
    }
}

/// `Ready | Interrupted | Failed`
pub type EvalResult<T> = Result<Eval<T>, ScriptError>;

/// Unwrap a ready value or return the interruption to the caller.
#[macro_export]
macro_rules! eval_ready {
    ($e:expr) => {
        match $e? {
            $crate::script::Eval::Ready(value) => value,
            $crate::script::Eval::Interrupted(reason) => {
                return Ok($crate::script::Eval::Interrupted(reason))
            }
        }
    };
}

/// Reads the current value of a signal for the host it was resolved for
pub type SignalSource = Rc<dyn Fn() -> EvalResult<ScriptValue>>;

/// Performs an action with already evaluated arguments
pub type ActionExecutor = Rc<dyn Fn(&[ScriptValue]) -> EvalResult<()>>;

/// What a completed action asks of its owning rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Done,
    /// The action was marked execute-once; the rule should deactivate.
    DoneOnce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    Not,
    Add,
    Sub,
    Mul,
    Div,
}

impl OperatorKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "eq" => OperatorKind::Eq,
            "ne" => OperatorKind::Ne,
            "gt" => OperatorKind::Gt,
            "lt" => OperatorKind::Lt,
            "ge" => OperatorKind::Ge,
            "le" => OperatorKind::Le,
            "and" => OperatorKind::And,
            "or" => OperatorKind::Or,
            "not" => OperatorKind::Not,
            "add" => OperatorKind::Add,
            "sub" => OperatorKind::Sub,
            "mul" => OperatorKind::Mul,
            "div" => OperatorKind::Div,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            OperatorKind::Eq => "eq",
            OperatorKind::Ne => "ne",
            OperatorKind::Gt => "gt",
            OperatorKind::Lt => "lt",
            OperatorKind::Ge => "ge",
            OperatorKind::Le => "le",
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Not => "not",
            OperatorKind::Add => "add",
            OperatorKind::Sub => "sub",
            OperatorKind::Mul => "mul",
            OperatorKind::Div => "div",
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            OperatorKind::Eq => "=",
            OperatorKind::Ne => "≠",
            OperatorKind::Gt => ">",
            OperatorKind::Lt => "<",
            OperatorKind::Ge => "≥",
            OperatorKind::Le => "≤",
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Not => "not",
            OperatorKind::Add => "+",
            OperatorKind::Sub => "-",
            OperatorKind::Mul => "×",
            OperatorKind::Div => "÷",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            OperatorKind::Eq
                | OperatorKind::Ne
                | OperatorKind::Gt
                | OperatorKind::Lt
                | OperatorKind::Ge
                | OperatorKind::Le
        )
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, OperatorKind::And | OperatorKind::Or | OperatorKind::Not)
    }

    /// Accepted operand count as `(min, max)`; `None` max means unbounded
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            OperatorKind::Not => (1, Some(1)),
            OperatorKind::And | OperatorKind::Or => (2, None),
            _ => (2, Some(2)),
        }
    }
}

/// A signal read bound to a host
#[derive(Clone)]
pub struct SignalExpr {
    pub name: String,
    pub host: HostId,
    pub def: Rc<SignalDef>,
    source: SignalSource,
}

impl SignalExpr {
    pub fn new(name: impl Into<String>, host: HostId, def: Rc<SignalDef>, source: SignalSource) -> Self {
        Self {
            name: name.into(),
            host,
            def,
            source,
        }
    }

    pub fn evaluate(&self) -> EvalResult<ScriptValue> {
        let value = eval_ready!((self.source)());
        self.def.result.validate(&value)?;
        Ok(Eval::Ready(value))
    }
}

impl PartialEq for SignalExpr {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.host == other.host
    }
}

impl fmt::Debug for SignalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalExpr")
            .field("name", &self.name)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorExpr {
    pub kind: OperatorKind,
    pub operands: Vec<Expr>,
}

impl OperatorExpr {
    /// Evaluate all operands left to right, then apply the operator.
    ///
    /// Boolean operators do not short-circuit: reading a signal may have
    /// observable effects in its provider.
    pub fn evaluate(&self) -> EvalResult<ScriptValue> {
        let mut values = Vec::with_capacity(self.operands.len());
        let mut interrupted = None;
        for operand in &self.operands {
            match operand.evaluate()? {
                Eval::Ready(value) => values.push(value),
                Eval::Interrupted(reason) => {
                    interrupted.get_or_insert(reason);
                }
            }
        }
        if let Some(reason) = interrupted {
            return Ok(Eval::Interrupted(reason));
        }
        self.check_arity()?;

        let compare = |values: &[ScriptValue]| values[0].compare(&values[1]);
        let result = match self.kind {
            OperatorKind::Eq => ScriptValue::from_bool(compare(&values)? == Ordering::Equal),
            OperatorKind::Ne => ScriptValue::from_bool(compare(&values)? != Ordering::Equal),
            OperatorKind::Gt => ScriptValue::from_bool(compare(&values)? == Ordering::Greater),
            OperatorKind::Lt => ScriptValue::from_bool(compare(&values)? == Ordering::Less),
            OperatorKind::Ge => ScriptValue::from_bool(compare(&values)? != Ordering::Less),
            OperatorKind::Le => ScriptValue::from_bool(compare(&values)? != Ordering::Greater),
            OperatorKind::And | OperatorKind::Or => {
                let truths = values
                    .iter()
                    .map(ScriptValue::is_truthy)
                    .collect::<Result<Vec<_>, _>>()?;
                if self.kind == OperatorKind::And {
                    ScriptValue::from_bool(truths.iter().all(|t| *t))
                } else {
                    ScriptValue::from_bool(truths.iter().any(|t| *t))
                }
            }
            OperatorKind::Not => ScriptValue::from_bool(!values[0].is_truthy()?),
            OperatorKind::Add => (&values[0] + &values[1])?,
            OperatorKind::Sub => (&values[0] - &values[1])?,
            OperatorKind::Mul => (&values[0] * &values[1])?,
            OperatorKind::Div => (&values[0] / &values[1])?,
        };
        Ok(Eval::Ready(result))
    }

    /// Operand count matches [`OperatorKind::arity`]
    pub fn check_arity(&self) -> Result<(), ScriptError> {
        let (min, max) = self.kind.arity();
        let count = self.operands.len();
        if count < min || max.is_some_and(|max| count > max) {
            return Err(ScriptError::runtime(format!(
                "Operator '{}' cannot take {} operands",
                self.kind.keyword(),
                count
            )));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        if self.check_arity().is_err() {
            let operands: Vec<String> = self.operands.iter().map(Expr::describe).collect();
            return format!("{}({})", self.kind.keyword(), operands.join(", "));
        }
        if self.kind.is_comparison() {
            let (left, right) = (&self.operands[0], &self.operands[1]);
            return format!(
                "{} {} {}",
                describe_operand(left, right),
                self.kind.symbol(),
                describe_operand(right, left)
            );
        }
        match self.kind {
            OperatorKind::Not => format!("not ({})", self.operands[0].describe()),
            OperatorKind::And | OperatorKind::Or => self
                .operands
                .iter()
                .map(|operand| match operand {
                    Expr::Operator(inner) if inner.kind.is_boolean() => {
                        format!("({})", operand.describe())
                    }
                    _ => operand.describe(),
                })
                .collect::<Vec<_>>()
                .join(&format!(" {} ", self.kind.symbol())),
            _ => format!(
                "({} {} {})",
                self.operands[0].describe(),
                self.kind.symbol(),
                self.operands[1].describe()
            ),
        }
    }
}

/// A constant compared against a signal is shown with the signal's formatter
fn describe_operand(operand: &Expr, other: &Expr) -> String {
    match (operand, other) {
        (Expr::Constant(value), Expr::Signal(signal)) => signal.def.result.format(value),
        _ => operand.describe(),
    }
}

/// An action call bound to a host
#[derive(Clone)]
pub struct ActionExpr {
    pub name: String,
    pub host: HostId,
    pub def: Rc<ActionDef>,
    pub args: Vec<Expr>,
    pub execute_once: bool,
    executor: ActionExecutor,
}

impl ActionExpr {
    pub fn new(
        name: impl Into<String>,
        host: HostId,
        def: Rc<ActionDef>,
        args: Vec<Expr>,
        executor: ActionExecutor,
    ) -> Self {
        Self {
            name: name.into(),
            host,
            def,
            args,
            execute_once: false,
            executor,
        }
    }

    pub fn with_execute_once(mut self, execute_once: bool) -> Self {
        self.execute_once = execute_once;
        self
    }

    /// Evaluate every argument left to right, validate them, then run the action.
    ///
    /// An interrupted argument stops the action before validation and before
    /// any side effect, but only after the remaining arguments were read.
    pub fn execute(&self) -> EvalResult<ActionOutcome> {
        let mut values = Vec::with_capacity(self.args.len());
        let mut interrupted = None;
        for arg in &self.args {
            match arg.evaluate()? {
                Eval::Ready(value) => values.push(value),
                Eval::Interrupted(reason) => {
                    interrupted.get_or_insert(reason);
                }
            }
        }
        if let Some(reason) = interrupted {
            return Ok(Eval::Interrupted(reason));
        }
        for (value, def) in values.iter().zip(&self.def.arguments) {
            def.validate(value)?;
        }

        tracing::debug!(action = %self.name, host = %self.host, "executing action");
        eval_ready!((self.executor)(&values));

        Ok(Eval::Ready(if self.execute_once {
            ActionOutcome::DoneOnce
        } else {
            ActionOutcome::Done
        }))
    }

    pub fn describe(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .zip(&self.def.arguments)
            .map(|(arg, def)| match arg {
                Expr::Constant(value) => def.format(value),
                other => other.describe(),
            })
            .collect();
        let once = if self.execute_once { " (once)" } else { "" };
        if args.is_empty() {
            format!("{}{}", self.def.display_name, once)
        } else {
            format!("{}({}){}", self.def.display_name, args.join(", "), once)
        }
    }

    pub fn serialize(&self) -> String {
        let head = if self.execute_once { "act-once" } else { "act" };
        let mut out = format!("({} {}", head, self.name);
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.serialize());
        }
        out.push(')');
        out
    }
}

impl PartialEq for ActionExpr {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.host == other.host
            && self.args == other.args
            && self.execute_once == other.execute_once
    }
}

impl fmt::Debug for ActionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExpr")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("args", &self.args)
            .field("execute_once", &self.execute_once)
            .finish_non_exhaustive()
    }
}

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(ScriptValue),
    Signal(SignalExpr),
    Operator(OperatorExpr),
    Action(ActionExpr),
}

impl Expr {
    /// Evaluate a value-producing expression
    pub fn evaluate(&self) -> EvalResult<ScriptValue> {
        match self {
            Expr::Constant(value) => Ok(Eval::Ready(value.clone())),
            Expr::Signal(signal) => signal.evaluate(),
            Expr::Operator(op) => op.evaluate(),
            Expr::Action(action) => Err(ScriptError::runtime(format!(
                "Action '{}' does not produce a value",
                action.name
            ))),
        }
    }

    /// Run a root action expression
    pub fn execute(&self) -> EvalResult<ActionOutcome> {
        match self {
            Expr::Action(action) => action.execute(),
            other => Err(ScriptError::runtime(format!(
                "Not an action: {}",
                other.serialize()
            ))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Expr::Constant(value) => value.to_literal(),
            Expr::Signal(signal) => signal.def.display_name.clone(),
            Expr::Operator(op) => op.describe(),
            Expr::Action(action) => action.describe(),
        }
    }

    /// Canonical source text; parsing it back yields an equal tree
    pub fn serialize(&self) -> String {
        match self {
            Expr::Constant(value) => value.to_literal(),
            Expr::Signal(signal) => format!("(sig {})", signal.name),
            Expr::Operator(op) => {
                let mut out = format!("({}", op.kind.keyword());
                for operand in &op.operands {
                    out.push(' ');
                    out.push_str(&operand.serialize());
                }
                out.push(')');
                out
            }
            Expr::Action(action) => action.serialize(),
        }
    }

    /// Statically known result type; actions have none
    pub fn value_type(&self) -> Option<ScriptValueType> {
        match self {
            Expr::Constant(value) => Some(value.value_type()),
            Expr::Signal(signal) => Some(signal.def.result.value_type),
            Expr::Operator(_) => Some(ScriptValueType::Number),
            Expr::Action(_) => None,
        }
    }

    /// Distinct signal names referenced anywhere in the tree, in source order
    pub fn signal_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit(&mut |expr| {
            if let Expr::Signal(signal) = expr {
                if !names.contains(&signal.name) {
                    names.push(signal.name.clone());
                }
            }
        });
        names
    }

    /// Distinct action names referenced in the tree
    pub fn action_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.visit(&mut |expr| {
            if let Expr::Action(action) = expr {
                if !names.contains(&action.name) {
                    names.push(action.name.clone());
                }
            }
        });
        names
    }

    fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Operator(op) => op.operands.iter().for_each(|o| o.visit(f)),
            Expr::Action(action) => action.args.iter().for_each(|a| a.visit(f)),
            Expr::Constant(_) | Expr::Signal(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}
