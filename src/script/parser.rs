//! Compiles script text into expression trees bound to one host.
//!
//! Every `(sig ...)` and `(act ...)` reference is resolved against the
//! registry while parsing, so a script that names an unknown or inapplicable
//! signal or action is rejected before any rule is installed.

use std::rc::Rc;

use crate::core::error::ScriptError;
use crate::core::types::HostId;
use crate::script::defs::ValueDef;
use crate::script::expr::{ActionExpr, Expr, OperatorExpr, OperatorKind, SignalExpr};
use crate::script::reader::{self, Sexp};
use crate::script::service::ScriptingService;
use crate::script::value::{ScriptValue, ScriptValueType};

pub struct ExpressionParser<'a> {
    service: &'a ScriptingService,
    host: HostId,
}

impl<'a> ExpressionParser<'a> {
    pub fn new(service: &'a ScriptingService, host: HostId) -> Self {
        Self { service, host }
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// Parse any expression; actions are only accepted at the root
    pub fn parse(&self, text: &str) -> Result<Expr, ScriptError> {
        let config = self.service.config();
        if text.len() > config.max_script_length {
            return Err(ScriptError::parsing(format!(
                "Script is longer than {} characters",
                config.max_script_length
            )));
        }
        let sexp = reader::read(text, config.max_nesting_depth)?;
        let expr = self.compile(&sexp, true)?;
        tracing::debug!(host = %self.host, script = text, "parsed expression");
        Ok(expr)
    }

    /// Parse a rule condition: a number-valued, side-effect free expression
    pub fn parse_condition(&self, text: &str) -> Result<Expr, ScriptError> {
        let expr = self.parse(text)?;
        match expr.value_type() {
            Some(ScriptValueType::Number) => Ok(expr),
            Some(other) => Err(ScriptError::parsing(format!(
                "Condition must be a boolean or number expression, got {}",
                other
            ))),
            None => Err(ScriptError::parsing("Condition cannot be an action")),
        }
    }

    /// Parse a rule action: `(act ...)` or `(act-once ...)`
    pub fn parse_action(&self, text: &str) -> Result<ActionExpr, ScriptError> {
        match self.parse(text)? {
            Expr::Action(action) => Ok(action),
            other => Err(ScriptError::parsing(format!(
                "Expected an action, got {}",
                other.serialize()
            ))),
        }
    }

    /// Rebind a tree produced for another host to this parser's host
    pub fn clone_definition(&self, expr: &Expr) -> Result<Expr, ScriptError> {
        self.parse(&expr.serialize())
    }

    fn compile(&self, sexp: &Sexp<'_>, at_root: bool) -> Result<Expr, ScriptError> {
        match sexp {
            Sexp::Number(text) => Ok(Expr::Constant(ScriptValue::of_number(
                ScriptValue::parse_number(text)?,
            ))),
            Sexp::Str(text) => Ok(Expr::Constant(ScriptValue::of_string(*text))),
            Sexp::Symbol(symbol) => Err(ScriptError::parsing(format!(
                "Unexpected symbol '{}'; read signals with (sig {})",
                symbol, symbol
            ))),
            Sexp::List(items) => {
                let (head, rest) = items
                    .split_first()
                    .ok_or_else(|| ScriptError::parsing("Empty list"))?;
                let keyword = match head {
                    Sexp::Symbol(keyword) => *keyword,
                    other => {
                        return Err(ScriptError::parsing(format!(
                            "Expected an operator name, got {}",
                            other.kind()
                        )))
                    }
                };
                match keyword {
                    "sig" => self.compile_signal(rest),
                    "act" | "act-once" => {
                        if !at_root {
                            return Err(ScriptError::parsing(
                                "Actions are only allowed at the top level",
                            ));
                        }
                        self.compile_action(rest, keyword == "act-once")
                            .map(Expr::Action)
                    }
                    _ => match OperatorKind::from_keyword(keyword) {
                        Some(kind) => self.compile_operator(kind, rest),
                        None => Err(ScriptError::parsing(format!(
                            "Unknown operator '{}'",
                            keyword
                        ))),
                    },
                }
            }
        }
    }

    fn compile_signal(&self, args: &[Sexp<'_>]) -> Result<Expr, ScriptError> {
        let name = match args {
            [Sexp::Symbol(name)] => *name,
            _ => {
                return Err(ScriptError::parsing(
                    "(sig) takes exactly one signal name",
                ))
            }
        };
        let def = self.service.get_signal_definition(name, self.host)?;
        let source = self.service.get_signal_source(name, self.host)?;
        Ok(Expr::Signal(SignalExpr::new(name, self.host, def, source)))
    }

    fn compile_operator(&self, kind: OperatorKind, args: &[Sexp<'_>]) -> Result<Expr, ScriptError> {
        let (min, max) = kind.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => format!("{}", min),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(ScriptError::parsing(format!(
                "Operator '{}' expects {} operands, got {}",
                kind.keyword(),
                expected,
                args.len()
            )));
        }

        let mut operands = args
            .iter()
            .map(|arg| self.compile(arg, false))
            .collect::<Result<Vec<_>, _>>()?;

        if kind.is_comparison() {
            self.normalize_comparison(&mut operands)?;
            let (left, right) = (operands[0].value_type(), operands[1].value_type());
            if left != right {
                return Err(ScriptError::parsing(format!(
                    "Cannot compare {} with {} in '{}'",
                    type_name(left),
                    type_name(right),
                    kind.keyword()
                )));
            }
        } else if let Some(bad) = operands
            .iter()
            .find(|o| o.value_type() != Some(ScriptValueType::Number))
        {
            return Err(ScriptError::parsing(format!(
                "Operator '{}' needs numbers, got {} for {}",
                kind.keyword(),
                type_name(bad.value_type()),
                bad.serialize()
            )));
        }

        Ok(Expr::Operator(OperatorExpr { kind, operands }))
    }

    /// A string constant compared with a signal follows that signal's
    /// options and deprecated-value table.
    fn normalize_comparison(&self, operands: &mut [Expr]) -> Result<(), ScriptError> {
        for (constant_idx, signal_idx) in [(0, 1), (1, 0)] {
            let def = match &operands[signal_idx] {
                Expr::Signal(signal) => Rc::clone(&signal.def),
                _ => continue,
            };
            if let Expr::Constant(value) = &operands[constant_idx] {
                let normalized = normalize_constant(value, &def.result, &def.display_name)?;
                operands[constant_idx] = Expr::Constant(normalized);
            }
        }
        Ok(())
    }

    fn compile_action(&self, args: &[Sexp<'_>], execute_once: bool) -> Result<ActionExpr, ScriptError> {
        let (name, arg_sexps) = match args.split_first() {
            Some((Sexp::Symbol(name), rest)) => (*name, rest),
            _ => return Err(ScriptError::parsing("(act) needs an action name")),
        };
        let def = self.service.get_action_definition(name, self.host)?;
        if arg_sexps.len() != def.arguments.len() {
            return Err(ScriptError::parsing(format!(
                "Action '{}' expects {} arguments, got {}",
                name,
                def.arguments.len(),
                arg_sexps.len()
            )));
        }

        let mut arguments = Vec::with_capacity(arg_sexps.len());
        for (index, (sexp, arg_def)) in arg_sexps.iter().zip(&def.arguments).enumerate() {
            let what = format!("argument #{} of '{}'", index + 1, name);
            let expr = self.compile(sexp, false)?;
            arguments.push(conform_argument(expr, arg_def, &what)?);
        }

        let executor = self.service.get_action_executor(name, self.host)?;
        Ok(ActionExpr::new(name, self.host, def, arguments, executor).with_execute_once(execute_once))
    }
}

fn type_name(value_type: Option<ScriptValueType>) -> String {
    match value_type {
        Some(t) => t.to_string(),
        None => "action".to_string(),
    }
}

fn normalize_constant(
    value: &ScriptValue,
    def: &ValueDef,
    what: &str,
) -> Result<ScriptValue, ScriptError> {
    let ScriptValue::String(text) = value else {
        return Ok(value.clone());
    };
    let text = match def.remap(text) {
        Some(replacement) => {
            tracing::debug!(old = %text, new = %replacement, "remapped deprecated value");
            replacement
        }
        None => text.as_str(),
    };
    if !def.allows_option(text) {
        return Err(ScriptError::parsing(format!(
            "'{}' is not a valid value for {}",
            text, what
        )));
    }
    Ok(ScriptValue::of_string(text))
}

fn conform_argument(expr: Expr, def: &ValueDef, what: &str) -> Result<Expr, ScriptError> {
    let expr = match expr {
        Expr::Constant(value) => Expr::Constant(normalize_constant(&value, def, what)?),
        other => other,
    };
    if let Some(actual) = expr.value_type() {
        if actual != def.value_type {
            return Err(ScriptError::parsing(format!(
                "{}: expected {}, got {}",
                what, def.value_type, actual
            )));
        }
    }
    if let Expr::Constant(value) = &expr {
        def.validate(value)?;
    }
    if let Some(validator) = &def.arg_validator {
        validator(&expr)?;
    }
    Ok(expr)
}
