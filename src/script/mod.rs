//! Scripting language: values, descriptors, parser, evaluator and the
//! provider registry that binds them to the game.

pub mod defs;
pub mod dispatcher;
pub mod expr;
pub mod parser;
pub mod provider;
pub mod reader;
pub mod service;
pub mod value;

pub use defs::{ActionDef, SignalDef, ValueDef, ValueOption};
pub use dispatcher::SignalDispatcher;
pub use expr::{
    ActionExecutor, ActionExpr, ActionOutcome, Eval, EvalResult, Expr, OperatorExpr, OperatorKind,
    SignalExpr, SignalSource,
};
pub use parser::ExpressionParser;
pub use provider::{ScriptableProvider, SignalCallback, SignalListener, SignalSubscriptions};
pub use service::ScriptingService;
pub use value::{format_fixed, ScriptValue, ScriptValueType, FIXED_POINT_SCALE};
