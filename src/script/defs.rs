//! Signal, action and value descriptors.
//!
//! Providers create these once and hand them out behind `Rc`; the engine
//! never mutates them and they carry no per-host state.

use ahash::AHashMap;
use std::fmt;
use std::rc::Rc;

use crate::core::error::ScriptError;
use crate::script::expr::Expr;
use crate::script::value::{format_fixed, ScriptValue, ScriptValueType};

pub type ValueFormatter = Rc<dyn Fn(&ScriptValue) -> String>;
pub type ValueValidator = Rc<dyn Fn(&ScriptValue) -> Result<(), ScriptError>>;
/// Parse-time check of an argument expression (e.g. "must be a constant")
pub type ArgumentValidator = Rc<dyn Fn(&Expr) -> Result<(), ScriptError>>;

/// One allowed value of an enumerated argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueOption {
    pub value: String,
    pub text: String,
}

/// Type and constraints of a signal result or an action argument
#[derive(Clone)]
pub struct ValueDef {
    pub value_type: ScriptValueType,
    pub formatter: Option<ValueFormatter>,
    pub value_validator: Option<ValueValidator>,
    pub arg_validator: Option<ArgumentValidator>,
    pub options: Option<Vec<ValueOption>>,
    /// Deprecated string values and their replacements
    pub compatibility: Option<AHashMap<String, String>>,
}

impl ValueDef {
    pub fn new(value_type: ScriptValueType) -> Self {
        Self {
            value_type,
            formatter: None,
            value_validator: None,
            arg_validator: None,
            options: None,
            compatibility: None,
        }
    }

    pub fn number() -> Self {
        Self::new(ScriptValueType::Number)
    }

    pub fn string() -> Self {
        Self::new(ScriptValueType::String)
    }

    pub fn with_formatter(mut self, formatter: impl Fn(&ScriptValue) -> String + 'static) -> Self {
        self.formatter = Some(Rc::new(formatter));
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&ScriptValue) -> Result<(), ScriptError> + 'static,
    ) -> Self {
        self.value_validator = Some(Rc::new(validator));
        self
    }

    pub fn with_arg_validator(
        mut self,
        validator: impl Fn(&Expr) -> Result<(), ScriptError> + 'static,
    ) -> Self {
        self.arg_validator = Some(Rc::new(validator));
        self
    }

    /// Accept only numbers in `[min, max]` (fixed-point bounds)
    pub fn with_range(self, min: i32, max: i32) -> Self {
        self.with_validator(move |value| {
            let n = value.as_number()?;
            if n < min || n > max {
                return Err(ScriptError::out_of_range(format!(
                    "{} is not in range [{}, {}]",
                    format_fixed(n),
                    format_fixed(min),
                    format_fixed(max)
                )));
            }
            Ok(())
        })
    }

    /// Restrict a string value to an enumerated set of `(value, text)` pairs
    pub fn with_options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = Some(
            options
                .iter()
                .map(|(value, text)| ValueOption {
                    value: value.to_string(),
                    text: text.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Map deprecated string values to their current spelling
    pub fn with_compatibility(mut self, remap: &[(&str, &str)]) -> Self {
        self.compatibility = Some(
            remap
                .iter()
                .map(|(old, new)| (old.to_string(), new.to_string()))
                .collect(),
        );
        self
    }

    /// Replacement for a deprecated value, if any
    pub fn remap(&self, value: &str) -> Option<&str> {
        self.compatibility
            .as_ref()
            .and_then(|table| table.get(value))
            .map(String::as_str)
    }

    pub fn allows_option(&self, value: &str) -> bool {
        match &self.options {
            Some(options) => options.iter().any(|o| o.value == value),
            None => true,
        }
    }

    /// Check type, then run the value validator
    pub fn validate(&self, value: &ScriptValue) -> Result<(), ScriptError> {
        if value.value_type() != self.value_type {
            return Err(ScriptError::runtime(format!(
                "Expected {}, got {}",
                self.value_type,
                value.value_type()
            )));
        }
        match &self.value_validator {
            Some(validator) => validator(value),
            None => Ok(()),
        }
    }

    /// Human-readable rendering of a value of this type
    pub fn format(&self, value: &ScriptValue) -> String {
        if let Some(formatter) = &self.formatter {
            return formatter(value);
        }
        match value {
            ScriptValue::Number(n) => format_fixed(*n),
            ScriptValue::String(s) => self
                .options
                .as_ref()
                .and_then(|options| options.iter().find(|o| &o.value == s))
                .map(|o| o.text.clone())
                .unwrap_or_else(|| s.clone()),
        }
    }
}

impl fmt::Debug for ValueDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueDef")
            .field("value_type", &self.value_type)
            .field("options", &self.options)
            .field("compatibility", &self.compatibility)
            .finish_non_exhaustive()
    }
}

/// Description of a readable signal
#[derive(Debug, Clone)]
pub struct SignalDef {
    pub script_name: String,
    pub display_name: String,
    pub result: ValueDef,
}

impl SignalDef {
    pub fn new(script_name: impl Into<String>, display_name: impl Into<String>, result: ValueDef) -> Self {
        Self {
            script_name: script_name.into(),
            display_name: display_name.into(),
            result,
        }
    }
}

/// Description of an executable action
#[derive(Debug, Clone)]
pub struct ActionDef {
    pub script_name: String,
    pub display_name: String,
    pub arguments: Vec<ValueDef>,
}

impl ActionDef {
    pub fn new(
        script_name: impl Into<String>,
        display_name: impl Into<String>,
        arguments: Vec<ValueDef>,
    ) -> Self {
        Self {
            script_name: script_name.into(),
            display_name: display_name.into(),
            arguments,
        }
    }
}
