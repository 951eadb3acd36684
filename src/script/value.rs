//! Runtime values of the scripting language.
//!
//! Numbers are fixed-point: an `i32` scaled by 100, so `1.50` is stored as
//! `150`. Strings are opaque text. There is no implicit coercion between the
//! two; every operation that needs a particular variant fails loudly.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use crate::core::error::ScriptError;

/// Scale factor of the fixed-point representation
pub const FIXED_POINT_SCALE: i32 = 100;

/// Type tag of a [`ScriptValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptValueType {
    Number,
    String,
}

impl fmt::Display for ScriptValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValueType::Number => write!(f, "number"),
            ScriptValueType::String => write!(f, "string"),
        }
    }
}

/// A value produced by a signal, a constant or an operator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptValue {
    /// Fixed-point number, scaled by [`FIXED_POINT_SCALE`]
    Number(i32),
    String(String),
}

impl ScriptValue {
    pub fn of_string(value: impl Into<String>) -> Self {
        ScriptValue::String(value.into())
    }

    /// Wrap an already scaled fixed-point number
    pub fn of_number(fixed: i32) -> Self {
        ScriptValue::Number(fixed)
    }

    /// Scale a whole number (saturates at the `i32` bounds)
    pub fn from_int(value: i32) -> Self {
        ScriptValue::Number(value.saturating_mul(FIXED_POINT_SCALE))
    }

    /// Scale a float, rounding to the nearest hundredth
    pub fn from_float(value: f32) -> Self {
        ScriptValue::Number((value * FIXED_POINT_SCALE as f32).round() as i32)
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            ScriptValue::from_int(1)
        } else {
            ScriptValue::Number(0)
        }
    }

    pub fn value_type(&self) -> ScriptValueType {
        match self {
            ScriptValue::Number(_) => ScriptValueType::Number,
            ScriptValue::String(_) => ScriptValueType::String,
        }
    }

    /// Raw fixed-point number
    pub fn as_number(&self) -> Result<i32, ScriptError> {
        match self {
            ScriptValue::Number(n) => Ok(*n),
            ScriptValue::String(s) => Err(ScriptError::runtime(format!(
                "Expected a number, got string '{}'",
                s
            ))),
        }
    }

    pub fn as_float(&self) -> Result<f32, ScriptError> {
        Ok(self.as_number()? as f32 / FIXED_POINT_SCALE as f32)
    }

    /// Whole part of the number, truncated toward zero
    pub fn as_int(&self) -> Result<i32, ScriptError> {
        Ok(self.as_number()? / FIXED_POINT_SCALE)
    }

    pub fn as_string(&self) -> Result<&str, ScriptError> {
        match self {
            ScriptValue::String(s) => Ok(s),
            ScriptValue::Number(n) => Err(ScriptError::runtime(format!(
                "Expected a string, got number {}",
                format_fixed(*n)
            ))),
        }
    }

    /// Booleans are numbers; any non-zero value is true
    pub fn is_truthy(&self) -> Result<bool, ScriptError> {
        Ok(self.as_number()? != 0)
    }

    /// Order two values of the same type.
    ///
    /// Numbers compare numerically, strings ordinally.
    pub fn compare(&self, other: &ScriptValue) -> Result<Ordering, ScriptError> {
        match (self, other) {
            (ScriptValue::Number(a), ScriptValue::Number(b)) => Ok(a.cmp(b)),
            (ScriptValue::String(a), ScriptValue::String(b)) => Ok(a.cmp(b)),
            _ => Err(ScriptError::runtime(format!(
                "Cannot compare {} with {}",
                self.value_type(),
                other.value_type()
            ))),
        }
    }

    /// Canonical script literal for this value.
    ///
    /// Number literals are written in raw fixed-point form, so `1.50` is `150`.
    pub fn to_literal(&self) -> String {
        match self {
            ScriptValue::Number(n) => n.to_string(),
            ScriptValue::String(s) => format!("'{}'", s),
        }
    }

    /// Parse a number literal: a signed integer in raw fixed-point form
    pub fn parse_number(text: &str) -> Result<i32, ScriptError> {
        let digits = text.strip_prefix('-').unwrap_or(text);
        if digits.contains('.') {
            return Err(ScriptError::parsing(format!(
                "Number {} must be written in fixed-point form, e.g. 150 for 1.50",
                text
            )));
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScriptError::parsing(format!("Bad number: {}", text)));
        }
        text.parse::<i32>()
            .map_err(|_| ScriptError::parsing(format!("Number out of range: {}", text)))
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Number(n) => write!(f, "Number:{}", n),
            ScriptValue::String(s) => write!(f, "String:{}", s),
        }
    }
}

/// Human-readable decimal form of a fixed-point number (`450` is `4.5`)
pub fn format_fixed(fixed: i32) -> String {
    let sign = if fixed < 0 { "-" } else { "" };
    let magnitude = (fixed as i64).abs();
    let (int_part, frac) = (
        magnitude / FIXED_POINT_SCALE as i64,
        magnitude % FIXED_POINT_SCALE as i64,
    );
    if frac == 0 {
        format!("{}{}", sign, int_part)
    } else if frac % 10 == 0 {
        format!("{}{}.{}", sign, int_part, frac / 10)
    } else {
        format!("{}{}.{:02}", sign, int_part, frac)
    }
}

fn numeric_operands(
    op: &str,
    lhs: &ScriptValue,
    rhs: &ScriptValue,
) -> Result<(i64, i64), ScriptError> {
    match (lhs, rhs) {
        (ScriptValue::Number(a), ScriptValue::Number(b)) => Ok((*a as i64, *b as i64)),
        _ => Err(ScriptError::runtime(format!(
            "Operator '{}' needs numbers, got {} and {}",
            op,
            lhs.value_type(),
            rhs.value_type()
        ))),
    }
}

fn fit(op: &str, raw: i64) -> Result<ScriptValue, ScriptError> {
    i32::try_from(raw)
        .map(ScriptValue::Number)
        .map_err(|_| ScriptError::runtime(format!("Overflow in '{}'", op)))
}

impl Add for &ScriptValue {
    type Output = Result<ScriptValue, ScriptError>;

    fn add(self, rhs: Self) -> Self::Output {
        let (a, b) = numeric_operands("+", self, rhs)?;
        fit("+", a + b)
    }
}

impl Sub for &ScriptValue {
    type Output = Result<ScriptValue, ScriptError>;

    fn sub(self, rhs: Self) -> Self::Output {
        let (a, b) = numeric_operands("-", self, rhs)?;
        fit("-", a - b)
    }
}

impl Mul for &ScriptValue {
    type Output = Result<ScriptValue, ScriptError>;

    fn mul(self, rhs: Self) -> Self::Output {
        let (a, b) = numeric_operands("*", self, rhs)?;
        fit("*", a * b / FIXED_POINT_SCALE as i64)
    }
}

impl Div for &ScriptValue {
    type Output = Result<ScriptValue, ScriptError>;

    fn div(self, rhs: Self) -> Self::Output {
        let (a, b) = numeric_operands("/", self, rhs)?;
        if b == 0 {
            return Err(ScriptError::runtime("Division by zero"));
        }
        fit("/", a * FIXED_POINT_SCALE as i64 / b)
    }
}
