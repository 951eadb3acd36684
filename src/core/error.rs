use thiserror::Error;

/// Failures raised by the scripting engine.
///
/// An interrupted evaluation is reported through [`crate::script::Eval`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// Source text is malformed or references an unknown signal/action.
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// The host's current state makes an otherwise valid expression inapplicable.
    #[error("Bad state: {0}")]
    BadState(String),

    /// Unrecoverable failure discovered during evaluation.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A validator rejected a value outside its declared range.
    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),
}

impl ScriptError {
    pub fn parsing(msg: impl Into<String>) -> Self {
        Self::Parsing(msg.into())
    }

    pub fn bad_state(msg: impl Into<String>) -> Self {
        Self::BadState(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Self::ValueOutOfRange(msg.into())
    }

    /// True for failures that permanently break the owning rule.
    ///
    /// `ValueOutOfRange` is a specialization of a runtime error.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_) | Self::ValueOutOfRange(_))
    }

    pub fn is_parsing(&self) -> bool {
        matches!(self, Self::Parsing(_))
    }

    /// Converts a parse-time `BadState` into the runtime error it becomes
    /// when the same condition is found after the rule was installed.
    pub fn into_runtime(self) -> Self {
        match self {
            Self::BadState(msg) => Self::Runtime(msg),
            other => other,
        }
    }
}

/// A rule text block that could not be imported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Import error at line {line}: {message}")]
pub struct ImportError {
    pub line: usize,
    pub message: String,
}

impl ImportError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("{0}")]
    Import(#[from] ImportError),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
