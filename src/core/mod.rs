pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::EngineConfig;
pub use error::{EngineError, ImportError, ScriptError};
pub use types::{HostId, ListenerId};
