//! Signal Automation - "if signal-condition then action" rules for simulation hosts

pub mod automation;
pub mod core;
pub mod providers;
pub mod script;
pub mod templating;
