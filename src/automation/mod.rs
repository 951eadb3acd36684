//! Rules that react to signal changes.
//!
//! A [`ScriptedRule`] listens to every signal in its condition and fires its
//! action when the condition becomes true. [`RuleBook`] owns the rules of one
//! host and handles import, export and cleanup.

pub mod book;
pub mod rule;

pub use book::{InvalidRule, RuleBook};
pub use rule::{RuleState, ScriptedRule};
