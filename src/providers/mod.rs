//! Providers shipped with the engine

pub mod debug;
pub mod signals;

pub use debug::DebugProvider;
pub use signals::SignalsProvider;
