// Unified chat interface
mod repl;
mod service;

pub use repl::execute;
pub use service::*;
