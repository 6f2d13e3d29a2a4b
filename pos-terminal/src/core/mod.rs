//! Configuration and component wiring

pub mod config;
pub mod state;

pub use config::TerminalConfig;
pub use state::TerminalState;
