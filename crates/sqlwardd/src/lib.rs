//! Library half of `sqlwardd`: subsystem wiring and the subcommand bodies,
//! kept out of `main.rs` so integration tests can drive them.

pub mod commands;
pub mod context;
pub mod control;
pub mod serve;

pub use context::AppContext;
