//! sqlward-core — shared configuration, error taxonomy, and input validation.
//!
//! Every other sqlward crate depends on this one. It carries no I/O beyond
//! reading the configuration file.

pub mod config;
pub mod error;
pub mod scalar;

pub use config::{ConfigError, SqlwardConfig};
pub use error::{Classify, ErrorKind, PublicError};
