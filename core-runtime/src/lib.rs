//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the library sync engine:
//! - Logging and tracing infrastructure
//! - Engine configuration with fail-fast validation

pub mod config;
pub mod error;
pub mod logging;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
