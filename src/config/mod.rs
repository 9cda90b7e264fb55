//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServicesConfig, DatabaseConfig, LogConfig)
//! - [`chanserv`]: Access list cap and template levels (ChanServConfig)
//! - [`flags`]: Extra access flags and flag table construction (FlagBlock)
//! - [`validation`]: Startup checks

mod chanserv;
mod flags;
mod types;
mod validation;

pub use chanserv::ChanServConfig;
pub use flags::{FlagBlock, build_registry};
pub use types::{Config, ConfigError, DatabaseConfig, LogConfig, LogFormat, ServicesConfig};
pub use validation::{ValidationError, validate, validate_templates};
