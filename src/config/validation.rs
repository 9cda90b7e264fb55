//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::{ChanServConfig, Config};
use crate::flags::codec::flags_to_bitmask;
use crate::flags::{CA_NONE, FlagRegistry, is_flag_char};
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("services.name is required")]
    MissingServicesName,
    #[error("services.network is required")]
    MissingNetworkName,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("database.save_interval_secs must be greater than zero")]
    ZeroSaveInterval,
    #[error("database.temp_suffix must not be empty")]
    EmptyTempSuffix,
    #[error("flag {0:?} is not a usable flag character")]
    InvalidFlagChar(char),
    #[error("flag '{0}' is declared more than once")]
    DuplicateFlag(char),
    #[error("flag '{0}' has an empty name")]
    MissingFlagName(char),
    #[error("template {0} has an invalid name or grants no known flag")]
    InvalidTemplate(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Required fields
    if config.services.name.is_empty() {
        errors.push(ValidationError::MissingServicesName);
    }
    if config.services.network.is_empty() {
        errors.push(ValidationError::MissingNetworkName);
    }

    // Database
    let db = &config.database;
    if let Some(parent) = db.path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(
            db.path.display().to_string(),
        ));
    }
    if db.save_interval_secs == 0 {
        errors.push(ValidationError::ZeroSaveInterval);
    }
    if db.temp_suffix.is_empty() {
        errors.push(ValidationError::EmptyTempSuffix);
    }

    // Extra flags. Collisions with core flags surface when the table is built.
    let mut seen = HashSet::new();
    for block in &config.flags {
        if !is_flag_char(block.char) {
            errors.push(ValidationError::InvalidFlagChar(block.char));
        }
        if !seen.insert(block.char) {
            errors.push(ValidationError::DuplicateFlag(block.char));
        }
        if block.name.trim().is_empty() {
            errors.push(ValidationError::MissingFlagName(block.char));
        }
    }

    for (name, flags) in &config.chanserv.templates {
        if name.trim().is_empty() || name.contains(char::is_whitespace) || flags.trim().is_empty() {
            errors.push(ValidationError::InvalidTemplate(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check template levels against the finished flag table.
///
/// Runs after [`build_registry`](super::build_registry): a template whose
/// flags are all unknown, or cancel out, grants nothing.
pub fn validate_templates(
    chanserv: &ChanServConfig,
    reg: &FlagRegistry,
) -> Result<(), Vec<ValidationError>> {
    let errors: Vec<_> = chanserv
        .templates
        .iter()
        .filter(|(_, flags)| reg.sanitize_level(flags_to_bitmask(reg, flags, CA_NONE)) == CA_NONE)
        .map(|(name, _)| ValidationError::InvalidTemplate(name.clone()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
