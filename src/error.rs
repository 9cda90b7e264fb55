//! Unified error handling for slircd-services.
//!
//! Layer errors for the flag table and the access registry. Database errors
//! live in [`crate::db`] next to the codec that produces them, and
//! configuration errors live in [`crate::config`].

use thiserror::Error;

// ============================================================================
// Flag table errors
// ============================================================================

/// Errors raised while claiming or releasing privilege flags.
///
/// Exhaustion is a configuration-fatal condition: the binary refuses to
/// start rather than run with a silently dropped flag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagError {
    #[error("flag table exhausted: no free bit for '{0}'")]
    Exhausted(char),

    #[error("flag '{0}' is already assigned")]
    AlreadyAssigned(char),

    #[error("flag table is frozen, '{0}' must be registered during startup")]
    Frozen(char),

    #[error("bit {bit:#x} requested for '{flag}' is not free")]
    BitTaken { flag: char, bit: u32 },

    #[error("invalid flag character {0:?}")]
    InvalidChar(char),
}

impl FlagError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Exhausted(_) => "flags_exhausted",
            Self::AlreadyAssigned(_) => "flag_assigned",
            Self::Frozen(_) => "flags_frozen",
            Self::BitTaken { .. } => "bit_taken",
            Self::InvalidChar(_) => "invalid_flag_char",
        }
    }

    /// Whether the process must stop rather than continue with this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Exhausted(_) | Self::BitTaken { .. })
    }
}

// ============================================================================
// Access registry errors
// ============================================================================

/// Errors from the channel access registry.
///
/// All of these are user-visible, recoverable conditions. They are reported
/// back to the command layer and never abort the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("{channel} has too many access entries (limit {limit})")]
    TooManyEntries { channel: String, limit: usize },

    #[error("channel not registered: {0}")]
    NoSuchChannel(String),

    #[error("no such account or group: {0}")]
    NoSuchEntity(String),

    #[error("invalid access target: {0}")]
    InvalidTarget(String),

    #[error("channel already registered: {0}")]
    ChannelExists(String),

    #[error("account or group already registered: {0}")]
    EntityExists(String),

    #[error("no such template: {0}")]
    NoSuchTemplate(String),

    #[error("{field} must be a single word without spaces: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

impl AclError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TooManyEntries { .. } => "too_many_entries",
            Self::NoSuchChannel(_) => "no_such_channel",
            Self::NoSuchEntity(_) => "no_such_entity",
            Self::InvalidTarget(_) => "invalid_target",
            Self::ChannelExists(_) => "channel_exists",
            Self::EntityExists(_) => "entity_exists",
            Self::NoSuchTemplate(_) => "no_such_template",
            Self::InvalidValue { .. } => "invalid_value",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_error_codes() {
        assert_eq!(FlagError::Exhausted('x').error_code(), "flags_exhausted");
        assert_eq!(FlagError::Frozen('x').error_code(), "flags_frozen");
        assert!(FlagError::Exhausted('x').is_fatal());
        assert!(!FlagError::AlreadyAssigned('x').is_fatal());
    }

    #[test]
    fn test_acl_error_display() {
        let err = AclError::TooManyEntries {
            channel: "#test".into(),
            limit: 2,
        };
        assert_eq!(err.to_string(), "#test has too many access entries (limit 2)");
        assert_eq!(err.error_code(), "too_many_entries");

        let err = AclError::InvalidValue {
            field: "email",
            value: String::new(),
        };
        assert_eq!(err.to_string(), "email must be a single word without spaces: \"\"");
        assert_eq!(err.error_code(), "invalid_value");
    }
}
