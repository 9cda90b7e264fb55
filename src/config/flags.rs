//! Extra access flag configuration.

use crate::error::FlagError;
use crate::flags::codec::flags_to_bitmask;
use crate::flags::{CA_NONE, FlagRegistry};
use serde::Deserialize;

/// One `[[flags]]` block: a privilege registered on top of the core set.
#[derive(Debug, Clone, Deserialize)]
pub struct FlagBlock {
    /// Flag character.
    pub char: char,
    /// Long name, usable as `+name` in flag changes.
    pub name: String,
    /// Whether `*` grants this flag (default: true).
    #[serde(default = "default_true")]
    pub default: bool,
    /// Flags this one may not be combined with in a template, e.g. `"+o"`.
    /// Only core flags and flags declared earlier can be referenced.
    #[serde(default)]
    pub restrict: String,
}

fn default_true() -> bool {
    true
}

/// Build the flag table: core flags, then each block in order, then
/// freeze.
pub fn build_registry(blocks: &[FlagBlock]) -> Result<FlagRegistry, FlagError> {
    let mut reg = FlagRegistry::with_core_flags();
    for block in blocks {
        let restrict = flags_to_bitmask(&reg, &block.restrict, CA_NONE);
        reg.associate(block.char, restrict, block.default, &block.name)?;
    }
    reg.freeze();
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(c: char, name: &str, restrict: &str) -> FlagBlock {
        FlagBlock {
            char: c,
            name: name.to_string(),
            default: true,
            restrict: restrict.to_string(),
        }
    }

    #[test]
    fn extra_flags_take_free_bits() {
        let reg = build_registry(&[block('m', "memo", ""), block('g', "greet", "+m")]).unwrap();
        assert!(reg.is_frozen());
        let m = reg.lookup('m');
        assert_eq!(m, 0x0002_0000);
        assert_eq!(reg.slot('g').unwrap().restrict, m);
    }

    #[test]
    fn core_flag_cannot_be_redefined() {
        assert_eq!(
            build_registry(&[block('o', "other", "")]).unwrap_err(),
            FlagError::AlreadyAssigned('o')
        );
    }
}
