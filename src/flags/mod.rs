//! Channel privilege flag table.
//!
//! Every privilege a channel access entry can carry is a single printable
//! character bound to one bit of a 32-bit mask. The table is built once at
//! startup: the core set is installed first, then each optional feature
//! claims its character with [`FlagRegistry::associate`], and finally the
//! table is frozen before the services start handling events.
//!
//! The registry is an explicit value passed to whoever needs flag
//! resolution (codec, access store, database layer). There is no global.

pub mod codec;
pub mod gflags;

use crate::error::FlagError;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// A set of channel privileges, one bit per registered flag.
pub type Bitmask = u32;

/// The empty mask. An entry whose level reaches this value is deleted.
pub const CA_NONE: Bitmask = 0;

/// Bit permanently reserved for the AKICK (`b`) flag.
pub const AKICK_BIT: Bitmask = 0x8000_0000;

/// Long names of flags the access engine gives special meaning to.
pub mod names {
    pub const AKICK: &str = "banned";
    pub const FOUNDER: &str = "founder";
    pub const ACL_CHANGE: &str = "acl-change";
    pub const ACL_VIEW: &str = "acl-view";
    pub const SET: &str = "set";
    pub const RECOVER: &str = "recover";
    pub const EXEMPT: &str = "exempt";
    pub const REMOVE: &str = "remove";
    pub const VOICE: &str = "voice";
    pub const AUTOVOICE: &str = "autovoice";
    pub const HALFOP: &str = "halfop";
    pub const AUTOHALFOP: &str = "autohalfop";
    pub const OP: &str = "op";
    pub const AUTOOP: &str = "autoop";
}

/// One occupied slot of the flag table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSlot {
    pub flag: char,
    pub value: Bitmask,
    /// Bits this flag may not coexist with inside a computed template level.
    pub restrict: Bitmask,
    /// Whether `*` (all default flags) includes this flag.
    pub default: bool,
    pub name: String,
}

/// Core flag layout. Bit values are stable across releases because older
/// databases and operator muscle memory depend on them.
const CORE_FLAGS: &[(char, Bitmask, bool, &str)] = &[
    ('v', 0x0000_0001, true, names::VOICE),
    ('V', 0x0000_0002, true, names::AUTOVOICE),
    ('o', 0x0000_0004, true, names::OP),
    ('O', 0x0000_0008, true, names::AUTOOP),
    ('t', 0x0000_0010, true, "topic"),
    ('s', 0x0000_0020, true, names::SET),
    ('r', 0x0000_0040, true, names::REMOVE),
    ('i', 0x0000_0080, true, "invite"),
    ('R', 0x0000_0100, true, names::RECOVER),
    ('f', 0x0000_0200, true, names::ACL_CHANGE),
    ('h', 0x0000_0400, true, names::HALFOP),
    ('H', 0x0000_0800, true, names::AUTOHALFOP),
    ('A', 0x0000_1000, true, names::ACL_VIEW),
    ('F', 0x0000_2000, false, names::FOUNDER),
    ('a', 0x0000_4000, true, "protect"),
    ('q', 0x0000_8000, true, "owner"),
    ('e', 0x0001_0000, true, names::EXEMPT),
];

/// Registry mapping flag characters to bits.
///
/// Iteration, and therefore every rendered flag string, follows character
/// order so output is deterministic.
#[derive(Debug, Clone)]
pub struct FlagRegistry {
    slots: BTreeMap<char, FlagSlot>,
    frozen: bool,
}

impl Default for FlagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FlagRegistry {
    /// Create a table holding only the AKICK flag (`b`, bit 31).
    pub fn new() -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(
            'b',
            FlagSlot {
                flag: 'b',
                value: AKICK_BIT,
                restrict: 0,
                default: false,
                name: names::AKICK.to_string(),
            },
        );
        Self {
            slots,
            frozen: false,
        }
    }

    /// Create a table holding the full core flag set at its stable bits.
    pub fn with_core_flags() -> Self {
        let mut reg = Self::new();
        for &(flag, value, default, name) in CORE_FLAGS {
            reg.slots.insert(
                flag,
                FlagSlot {
                    flag,
                    value,
                    restrict: 0,
                    default,
                    name: name.to_string(),
                },
            );
        }
        reg
    }

    /// Claim the lowest free bit for `flag`.
    ///
    /// Fails if the character is already bound, if the table was frozen, or
    /// if all 32 bits are in use. Exhaustion is logged at error level since
    /// the caller is expected to abort startup.
    pub fn associate(
        &mut self,
        flag: char,
        restrict: Bitmask,
        default: bool,
        name: &str,
    ) -> Result<Bitmask, FlagError> {
        self.check_claim(flag)?;

        let value = self.find_slot();
        if value == CA_NONE {
            error!(flag = %flag, name = %name, "Flag table exhausted");
            return Err(FlagError::Exhausted(flag));
        }

        self.insert(flag, value, restrict, default, name);
        Ok(value)
    }

    /// Claim a specific bit for `flag`.
    pub fn associate_at(
        &mut self,
        flag: char,
        value: Bitmask,
        restrict: Bitmask,
        default: bool,
        name: &str,
    ) -> Result<Bitmask, FlagError> {
        self.check_claim(flag)?;

        if !value.is_power_of_two() || self.all_assigned() & value != 0 {
            return Err(FlagError::BitTaken { flag, bit: value });
        }

        self.insert(flag, value, restrict, default, name);
        Ok(value)
    }

    fn check_claim(&self, flag: char) -> Result<(), FlagError> {
        if !is_flag_char(flag) {
            return Err(FlagError::InvalidChar(flag));
        }
        if self.frozen {
            return Err(FlagError::Frozen(flag));
        }
        if self.slots.contains_key(&flag) {
            return Err(FlagError::AlreadyAssigned(flag));
        }
        Ok(())
    }

    fn insert(&mut self, flag: char, value: Bitmask, restrict: Bitmask, default: bool, name: &str) {
        debug!(flag = %flag, bit = %format!("{value:#x}"), name = %name, "Flag associated");
        self.slots.insert(
            flag,
            FlagSlot {
                flag,
                value,
                restrict,
                default,
                name: name.to_string(),
            },
        );
    }

    /// Release `flag`, making its bit available again.
    ///
    /// Precondition: the caller has already stripped the bit from every
    /// access entry (see `ServiceState::repair`). The table does not cascade.
    pub fn clear(&mut self, flag: char) -> Option<FlagSlot> {
        let slot = self.slots.remove(&flag);
        if let Some(ref slot) = slot {
            debug!(flag = %flag, bit = %format!("{:#x}", slot.value), "Flag cleared");
        }
        slot
    }

    /// Lowest unassigned bit, or [`CA_NONE`] when the table is full.
    pub fn find_slot(&self) -> Bitmask {
        let used = self.all_assigned();
        (0..32)
            .map(|shift| 1u32 << shift)
            .find(|bit| used & bit == 0)
            .unwrap_or(CA_NONE)
    }

    fn all_assigned(&self) -> Bitmask {
        self.slots.values().fold(0, |acc, s| acc | s.value)
    }

    /// End the registration phase. Later `associate` calls fail.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Bit bound to `flag`, or [`CA_NONE`] if the character is unknown.
    #[inline]
    pub fn lookup(&self, flag: char) -> Bitmask {
        self.slots.get(&flag).map_or(CA_NONE, |s| s.value)
    }

    pub fn slot(&self, flag: char) -> Option<&FlagSlot> {
        self.slots.get(&flag)
    }

    /// Bit bound to a long flag name (case-insensitive), or [`CA_NONE`].
    pub fn lookup_name(&self, name: &str) -> Bitmask {
        self.slots
            .values()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map_or(CA_NONE, |s| s.value)
    }

    /// Slots in character order.
    pub fn iter(&self) -> impl Iterator<Item = &FlagSlot> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Union of every assigned bit.
    pub fn ca_all(&self) -> Bitmask {
        self.all_assigned()
    }

    /// Union of the bits whose flags are marked default.
    pub fn ca_all_enable(&self) -> Bitmask {
        self.slots
            .values()
            .filter(|s| s.default)
            .fold(0, |acc, s| acc | s.value)
    }

    pub fn akick(&self) -> Bitmask {
        self.lookup_name(names::AKICK)
    }

    pub fn founder(&self) -> Bitmask {
        self.lookup_name(names::FOUNDER)
    }

    pub fn acl_change(&self) -> Bitmask {
        self.lookup_name(names::ACL_CHANGE)
    }

    /// Implicit access of a channel founder: every privilege, never AKICK.
    pub fn full_access(&self) -> Bitmask {
        self.ca_all() & !self.akick()
    }

    /// Bits that make an entity eligible to inherit a channel whose founder
    /// went away.
    pub fn successor_mask(&self) -> Bitmask {
        self.lookup_name(names::SET) | self.lookup_name(names::RECOVER) | self.acl_change()
    }

    /// Flags a non-founder holding `acl-change` and `theirs` may grant or
    /// revoke.
    ///
    /// Nobody hands out AKICK by holding it; `remove` is what allows it.
    /// Holding an op level allows its automatic variant. With `limit` set
    /// (a channel with the limitflags option), a holder with neither `set`
    /// nor `recover` may only manage AKICK, and one lacking any of `set`,
    /// `recover` and `acl-change` may not grant those three.
    pub fn allow_flags(&self, theirs: Bitmask, limit: bool) -> Bitmask {
        const IMPLIED: [(&str, &str); 4] = [
            (names::REMOVE, names::AKICK),
            (names::OP, names::AUTOOP),
            (names::HALFOP, names::AUTOHALFOP),
            (names::VOICE, names::AUTOVOICE),
        ];

        let mut flags = theirs & !self.akick();
        for (held, implied) in IMPLIED {
            if theirs & self.lookup_name(held) != CA_NONE {
                flags |= self.lookup_name(implied);
            }
        }

        if limit {
            let high = self.successor_mask();
            if theirs & high & !self.acl_change() == CA_NONE {
                flags &= self.akick();
            } else if theirs & high != high {
                flags &= !high;
            }
        }
        flags
    }

    /// Drop mutually restricted flags from a template level.
    ///
    /// Flags are considered in character order; a flag is kept only if it
    /// is not restricted by, and does not restrict, any flag already kept.
    pub fn sanitize_level(&self, level: Bitmask) -> Bitmask {
        let mut kept = CA_NONE;
        let mut forbidden = CA_NONE;
        for slot in self.slots.values().filter(|s| level & s.value != 0) {
            if forbidden & slot.value != 0 || slot.restrict & kept != 0 {
                continue;
            }
            kept |= slot.value;
            forbidden |= slot.restrict;
        }
        kept
    }

    /// Comma separated long names of the flags in `mask`.
    pub fn names_of(&self, mask: Bitmask) -> String {
        self.slots
            .values()
            .filter(|s| mask & s.value != 0)
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Characters usable as flags: printable ASCII minus the codec operators.
pub fn is_flag_char(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '+' | '-' | '=' | '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_reserves_akick() {
        let reg = FlagRegistry::new();
        assert_eq!(reg.lookup('b'), AKICK_BIT);
        assert_eq!(reg.akick(), AKICK_BIT);
        assert_eq!(reg.ca_all(), AKICK_BIT);
        assert_eq!(reg.find_slot(), 0x1);
    }

    #[test]
    fn associate_claims_lowest_free_bit() {
        let mut reg = FlagRegistry::new();
        assert_eq!(reg.associate('v', 0, true, "voice"), Ok(0x1));
        assert_eq!(reg.associate('o', 0, true, "op"), Ok(0x2));
        assert_eq!(reg.associate('f', 0, false, "founder"), Ok(0x4));
        assert_eq!(reg.founder(), 0x4);
        assert_eq!(reg.full_access(), 0x7);
    }

    #[test]
    fn associate_rejects_duplicate_and_invalid() {
        let mut reg = FlagRegistry::with_core_flags();
        assert_eq!(
            reg.associate('o', 0, true, "op2"),
            Err(FlagError::AlreadyAssigned('o'))
        );
        assert_eq!(reg.associate('+', 0, true, "plus"), Err(FlagError::InvalidChar('+')));
        assert_eq!(reg.associate(' ', 0, true, "space"), Err(FlagError::InvalidChar(' ')));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut reg = FlagRegistry::new();
        let chars: Vec<char> = ('A'..='Z').chain('c'..='h').collect();
        for (i, c) in chars.iter().take(31).enumerate() {
            let bit = reg.associate(*c, 0, true, &format!("f{i}")).unwrap();
            assert_eq!(bit, 1 << i);
        }
        assert_eq!(reg.find_slot(), CA_NONE);
        assert_eq!(reg.associate('z', 0, true, "late"), Err(FlagError::Exhausted('z')));
    }

    #[test]
    fn clear_releases_bit() {
        let mut reg = FlagRegistry::new();
        reg.associate('v', 0, true, "voice").unwrap();
        reg.associate('o', 0, true, "op").unwrap();
        assert!(reg.clear('v').is_some());
        assert_eq!(reg.lookup('v'), CA_NONE);
        assert_eq!(reg.find_slot(), 0x1);
        assert_eq!(reg.associate('x', 0, true, "extra"), Ok(0x1));
    }

    #[test]
    fn frozen_table_rejects_registration() {
        let mut reg = FlagRegistry::with_core_flags();
        reg.freeze();
        assert_eq!(reg.associate('x', 0, true, "extra"), Err(FlagError::Frozen('x')));
        assert!(reg.clear('e').is_some());
    }

    #[test]
    fn associate_at_requires_free_single_bit() {
        let mut reg = FlagRegistry::new();
        assert_eq!(reg.associate_at('x', 0x10, 0, true, "x"), Ok(0x10));
        assert_eq!(
            reg.associate_at('y', 0x10, 0, true, "y"),
            Err(FlagError::BitTaken { flag: 'y', bit: 0x10 })
        );
        assert_eq!(
            reg.associate_at('y', 0x30, 0, true, "y"),
            Err(FlagError::BitTaken { flag: 'y', bit: 0x30 })
        );
    }

    #[test]
    fn core_masks() {
        let reg = FlagRegistry::with_core_flags();
        assert_eq!(reg.ca_all(), 0x8001_FFFF);
        assert_eq!(reg.ca_all_enable() & reg.founder(), 0);
        assert_eq!(reg.ca_all_enable() & AKICK_BIT, 0);
        assert_eq!(reg.lookup_name("VOICE"), 0x1);
        assert_eq!(reg.names_of(0x5), "voice, op");
        assert_eq!(reg.successor_mask(), 0x20 | 0x100 | 0x200);
    }

    #[test]
    fn allow_flags_adds_implied_flags() {
        let reg = FlagRegistry::with_core_flags();
        let f = |s: &str| codec::flags_to_bitmask(&reg, s, CA_NONE);

        assert_eq!(reg.allow_flags(f("+fov"), false), f("+fovOV"));
        assert_eq!(reg.allow_flags(f("+fh"), false), f("+fhH"));
        assert_eq!(reg.allow_flags(f("+fr"), false), f("+frb"));
        // holding AKICK alone does not allow setting it
        assert_eq!(reg.allow_flags(f("+fb"), false), f("+f"));
    }

    #[test]
    fn allow_flags_limitflags_clamp() {
        let reg = FlagRegistry::with_core_flags();
        let f = |s: &str| codec::flags_to_bitmask(&reg, s, CA_NONE);

        // neither set nor recover: AKICK management only
        assert_eq!(reg.allow_flags(f("+for"), true), f("+b"));
        assert_eq!(reg.allow_flags(f("+fo"), true), CA_NONE);
        // some high privileges but not all: those are withheld
        assert_eq!(reg.allow_flags(f("+fso"), true), f("+oO"));
        assert_eq!(reg.allow_flags(f("+fsRo"), true), f("+fsRoO"));
    }


    #[test]
    fn sanitize_level_applies_restrictions() {
        let mut reg = FlagRegistry::with_core_flags();
        reg.freeze();
        let mut reg2 = FlagRegistry::new();
        let s = reg2.associate('s', 0, true, "set").unwrap();
        let k = reg2.associate('k', AKICK_BIT | s, true, "kickban").unwrap();
        let level = s | k | AKICK_BIT;
        // 'b' sorts first and is kept; 'k' is restricted against it; 's' survives
        assert_eq!(reg2.sanitize_level(level), AKICK_BIT | s);
        assert_eq!(reg.sanitize_level(0x7), 0x7);
    }
}
