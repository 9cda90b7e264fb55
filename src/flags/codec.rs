//! Conversion between flag strings (`+ov-s`) and bitmasks.
//!
//! Parsing is deliberately lenient: characters the table does not know are
//! skipped, so a database or command that mentions a flag from a feature
//! that is not loaded still parses. Rendering always walks the table in
//! character order, so identical masks produce identical strings.

use super::{Bitmask, CA_NONE, FlagRegistry};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Add,
    Remove,
}

/// Apply `flags` to `base` and return the resulting mask.
///
/// - `+` switches to adding (the default), `-` to removing.
/// - `=` resets the mask to empty and switches to adding.
/// - `*` under `+` adds every default-enabled flag except founder; under
///   `-` clears everything.
///
/// The result is restricted to bits currently assigned in the table.
pub fn flags_to_bitmask(reg: &FlagRegistry, flags: &str, base: Bitmask) -> Bitmask {
    let mut mask = base;
    let mut dir = Direction::Add;

    for c in flags.chars() {
        match c {
            '+' => dir = Direction::Add,
            '-' => dir = Direction::Remove,
            '=' => {
                mask = CA_NONE;
                dir = Direction::Add;
            }
            '*' => match dir {
                Direction::Add => mask |= reg.ca_all_enable() & !reg.founder(),
                Direction::Remove => mask = CA_NONE,
            },
            _ => {
                let bit = reg.lookup(c);
                match dir {
                    Direction::Add => mask |= bit,
                    Direction::Remove => mask &= !bit,
                }
            }
        }
    }

    mask & reg.ca_all()
}

/// Build a disjoint `(add, remove)` pair from a change string.
///
/// Used for commands that modify an existing entry. A long flag name may be
/// given instead of characters (`+voice`, `-banned`); it must be the first
/// thing after the optional direction prefix.
///
/// `=` means "replace": everything not re-added is removed. `*` under `+`
/// adds all default flags and removes AKICK.
pub fn make_bitmasks(reg: &FlagRegistry, flags: &str) -> (Bitmask, Bitmask) {
    let mut add = CA_NONE;
    let mut remove = CA_NONE;
    let mut dir = Direction::Add;
    let mut seen_short = false;

    for (idx, c) in flags.char_indices() {
        match c {
            '+' => dir = Direction::Add,
            '-' => dir = Direction::Remove,
            '=' => {
                add = CA_NONE;
                remove = Bitmask::MAX;
                dir = Direction::Add;
            }
            '*' => match dir {
                Direction::Add => {
                    add |= reg.ca_all_enable();
                    remove |= reg.akick();
                }
                Direction::Remove => {
                    add = CA_NONE;
                    remove = Bitmask::MAX;
                }
            },
            _ => {
                if !seen_short {
                    let long = reg.lookup_name(&flags[idx..]);
                    if long != CA_NONE {
                        apply(&mut add, &mut remove, long, dir);
                        return (add & reg.ca_all(), remove & reg.ca_all());
                    }
                }
                apply(&mut add, &mut remove, reg.lookup(c), dir);
                seen_short = true;
            }
        }
    }

    (add & reg.ca_all(), remove & reg.ca_all())
}

fn apply(add: &mut Bitmask, remove: &mut Bitmask, bit: Bitmask, dir: Direction) {
    match dir {
        Direction::Add => {
            *add |= bit;
            *remove &= !bit;
        }
        Direction::Remove => {
            *add &= !bit;
            *remove |= bit;
        }
    }
}

/// Render `mask` as the canonical `+<chars>` string.
///
/// Bits with no flag in the table are not rendered. An empty mask renders
/// as `+`.
pub fn bitmask_to_flags(reg: &FlagRegistry, mask: Bitmask) -> String {
    let mut out = String::with_capacity(reg.len() + 1);
    out.push('+');
    out.extend(reg.iter().filter(|s| mask & s.value != 0).map(|s| s.flag));
    out
}

/// Render only the flags of `mask` that also appear in `reference`.
///
/// Used to show how an entry relates to a template level: bits outside
/// the template's universe are left out.
pub fn bitmask_to_flags2(reg: &FlagRegistry, mask: Bitmask, reference: Bitmask) -> String {
    bitmask_to_flags(reg, mask & reference)
}

/// Render a change as `-<removed>+<added>`, omitting empty halves.
pub fn change_to_flags(reg: &FlagRegistry, add: Bitmask, remove: Bitmask) -> String {
    let mut out = String::new();
    if remove != CA_NONE {
        out.push('-');
        out.extend(reg.iter().filter(|s| remove & s.value != 0).map(|s| s.flag));
    }
    if add != CA_NONE {
        out.push('+');
        out.extend(reg.iter().filter(|s| add & s.value != 0).map(|s| s.flag));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::AKICK_BIT;

    fn scenario_table() -> FlagRegistry {
        let mut reg = FlagRegistry::new();
        reg.associate('v', 0, true, "voice").unwrap();
        reg.associate('o', 0, true, "op").unwrap();
        reg.associate('f', 0, false, "founder").unwrap();
        reg
    }

    #[test]
    fn parse_groups_and_prefixes() {
        let reg = scenario_table();
        assert_eq!(flags_to_bitmask(&reg, "+ov", 0), 0x3);
        assert_eq!(flags_to_bitmask(&reg, "ov", 0), 0x3);
        assert_eq!(flags_to_bitmask(&reg, "+ov-v", 0), 0x2);
        assert_eq!(flags_to_bitmask(&reg, "-o", 0x3), 0x1);
        assert_eq!(flags_to_bitmask(&reg, "+b", 0), AKICK_BIT);
    }

    #[test]
    fn unknown_chars_are_ignored() {
        let reg = scenario_table();
        assert_eq!(flags_to_bitmask(&reg, "+oxyz", 0), 0x2);
        assert_eq!(flags_to_bitmask(&reg, "+Q", 0), 0);
    }

    #[test]
    fn reset_and_wildcard() {
        let reg = scenario_table();
        assert_eq!(flags_to_bitmask(&reg, "=v", 0x6), 0x1);
        // '*' adds defaults but never founder or AKICK
        assert_eq!(flags_to_bitmask(&reg, "*", 0), 0x3);
        assert_eq!(flags_to_bitmask(&reg, "-*", 0x7), 0);
    }

    #[test]
    fn result_is_limited_to_assigned_bits() {
        let reg = scenario_table();
        assert_eq!(flags_to_bitmask(&reg, "+v", 0x100), 0x1);
    }

    #[test]
    fn render_is_canonical() {
        let reg = scenario_table();
        assert_eq!(bitmask_to_flags(&reg, 0x3), "+ov");
        assert_eq!(bitmask_to_flags(&reg, 0), "+");
        assert_eq!(bitmask_to_flags(&reg, AKICK_BIT | 0x1), "+bv");
        assert_eq!(bitmask_to_flags2(&reg, 0x7, 0x3), "+ov");
        assert_eq!(change_to_flags(&reg, 0x1, 0x2), "-o+v");
        assert_eq!(change_to_flags(&reg, 0, 0), "");
    }

    #[test]
    fn make_bitmasks_is_disjoint() {
        let reg = FlagRegistry::with_core_flags();
        let (add, remove) = make_bitmasks(&reg, "+ov-v");
        assert_eq!(add, reg.lookup('o'));
        assert_eq!(remove, reg.lookup('v'));
        assert_eq!(add & remove, 0);
    }

    #[test]
    fn make_bitmasks_long_names() {
        let reg = FlagRegistry::with_core_flags();
        assert_eq!(make_bitmasks(&reg, "+voice"), (reg.lookup('v'), 0));
        assert_eq!(make_bitmasks(&reg, "-banned"), (0, AKICK_BIT));
        // not a long name, so parsed as characters
        assert_eq!(
            make_bitmasks(&reg, "+vo"),
            (reg.lookup('v') | reg.lookup('o'), 0)
        );
    }

    #[test]
    fn make_bitmasks_replace_and_wildcard() {
        let reg = FlagRegistry::with_core_flags();
        let (add, remove) = make_bitmasks(&reg, "=o");
        assert_eq!(add, reg.lookup('o'));
        assert_eq!(remove, reg.ca_all() & !reg.lookup('o'));

        let (add, remove) = make_bitmasks(&reg, "+*");
        assert_eq!(add, reg.ca_all_enable());
        assert_eq!(remove, AKICK_BIT);

        assert_eq!(make_bitmasks(&reg, "-*"), (0, reg.ca_all()));
    }
}
