//! Fixed option flag sets for accounts, channels and groups.
//!
//! Unlike channel access flags these tables never change at runtime, so they
//! are plain static slices. They are only used to render and parse the
//! `+flags` words stored in database rows.

/// One option flag: character and bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GFlag {
    pub ch: char,
    pub value: u32,
}

const fn g(ch: char, value: u32) -> GFlag {
    GFlag { ch, value }
}

// Account options.
pub const MU_HOLD: u32 = 0x0000_0001;
pub const MU_NEVEROP: u32 = 0x0000_0002;
pub const MU_NOOP: u32 = 0x0000_0004;
pub const MU_WAITAUTH: u32 = 0x0000_0008;
pub const MU_HIDEMAIL: u32 = 0x0000_0010;
pub const MU_NOMEMO: u32 = 0x0000_0040;
pub const MU_EMAILMEMOS: u32 = 0x0000_0080;
pub const MU_CRYPTPASS: u32 = 0x0000_0100;
pub const MU_NOBURSTLOGIN: u32 = 0x0000_0400;
pub const MU_ENFORCE: u32 = 0x0000_0800;
pub const MU_USE_PRIVMSG: u32 = 0x0000_1000;
pub const MU_PRIVATE: u32 = 0x0000_2000;
pub const MU_QUIETCHG: u32 = 0x0000_4000;
pub const MU_NOGREET: u32 = 0x0000_8000;
pub const MU_REGNOLIMIT: u32 = 0x0001_0000;
pub const MU_NEVERGROUP: u32 = 0x0002_0000;

pub static MU_FLAGS: &[GFlag] = &[
    g('h', MU_HOLD),
    g('n', MU_NEVEROP),
    g('o', MU_NOOP),
    g('W', MU_WAITAUTH),
    g('s', MU_HIDEMAIL),
    g('m', MU_NOMEMO),
    g('e', MU_EMAILMEMOS),
    g('C', MU_CRYPTPASS),
    g('b', MU_NOBURSTLOGIN),
    g('E', MU_ENFORCE),
    g('P', MU_USE_PRIVMSG),
    g('p', MU_PRIVATE),
    g('Q', MU_QUIETCHG),
    g('g', MU_NOGREET),
    g('r', MU_REGNOLIMIT),
    g('N', MU_NEVERGROUP),
];

// Channel options.
pub const MC_HOLD: u32 = 0x0000_0001;
pub const MC_NOOP: u32 = 0x0000_0002;
pub const MC_LIMITFLAGS: u32 = 0x0000_0004;
pub const MC_SECURE: u32 = 0x0000_0008;
pub const MC_VERBOSE: u32 = 0x0000_0010;
pub const MC_RESTRICTED: u32 = 0x0000_0020;
pub const MC_KEEPTOPIC: u32 = 0x0000_0040;
pub const MC_VERBOSE_OPS: u32 = 0x0000_0080;
pub const MC_TOPICLOCK: u32 = 0x0000_0100;
pub const MC_GUARD: u32 = 0x0000_0200;
pub const MC_PRIVATE: u32 = 0x0000_0400;
pub const MC_NOSYNC: u32 = 0x0000_0800;

pub static MC_FLAGS: &[GFlag] = &[
    g('h', MC_HOLD),
    g('o', MC_NOOP),
    g('l', MC_LIMITFLAGS),
    g('z', MC_SECURE),
    g('v', MC_VERBOSE),
    g('r', MC_RESTRICTED),
    g('k', MC_KEEPTOPIC),
    g('e', MC_VERBOSE_OPS),
    g('t', MC_TOPICLOCK),
    g('g', MC_GUARD),
    g('p', MC_PRIVATE),
    g('n', MC_NOSYNC),
];

// Group options.
pub const MG_REGNOLIMIT: u32 = 0x0000_0001;
pub const MG_ACSNOLIMIT: u32 = 0x0000_0002;
pub const MG_OPEN: u32 = 0x0000_0004;
pub const MG_PUBLIC: u32 = 0x0000_0008;

pub static MG_FLAGS: &[GFlag] = &[
    g('r', MG_REGNOLIMIT),
    g('a', MG_ACSNOLIMIT),
    g('o', MG_OPEN),
    g('p', MG_PUBLIC),
];

// Group membership privileges.
pub const GA_FOUNDER: u32 = 0x0000_0001;
pub const GA_FLAGS: u32 = 0x0000_0002;
/// Member inherits the group's channel access entries.
pub const GA_CHANACS: u32 = 0x0000_0004;
pub const GA_MEMOS: u32 = 0x0000_0008;
pub const GA_SET: u32 = 0x0000_0010;
pub const GA_VHOST: u32 = 0x0000_0020;
pub const GA_BAN: u32 = 0x0000_0040;
pub const GA_INVITE: u32 = 0x0000_0080;
pub const GA_ACLVIEW: u32 = 0x0000_0100;

pub static GA_FLAGS_TABLE: &[GFlag] = &[
    g('F', GA_FOUNDER),
    g('f', GA_FLAGS),
    g('c', GA_CHANACS),
    g('m', GA_MEMOS),
    g('s', GA_SET),
    g('v', GA_VHOST),
    g('b', GA_BAN),
    g('i', GA_INVITE),
    g('A', GA_ACLVIEW),
];

/// Render `flags` as `+<chars>` in table order.
pub fn gflags_tostr(table: &[GFlag], flags: u32) -> String {
    let mut out = String::from("+");
    out.extend(table.iter().filter(|f| flags & f.value != 0).map(|f| f.ch));
    out
}

/// Parse a `+<chars>` word. Returns `None` if any character is unknown.
pub fn gflags_fromstr(table: &[GFlag], s: &str) -> Option<u32> {
    let mut res = 0;
    for c in s.chars() {
        if c == '+' {
            continue;
        }
        res |= table.iter().find(|f| f.ch == c)?.value;
    }
    Some(res)
}

/// Parse a `+<chars>` word, keeping the known flags and reporting whether
/// every character was recognised.
pub fn gflags_fromstr_lossy(table: &[GFlag], s: &str) -> (u32, bool) {
    let mut res = 0;
    let mut clean = true;
    for c in s.chars().filter(|&c| c != '+') {
        match table.iter().find(|f| f.ch == c) {
            Some(f) => res |= f.value,
            None => clean = false,
        }
    }
    (res, clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_and_parse() {
        assert_eq!(gflags_tostr(MU_FLAGS, MU_HOLD | MU_CRYPTPASS), "+hC");
        assert_eq!(gflags_tostr(MC_FLAGS, 0), "+");
        assert_eq!(gflags_fromstr(MU_FLAGS, "+hC"), Some(MU_HOLD | MU_CRYPTPASS));
        assert_eq!(gflags_fromstr(MC_FLAGS, "+"), Some(0));
        assert_eq!(gflags_fromstr(MC_FLAGS, "+kX"), None);
    }

    #[test]
    fn lossy_parse_keeps_known() {
        assert_eq!(gflags_fromstr_lossy(MC_FLAGS, "+kX"), (MC_KEEPTOPIC, false));
        assert_eq!(gflags_fromstr_lossy(GA_FLAGS_TABLE, "+Fc"), (GA_FOUNDER | GA_CHANACS, true));
    }
}
