//! IRC case-mapping and mask matching.
//!
//! Account, group and channel names are keyed by their RFC 1459 lowercase
//! form, where `[]\~` are the uppercase forms of `{}|^`. Hostmask access
//! entries are matched with `*`/`?` wildcards under the same mapping.

/// Convert a single character to IRC lowercase using RFC 1459 case mapping.
#[inline]
pub const fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Convert a string to IRC lowercase using RFC 1459 case mapping.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Compare two strings using IRC case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.chars()
        .zip(b.chars())
        .all(|(ca, cb)| irc_lower_char(ca) == irc_lower_char(cb))
}

/// Match `text` against a wildcard `pattern` (`*` any run, `?` one char),
/// case-insensitively.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(irc_lower_char).collect();
    let text: Vec<char> = text.chars().map(irc_lower_char).collect();

    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            // backtrack: let the last '*' swallow one more char
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}

/// Maximum length of a `nick!user@host` mask accepted as an access target.
pub const MAX_HOSTMASK_LEN: usize = 30 + 1 + 10 + 1 + 63;

/// Check whether `mask` is usable as a hostmask access target.
///
/// The mask must contain exactly one `!` followed later by exactly one `@`,
/// no whitespace, and must not start with a character that would make it
/// ambiguous with a channel, option or prefix.
pub fn is_valid_hostmask(mask: &str) -> bool {
    if mask.is_empty() || mask.len() > MAX_HOSTMASK_LEN {
        return false;
    }
    if mask.chars().any(char::is_whitespace) {
        return false;
    }
    if mask.starts_with([',', '-', '#', '@', '!', ':']) {
        return false;
    }

    match (mask.find('!'), mask.find('@')) {
        (Some(bang), Some(at)) => {
            bang < at && mask.matches('!').count() == 1 && mask.matches('@').count() == 1
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irc_to_lower() {
        assert_eq!(irc_to_lower("HELLO"), "hello");
        assert_eq!(irc_to_lower("#Channel[1]"), "#channel{1}");
        assert_eq!(irc_to_lower("Nick\\Away"), "nick|away");
        assert_eq!(irc_to_lower("Test~Name"), "test^name");
    }

    #[test]
    fn test_irc_eq() {
        assert!(irc_eq("Alice", "alice"));
        assert!(irc_eq("[x]", "{X}"));
        assert!(!irc_eq("alice", "alicia"));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*!*@*.example.com", "nick!user@host.example.com"));
        assert!(wildcard_match("bad?ser!*@*", "BADUSER!evil@anywhere.net"));
        assert!(wildcard_match("#channel[*]", "#CHANNEL{test}"));
        assert!(!wildcard_match("*!admin@*", "nick!user@host"));
        assert!(!wildcard_match("abc", "abcd"));
    }

    #[test]
    fn test_valid_hostmask() {
        assert!(is_valid_hostmask("*!*@*.example.com"));
        assert!(is_valid_hostmask("nick!user@host"));
        assert!(!is_valid_hostmask("alice"));
        assert!(!is_valid_hostmask("nick@user!host"));
        assert!(!is_valid_hostmask("a!b!c@d"));
        assert!(!is_valid_hostmask("#chan!x@y"));
        assert!(!is_valid_hostmask("nick !user@host"));
    }
}
