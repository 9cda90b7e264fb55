//! Line-oriented row codec.
//!
//! A row is one line: a tag, then space separated fields. Fields are
//! either words (non-empty, no whitespace), integers, or a single trailing
//! string which may contain spaces and is escaped so it always fits on one
//! line.

use thiserror::Error;

/// Errors produced while writing or reading a row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("a row is already open")]
    RowAlreadyOpen,

    #[error("no row is open")]
    NoOpenRow,

    #[error("field written after the trailing string")]
    FieldAfterString,

    #[error("invalid word {0:?}")]
    InvalidWord(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unknown {kind}: {name}")]
    Unresolved { kind: &'static str, name: String },

    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Open,
    Sealed,
}

/// Accumulates rows into an in-memory buffer.
#[derive(Debug)]
pub struct RowWriter {
    buf: String,
    state: WriterState,
    rows: usize,
}

impl Default for RowWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RowWriter {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            state: WriterState::Idle,
            rows: 0,
        }
    }

    pub fn start_row(&mut self, tag: &str) -> Result<(), RowError> {
        if self.state != WriterState::Idle {
            return Err(RowError::RowAlreadyOpen);
        }
        check_word(tag)?;
        self.buf.push_str(tag);
        self.state = WriterState::Open;
        Ok(())
    }

    fn field(&mut self) -> Result<(), RowError> {
        match self.state {
            WriterState::Idle => Err(RowError::NoOpenRow),
            WriterState::Sealed => Err(RowError::FieldAfterString),
            WriterState::Open => {
                self.buf.push(' ');
                Ok(())
            }
        }
    }

    pub fn write_word(&mut self, word: &str) -> Result<(), RowError> {
        check_word(word)?;
        self.field()?;
        self.buf.push_str(word);
        Ok(())
    }

    pub fn write_uint(&mut self, value: u64) -> Result<(), RowError> {
        self.field()?;
        self.buf.push_str(&value.to_string());
        Ok(())
    }

    pub fn write_int(&mut self, value: i64) -> Result<(), RowError> {
        self.field()?;
        self.buf.push_str(&value.to_string());
        Ok(())
    }

    /// Write a timestamp as signed UNIX seconds.
    pub fn write_time(&mut self, ts: i64) -> Result<(), RowError> {
        self.write_int(ts)
    }

    /// Write the trailing string field. Nothing may follow it.
    pub fn write_str(&mut self, value: &str) -> Result<(), RowError> {
        self.field()?;
        escape_into(&mut self.buf, value);
        self.state = WriterState::Sealed;
        Ok(())
    }

    pub fn commit_row(&mut self) -> Result<(), RowError> {
        if self.state == WriterState::Idle {
            return Err(RowError::NoOpenRow);
        }
        self.buf.push('\n');
        self.state = WriterState::Idle;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Take the finished text. Fails if a row is still open.
    pub fn finish(self) -> Result<String, RowError> {
        if self.state != WriterState::Idle {
            return Err(RowError::RowAlreadyOpen);
        }
        Ok(self.buf)
    }
}

/// Whether `word` can be written as a word field: non-empty, with no
/// whitespace or control characters.
pub fn is_word(word: &str) -> bool {
    !word.is_empty() && !word.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn check_word(word: &str) -> Result<(), RowError> {
    if !is_word(word) {
        return Err(RowError::InvalidWord(word.to_string()));
    }
    Ok(())
}

fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\x7f' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
}

/// Decode an escaped string field. Unknown escapes are kept as written.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('r') => {
                chars.next();
                out.push('\r');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            Some('x') => {
                let mut probe = chars.clone();
                probe.next();
                let hex: String = probe.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) if hex.len() == 2 => {
                        out.push(char::from(byte));
                        chars = probe;
                    }
                    _ => out.push('\\'),
                }
            }
            _ => out.push('\\'),
        }
    }
    out
}

/// Cursor over the fields of one row.
#[derive(Debug)]
pub struct RowReader<'a> {
    tag: &'a str,
    rest: &'a str,
}

impl<'a> RowReader<'a> {
    /// Split off the tag. Returns `None` for a blank line.
    pub fn new(line: &'a str) -> Option<Self> {
        let line = line.trim_start_matches(' ');
        let (tag, rest) = match line.find(' ') {
            Some(idx) => (&line[..idx], &line[idx..]),
            None => (line, ""),
        };
        if tag.is_empty() {
            return None;
        }
        Some(Self { tag, rest })
    }

    pub fn tag(&self) -> &'a str {
        self.tag
    }

    pub fn read_word(&mut self, field: &'static str) -> Result<&'a str, RowError> {
        self.try_word().ok_or(RowError::MissingField(field))
    }

    /// Next word if present. Used for optional trailing fields.
    pub fn try_word(&mut self) -> Option<&'a str> {
        let rest = self.rest.trim_start_matches(' ');
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        let (word, tail) = rest.split_at(end);
        self.rest = tail;
        Some(word)
    }

    pub fn read_uint(&mut self, field: &'static str) -> Result<u64, RowError> {
        let word = self.read_word(field)?;
        word.parse().map_err(|_| RowError::InvalidNumber {
            field,
            value: word.to_string(),
        })
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, RowError> {
        let word = self.read_word(field)?;
        word.parse().map_err(|_| RowError::InvalidNumber {
            field,
            value: word.to_string(),
        })
    }

    pub fn read_int(&mut self, field: &'static str) -> Result<i64, RowError> {
        let word = self.read_word(field)?;
        word.parse().map_err(|_| RowError::InvalidNumber {
            field,
            value: word.to_string(),
        })
    }

    /// Read a timestamp written by [`RowWriter::write_time`].
    pub fn read_time(&mut self, field: &'static str) -> Result<i64, RowError> {
        self.read_int(field)
    }

    /// The rest of the row as the trailing string field.
    pub fn read_str(&mut self, field: &'static str) -> Result<String, RowError> {
        let raw = self
            .rest
            .strip_prefix(' ')
            .ok_or(RowError::MissingField(field))?;
        self.rest = "";
        Ok(unescape(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_produces_lines() {
        let mut w = RowWriter::new();
        w.start_row("CA").unwrap();
        w.write_word("#chan").unwrap();
        w.write_word("alice").unwrap();
        w.write_word("+ov").unwrap();
        w.write_time(1_700_000_000).unwrap();
        w.commit_row().unwrap();
        w.start_row("MDC").unwrap();
        w.write_word("#chan").unwrap();
        w.write_word("url").unwrap();
        w.write_str("see https://example.org\tnow").unwrap();
        w.commit_row().unwrap();
        assert_eq!(w.rows(), 2);
        assert_eq!(
            w.finish().unwrap(),
            "CA #chan alice +ov 1700000000\nMDC #chan url see https://example.org\\tnow\n"
        );
    }

    #[test]
    fn writer_state_machine() {
        let mut w = RowWriter::new();
        assert_eq!(w.write_word("x"), Err(RowError::NoOpenRow));
        assert_eq!(w.commit_row(), Err(RowError::NoOpenRow));
        w.start_row("X").unwrap();
        assert_eq!(w.start_row("Y"), Err(RowError::RowAlreadyOpen));
        w.write_str("tail").unwrap();
        assert_eq!(w.write_uint(1), Err(RowError::FieldAfterString));
        assert_eq!(w.write_word("two words"), Err(RowError::InvalidWord("two words".into())));
        assert_eq!(w.write_word(""), Err(RowError::InvalidWord(String::new())));
        w.commit_row().unwrap();
        w.start_row("Z").unwrap();
        assert!(w.finish().is_err());
    }

    #[test]
    fn escaping_round_trips() {
        let nasty = "back\\slash\nnew\rret\ttab\x01bell end ";
        let mut w = RowWriter::new();
        w.start_row("MDU").unwrap();
        w.write_str(nasty).unwrap();
        w.commit_row().unwrap();
        let text = w.finish().unwrap();
        assert_eq!(text.lines().count(), 1);

        let mut r = RowReader::new(text.trim_end_matches('\n')).unwrap();
        assert_eq!(r.tag(), "MDU");
        assert_eq!(r.read_str("value").unwrap(), nasty);
    }

    #[test]
    fn unknown_escapes_are_literal() {
        assert_eq!(unescape("a\\qb"), "a\\qb");
        assert_eq!(unescape("\\xZZ"), "\\xZZ");
        assert_eq!(unescape("\\x4"), "\\x4");
        assert_eq!(unescape("end\\"), "end\\");
        assert_eq!(unescape("\\x41"), "A");
    }

    #[test]
    fn reader_fields() {
        let mut r = RowReader::new("MU alice hash a@example.com 10 -5").unwrap();
        assert_eq!(r.tag(), "MU");
        assert_eq!(r.read_word("name").unwrap(), "alice");
        assert_eq!(r.read_word("pass").unwrap(), "hash");
        r.read_word("email").unwrap();
        assert_eq!(r.read_uint("registered").unwrap(), 10);
        assert_eq!(RowReader::new("X -5").unwrap().read_int("n").unwrap(), -5);
        assert!(matches!(
            r.read_uint("lastlogin"),
            Err(RowError::InvalidNumber { field: "lastlogin", .. })
        ));
        assert_eq!(r.read_word("flags"), Err(RowError::MissingField("flags")));
        assert_eq!(r.try_word(), None);
    }

    #[test]
    fn times_round_trip() {
        let mut w = RowWriter::new();
        w.start_row("MN").unwrap();
        w.write_time(1_700_000_000).unwrap();
        w.write_time(0).unwrap();
        w.write_time(-86_400).unwrap();
        w.commit_row().unwrap();
        let text = w.finish().unwrap();
        assert_eq!(text, "MN 1700000000 0 -86400\n");

        let mut r = RowReader::new(text.trim_end_matches('\n')).unwrap();
        assert_eq!(r.read_time("registered").unwrap(), 1_700_000_000);
        assert_eq!(r.read_time("lastseen").unwrap(), 0);
        assert_eq!(r.read_time("tmodified").unwrap(), -86_400);
        assert_eq!(r.read_time("used"), Err(RowError::MissingField("used")));

        let mut r = RowReader::new("MN yesterday").unwrap();
        assert_eq!(
            r.read_time("registered"),
            Err(RowError::InvalidNumber {
                field: "registered",
                value: "yesterday".into()
            })
        );
    }

    #[test]
    fn blank_rows() {
        assert!(RowReader::new("").is_none());
        assert!(RowReader::new("   ").is_none());
        let mut r = RowReader::new("DE").unwrap();
        assert_eq!(r.read_str("x"), Err(RowError::MissingField("x")));
    }
}
