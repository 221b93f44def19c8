//! Wire rendering for command arguments.

use chrono::{DateTime, FixedOffset};

use super::types::{FetchItems, SearchCriteria, StoreAction, StoreValues, search_date};
use crate::types::{Flag, Mailbox, Tag};
use crate::{Error, Result};

/// Accumulates one command line.
pub(crate) struct LineWriter {
    buf: Vec<u8>,
}

impl LineWriter {
    /// Starts a line with `tag` and the command verb.
    pub(crate) fn new(tag: &Tag, verb: &str) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(tag.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(verb.as_bytes());
        Self { buf }
    }

    /// A writer for a nested group, joined later with [`Self::parenthesized`].
    pub(crate) const fn detached() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends `(inner)`, dropping the separator the first item wrote.
    pub(crate) fn parenthesized(&mut self, inner: Self) {
        self.buf.push(b'(');
        self.buf.extend_from_slice(inner.buf.get(1..).unwrap_or_default());
        self.buf.push(b')');
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        self.buf.extend_from_slice(b"\r\n");
        self.buf
    }

    pub(crate) fn sp(&mut self) {
        self.buf.push(b' ');
    }

    /// Writes text verbatim, after a space.
    pub(crate) fn word(&mut self, text: &str) {
        self.sp();
        self.buf.extend_from_slice(text.as_bytes());
    }

    /// Writes a string as an atom when it can be one, quoted otherwise.
    pub(crate) fn astring(&mut self, text: &str) -> Result<()> {
        check_text(text)?;
        if needs_quoting(text) {
            self.sp();
            self.quoted_raw(text);
        } else {
            self.word(text);
        }
        Ok(())
    }

    /// Always writes a quoted string.
    pub(crate) fn quoted(&mut self, text: &str) -> Result<()> {
        check_text(text)?;
        self.sp();
        self.quoted_raw(text);
        Ok(())
    }

    fn quoted_raw(&mut self, text: &str) {
        self.buf.push(b'"');
        for byte in text.bytes() {
            if byte == b'"' || byte == b'\\' {
                self.buf.push(b'\\');
            }
            self.buf.push(byte);
        }
        self.buf.push(b'"');
    }

    pub(crate) fn mailbox(&mut self, mailbox: &Mailbox) -> Result<()> {
        if mailbox.is_inbox() {
            self.word("INBOX");
            return Ok(());
        }
        self.astring(mailbox.as_str())
    }

    /// `(a b c)`; an empty list renders as `()`.
    pub(crate) fn list<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sp();
        self.buf.push(b'(');
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.buf.push(b' ');
            }
            self.buf.extend_from_slice(item.as_ref().as_bytes());
        }
        self.buf.push(b')');
    }

    pub(crate) fn flags(&mut self, flags: &[Flag]) -> Result<()> {
        for flag in flags {
            if let Flag::Keyword(keyword) = flag
                && (keyword.is_empty() || needs_quoting(keyword))
            {
                return Err(Error::Validation(format!("invalid keyword {keyword:?}")));
            }
        }
        self.list(flags.iter().map(Flag::as_str));
        Ok(())
    }

    pub(crate) fn date_time(&mut self, date: &DateTime<FixedOffset>) {
        self.word(&format!("\"{}\"", date.format("%e-%b-%Y %H:%M:%S %z")));
    }

    pub(crate) fn fetch_items(&mut self, items: &FetchItems) {
        match items {
            FetchItems::All => self.word("ALL"),
            FetchItems::Fast => self.word("FAST"),
            FetchItems::Full => self.word("FULL"),
            FetchItems::Items(attributes) if attributes.len() == 1 => {
                self.word(&attributes[0].to_string());
            }
            FetchItems::Items(attributes) => {
                self.list(attributes.iter().map(ToString::to_string));
            }
        }
    }

    pub(crate) fn store_action(&mut self, action: &StoreAction) -> Result<()> {
        if let Some(modseq) = action.unchanged_since {
            self.word(&format!("(UNCHANGEDSINCE {modseq})"));
        }
        self.word(&action.item_name());
        match &action.values {
            StoreValues::Flags(flags) => self.flags(flags)?,
            StoreValues::GmailLabels(labels) => {
                self.sp();
                self.buf.push(b'(');
                for (i, label) in labels.iter().enumerate() {
                    check_text(label)?;
                    if i > 0 {
                        self.buf.push(b' ');
                    }
                    if needs_quoting(label) {
                        self.quoted_raw(label);
                    } else {
                        self.buf.extend_from_slice(label.as_bytes());
                    }
                }
                self.buf.push(b')');
            }
        }
        Ok(())
    }

    /// Writes one search key. Nested `And` groups are parenthesized.
    pub(crate) fn search(&mut self, key: &SearchCriteria, nested: bool) -> Result<()> {
        match key {
            SearchCriteria::All => self.word("ALL"),
            SearchCriteria::Answered => self.word("ANSWERED"),
            SearchCriteria::Deleted => self.word("DELETED"),
            SearchCriteria::Draft => self.word("DRAFT"),
            SearchCriteria::Flagged => self.word("FLAGGED"),
            SearchCriteria::New => self.word("NEW"),
            SearchCriteria::Old => self.word("OLD"),
            SearchCriteria::Recent => self.word("RECENT"),
            SearchCriteria::Seen => self.word("SEEN"),
            SearchCriteria::Unanswered => self.word("UNANSWERED"),
            SearchCriteria::Undeleted => self.word("UNDELETED"),
            SearchCriteria::Undraft => self.word("UNDRAFT"),
            SearchCriteria::Unflagged => self.word("UNFLAGGED"),
            SearchCriteria::Unseen => self.word("UNSEEN"),
            SearchCriteria::Keyword(k) => {
                self.word("KEYWORD");
                self.astring(k)?;
            }
            SearchCriteria::Unkeyword(k) => {
                self.word("UNKEYWORD");
                self.astring(k)?;
            }
            SearchCriteria::Sequence(set) => self.word(&set.to_string()),
            SearchCriteria::Uid(set) => self.word(&format!("UID {set}")),
            SearchCriteria::From(s) => self.keyed("FROM", s)?,
            SearchCriteria::To(s) => self.keyed("TO", s)?,
            SearchCriteria::Cc(s) => self.keyed("CC", s)?,
            SearchCriteria::Bcc(s) => self.keyed("BCC", s)?,
            SearchCriteria::Subject(s) => self.keyed("SUBJECT", s)?,
            SearchCriteria::Body(s) => self.keyed("BODY", s)?,
            SearchCriteria::Text(s) => self.keyed("TEXT", s)?,
            SearchCriteria::GmailRaw(s) => self.keyed("X-GM-RAW", s)?,
            SearchCriteria::Header(field, value) => {
                self.word("HEADER");
                self.astring(field)?;
                self.quoted(value)?;
            }
            SearchCriteria::Before(d) => self.word(&format!("BEFORE {}", search_date(*d))),
            SearchCriteria::On(d) => self.word(&format!("ON {}", search_date(*d))),
            SearchCriteria::Since(d) => self.word(&format!("SINCE {}", search_date(*d))),
            SearchCriteria::SentBefore(d) => {
                self.word(&format!("SENTBEFORE {}", search_date(*d)));
            }
            SearchCriteria::SentOn(d) => self.word(&format!("SENTON {}", search_date(*d))),
            SearchCriteria::SentSince(d) => {
                self.word(&format!("SENTSINCE {}", search_date(*d)));
            }
            SearchCriteria::Larger(n) => self.word(&format!("LARGER {n}")),
            SearchCriteria::Smaller(n) => self.word(&format!("SMALLER {n}")),
            SearchCriteria::ModSeq(n) => self.word(&format!("MODSEQ {n}")),
            SearchCriteria::And(keys) if keys.is_empty() => self.word("ALL"),
            SearchCriteria::And(keys) => {
                if nested {
                    self.sp();
                    self.buf.push(b'(');
                }
                let mark = self.buf.len();
                for key in keys {
                    self.search(key, true)?;
                }
                if nested {
                    // the first key wrote a separator right after the paren
                    self.buf.remove(mark);
                    self.buf.push(b')');
                }
            }
            SearchCriteria::Or(a, b) => {
                self.word("OR");
                self.search(a, true)?;
                self.search(b, true)?;
            }
            SearchCriteria::Not(key) => {
                self.word("NOT");
                self.search(key, true)?;
            }
        }
        Ok(())
    }

    fn keyed(&mut self, key: &str, value: &str) -> Result<()> {
        self.word(key);
        self.quoted(value)
    }
}

/// Rejects text that cannot travel in a quoted string.
pub(crate) fn check_text(text: &str) -> Result<()> {
    if text.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0)) {
        return Err(Error::Validation(
            "argument contains CR, LF or NUL".to_string(),
        ));
    }
    Ok(())
}

/// True when `text` is not a plain atom.
pub(crate) fn needs_quoting(text: &str) -> bool {
    text.is_empty()
        || text.bytes().any(|b| {
            !(0x21..=0x7e).contains(&b)
                || matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']')
        })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::*;

    fn render(f: impl FnOnce(&mut LineWriter) -> Result<()>) -> String {
        let mut w = LineWriter::new(&Tag::new("x1"), "T");
        f(&mut w).unwrap();
        String::from_utf8(w.finish()).unwrap()
    }

    #[test]
    fn test_astring_atom_and_quoted() {
        assert_eq!(render(|w| w.astring("simple")), "x1 T simple\r\n");
        assert_eq!(render(|w| w.astring("two words")), "x1 T \"two words\"\r\n");
        assert_eq!(render(|w| w.astring("")), "x1 T \"\"\r\n");
        assert_eq!(render(|w| w.astring("a\"b\\c")), "x1 T \"a\\\"b\\\\c\"\r\n");
    }

    #[test]
    fn test_crlf_is_rejected() {
        let mut w = LineWriter::new(&Tag::new("x1"), "T");
        let err = w.quoted("pass\r\nx2 LOGOUT").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_inbox_normalized() {
        assert_eq!(render(|w| w.mailbox(&Mailbox::new("inbox"))), "x1 T INBOX\r\n");
        assert_eq!(
            render(|w| w.mailbox(&Mailbox::new("Sent Items"))),
            "x1 T \"Sent Items\"\r\n"
        );
    }

    #[test]
    fn test_search_composition() {
        let key = SearchCriteria::And(vec![
            SearchCriteria::Unseen,
            SearchCriteria::or(
                SearchCriteria::From("alice".into()),
                SearchCriteria::And(vec![
                    SearchCriteria::Flagged,
                    SearchCriteria::Since(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
                ]),
            ),
            SearchCriteria::not(SearchCriteria::Deleted),
        ]);
        assert_eq!(
            render(|w| w.search(&key, false)),
            "x1 T UNSEEN OR FROM \"alice\" (FLAGGED SINCE 5-Mar-2024) NOT DELETED\r\n"
        );
    }

    #[test]
    fn test_store_with_guard() {
        let action = StoreAction::add_flags(vec![Flag::Deleted])
            .silent()
            .unchanged_since(320162338);
        assert_eq!(
            render(|w| w.store_action(&action)),
            "x1 T (UNCHANGEDSINCE 320162338) +FLAGS.SILENT (\\Deleted)\r\n"
        );
    }

    #[test]
    fn test_store_labels_quoting() {
        let action = StoreAction::add_labels(vec!["\\Important".into(), "My Label".into()]);
        assert_eq!(
            render(|w| w.store_action(&action)),
            "x1 T +X-GM-LABELS (\"\\\\Important\" \"My Label\")\r\n"
        );
    }

    proptest! {
        #[test]
        fn quoted_strings_round_trip_through_the_lexer(s in "[ -~]{0,20} [ -~]{0,20}") {
            let line = render(|w| w.astring(&s));
            let arg = &line["x1 T ".len()..line.len() - 2];
            let mut lexer = crate::parser::Lexer::new(arg.as_bytes());
            prop_assert_eq!(lexer.astring().unwrap(), s);
        }
    }
}
