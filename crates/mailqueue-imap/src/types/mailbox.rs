//! Mailbox names, LIST entries and SELECT results.

use std::fmt;

use super::{Flags, SeqNum, Uid, UidValidity};

/// A mailbox name as sent on the wire (modified UTF-7 is the caller's concern).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(String);

impl Mailbox {
    /// Wraps a mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for INBOX, which is case-insensitive.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0.eq_ignore_ascii_case("INBOX")
    }
}

impl From<&str> for Mailbox {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Mailbox {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What SELECT or EXAMINE reported about the opened mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// `* n EXISTS`
    pub exists: u32,
    /// `* n RECENT`
    pub recent: u32,
    /// `[UNSEEN n]`
    pub unseen: Option<SeqNum>,
    /// `[UIDNEXT n]`
    pub uid_next: Option<Uid>,
    /// `[UIDVALIDITY n]`
    pub uid_validity: Option<UidValidity>,
    /// `* FLAGS (...)`
    pub flags: Flags,
    /// `[PERMANENTFLAGS (...)]`
    pub permanent_flags: Flags,
    /// `[HIGHESTMODSEQ n]`
    pub highest_mod_seq: Option<u64>,
    /// Set by `[READ-ONLY]` or EXAMINE.
    pub read_only: bool,
}

/// One `* LIST` or `* LSUB` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    /// Name attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: Mailbox,
}

/// Name attribute from a LIST or LSUB response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// `\Noselect`
    NoSelect,
    /// `\Noinferiors`
    NoInferiors,
    /// `\HasChildren`
    HasChildren,
    /// `\HasNoChildren`
    HasNoChildren,
    /// `\Marked`
    Marked,
    /// `\Unmarked`
    Unmarked,
    /// `\All` (RFC 6154)
    All,
    /// `\Archive`
    Archive,
    /// `\Drafts`
    Drafts,
    /// `\Flagged`
    Flagged,
    /// `\Junk`
    Junk,
    /// `\Sent`
    Sent,
    /// `\Trash`
    Trash,
    /// Anything else, verbatim.
    Other(String),
}

impl MailboxAttribute {
    /// Parses an attribute atom.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        match atom.to_ascii_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NOINFERIORS" => Self::NoInferiors,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            _ => Self::Other(atom.to_string()),
        }
    }
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
    use super::*;

    #[test]
    fn inbox_is_case_insensitive() {
        assert!(Mailbox::new("inbox").is_inbox());
        assert!(Mailbox::from("INBOX").is_inbox());
        assert!(!Mailbox::from("INBOX/Sub").is_inbox());
    }

    #[test]
    fn attribute_parse() {
        assert_eq!(MailboxAttribute::parse("\\Noselect"), MailboxAttribute::NoSelect);
        assert_eq!(MailboxAttribute::parse("\\Spam"), MailboxAttribute::Junk);
        assert_eq!(
            MailboxAttribute::parse("\\Important"),
            MailboxAttribute::Other("\\Important".to_string())
        );
    }
}
