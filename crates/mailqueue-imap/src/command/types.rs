//! Typed command arguments: message sets, STATUS items, FETCH items,
//! STORE actions and SEARCH keys.

use std::fmt;

use chrono::NaiveDate;

use crate::types::{Flag, SequenceSet, UidSet};

/// Messages addressed by a FETCH, STORE or COPY.
///
/// The UID form turns the command into its `UID` variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSet {
    /// Sequence numbers.
    Seq(SequenceSet),
    /// UIDs.
    Uid(UidSet),
}

impl MessageSet {
    /// True when the command must be prefixed with `UID`.
    #[must_use]
    pub const fn is_uid(&self) -> bool {
        matches!(self, Self::Uid(_))
    }
}

impl From<SequenceSet> for MessageSet {
    fn from(set: SequenceSet) -> Self {
        Self::Seq(set)
    }
}

impl From<UidSet> for MessageSet {
    fn from(set: UidSet) -> Self {
        Self::Uid(set)
    }
}

impl fmt::Display for MessageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seq(set) => set.fmt(f),
            Self::Uid(set) => set.fmt(f),
        }
    }
}

/// STATUS data items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// MESSAGES
    Messages,
    /// RECENT
    Recent,
    /// UIDNEXT
    UidNext,
    /// UIDVALIDITY
    UidValidity,
    /// UNSEEN
    Unseen,
    /// HIGHESTMODSEQ (CONDSTORE)
    HighestModSeq,
}

impl StatusAttribute {
    /// The item set requested when the caller does not pick one.
    pub const DEFAULT: [Self; 5] = [
        Self::Messages,
        Self::Recent,
        Self::UidNext,
        Self::UidValidity,
        Self::Unseen,
    ];

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// What a FETCH asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// `ALL`: FLAGS INTERNALDATE RFC822.SIZE ENVELOPE.
    All,
    /// `FAST`: FLAGS INTERNALDATE RFC822.SIZE.
    Fast,
    /// `FULL`: ALL plus BODY.
    Full,
    /// An explicit list.
    Items(Vec<FetchAttribute>),
}

impl From<Vec<FetchAttribute>> for FetchItems {
    fn from(items: Vec<FetchAttribute>) -> Self {
        Self::Items(items)
    }
}

/// One FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// FLAGS
    Flags,
    /// UID
    Uid,
    /// RFC822.SIZE
    Rfc822Size,
    /// INTERNALDATE
    InternalDate,
    /// ENVELOPE
    Envelope,
    /// BODYSTRUCTURE
    BodyStructure,
    /// `BODY[section]<start.len>`, or `BODY.PEEK[...]` when `peek` is set.
    Body {
        /// Section text such as `HEADER` or `1.2`; empty means the whole message.
        section: String,
        /// Leave `\Seen` untouched.
        peek: bool,
        /// Byte window `(start, length)`.
        partial: Option<(u32, u32)>,
    },
    /// MODSEQ (CONDSTORE)
    ModSeq,
    /// X-GM-MSGID
    GmailMessageId,
    /// X-GM-THRID
    GmailThreadId,
    /// X-GM-LABELS
    GmailLabels,
}

impl FetchAttribute {
    /// `BODY.PEEK[section]`.
    #[must_use]
    pub fn peek(section: impl Into<String>) -> Self {
        Self::Body {
            section: section.into(),
            peek: true,
            partial: None,
        }
    }
}

impl fmt::Display for FetchAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flags => f.write_str("FLAGS"),
            Self::Uid => f.write_str("UID"),
            Self::Rfc822Size => f.write_str("RFC822.SIZE"),
            Self::InternalDate => f.write_str("INTERNALDATE"),
            Self::Envelope => f.write_str("ENVELOPE"),
            Self::BodyStructure => f.write_str("BODYSTRUCTURE"),
            Self::Body {
                section,
                peek,
                partial,
            } => {
                let name = if *peek { "BODY.PEEK" } else { "BODY" };
                write!(f, "{name}[{section}]")?;
                if let Some((start, len)) = partial {
                    write!(f, "<{start}.{len}>")?;
                }
                Ok(())
            }
            Self::ModSeq => f.write_str("MODSEQ"),
            Self::GmailMessageId => f.write_str("X-GM-MSGID"),
            Self::GmailThreadId => f.write_str("X-GM-THRID"),
            Self::GmailLabels => f.write_str("X-GM-LABELS"),
        }
    }
}

/// How STORE combines the given values with the existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// `FLAGS`: replace.
    Replace,
    /// `+FLAGS`: add.
    Add,
    /// `-FLAGS`: remove.
    Remove,
}

impl StoreMode {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Replace => "",
            Self::Add => "+",
            Self::Remove => "-",
        }
    }
}

/// The values a STORE writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreValues {
    /// System flags and keywords.
    Flags(Vec<Flag>),
    /// Gmail labels (`X-GM-LABELS`).
    GmailLabels(Vec<String>),
}

/// A complete STORE request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAction {
    /// Combination mode.
    pub mode: StoreMode,
    /// What to write.
    pub values: StoreValues,
    /// Suppress the untagged FETCH echo (`.SILENT`).
    pub silent: bool,
    /// CONDSTORE `UNCHANGEDSINCE` guard.
    pub unchanged_since: Option<u64>,
}

impl StoreAction {
    fn new(mode: StoreMode, values: StoreValues) -> Self {
        Self {
            mode,
            values,
            silent: false,
            unchanged_since: None,
        }
    }

    /// `+FLAGS (...)`
    #[must_use]
    pub fn add_flags(flags: Vec<Flag>) -> Self {
        Self::new(StoreMode::Add, StoreValues::Flags(flags))
    }

    /// `-FLAGS (...)`
    #[must_use]
    pub fn remove_flags(flags: Vec<Flag>) -> Self {
        Self::new(StoreMode::Remove, StoreValues::Flags(flags))
    }

    /// `FLAGS (...)`
    #[must_use]
    pub fn set_flags(flags: Vec<Flag>) -> Self {
        Self::new(StoreMode::Replace, StoreValues::Flags(flags))
    }

    /// `+X-GM-LABELS (...)`
    #[must_use]
    pub fn add_labels(labels: Vec<String>) -> Self {
        Self::new(StoreMode::Add, StoreValues::GmailLabels(labels))
    }

    /// `-X-GM-LABELS (...)`
    #[must_use]
    pub fn remove_labels(labels: Vec<String>) -> Self {
        Self::new(StoreMode::Remove, StoreValues::GmailLabels(labels))
    }

    /// Marks the action `.SILENT`.
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Adds a CONDSTORE `UNCHANGEDSINCE` guard.
    #[must_use]
    pub const fn unchanged_since(mut self, modseq: u64) -> Self {
        self.unchanged_since = Some(modseq);
        self
    }

    pub(crate) fn item_name(&self) -> String {
        let name = match self.values {
            StoreValues::Flags(_) => "FLAGS",
            StoreValues::GmailLabels(_) => "X-GM-LABELS",
        };
        let silent = if self.silent { ".SILENT" } else { "" };
        format!("{}{name}{silent}", self.mode.prefix())
    }
}

/// A SEARCH key. Lists of keys are ANDed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// ALL
    All,
    /// ANSWERED
    Answered,
    /// DELETED
    Deleted,
    /// DRAFT
    Draft,
    /// FLAGGED
    Flagged,
    /// NEW
    New,
    /// OLD
    Old,
    /// RECENT
    Recent,
    /// SEEN
    Seen,
    /// UNANSWERED
    Unanswered,
    /// UNDELETED
    Undeleted,
    /// UNDRAFT
    Undraft,
    /// UNFLAGGED
    Unflagged,
    /// UNSEEN
    Unseen,
    /// KEYWORD
    Keyword(String),
    /// UNKEYWORD
    Unkeyword(String),
    /// Sequence set as a key.
    Sequence(SequenceSet),
    /// UID
    Uid(UidSet),
    /// FROM
    From(String),
    /// TO
    To(String),
    /// CC
    Cc(String),
    /// BCC
    Bcc(String),
    /// SUBJECT
    Subject(String),
    /// BODY
    Body(String),
    /// TEXT
    Text(String),
    /// HEADER field value
    Header(String, String),
    /// BEFORE (internal date)
    Before(NaiveDate),
    /// ON (internal date)
    On(NaiveDate),
    /// SINCE (internal date)
    Since(NaiveDate),
    /// SENTBEFORE
    SentBefore(NaiveDate),
    /// SENTON
    SentOn(NaiveDate),
    /// SENTSINCE
    SentSince(NaiveDate),
    /// LARGER
    Larger(u32),
    /// SMALLER
    Smaller(u32),
    /// MODSEQ (CONDSTORE)
    ModSeq(u64),
    /// Gmail search syntax (`X-GM-RAW`).
    GmailRaw(String),
    /// All keys must match.
    And(Vec<Self>),
    /// Either key matches.
    Or(Box<Self>, Box<Self>),
    /// The key must not match.
    Not(Box<Self>),
}

impl SearchCriteria {
    /// `OR a b`
    #[must_use]
    pub fn or(a: Self, b: Self) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    /// `NOT key`
    #[must_use]
    pub fn not(key: Self) -> Self {
        Self::Not(Box::new(key))
    }
}

/// Renders a date the way SEARCH expects it: `1-Feb-1994`.
pub(crate) fn search_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
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
    fn test_search_date_has_no_padding() {
        let date = NaiveDate::from_ymd_opt(1994, 2, 1).unwrap();
        assert_eq!(search_date(date), "1-Feb-1994");
        let date = NaiveDate::from_ymd_opt(2024, 12, 25).unwrap();
        assert_eq!(search_date(date), "25-Dec-2024");
    }

    #[test]
    fn test_fetch_attribute_body_partial() {
        let attr = FetchAttribute::Body {
            section: "1.2".to_string(),
            peek: true,
            partial: Some((0, 1024)),
        };
        assert_eq!(attr.to_string(), "BODY.PEEK[1.2]<0.1024>");
        assert_eq!(FetchAttribute::peek("").to_string(), "BODY.PEEK[]");
    }

    #[test]
    fn test_store_item_names() {
        assert_eq!(StoreAction::add_flags(vec![Flag::Seen]).item_name(), "+FLAGS");
        assert_eq!(
            StoreAction::remove_flags(vec![]).silent().item_name(),
            "-FLAGS.SILENT"
        );
        assert_eq!(StoreAction::set_flags(vec![]).item_name(), "FLAGS");
        assert_eq!(
            StoreAction::add_labels(vec!["Work".into()]).item_name(),
            "+X-GM-LABELS"
        );
    }

    #[test]
    fn test_message_set_uid_flag() {
        let seq = MessageSet::from(SequenceSet::All);
        let uid = MessageSet::from(UidSet::All);
        assert!(!seq.is_uid());
        assert!(uid.is_uid());
        assert_eq!(uid.to_string(), "*");
    }
}
