//! IMAP command construction and serialization.
//!
//! A [`Command`] renders to the exact bytes of one command line, including
//! the tag and trailing CRLF. Arguments are validated while rendering: text
//! that cannot be carried in a quoted string is rejected before anything
//! reaches the wire.

mod serialize;
mod tag;
mod types;

use chrono::{DateTime, FixedOffset};

pub use tag::TagCounter;
pub use types::{
    FetchAttribute, FetchItems, MessageSet, SearchCriteria, StatusAttribute, StoreAction,
    StoreMode, StoreValues,
};

use self::serialize::LineWriter;
pub(crate) use self::serialize::check_text;
use crate::Result;
use crate::types::{Flag, Mailbox, Tag};

/// Ends an IDLE. Sent without a tag.
pub const DONE: &[u8] = b"DONE\r\n";

/// An IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY
    Capability,
    /// NOOP
    Noop,
    /// LOGOUT
    Logout,
    /// STARTTLS
    StartTls,
    /// LOGIN with both arguments quoted.
    Login {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE with an optional SASL-IR initial response.
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
        /// Base64 initial response.
        initial_response: Option<String>,
    },
    /// ID (RFC 2971). `None` sends `NIL`.
    Id {
        /// Client identification fields.
        parameters: Option<Vec<(String, String)>>,
    },
    /// ENABLE (RFC 5161)
    Enable {
        /// Capability names.
        capabilities: Vec<String>,
    },
    /// SELECT
    Select {
        /// Mailbox to open.
        mailbox: Mailbox,
        /// Append `(CONDSTORE)`.
        condstore: bool,
    },
    /// EXAMINE
    Examine {
        /// Mailbox to open read-only.
        mailbox: Mailbox,
    },
    /// CREATE
    Create {
        /// New mailbox.
        mailbox: Mailbox,
    },
    /// DELETE
    Delete {
        /// Mailbox to remove.
        mailbox: Mailbox,
    },
    /// RENAME
    Rename {
        /// Current name.
        from: Mailbox,
        /// New name.
        to: Mailbox,
    },
    /// SUBSCRIBE
    Subscribe {
        /// Mailbox.
        mailbox: Mailbox,
    },
    /// UNSUBSCRIBE
    Unsubscribe {
        /// Mailbox.
        mailbox: Mailbox,
    },
    /// LIST
    List {
        /// Reference name.
        reference: String,
        /// Pattern with `*` and `%` wildcards.
        pattern: String,
    },
    /// LSUB
    Lsub {
        /// Reference name.
        reference: String,
        /// Pattern with `*` and `%` wildcards.
        pattern: String,
    },
    /// STATUS
    Status {
        /// Mailbox to query.
        mailbox: Mailbox,
        /// Items to report.
        items: Vec<StatusAttribute>,
    },
    /// First line of APPEND, up to and including the literal header.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Initial flags.
        flags: Vec<Flag>,
        /// Internal date to record.
        date: Option<DateTime<FixedOffset>>,
        /// Literal length in bytes.
        size: usize,
    },
    /// CHECK
    Check,
    /// CLOSE
    Close,
    /// EXPUNGE
    Expunge,
    /// SEARCH / UID SEARCH
    Search {
        /// `CHARSET` argument.
        charset: Option<String>,
        /// Keys, ANDed; empty means `ALL`.
        criteria: Vec<SearchCriteria>,
        /// Return UIDs.
        uid: bool,
    },
    /// FETCH / UID FETCH
    Fetch {
        /// Messages.
        set: MessageSet,
        /// Data items.
        items: FetchItems,
        /// CONDSTORE `CHANGEDSINCE` modifier.
        changed_since: Option<u64>,
    },
    /// STORE / UID STORE
    Store {
        /// Messages.
        set: MessageSet,
        /// What to change.
        action: StoreAction,
    },
    /// COPY / UID COPY
    Copy {
        /// Messages.
        set: MessageSet,
        /// Destination.
        mailbox: Mailbox,
    },
    /// IDLE
    Idle,
}

impl Command {
    /// The command verb as it appears on the wire.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Id { .. } => "ID",
            Self::Enable { .. } => "ENABLE",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Rename { .. } => "RENAME",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::List { .. } => "LIST",
            Self::Lsub { .. } => "LSUB",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::Check => "CHECK",
            Self::Close => "CLOSE",
            Self::Expunge => "EXPUNGE",
            Self::Search { uid: false, .. } => "SEARCH",
            Self::Search { uid: true, .. } => "UID SEARCH",
            Self::Fetch { set, .. } if set.is_uid() => "UID FETCH",
            Self::Fetch { .. } => "FETCH",
            Self::Store { set, .. } if set.is_uid() => "UID STORE",
            Self::Store { .. } => "STORE",
            Self::Copy { set, .. } if set.is_uid() => "UID COPY",
            Self::Copy { .. } => "COPY",
            Self::Idle => "IDLE",
        }
    }

    /// True for commands that carry credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Login { .. } | Self::Authenticate { .. })
    }

    /// Checks every argument without needing a tag.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] when an argument cannot be sent.
    pub fn validate(&self) -> Result<()> {
        self.serialize(&Tag::new("x0")).map(drop)
    }

    /// A loggable rendering of the line: credentials are replaced.
    #[must_use]
    pub fn redacted(&self, tag: &Tag, line: &[u8]) -> String {
        if self.is_sensitive() {
            format!("{tag} {} <redacted>", self.verb())
        } else {
            String::from_utf8_lossy(line).trim_end().to_string()
        }
    }

    /// Renders `tag command CRLF`.
    ///
    /// For APPEND this is only the first line, ending in `{size}`; the
    /// literal is sent once the server asks for it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] when an argument contains CR, LF
    /// or NUL, or a keyword flag is not an atom.
    pub fn serialize(&self, tag: &Tag) -> Result<Vec<u8>> {
        let mut w = LineWriter::new(tag, self.verb());
        match self {
            Self::Capability
            | Self::Noop
            | Self::Logout
            | Self::StartTls
            | Self::Check
            | Self::Close
            | Self::Expunge
            | Self::Idle => {}
            Self::Login { username, password } => {
                w.quoted(username)?;
                w.quoted(password)?;
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                w.astring(mechanism)?;
                if let Some(response) = initial_response {
                    check_text(response)?;
                    w.word(if response.is_empty() { "=" } else { response });
                }
            }
            Self::Id { parameters: None } => w.word("NIL"),
            Self::Id {
                parameters: Some(fields),
            } => {
                w.sp();
                let mut inner = LineWriter::detached();
                for (key, value) in fields {
                    inner.quoted(key)?;
                    inner.quoted(value)?;
                }
                w.parenthesized(inner);
            }
            Self::Enable { capabilities } => {
                for capability in capabilities {
                    w.astring(capability)?;
                }
            }
            Self::Select { mailbox, condstore } => {
                w.mailbox(mailbox)?;
                if *condstore {
                    w.word("(CONDSTORE)");
                }
            }
            Self::Examine { mailbox }
            | Self::Create { mailbox }
            | Self::Delete { mailbox }
            | Self::Subscribe { mailbox }
            | Self::Unsubscribe { mailbox } => w.mailbox(mailbox)?,
            Self::Rename { from, to } => {
                w.mailbox(from)?;
                w.mailbox(to)?;
            }
            Self::List { reference, pattern } | Self::Lsub { reference, pattern } => {
                w.quoted(reference)?;
                w.quoted(pattern)?;
            }
            Self::Status { mailbox, items } => {
                w.mailbox(mailbox)?;
                w.list(items.iter().map(|item| item.as_str()));
            }
            Self::Append {
                mailbox,
                flags,
                date,
                size,
            } => {
                w.mailbox(mailbox)?;
                if !flags.is_empty() {
                    w.flags(flags)?;
                }
                if let Some(date) = date {
                    w.date_time(date);
                }
                w.word(&format!("{{{size}}}"));
            }
            Self::Search {
                charset,
                criteria,
                uid: _,
            } => {
                if let Some(charset) = charset {
                    w.word("CHARSET");
                    w.astring(charset)?;
                }
                if criteria.is_empty() {
                    w.word("ALL");
                }
                for key in criteria {
                    w.search(key, false)?;
                }
            }
            Self::Fetch {
                set,
                items,
                changed_since,
            } => {
                w.word(&set.to_string());
                w.fetch_items(items);
                if let Some(modseq) = changed_since {
                    w.word(&format!("(CHANGEDSINCE {modseq})"));
                }
            }
            Self::Store { set, action } => {
                w.word(&set.to_string());
                w.store_action(action)?;
            }
            Self::Copy { set, mailbox } => {
                w.word(&set.to_string());
                w.mailbox(mailbox)?;
            }
        }
        Ok(w.finish())
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
    use crate::types::{SequenceSet, Uid, UidSet};

    fn line(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize(&Tag::new("x7")).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(line(&Command::Noop), "x7 NOOP\r\n");
        assert_eq!(line(&Command::Capability), "x7 CAPABILITY\r\n");
        assert_eq!(line(&Command::Idle), "x7 IDLE\r\n");
    }

    #[test]
    fn test_login_quotes_both_arguments() {
        let cmd = Command::Login {
            username: "user".into(),
            password: "p\"w".into(),
        };
        assert_eq!(line(&cmd), "x7 LOGIN \"user\" \"p\\\"w\"\r\n");
        assert_eq!(
            cmd.redacted(&Tag::new("x7"), b"ignored"),
            "x7 LOGIN <redacted>"
        );
    }

    #[test]
    fn test_login_with_newline_is_invalid() {
        let cmd = Command::Login {
            username: "user".into(),
            password: "secret\r\nx2 DELETE INBOX".into(),
        };
        assert!(matches!(cmd.validate(), Err(crate::Error::Validation(_))));
    }

    #[test]
    fn test_authenticate_initial_response() {
        let cmd = Command::Authenticate {
            mechanism: "XOAUTH2".into(),
            initial_response: Some("dXNlcj0=".into()),
        };
        assert_eq!(line(&cmd), "x7 AUTHENTICATE XOAUTH2 dXNlcj0=\r\n");
    }

    #[test]
    fn test_select_condstore() {
        let cmd = Command::Select {
            mailbox: Mailbox::new("INBOX"),
            condstore: true,
        };
        assert_eq!(line(&cmd), "x7 SELECT INBOX (CONDSTORE)\r\n");
    }

    #[test]
    fn test_status_items() {
        let cmd = Command::Status {
            mailbox: Mailbox::new("Archive"),
            items: StatusAttribute::DEFAULT.to_vec(),
        };
        assert_eq!(
            line(&cmd),
            "x7 STATUS Archive (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)\r\n"
        );
    }

    #[test]
    fn test_append_header() {
        let cmd = Command::Append {
            mailbox: Mailbox::new("Drafts"),
            flags: vec![Flag::Seen, Flag::Draft],
            date: None,
            size: 100,
        };
        assert_eq!(line(&cmd), "x7 APPEND Drafts (\\Seen \\Draft) {100}\r\n");
    }

    #[test]
    fn test_append_with_date() {
        let date = DateTime::parse_from_rfc3339("2024-03-05T09:08:07+01:00").unwrap();
        let cmd = Command::Append {
            mailbox: Mailbox::new("INBOX"),
            flags: vec![],
            date: Some(date),
            size: 3,
        };
        assert_eq!(
            line(&cmd),
            "x7 APPEND INBOX \" 5-Mar-2024 09:08:07 +0100\" {3}\r\n"
        );
    }

    #[test]
    fn test_uid_fetch() {
        let cmd = Command::Fetch {
            set: UidSet::Range(Uid::new(1).unwrap(), Uid::new(9).unwrap()).into(),
            items: vec![FetchAttribute::Uid, FetchAttribute::Flags].into(),
            changed_since: None,
        };
        assert_eq!(line(&cmd), "x7 UID FETCH 1:9 (UID FLAGS)\r\n");
    }

    #[test]
    fn test_fetch_single_item_and_changedsince() {
        let cmd = Command::Fetch {
            set: SequenceSet::All.into(),
            items: vec![FetchAttribute::Flags].into(),
            changed_since: Some(12),
        };
        assert_eq!(line(&cmd), "x7 FETCH * FLAGS (CHANGEDSINCE 12)\r\n");
    }

    #[test]
    fn test_search_charset_and_default() {
        let cmd = Command::Search {
            charset: Some("UTF-8".into()),
            criteria: vec![SearchCriteria::Subject("caf\u{e9}".into())],
            uid: true,
        };
        assert_eq!(
            line(&cmd),
            "x7 UID SEARCH CHARSET UTF-8 SUBJECT \"caf\u{e9}\"\r\n"
        );
        let cmd = Command::Search {
            charset: None,
            criteria: vec![],
            uid: false,
        };
        assert_eq!(line(&cmd), "x7 SEARCH ALL\r\n");
    }

    #[test]
    fn test_store_and_copy() {
        let cmd = Command::Store {
            set: SequenceSet::single(3).unwrap().into(),
            action: StoreAction::add_flags(vec![Flag::Seen]),
        };
        assert_eq!(line(&cmd), "x7 STORE 3 +FLAGS (\\Seen)\r\n");
        let cmd = Command::Copy {
            set: UidSet::from(Uid::new(42).unwrap()).into(),
            mailbox: Mailbox::new("Archive/2024"),
        };
        assert_eq!(line(&cmd), "x7 UID COPY 42 Archive/2024\r\n");
    }

    #[test]
    fn test_id_and_enable() {
        assert_eq!(line(&Command::Id { parameters: None }), "x7 ID NIL\r\n");
        let cmd = Command::Id {
            parameters: Some(vec![("name".into(), "mailqueue".into())]),
        };
        assert_eq!(line(&cmd), "x7 ID (\"name\" \"mailqueue\")\r\n");
        let cmd = Command::Enable {
            capabilities: vec!["CONDSTORE".into(), "QRESYNC".into()],
        };
        assert_eq!(line(&cmd), "x7 ENABLE CONDSTORE QRESYNC\r\n");
    }

    #[test]
    fn test_list_quotes_empty_reference() {
        let cmd = Command::List {
            reference: String::new(),
            pattern: "*".into(),
        };
        assert_eq!(line(&cmd), "x7 LIST \"\" \"*\"\r\n");
    }
}
