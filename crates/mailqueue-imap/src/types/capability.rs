//! Completion status and server capabilities.

use std::fmt;

/// Status word of a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed.
    Ok,
    /// Command failed for an operational reason.
    No,
    /// Command was not understood.
    Bad,
    /// Greeting for a session that is already authenticated.
    PreAuth,
    /// Server is closing the connection.
    Bye,
}

impl Status {
    /// Parses a status keyword, ignoring case.
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        let status = match word.to_ascii_uppercase().as_str() {
            "OK" => Self::Ok,
            "NO" => Self::No,
            "BAD" => Self::Bad,
            "PREAUTH" => Self::PreAuth,
            "BYE" => Self::Bye,
            _ => return None,
        };
        Some(status)
    }

    /// Returns true for `OK`.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        })
    }
}

/// A single advertised server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501).
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051).
    Imap4Rev2,
    /// IDLE (RFC 2177).
    Idle,
    /// UIDPLUS (RFC 4315), required for APPENDUID and COPYUID.
    UidPlus,
    /// MOVE (RFC 6851).
    Move,
    /// STARTTLS.
    StartTls,
    /// LOGIN is disabled on this connection.
    LoginDisabled,
    /// `AUTH=<mechanism>`.
    Auth(String),
    /// ENABLE (RFC 5161).
    Enable,
    /// CONDSTORE (RFC 7162).
    CondStore,
    /// QRESYNC (RFC 7162).
    QResync,
    /// ID (RFC 2971).
    Id,
    /// Gmail extensions (`X-GM-EXT-1`).
    GmailExt,
    /// Anything else, kept verbatim.
    Other(String),
}

impl Capability {
    /// Parses one capability atom.
    #[must_use]
    pub fn parse(atom: &str) -> Self {
        let upper = atom.to_ascii_uppercase();
        if let Some(mechanism) = upper.strip_prefix("AUTH=") {
            return Self::Auth(mechanism.to_string());
        }
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "ENABLE" => Self::Enable,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            "ID" => Self::Id,
            "X-GM-EXT-1" => Self::GmailExt,
            _ => Self::Other(atom.to_string()),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::Imap4Rev2 => f.write_str("IMAP4rev2"),
            Self::Idle => f.write_str("IDLE"),
            Self::UidPlus => f.write_str("UIDPLUS"),
            Self::Move => f.write_str("MOVE"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::LoginDisabled => f.write_str("LOGINDISABLED"),
            Self::Auth(mechanism) => write!(f, "AUTH={mechanism}"),
            Self::Enable => f.write_str("ENABLE"),
            Self::CondStore => f.write_str("CONDSTORE"),
            Self::QResync => f.write_str("QRESYNC"),
            Self::Id => f.write_str("ID"),
            Self::GmailExt => f.write_str("X-GM-EXT-1"),
            Self::Other(atom) => f.write_str(atom),
        }
    }
}

/// The capability set last advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Wraps a parsed capability list.
    #[must_use]
    pub fn new(list: Vec<Capability>) -> Self {
        Self(list)
    }

    /// Returns true if the capability was advertised.
    #[must_use]
    pub fn has(&self, capability: &Capability) -> bool {
        self.0.contains(capability)
    }

    /// Returns true if `AUTH=<mechanism>` was advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case(mechanism)))
    }

    /// Iterates over the advertised capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    /// Returns true when nothing has been advertised yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
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
    fn status_parse_is_case_insensitive() {
        assert_eq!(Status::parse("ok"), Some(Status::Ok));
        assert_eq!(Status::parse("PreAuth"), Some(Status::PreAuth));
        assert_eq!(Status::parse("maybe"), None);
        assert!(!Status::PreAuth.is_ok());
    }

    #[test]
    fn capability_parse_known_and_unknown() {
        assert_eq!(Capability::parse("imap4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("IDLE"), Capability::Idle);
        assert_eq!(
            Capability::parse("AUTH=xoauth2"),
            Capability::Auth("XOAUTH2".to_string())
        );
        assert_eq!(
            Capability::parse("XLIST"),
            Capability::Other("XLIST".to_string())
        );
    }

    #[test]
    fn capability_display_round_trips_atoms() {
        for atom in ["IMAP4rev1", "IDLE", "AUTH=PLAIN", "X-GM-EXT-1", "SORT"] {
            assert_eq!(Capability::parse(atom).to_string(), atom);
        }
    }

    #[test]
    fn capabilities_lookup() {
        let caps = Capabilities::new(vec![
            Capability::Idle,
            Capability::Auth("XOAUTH2".to_string()),
        ]);
        assert!(caps.has(&Capability::Idle));
        assert!(!caps.has(&Capability::CondStore));
        assert!(caps.has_auth("xoauth2"));
        assert!(!caps.has_auth("PLAIN"));
    }
}
