//! Bracketed response codes (`[UIDNEXT 4]`, `[APPENDUID 38505 3955]`, ...).

use super::{Capability, Flag, SeqNum, Uid, UidValidity};

/// Response code carried inside a status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `ALERT`: the text must be shown to the user.
    Alert,
    /// `CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `PARSE`
    Parse,
    /// `PERMANENTFLAGS (...)`
    PermanentFlags(Vec<Flag>),
    /// `READ-ONLY`
    ReadOnly,
    /// `READ-WRITE`
    ReadWrite,
    /// `TRYCREATE`
    TryCreate,
    /// `UIDNEXT n`
    UidNext(Uid),
    /// `UIDVALIDITY n`
    UidValidity(UidValidity),
    /// `UNSEEN n`
    Unseen(SeqNum),
    /// `APPENDUID validity uid-set` (UIDPLUS)
    AppendUid(AppendUid),
    /// `COPYUID validity source-set dest-set` (UIDPLUS)
    CopyUid(CopyUid),
    /// `HIGHESTMODSEQ n` (CONDSTORE)
    HighestModSeq(u64),
    /// `NOMODSEQ`
    NoModSeq,
    /// Any other code, with its raw argument text.
    Other {
        /// Code atom.
        name: String,
        /// Raw text up to `]`, if any.
        text: Option<String>,
    },
}

/// Where an appended message landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendUid {
    /// UIDVALIDITY of the destination mailbox.
    pub uid_validity: UidValidity,
    /// Assigned UIDs (one for a plain APPEND).
    pub uids: Vec<Uid>,
}

/// Source-to-destination UID mapping of a COPY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyUid {
    /// UIDVALIDITY of the destination mailbox.
    pub uid_validity: UidValidity,
    /// UIDs in the source mailbox.
    pub source: Vec<Uid>,
    /// UIDs in the destination mailbox, position for position.
    pub destination: Vec<Uid>,
}
