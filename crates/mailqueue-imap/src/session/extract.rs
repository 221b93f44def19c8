//! Typed results pulled out of a completed [`Reply`].
//!
//! Each function here is the extractor behind one facade call.

use crate::engine::Reply;
use crate::error::OperationKind;
use crate::parser::{FetchItem, StatusItem, UntaggedResponse};
use crate::types::{
    AppendUid, Capabilities, Capability, CopyUid, ListResponse, MailboxStatus, ResponseCode,
    SeqNum, Status, Uid,
};
use crate::{Error, Result};

/// Message data rows: sequence number plus returned items.
pub type FetchRows = Vec<(SeqNum, Vec<FetchItem>)>;

/// ID parameters; `None` when the server sent `ID NIL`.
pub type IdParameters = Option<Vec<(String, Option<String>)>>;

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn unit(_reply: Reply) -> Result<()> {
    Ok(())
}

/// Capabilities on the greeting; empty if the server sent none.
pub(crate) fn greeting(reply: Reply) -> Result<Capabilities> {
    Ok(reply.capabilities().map(Capabilities::new).unwrap_or_default())
}

/// Post-login capabilities, when the server volunteered them.
pub(crate) fn login(reply: Reply) -> Result<Option<Capabilities>> {
    Ok(reply.capabilities().map(Capabilities::new))
}

pub(crate) fn capability(reply: Reply) -> Result<Capabilities> {
    reply.capabilities().map(Capabilities::new).ok_or_else(|| {
        Error::operation(OperationKind::Capability, "no CAPABILITY data in reply")
    })
}

pub(crate) fn select(reply: Reply) -> Result<MailboxStatus> {
    Ok(mailbox_status(reply))
}

pub(crate) fn examine(reply: Reply) -> Result<MailboxStatus> {
    let mut status = mailbox_status(reply);
    status.read_only = true;
    Ok(status)
}

fn mailbox_status(reply: Reply) -> MailboxStatus {
    let mut status = MailboxStatus::default();
    let codes = reply
        .untagged
        .into_iter()
        .filter_map(|untagged| match untagged {
            UntaggedResponse::Exists(n) => {
                status.exists = n;
                None
            }
            UntaggedResponse::Recent(n) => {
                status.recent = n;
                None
            }
            UntaggedResponse::Flags(flags) => {
                status.flags = flags;
                None
            }
            UntaggedResponse::Status {
                status: Status::Ok,
                code,
                ..
            } => code,
            _ => None,
        })
        .collect::<Vec<_>>();

    for code in codes.into_iter().chain(reply.code) {
        match code {
            ResponseCode::UidValidity(v) => status.uid_validity = Some(v),
            ResponseCode::UidNext(v) => status.uid_next = Some(v),
            ResponseCode::Unseen(v) => status.unseen = Some(v),
            ResponseCode::PermanentFlags(flags) => {
                status.permanent_flags = flags.into_iter().collect();
            }
            ResponseCode::HighestModSeq(n) => status.highest_mod_seq = Some(n),
            ResponseCode::ReadOnly => status.read_only = true,
            ResponseCode::ReadWrite => status.read_only = false,
            _ => {}
        }
    }
    status
}

pub(crate) fn fetch(reply: Reply) -> Result<FetchRows> {
    Ok(reply
        .untagged
        .into_iter()
        .filter_map(|untagged| match untagged {
            UntaggedResponse::Fetch { seq, items } => Some((seq, items)),
            _ => None,
        })
        .collect())
}

fn search_hits(reply: Reply) -> impl Iterator<Item = u32> {
    reply
        .untagged
        .into_iter()
        .filter_map(|untagged| match untagged {
            UntaggedResponse::Search(ids) => Some(ids),
            _ => None,
        })
        .flatten()
}

pub(crate) fn search(reply: Reply) -> Result<Vec<SeqNum>> {
    Ok(search_hits(reply).filter_map(SeqNum::new).collect())
}

pub(crate) fn uid_search(reply: Reply) -> Result<Vec<Uid>> {
    Ok(search_hits(reply).filter_map(Uid::new).collect())
}

pub(crate) fn status(reply: Reply) -> Result<Vec<StatusItem>> {
    reply
        .untagged
        .into_iter()
        .find_map(|untagged| match untagged {
            UntaggedResponse::MailboxStatus { items, .. } => Some(items),
            _ => None,
        })
        .ok_or_else(|| Error::operation(OperationKind::Status, "no STATUS data in reply"))
}

pub(crate) fn list(reply: Reply) -> Result<Vec<ListResponse>> {
    Ok(reply
        .untagged
        .into_iter()
        .filter_map(|untagged| match untagged {
            UntaggedResponse::List(entry) => Some(entry),
            _ => None,
        })
        .collect())
}

pub(crate) fn lsub(reply: Reply) -> Result<Vec<ListResponse>> {
    Ok(reply
        .untagged
        .into_iter()
        .filter_map(|untagged| match untagged {
            UntaggedResponse::Lsub(entry) => Some(entry),
            _ => None,
        })
        .collect())
}

pub(crate) fn expunge(reply: Reply) -> Result<Vec<SeqNum>> {
    Ok(reply
        .untagged
        .into_iter()
        .filter_map(|untagged| match untagged {
            UntaggedResponse::Expunge(seq) => Some(seq),
            _ => None,
        })
        .collect())
}

pub(crate) fn id(reply: Reply) -> Result<IdParameters> {
    reply
        .untagged
        .into_iter()
        .find_map(|untagged| match untagged {
            UntaggedResponse::Id(parameters) => Some(parameters),
            _ => None,
        })
        .ok_or_else(|| Error::operation(OperationKind::Id, "no ID data in reply"))
}

pub(crate) fn enable(reply: Reply) -> Result<Vec<Capability>> {
    Ok(reply
        .untagged
        .into_iter()
        .filter_map(|untagged| match untagged {
            UntaggedResponse::Enabled(list) => Some(list),
            _ => None,
        })
        .flatten()
        .collect())
}

pub(crate) fn append(reply: Reply) -> Result<Option<AppendUid>> {
    Ok(match reply.code {
        Some(ResponseCode::AppendUid(uid)) => Some(uid),
        _ => None,
    })
}

pub(crate) fn copy(reply: Reply) -> Result<Option<CopyUid>> {
    Ok(match reply.code {
        Some(ResponseCode::CopyUid(uid)) => Some(uid),
        _ => None,
    })
}

/// Everything the server sent while idling.
pub(crate) fn idle(reply: Reply) -> Result<Vec<UntaggedResponse>> {
    Ok(reply.untagged)
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
    use crate::types::{Flag, Flags, UidValidity};

    fn ok_code(code: ResponseCode) -> UntaggedResponse {
        UntaggedResponse::Status {
            status: Status::Ok,
            code: Some(code),
            text: String::new(),
        }
    }

    #[test]
    fn test_select_status() {
        let reply = Reply {
            untagged: vec![
                UntaggedResponse::Flags([Flag::Seen, Flag::Answered].into_iter().collect()),
                UntaggedResponse::Exists(172),
                UntaggedResponse::Recent(1),
                ok_code(ResponseCode::Unseen(SeqNum::new(12).unwrap())),
                ok_code(ResponseCode::UidValidity(UidValidity::new(3857529045).unwrap())),
                ok_code(ResponseCode::UidNext(Uid::new(4392).unwrap())),
                ok_code(ResponseCode::PermanentFlags(vec![Flag::Deleted, Flag::Seen])),
                ok_code(ResponseCode::HighestModSeq(715194045007)),
            ],
            code: Some(ResponseCode::ReadWrite),
            text: "SELECT completed".into(),
        };
        let status = select(reply).unwrap();
        assert_eq!(status.exists, 172);
        assert_eq!(status.recent, 1);
        assert_eq!(status.unseen, SeqNum::new(12));
        assert_eq!(status.uid_validity, UidValidity::new(3857529045));
        assert_eq!(status.uid_next, Uid::new(4392));
        assert_eq!(status.flags.len(), 2);
        assert!(status.permanent_flags.contains(&Flag::Deleted));
        assert_eq!(status.highest_mod_seq, Some(715194045007));
        assert!(!status.read_only);
    }

    #[test]
    fn test_examine_is_read_only() {
        let status = examine(Reply::default()).unwrap();
        assert!(status.read_only);
        assert_eq!(status.flags, Flags::default());
    }

    #[test]
    fn test_search_drops_zero() {
        let reply = Reply {
            untagged: vec![
                UntaggedResponse::Search(vec![2, 84, 882]),
                UntaggedResponse::Search(vec![0]),
            ],
            ..Reply::default()
        };
        let hits = search(reply.clone()).unwrap();
        assert_eq!(hits.iter().map(|s| s.get()).collect::<Vec<_>>(), [2, 84, 882]);
        assert_eq!(uid_search(reply).unwrap().len(), 3);
    }

    #[test]
    fn test_status_requires_data() {
        let err = status(Reply::default()).unwrap_err();
        assert_eq!(err.kind().to_string(), "status_error");
    }

    #[test]
    fn test_capability_requires_data() {
        assert_eq!(
            capability(Reply::default()).unwrap_err().kind().to_string(),
            "capability_error"
        );
        let reply = Reply {
            untagged: vec![UntaggedResponse::Capability(vec![
                Capability::Imap4Rev1,
                Capability::Idle,
            ])],
            ..Reply::default()
        };
        assert!(capability(reply).unwrap().has(&Capability::Idle));
    }

    #[test]
    fn test_append_uid() {
        let uid = AppendUid {
            uid_validity: UidValidity::new(38505).unwrap(),
            uids: vec![Uid::new(3955).unwrap()],
        };
        let reply = Reply {
            code: Some(ResponseCode::AppendUid(uid.clone())),
            ..Reply::default()
        };
        assert_eq!(append(reply).unwrap(), Some(uid));
        assert_eq!(append(Reply::default()).unwrap(), None);
    }

    #[test]
    fn test_id_nil() {
        let reply = Reply {
            untagged: vec![UntaggedResponse::Id(None)],
            ..Reply::default()
        };
        assert_eq!(id(reply).unwrap(), None);
        assert_eq!(id(Reply::default()).unwrap_err().kind().to_string(), "id_error");
    }

    #[test]
    fn test_enabled_collects_all_lines() {
        let reply = Reply {
            untagged: vec![
                UntaggedResponse::Enabled(vec![Capability::CondStore]),
                UntaggedResponse::Enabled(vec![Capability::QResync]),
            ],
            ..Reply::default()
        };
        assert_eq!(
            enable(reply).unwrap(),
            vec![Capability::CondStore, Capability::QResync]
        );
    }
}
