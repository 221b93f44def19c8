//! What a completed operation hands back before typed extraction.

use crate::parser::UntaggedResponse;
use crate::types::{Capability, ResponseCode};

/// Everything the server said for one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// Untagged data received while the operation was in flight, in order.
    pub untagged: Vec<UntaggedResponse>,
    /// Code on the completion (or greeting) line.
    pub code: Option<ResponseCode>,
    /// Text on the completion (or greeting) line.
    pub text: String,
}

impl Reply {
    /// Capabilities carried by the reply, from an untagged CAPABILITY
    /// response or a CAPABILITY response code, whichever came last.
    #[must_use]
    pub fn capabilities(&self) -> Option<Vec<Capability>> {
        if let Some(ResponseCode::Capability(list)) = &self.code {
            return Some(list.clone());
        }
        self.untagged.iter().rev().find_map(|response| match response {
            UntaggedResponse::Capability(list) => Some(list.clone()),
            UntaggedResponse::Status {
                code: Some(ResponseCode::Capability(list)),
                ..
            } => Some(list.clone()),
            _ => None,
        })
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
    use crate::types::Status;

    #[test]
    fn test_capabilities_from_code_wins() {
        let reply = Reply {
            untagged: vec![UntaggedResponse::Capability(vec![Capability::Idle])],
            code: Some(ResponseCode::Capability(vec![Capability::Imap4Rev1])),
            text: "done".into(),
        };
        assert_eq!(reply.capabilities().unwrap(), vec![Capability::Imap4Rev1]);
    }

    #[test]
    fn test_capabilities_from_greeting_code() {
        let reply = Reply {
            untagged: vec![UntaggedResponse::Status {
                status: Status::Ok,
                code: Some(ResponseCode::Capability(vec![Capability::StartTls])),
                text: "ready".into(),
            }],
            ..Reply::default()
        };
        assert_eq!(reply.capabilities().unwrap(), vec![Capability::StartTls]);
        assert!(Reply::default().capabilities().is_none());
    }
}
