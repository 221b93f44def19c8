//! Queued operations and the state gate they pass at promotion.

use tokio::sync::oneshot;

use super::reply::Reply;
use super::state::ConnectionState;
use crate::command::Command;
use crate::error::{OperationKind, StateError};
use crate::Result;

/// One unit of work for the engine.
#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) kind: OperationKind,
    /// `None` only for connect, which writes nothing.
    pub(crate) command: Option<Command>,
    /// APPEND payload, sent after the continuation.
    pub(crate) literal: Option<Vec<u8>>,
}

impl Operation {
    pub(crate) const fn connect() -> Self {
        Self {
            kind: OperationKind::Connect,
            command: None,
            literal: None,
        }
    }

    pub(crate) fn command(command: Command) -> Self {
        Self {
            kind: kind_of(&command),
            command: Some(command),
            literal: None,
        }
    }

    pub(crate) fn append(command: Command, message: Vec<u8>) -> Self {
        Self {
            kind: OperationKind::Append,
            command: Some(command),
            literal: Some(message),
        }
    }
}

/// An operation plus the channel its result goes back on.
#[derive(Debug)]
pub(crate) struct Submission {
    pub(crate) operation: Operation,
    pub(crate) reply: oneshot::Sender<Result<Reply>>,
}

/// Out-of-band requests that skip the queue.
#[derive(Debug)]
pub(crate) enum Control {
    /// End the running IDLE; answers whether `DONE` was (or will be) sent
    /// on the caller's behalf.
    IdleDone(oneshot::Sender<bool>),
    /// Drop the transport without a wire exchange.
    Disconnect(oneshot::Sender<()>),
}

const fn kind_of(command: &Command) -> OperationKind {
    match command {
        Command::Capability => OperationKind::Capability,
        Command::Noop => OperationKind::Noop,
        Command::Logout => OperationKind::Logout,
        Command::StartTls => OperationKind::StartTls,
        Command::Login { .. } => OperationKind::Login,
        Command::Authenticate { .. } => OperationKind::Authenticate,
        Command::Id { .. } => OperationKind::Id,
        Command::Enable { .. } => OperationKind::Enable,
        Command::Select { .. } => OperationKind::Select,
        Command::Examine { .. } => OperationKind::Examine,
        Command::Create { .. } => OperationKind::Create,
        Command::Delete { .. } => OperationKind::Delete,
        Command::Rename { .. } => OperationKind::Rename,
        Command::Subscribe { .. } => OperationKind::Subscribe,
        Command::Unsubscribe { .. } => OperationKind::Unsubscribe,
        Command::List { .. } => OperationKind::List,
        Command::Lsub { .. } => OperationKind::Lsub,
        Command::Status { .. } => OperationKind::Status,
        Command::Append { .. } => OperationKind::Append,
        Command::Check => OperationKind::Check,
        Command::Close => OperationKind::Close,
        Command::Expunge => OperationKind::Expunge,
        Command::Search { .. } => OperationKind::Search,
        Command::Fetch { .. } => OperationKind::Fetch,
        Command::Store { .. } => OperationKind::Store,
        Command::Copy { .. } => OperationKind::Copy,
        Command::Idle => OperationKind::Idle,
    }
}

/// Lowest state an operation may run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requires {
    Disconnected,
    /// Connected and not yet logged in.
    NotAuthenticated,
    AnyConnected,
    Authenticated,
    Selected,
}

const fn requirement(kind: OperationKind) -> Requires {
    match kind {
        OperationKind::Connect => Requires::Disconnected,
        OperationKind::Login | OperationKind::Authenticate | OperationKind::StartTls => {
            Requires::NotAuthenticated
        }
        OperationKind::Noop | OperationKind::Capability | OperationKind::Logout => {
            Requires::AnyConnected
        }
        OperationKind::Select
        | OperationKind::Examine
        | OperationKind::Status
        | OperationKind::Subscribe
        | OperationKind::Unsubscribe
        | OperationKind::Enable
        | OperationKind::Id
        | OperationKind::Create
        | OperationKind::Delete
        | OperationKind::Rename
        | OperationKind::List
        | OperationKind::Lsub
        | OperationKind::Append => Requires::Authenticated,
        OperationKind::Fetch
        | OperationKind::Search
        | OperationKind::Store
        | OperationKind::Copy
        | OperationKind::Check
        | OperationKind::Close
        | OperationKind::Expunge
        | OperationKind::Idle => Requires::Selected,
    }
}

/// Decides whether `kind` may run in `state`.
pub(crate) const fn gate(
    kind: OperationKind,
    state: ConnectionState,
) -> std::result::Result<(), StateError> {
    use ConnectionState::{Authenticated, Connected, Disconnected, MailboxSelected};

    match (requirement(kind), state) {
        (Requires::Disconnected, Disconnected)
        | (Requires::NotAuthenticated, Connected)
        | (Requires::AnyConnected, Connected | Authenticated | MailboxSelected)
        | (Requires::Authenticated, Authenticated | MailboxSelected)
        | (Requires::Selected, MailboxSelected) => Ok(()),
        (Requires::Disconnected, _) => Err(StateError::AlreadyConnected),
        (_, Disconnected) => Err(StateError::NotConnected),
        (Requires::NotAuthenticated, _) => Err(StateError::AlreadyAuthenticated),
        (Requires::Authenticated | Requires::Selected, Connected) => {
            Err(StateError::NotAuthenticated)
        }
        (Requires::Selected, Authenticated) => Err(StateError::NoMailboxSelected),
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
    use crate::types::Mailbox;

    #[test]
    fn test_connect_only_when_disconnected() {
        assert!(gate(OperationKind::Connect, ConnectionState::Disconnected).is_ok());
        assert_eq!(
            gate(OperationKind::Connect, ConnectionState::Authenticated),
            Err(StateError::AlreadyConnected)
        );
    }

    #[test]
    fn test_login_gating() {
        assert_eq!(
            gate(OperationKind::Login, ConnectionState::Disconnected),
            Err(StateError::NotConnected)
        );
        assert!(gate(OperationKind::Login, ConnectionState::Connected).is_ok());
        assert_eq!(
            gate(OperationKind::Login, ConnectionState::Authenticated),
            Err(StateError::AlreadyAuthenticated)
        );
        assert_eq!(
            gate(OperationKind::StartTls, ConnectionState::MailboxSelected),
            Err(StateError::AlreadyAuthenticated)
        );
    }

    #[test]
    fn test_select_before_login() {
        assert_eq!(
            gate(OperationKind::Select, ConnectionState::Connected),
            Err(StateError::NotAuthenticated)
        );
        assert!(gate(OperationKind::Select, ConnectionState::MailboxSelected).is_ok());
    }

    #[test]
    fn test_selected_operations() {
        for kind in [
            OperationKind::Fetch,
            OperationKind::Search,
            OperationKind::Store,
            OperationKind::Copy,
            OperationKind::Check,
            OperationKind::Close,
            OperationKind::Expunge,
            OperationKind::Idle,
        ] {
            assert_eq!(
                gate(kind, ConnectionState::Authenticated),
                Err(StateError::NoMailboxSelected)
            );
            assert!(gate(kind, ConnectionState::MailboxSelected).is_ok());
        }
    }

    #[test]
    fn test_any_connected_operations() {
        for kind in [
            OperationKind::Noop,
            OperationKind::Capability,
            OperationKind::Logout,
        ] {
            assert_eq!(
                gate(kind, ConnectionState::Disconnected),
                Err(StateError::NotConnected)
            );
            assert!(gate(kind, ConnectionState::Connected).is_ok());
            assert!(gate(kind, ConnectionState::MailboxSelected).is_ok());
        }
    }

    #[test]
    fn test_kind_follows_command() {
        let op = Operation::command(Command::Examine {
            mailbox: Mailbox::new("INBOX"),
        });
        assert_eq!(op.kind, OperationKind::Examine);
        assert_eq!(Operation::connect().kind, OperationKind::Connect);
    }
}
