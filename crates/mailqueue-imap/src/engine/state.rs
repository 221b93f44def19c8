//! Connection state and the sub-phases of multi-step exchanges.

use std::fmt;

/// Where the session stands with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Greeted, not logged in.
    Connected,
    /// Logged in.
    Authenticated,
    /// A mailbox is open.
    MailboxSelected,
}

impl ConnectionState {
    /// True for every state with an open transport.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::MailboxSelected => "selected",
        })
    }
}

/// Progress of an IDLE exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    /// `IDLE` written, waiting for `+`.
    AwaitingContinuation,
    /// Server accepted; waiting for something to happen.
    AwaitingData,
    /// Data arrived and `DONE` was written.
    DataReceived,
    /// The caller ended the idle and `DONE` was written.
    Cancelled,
}

impl IdlePhase {
    /// True once `DONE` has been written.
    #[must_use]
    pub const fn done_sent(self) -> bool {
        matches!(self, Self::DataReceived | Self::Cancelled)
    }
}

/// Progress of an APPEND exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendPhase {
    /// Header line written, waiting for `+` before sending the literal.
    AwaitingContinuation,
    /// Literal written, waiting for the tagged response.
    AwaitingFinal,
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
    fn test_states_are_ordered() {
        assert!(ConnectionState::Disconnected < ConnectionState::Connected);
        assert!(ConnectionState::Authenticated < ConnectionState::MailboxSelected);
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::MailboxSelected.is_connected());
    }

    #[test]
    fn test_done_sent() {
        assert!(!IdlePhase::AwaitingContinuation.done_sent());
        assert!(!IdlePhase::AwaitingData.done_sent());
        assert!(IdlePhase::DataReceived.done_sent());
        assert!(IdlePhase::Cancelled.done_sent());
    }
}
