//! Unsolicited server data and teardown notices.
//!
//! Servers may send mailbox updates at any time (RFC 2683): new message
//! counts, expunges, flag changes by other clients. Whatever the engine did
//! not collect as part of an operation's own reply is published here,
//! together with notices about the connection going away.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::OperationKind;
use crate::parser::FetchItem;
use crate::types::{Flags, SeqNum};

/// Something the caller did not ask for.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The mailbox now holds this many messages.
    Exists(u32),
    /// Count of messages with `\Recent`.
    Recent(u32),
    /// A message was removed; later sequence numbers shift down by one.
    Expunge(SeqNum),
    /// Message data changed, typically flags set by another client.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Changed data items.
        items: Vec<FetchItem>,
    },
    /// The mailbox's flag list changed.
    Flags(Flags),
    /// `[ALERT]` text, which must be shown to the user.
    Alert(String),
    /// The server is closing the connection.
    Bye(String),
    /// The transport is gone.
    Disconnected {
        /// Why the connection ended.
        reason: String,
    },
    /// The watchdog fired and the connection was dropped.
    TaskTimeout {
        /// The operation that stalled.
        kind: OperationKind,
        /// The bound that was exceeded.
        after: Duration,
    },
}

/// Receiving end of a session's event channel.
#[derive(Debug)]
pub struct Events {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Events {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<SessionEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Waits for the next event; `None` once the session is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    /// Returns an event if one is already waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

/// Logs an event the way it is published.
pub(crate) fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Exists(count) => tracing::debug!(count, "EXISTS"),
        SessionEvent::Recent(count) => tracing::debug!(count, "RECENT"),
        SessionEvent::Expunge(seq) => tracing::debug!(seq = seq.get(), "EXPUNGE"),
        SessionEvent::Fetch { seq, items } => {
            tracing::debug!(seq = seq.get(), items = ?items, "FETCH");
        }
        SessionEvent::Flags(flags) => tracing::debug!(?flags, "FLAGS"),
        SessionEvent::Alert(text) => tracing::warn!(text, "ALERT"),
        SessionEvent::Bye(text) => tracing::info!(text, "BYE"),
        SessionEvent::Disconnected { reason } => tracing::debug!(reason, "disconnected"),
        SessionEvent::TaskTimeout { kind, after } => {
            tracing::warn!(%kind, ?after, "operation timed out");
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

    #[tokio::test]
    async fn test_events_in_order() {
        let (tx, mut events) = Events::channel();
        tx.send(SessionEvent::Exists(50)).unwrap();
        tx.send(SessionEvent::Recent(5)).unwrap();
        tx.send(SessionEvent::Alert("Test alert".to_string())).unwrap();

        assert_eq!(events.recv().await, Some(SessionEvent::Exists(50)));
        assert_eq!(events.recv().await, Some(SessionEvent::Recent(5)));
        assert_eq!(
            events.try_recv(),
            Some(SessionEvent::Alert("Test alert".to_string()))
        );
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (tx, mut events) = Events::channel();
        drop(tx);
        assert!(events.recv().await.is_none());
    }
}
