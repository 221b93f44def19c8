//! Error types for the session engine and facade.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Host name is not valid for TLS verification.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Connecting took longer than the configured timeout.
    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    /// The stream ended, or the server closed the session.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Malformed server data.
    #[error("Parse error at position {position}: {message}")]
    Parse {
        /// Byte offset into the response.
        position: usize,
        /// What was expected.
        message: String,
    },

    /// Server behaviour that breaks the exchange (wrong tag, stray continuation).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation is not allowed in the current connection state.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// The server rejected the operation, or its reply could not be used.
    #[error("{kind} failed: {message}")]
    Operation {
        /// Which operation failed.
        kind: OperationKind,
        /// Server text or local reason.
        message: String,
    },

    /// No completion was observed within the watchdog bound.
    #[error("Operation timed out after {0:?}")]
    TaskTimeout(Duration),

    /// Parameters were rejected before anything was written.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The engine task has shut down.
    #[error("Session closed")]
    SessionClosed,
}

impl Error {
    /// Classifies the error into the caller-facing taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::InvalidDnsName(_)
            | Self::Timeout(_)
            | Self::Stream(_)
            | Self::SessionClosed => ErrorKind::Stream,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::State(_) => ErrorKind::State,
            Self::Operation { kind, .. } => ErrorKind::Operation(*kind),
            Self::TaskTimeout(_) => ErrorKind::TaskTimeout,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Returns true if the connection can no longer be used.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Stream | ErrorKind::TaskTimeout)
    }

    pub(crate) fn operation(kind: OperationKind, message: impl Into<String>) -> Self {
        Self::Operation {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }
}

/// Why an operation was refused by state gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    /// No connection is open.
    #[error("not connected")]
    NotConnected,
    /// `connect` while a connection is already open.
    #[error("already connected")]
    AlreadyConnected,
    /// Needs a logged-in session.
    #[error("not logged in")]
    NotAuthenticated,
    /// Login or STARTTLS after authentication.
    #[error("already logged in")]
    AlreadyAuthenticated,
    /// Needs a selected mailbox.
    #[error("no mailbox selected")]
    NoMailboxSelected,
    /// IDLE while an IDLE is already running.
    #[error("already idling")]
    AlreadyIdling,
}

/// Every logical operation the session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Open the transport and read the greeting.
    Connect,
    /// LOGIN.
    Login,
    /// AUTHENTICATE XOAUTH2.
    Authenticate,
    /// LOGOUT.
    Logout,
    /// SELECT.
    Select,
    /// EXAMINE.
    Examine,
    /// NOOP.
    Noop,
    /// CAPABILITY.
    Capability,
    /// CHECK.
    Check,
    /// CLOSE.
    Close,
    /// EXPUNGE.
    Expunge,
    /// COPY / UID COPY.
    Copy,
    /// CREATE.
    Create,
    /// DELETE.
    Delete,
    /// RENAME.
    Rename,
    /// FETCH / UID FETCH.
    Fetch,
    /// LIST.
    List,
    /// LSUB.
    Lsub,
    /// SEARCH / UID SEARCH.
    Search,
    /// STATUS.
    Status,
    /// STORE / UID STORE.
    Store,
    /// SUBSCRIBE.
    Subscribe,
    /// UNSUBSCRIBE.
    Unsubscribe,
    /// APPEND.
    Append,
    /// STARTTLS.
    StartTls,
    /// IDLE.
    Idle,
    /// ENABLE.
    Enable,
    /// ID.
    Id,
}

impl OperationKind {
    /// Lower-case name used in logs and error kinds.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Login => "login",
            Self::Authenticate => "authenticate",
            Self::Logout => "logout",
            Self::Select => "select",
            Self::Examine => "examine",
            Self::Noop => "noop",
            Self::Capability => "capability",
            Self::Check => "check",
            Self::Close => "close",
            Self::Expunge => "expunge",
            Self::Copy => "copy",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Fetch => "fetch",
            Self::List => "list",
            Self::Lsub => "lsub",
            Self::Search => "search",
            Self::Status => "status",
            Self::Store => "store",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Append => "append",
            Self::StartTls => "starttls",
            Self::Idle => "idle",
            Self::Enable => "enable",
            Self::Id => "id",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error taxonomy as reported to callers and event consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `state_error`
    State,
    /// `stream_error`
    Stream,
    /// `parse_error`
    Parse,
    /// `protocol_error`
    Protocol,
    /// `validation_error`
    Validation,
    /// `task_timeout`
    TaskTimeout,
    /// `<operation>_error`; both login flavours report `auth_error` and
    /// EXAMINE reports `select_error`.
    Operation(OperationKind),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::State => f.write_str("state_error"),
            Self::Stream => f.write_str("stream_error"),
            Self::Parse => f.write_str("parse_error"),
            Self::Protocol => f.write_str("protocol_error"),
            Self::Validation => f.write_str("validation_error"),
            Self::TaskTimeout => f.write_str("task_timeout"),
            Self::Operation(OperationKind::Login | OperationKind::Authenticate) => {
                f.write_str("auth_error")
            }
            Self::Operation(OperationKind::Select | OperationKind::Examine) => {
                f.write_str("select_error")
            }
            Self::Operation(kind) => write!(f, "{kind}_error"),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    fn kind_names_follow_taxonomy() {
        assert_eq!(
            Error::State(StateError::NotConnected).kind().to_string(),
            "state_error"
        );
        assert_eq!(Error::stream("eof").kind().to_string(), "stream_error");
        assert_eq!(
            Error::TaskTimeout(Duration::from_secs(30)).kind().to_string(),
            "task_timeout"
        );
        assert_eq!(
            Error::operation(OperationKind::Select, "no such mailbox")
                .kind()
                .to_string(),
            "select_error"
        );
        assert_eq!(
            Error::operation(OperationKind::Authenticate, "bad token")
                .kind()
                .to_string(),
            "auth_error"
        );
    }

    #[test]
    fn state_errors_tell_not_connected_from_wrong_phase() {
        let not_connected = Error::from(StateError::NotConnected).to_string();
        let logged_in = Error::from(StateError::AlreadyAuthenticated).to_string();
        assert!(not_connected.contains("not connected"));
        assert!(logged_in.contains("already logged in"));
    }

    #[test]
    fn io_errors_are_fatal() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(err.is_fatal());
        assert!(!Error::Validation("x".into()).is_fatal());
    }
}
