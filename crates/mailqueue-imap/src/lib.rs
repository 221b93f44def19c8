//! # mailqueue-imap
//!
//! An asynchronous IMAP client built around a queued, single-flight session
//! engine.
//!
//! ## Features
//!
//! - **One connection, many callers**: a [`Session`] is a cloneable handle;
//!   calls from anywhere are queued and executed strictly one at a time, in
//!   call order
//! - **State gating**: each operation is checked against the connection
//!   state when it reaches the head of the queue, so `connect`, `login` and
//!   `select` can be queued back to back
//! - **Multi-step exchanges**: APPEND literals, IDLE with `DONE`, and
//!   in-place STARTTLS upgrades
//! - **Unsolicited data as events**: EXISTS, EXPUNGE, FETCH and friends that
//!   no operation asked for arrive on an [`Events`] channel
//! - **Watchdog**: a stalled operation fails with `task_timeout` and the
//!   connection is dropped
//! - **TLS via rustls**: no OpenSSL dependency
//! - **Sans-I/O parser**: `parser::wire::parse(buffer, mode)` has no side
//!   effects and is driven by the engine
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailqueue_imap::{Config, Credentials, FetchItems, SequenceSet, Session};
//!
//! #[tokio::main]
//! async fn main() -> mailqueue_imap::Result<()> {
//!     let config = Config::builder("imap.example.com")
//!         .credentials(Credentials::password("user@example.com", "password"))
//!         .build();
//!     let (session, _events) = Session::new(config);
//!
//!     session.connect().await?;
//!     session.login("user@example.com", "password").await?;
//!
//!     let status = session.select("INBOX").await?;
//!     println!("Messages: {}", status.exists);
//!
//!     if let Some(range) = SequenceSet::range(1, 10) {
//!         for (seq, items) in session.fetch(range, FetchItems::Fast).await? {
//!             println!("{seq}: {items:?}");
//!         }
//!     }
//!
//!     session.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! Disconnected ── connect ──→ Connected ── login ──→ Authenticated
//!                     (PREAUTH greeting) ──────────→ Authenticated
//! Authenticated ── select/examine ──→ MailboxSelected ── close ──→ Authenticated
//! any connected state ── logout / stream error / watchdog ──→ Disconnected
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command model and wire serialization
//! - [`connection`]: configuration, transports and the receive buffer
//! - [`engine`]: connection state and completed-operation replies
//! - [`parser`]: sans-I/O response parser
//! - [`types`]: core IMAP types (flags, mailboxes, sequences, etc.)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
pub mod engine;
mod error;
mod event;
pub mod parser;
mod session;
pub mod types;

pub use command::{
    Command, FetchAttribute, FetchItems, MessageSet, SearchCriteria, StatusAttribute, StoreAction,
    TagCounter,
};
pub use connection::{
    Config, ConfigBuilder, Connector, Credentials, ImapStream, Security, TcpConnector, Transport,
};
pub use engine::{ConnectionState, IdlePhase, Reply};
pub use error::{Error, ErrorKind, OperationKind, Result, StateError};
pub use event::{Events, SessionEvent};
pub use parser::{FetchItem, Response, StatusItem, UntaggedResponse};
pub use session::{Completion, FetchRows, IdParameters, Session};
pub use types::{
    AppendUid, Capabilities, Capability, CopyUid, Flag, Flags, ListResponse, Mailbox,
    MailboxAttribute, MailboxStatus, ResponseCode, SeqNum, SequenceSet, Status, Tag, Uid, UidSet,
    UidValidity,
};
