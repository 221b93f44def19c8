//! The public session facade.
//!
//! A [`Session`] is a cheap, cloneable handle to one engine task. Every call
//! queues an operation and immediately returns a [`Completion`]; operations
//! run one at a time in call order, whichever clone they were made on.
//!
//! ## Example
//!
//! ```no_run
//! use mailqueue_imap::{Config, Session};
//!
//! # async fn run() -> mailqueue_imap::Result<()> {
//! let (session, mut events) = Session::new(Config::new("imap.example.com"));
//!
//! // Queued back to back; SELECT is gated after LOGIN completes.
//! let connect = session.connect();
//! let login = session.login("user@example.com", "secret");
//! let select = session.select("INBOX");
//!
//! connect.await?;
//! login.await?;
//! let status = select.await?;
//! println!("{} messages", status.exists);
//!
//! while let Some(event) = events.try_recv() {
//!     println!("{event:?}");
//! }
//! session.logout().await?;
//! # Ok(())
//! # }
//! ```

mod completion;
mod extract;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use tokio::sync::oneshot;
use tracing::{info, warn};

pub use self::completion::Completion;
pub use self::extract::{FetchRows, IdParameters};
use crate::auth;
use crate::command::{
    Command, FetchItems, MessageSet, SearchCriteria, StatusAttribute, StoreAction,
};
use crate::connection::{Config, Connector, Credentials, TcpConnector};
use crate::engine::{self, ConnectionState, Handle, Operation, Reply, Submission};
use crate::error::{ErrorKind, OperationKind};
use crate::event::Events;
use crate::parser::{StatusItem, UntaggedResponse};
use crate::types::{
    AppendUid, Capabilities, Capability, CopyUid, Flag, ListResponse, Mailbox, MailboxStatus,
    SeqNum, Uid,
};
use crate::{Error, Result};

/// Handle to one IMAP session.
#[derive(Debug, Clone)]
pub struct Session {
    handle: Handle,
    config: Arc<Config>,
}

impl Session {
    /// Starts a session engine that connects over TCP.
    ///
    /// Nothing touches the network until [`connect`](Self::connect). Must be
    /// called from inside a Tokio runtime.
    #[must_use]
    pub fn new(config: Config) -> (Self, Events) {
        Self::with_connector(config, TcpConnector)
    }

    /// Starts a session engine that opens transports with `connector`.
    #[must_use]
    pub fn with_connector<C: Connector>(config: Config, connector: C) -> (Self, Events) {
        let (events_tx, events) = Events::channel();
        let handle = engine::spawn(config.clone(), connector, events_tx);
        (
            Self {
                handle,
                config: Arc::new(config),
            },
            events,
        )
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.handle.state.borrow()
    }

    /// Last capability set the server advertised on this connection.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.handle.capabilities.borrow().clone()
    }

    /// The configuration this session was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn submit<T>(&self, operation: Operation, extract: fn(Reply) -> Result<T>) -> Completion<T> {
        if let Some(command) = &operation.command
            && let Err(err) = command.validate()
        {
            return Completion::failed(err);
        }
        let (reply, rx) = oneshot::channel();
        match self.handle.requests.send(Submission { operation, reply }) {
            Ok(()) => Completion::pending(rx, extract),
            Err(_) => Completion::failed(Error::SessionClosed),
        }
    }

    fn command<T>(&self, command: Command, extract: fn(Reply) -> Result<T>) -> Completion<T> {
        self.submit(Operation::command(command), extract)
    }

    // === Connection ===

    /// Opens the transport and waits for the greeting.
    ///
    /// Resolves to the capabilities on the greeting, if any. With
    /// [`Security::StartTls`](crate::Security::StartTls) the upgrade happens
    /// before this resolves and the cleartext capabilities are dropped.
    pub fn connect(&self) -> Completion<Capabilities> {
        self.submit(Operation::connect(), extract::greeting)
    }

    /// Upgrades the connection to TLS.
    pub fn starttls(&self) -> Completion<()> {
        self.command(Command::StartTls, extract::unit)
    }

    /// Logs out. The transport is closed once the server confirms.
    pub fn logout(&self) -> Completion<()> {
        self.command(Command::Logout, extract::unit)
    }

    /// Drops the transport at once, without LOGOUT.
    ///
    /// Skips the queue. The in-flight operation fails with a stream error and
    /// queued ones meet a disconnected session.
    pub async fn disconnect(&self) {
        let (ack, done) = oneshot::channel();
        if self
            .handle
            .control
            .send(engine::Control::Disconnect(ack))
            .is_ok()
        {
            let _ = done.await;
        }
    }

    /// Disconnects, connects again and logs in with the configured
    /// credentials.
    ///
    /// Connection failures are retried up to `max_reconnect_attempts` times
    /// with a growing pause; an authentication failure ends the attempt at
    /// once.
    ///
    /// # Errors
    ///
    /// Returns the last connection error, or the authentication error.
    pub async fn reconnect(&self) -> Result<()> {
        let attempts = self.config.max_reconnect_attempts.max(1);
        let mut last_error = Error::SessionClosed;

        for attempt in 1..=attempts {
            warn!(attempt, attempts, host = %self.config.host, "reconnecting");
            self.disconnect().await;

            match self.reestablish().await {
                Ok(()) => {
                    info!(attempt, "reconnected");
                    return Ok(());
                }
                Err(err) if is_auth_failure(&err) => return Err(err),
                Err(err) => {
                    warn!(attempt, %err, "reconnect attempt failed");
                    last_error = err;
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_secs(u64::from(attempt) * 2)).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn reestablish(&self) -> Result<()> {
        self.connect().await?;
        if self.state() == ConnectionState::Connected
            && let Some(credentials) = &self.config.credentials
        {
            self.authenticate(credentials).await?;
        }
        Ok(())
    }

    // === Authentication ===

    /// `LOGIN` with a user name and password.
    ///
    /// Resolves to the post-login capabilities when the server sends them.
    pub fn login(&self, username: &str, password: &str) -> Completion<Option<Capabilities>> {
        if username.is_empty() {
            return Completion::failed(Error::Validation("missing username".into()));
        }
        if password.is_empty() {
            return Completion::failed(Error::Validation("missing password".into()));
        }
        self.command(
            Command::Login {
                username: username.to_string(),
                password: password.to_string(),
            },
            extract::login,
        )
    }

    /// `AUTHENTICATE XOAUTH2` with a bearer token.
    pub fn authenticate_xoauth2(
        &self,
        user: &str,
        token: &str,
    ) -> Completion<Option<Capabilities>> {
        match auth::xoauth2_response(user, token) {
            Ok(response) => self.command(
                Command::Authenticate {
                    mechanism: "XOAUTH2".to_string(),
                    initial_response: Some(response),
                },
                extract::login,
            ),
            Err(err) => Completion::failed(err),
        }
    }

    /// Logs in with whichever mechanism `credentials` calls for.
    pub fn authenticate(&self, credentials: &Credentials) -> Completion<Option<Capabilities>> {
        match credentials {
            Credentials::Password { username, password } => self.login(username, password),
            Credentials::OAuth2 { user, token } => self.authenticate_xoauth2(user, token),
        }
    }

    // === Any state ===

    /// `NOOP`. Pending mailbox updates arrive as events.
    pub fn noop(&self) -> Completion<()> {
        self.command(Command::Noop, extract::unit)
    }

    /// `CAPABILITY`
    pub fn capability(&self) -> Completion<Capabilities> {
        self.command(Command::Capability, extract::capability)
    }

    // === Authenticated ===

    /// Opens a mailbox read-write.
    pub fn select(&self, mailbox: impl Into<Mailbox>) -> Completion<MailboxStatus> {
        self.command(
            Command::Select {
                mailbox: mailbox.into(),
                condstore: false,
            },
            extract::select,
        )
    }

    /// Opens a mailbox with `(CONDSTORE)`, so the status carries
    /// `HIGHESTMODSEQ`.
    pub fn select_condstore(&self, mailbox: impl Into<Mailbox>) -> Completion<MailboxStatus> {
        self.command(
            Command::Select {
                mailbox: mailbox.into(),
                condstore: true,
            },
            extract::select,
        )
    }

    /// Opens a mailbox read-only.
    pub fn examine(&self, mailbox: impl Into<Mailbox>) -> Completion<MailboxStatus> {
        self.command(
            Command::Examine {
                mailbox: mailbox.into(),
            },
            extract::examine,
        )
    }

    /// `CREATE`
    pub fn create(&self, mailbox: impl Into<Mailbox>) -> Completion<()> {
        self.command(
            Command::Create {
                mailbox: mailbox.into(),
            },
            extract::unit,
        )
    }

    /// `DELETE`
    pub fn delete(&self, mailbox: impl Into<Mailbox>) -> Completion<()> {
        self.command(
            Command::Delete {
                mailbox: mailbox.into(),
            },
            extract::unit,
        )
    }

    /// `RENAME`
    pub fn rename(&self, from: impl Into<Mailbox>, to: impl Into<Mailbox>) -> Completion<()> {
        self.command(
            Command::Rename {
                from: from.into(),
                to: to.into(),
            },
            extract::unit,
        )
    }

    /// `SUBSCRIBE`
    pub fn subscribe(&self, mailbox: impl Into<Mailbox>) -> Completion<()> {
        self.command(
            Command::Subscribe {
                mailbox: mailbox.into(),
            },
            extract::unit,
        )
    }

    /// `UNSUBSCRIBE`
    pub fn unsubscribe(&self, mailbox: impl Into<Mailbox>) -> Completion<()> {
        self.command(
            Command::Unsubscribe {
                mailbox: mailbox.into(),
            },
            extract::unit,
        )
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    pub fn list(&self, reference: &str, pattern: &str) -> Completion<Vec<ListResponse>> {
        self.command(
            Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            },
            extract::list,
        )
    }

    /// Lists subscribed mailboxes.
    pub fn lsub(&self, reference: &str, pattern: &str) -> Completion<Vec<ListResponse>> {
        self.command(
            Command::Lsub {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            },
            extract::lsub,
        )
    }

    /// Mailbox counters without selecting it.
    ///
    /// An empty `items` asks for MESSAGES, RECENT, UIDNEXT, UIDVALIDITY and
    /// UNSEEN, plus HIGHESTMODSEQ when the server supports CONDSTORE.
    pub fn status(
        &self,
        mailbox: impl Into<Mailbox>,
        items: &[StatusAttribute],
    ) -> Completion<Vec<StatusItem>> {
        self.command(
            Command::Status {
                mailbox: mailbox.into(),
                items: items.to_vec(),
            },
            extract::status,
        )
    }

    /// Uploads a message.
    ///
    /// The literal is sent only after the server's continuation. Resolves to
    /// the APPENDUID data when the server supports UIDPLUS.
    pub fn append(
        &self,
        mailbox: impl Into<Mailbox>,
        message: Vec<u8>,
        flags: &[Flag],
        date: Option<DateTime<FixedOffset>>,
    ) -> Completion<Option<AppendUid>> {
        let command = Command::Append {
            mailbox: mailbox.into(),
            flags: flags.to_vec(),
            date,
            size: message.len(),
        };
        self.submit(Operation::append(command, message), extract::append)
    }

    /// `ENABLE`; resolves to what the server actually enabled.
    pub fn enable<I, S>(&self, capabilities: I) -> Completion<Vec<Capability>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(
            Command::Enable {
                capabilities: capabilities.into_iter().map(Into::into).collect(),
            },
            extract::enable,
        )
    }

    /// `ID`; `None` sends `ID NIL`.
    pub fn id(&self, parameters: Option<Vec<(String, String)>>) -> Completion<IdParameters> {
        self.command(Command::Id { parameters }, extract::id)
    }

    // === Selected ===

    /// `CHECK`
    pub fn check(&self) -> Completion<()> {
        self.command(Command::Check, extract::unit)
    }

    /// Closes the mailbox, expunging `\Deleted` messages silently.
    pub fn close(&self) -> Completion<()> {
        self.command(Command::Close, extract::unit)
    }

    /// Expunges `\Deleted` messages; resolves to the removed sequence numbers
    /// in the order the server reported them.
    pub fn expunge(&self) -> Completion<Vec<SeqNum>> {
        self.command(Command::Expunge, extract::expunge)
    }

    /// `SEARCH`; the criteria are ANDed.
    pub fn search(&self, criteria: Vec<SearchCriteria>) -> Completion<Vec<SeqNum>> {
        self.command(
            Command::Search {
                charset: None,
                criteria,
                uid: false,
            },
            extract::search,
        )
    }

    /// `SEARCH CHARSET <charset>`
    pub fn search_charset(
        &self,
        charset: &str,
        criteria: Vec<SearchCriteria>,
    ) -> Completion<Vec<SeqNum>> {
        self.command(
            Command::Search {
                charset: Some(charset.to_string()),
                criteria,
                uid: false,
            },
            extract::search,
        )
    }

    /// `UID SEARCH`
    pub fn uid_search(&self, criteria: Vec<SearchCriteria>) -> Completion<Vec<Uid>> {
        self.command(
            Command::Search {
                charset: None,
                criteria,
                uid: true,
            },
            extract::uid_search,
        )
    }

    /// `FETCH`, or `UID FETCH` for a [`UidSet`](crate::types::UidSet).
    pub fn fetch(
        &self,
        set: impl Into<MessageSet>,
        items: impl Into<FetchItems>,
    ) -> Completion<FetchRows> {
        self.command(
            Command::Fetch {
                set: set.into(),
                items: items.into(),
                changed_since: None,
            },
            extract::fetch,
        )
    }

    /// `FETCH ... (CHANGEDSINCE modseq)` (CONDSTORE).
    pub fn fetch_changed_since(
        &self,
        set: impl Into<MessageSet>,
        items: impl Into<FetchItems>,
        modseq: u64,
    ) -> Completion<FetchRows> {
        self.command(
            Command::Fetch {
                set: set.into(),
                items: items.into(),
                changed_since: Some(modseq),
            },
            extract::fetch,
        )
    }

    /// `STORE`, or `UID STORE`. Resolves to the FETCH data the server sent
    /// back, which is empty for `.SILENT`.
    pub fn store(&self, set: impl Into<MessageSet>, action: StoreAction) -> Completion<FetchRows> {
        self.command(
            Command::Store {
                set: set.into(),
                action,
            },
            extract::fetch,
        )
    }

    /// `COPY`, or `UID COPY`. Resolves to the COPYUID data when the server
    /// supports UIDPLUS.
    pub fn copy(
        &self,
        set: impl Into<MessageSet>,
        mailbox: impl Into<Mailbox>,
    ) -> Completion<Option<CopyUid>> {
        self.command(
            Command::Copy {
                set: set.into(),
                mailbox: mailbox.into(),
            },
            extract::copy,
        )
    }

    /// Starts IDLE.
    ///
    /// The session waits without a watchdog until the server sends data or
    /// [`idle_done`](Self::idle_done) is called, then writes `DONE`. Resolves
    /// to everything received while idling. An IDLE submitted while another
    /// is queued or running fails with
    /// [`StateError::AlreadyIdling`](crate::StateError::AlreadyIdling) when
    /// its turn comes.
    pub fn idle(&self) -> Completion<Vec<UntaggedResponse>> {
        self.command(Command::Idle, extract::idle)
    }

    /// Ends the running or queued IDLE.
    ///
    /// Sees every call made before it, so `idle()` followed at once by
    /// `idle_done()` always ends that IDLE. Returns true if `DONE` was
    /// written (or will be, once the server accepts the IDLE) on the
    /// caller's behalf. Returns false and writes nothing when no IDLE is
    /// left to end, including when data already ended it.
    pub async fn idle_done(&self) -> bool {
        let (ack, answer) = oneshot::channel();
        if self
            .handle
            .control
            .send(engine::Control::IdleDone(ack))
            .is_err()
        {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

fn is_auth_failure(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Operation(OperationKind::Login | OperationKind::Authenticate)
            | ErrorKind::Validation
    )
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
    use crate::error::StateError;

    fn session() -> Session {
        Session::new(Config::new("imap.example.com")).0
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let session = session();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.capabilities().is_empty());
    }

    #[tokio::test]
    async fn test_gating_without_network() {
        let session = session();
        let err = session.select("INBOX").await.unwrap_err();
        assert!(matches!(err, Error::State(StateError::NotConnected)));
        let err = session.noop().await.unwrap_err();
        assert_eq!(err.kind().to_string(), "state_error");
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_locally() {
        let session = session();
        assert!(matches!(
            session.login("user", "").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            session.authenticate_xoauth2("", "token").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_crlf_in_arguments_rejected_locally() {
        let session = session();
        let err = session
            .login("user\r\nA1 LOGOUT", "password")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = session.create("Inbox\nfoo").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_idle_done_when_not_idling() {
        assert!(!session().idle_done().await);
    }

    #[test]
    fn test_auth_failure_classification() {
        assert!(is_auth_failure(&Error::operation(OperationKind::Login, "NO")));
        assert!(!is_auth_failure(&Error::stream("eof")));
    }
}
