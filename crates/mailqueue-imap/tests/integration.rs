//! End-to-end tests: a `Session` talking to a scripted server over an
//! in-memory duplex stream.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::unreadable_literal,
    clippy::similar_names,
    missing_docs
)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use mailqueue_imap::{
    Capability, Config, ConnectionState, Connector, Credentials, Error, Events, FetchAttribute,
    FetchItem, FetchItems, Flag, OperationKind, SearchCriteria, Security, SeqNum, SequenceSet,
    Session, SessionEvent, StateError, Transport, Uid, UidSet, UntaggedResponse,
};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
    ReadBuf,
};

// === Mock transport ===

#[derive(Default)]
struct Shared {
    upgrades: AtomicUsize,
    fail_tls: AtomicBool,
}

struct MockTransport {
    io: DuplexStream,
    shared: Arc<Shared>,
}

impl AsyncRead for MockTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl Transport for MockTransport {
    async fn start_tls(self, _host: String) -> mailqueue_imap::Result<Self> {
        if self.shared.fail_tls.load(Ordering::SeqCst) {
            return Err(Error::Io(io::Error::other("handshake failed")));
        }
        self.shared.upgrades.fetch_add(1, Ordering::SeqCst);
        Ok(self)
    }
}

/// Hands out one prepared stream per `connect`.
struct MockConnector {
    streams: Mutex<VecDeque<DuplexStream>>,
    shared: Arc<Shared>,
}

impl Connector for MockConnector {
    type Stream = MockTransport;

    async fn connect(&self, _config: &Config) -> mailqueue_imap::Result<MockTransport> {
        let next = self.streams.lock().unwrap().pop_front();
        next.map(|io| MockTransport {
            io,
            shared: Arc::clone(&self.shared),
        })
        .ok_or_else(|| Error::Io(io::ErrorKind::ConnectionRefused.into()))
    }
}

// === Scripted server ===

struct Server {
    io: BufReader<DuplexStream>,
}

impl Server {
    async fn send(&mut self, data: &str) {
        self.io.get_mut().write_all(data.as_bytes()).await.unwrap();
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        self.io.read_line(&mut line).await.unwrap();
        line
    }

    async fn expect(&mut self, expected: &str) {
        assert_eq!(self.line().await, format!("{expected}\r\n"));
    }

    /// True if the client writes nothing for a moment.
    async fn silent(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(50), self.line())
            .await
            .is_err()
    }

    async fn greet(&mut self) {
        self.send("* OK [CAPABILITY IMAP4rev1 IDLE UIDPLUS] ready\r\n")
            .await;
    }
}

fn config() -> Config {
    Config::builder("imap.test").security(Security::None).build()
}

fn start(config: Config, connections: usize) -> (Session, Events, VecDeque<Server>, Arc<Shared>) {
    let shared = Arc::new(Shared::default());
    let mut streams = VecDeque::new();
    let mut servers = VecDeque::new();
    for _ in 0..connections {
        let (client, server) = tokio::io::duplex(64 * 1024);
        streams.push_back(client);
        servers.push_back(Server {
            io: BufReader::new(server),
        });
    }
    let connector = MockConnector {
        streams: Mutex::new(streams),
        shared: Arc::clone(&shared),
    };
    let (session, events) = Session::with_connector(config, connector);
    (session, events, servers, shared)
}

/// Connects and logs in; uses tag x1.
async fn open(session: &Session, server: &mut Server) {
    let connect = session.connect();
    let login = session.login("user", "pass");
    server.greet().await;
    server.expect("x1 LOGIN \"user\" \"pass\"").await;
    server.send("x1 OK LOGIN completed\r\n").await;
    connect.await.unwrap();
    login.await.unwrap();
}

/// Connects, logs in and selects INBOX; uses tags x1 and x2.
async fn open_selected(session: &Session, server: &mut Server) {
    open(session, server).await;
    let select = session.select("INBOX");
    server.expect("x2 SELECT INBOX").await;
    server
        .send("* 3 EXISTS\r\n* 0 RECENT\r\n* OK [UIDVALIDITY 1] UIDs valid\r\nx2 OK [READ-WRITE] SELECT completed\r\n")
        .await;
    select.await.unwrap();
}

async fn next_event(events: &mut Events) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap()
}

// === Ordering and single flight ===

#[tokio::test]
async fn test_operations_complete_in_submission_order() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    let login = session.login("user", "pass");
    let select = session.select("INBOX");
    let noop = session.clone().noop();

    server.greet().await;
    server.expect("x1 LOGIN \"user\" \"pass\"").await;
    assert!(server.silent().await);
    server
        .send("x1 OK [CAPABILITY IMAP4rev1 IDLE MOVE] Logged in\r\n")
        .await;
    server.expect("x2 SELECT INBOX").await;
    server
        .send("* 172 EXISTS\r\n* 1 RECENT\r\n* FLAGS (\\Answered \\Seen)\r\n* OK [UIDVALIDITY 3857529045] UIDs valid\r\nx2 OK [READ-WRITE] SELECT completed\r\n")
        .await;
    server.expect("x3 NOOP").await;
    server.send("x3 OK NOOP completed\r\n").await;

    assert!(connect.await.unwrap().has(&Capability::Idle));
    let caps = login.await.unwrap().unwrap();
    assert!(caps.has(&Capability::Move));
    let status = select.await.unwrap();
    assert_eq!(status.exists, 172);
    assert_eq!(status.recent, 1);
    assert!(status.flags.contains(&Flag::Seen));
    noop.await.unwrap();

    assert_eq!(session.state(), ConnectionState::MailboxSelected);
    assert!(session.capabilities().has(&Capability::Move));
}

#[tokio::test]
async fn test_fetch_with_literal() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let fetch = session.fetch(
        UidSet::Single(Uid::new(42).unwrap()),
        vec![FetchAttribute::Uid, FetchAttribute::peek("")],
    );
    server.expect("x3 UID FETCH 42 (UID BODY.PEEK[])").await;
    server
        .send("* 1 FETCH (UID 42 BODY[] {11}\r\nHello World)\r\nx3 OK FETCH completed\r\n")
        .await;

    let rows = fetch.await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, SeqNum::new(1).unwrap());
    assert!(rows[0].1.contains(&FetchItem::Body {
        section: None,
        origin: None,
        data: Some(b"Hello World".to_vec()),
    }));
}

// === State gating ===

#[tokio::test]
async fn test_gating_rejects_without_writing() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    server.greet().await;
    connect.await.unwrap();

    let err = session.select("INBOX").await.unwrap_err();
    assert!(matches!(err, Error::State(StateError::NotAuthenticated)));
    assert_eq!(err.kind().to_string(), "state_error");

    let login = session.login("user", "pass");
    server.expect("x1 LOGIN \"user\" \"pass\"").await;
    server.send("x1 OK done\r\n").await;
    login.await.unwrap();

    let err = session.login("user", "pass").await.unwrap_err();
    assert!(matches!(err, Error::State(StateError::AlreadyAuthenticated)));
    let err = session
        .fetch(SequenceSet::All, FetchItems::Fast)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::State(StateError::NoMailboxSelected)));
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::State(StateError::AlreadyConnected)));

    // Rejected operations consumed no tags and wrote nothing.
    let noop = session.noop();
    server.expect("x2 NOOP").await;
    server.send("x2 OK done\r\n").await;
    noop.await.unwrap();
}

#[tokio::test]
async fn test_queued_select_sees_post_login_state() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    let login = session.login("user", "pass");
    let select = session.select("INBOX");

    server.greet().await;
    server.expect("x1 LOGIN \"user\" \"pass\"").await;
    server.send("x1 NO [AUTHENTICATIONFAILED] bad password\r\n").await;

    connect.await.unwrap();
    assert_eq!(login.await.unwrap_err().kind().to_string(), "auth_error");
    let err = select.await.unwrap_err();
    assert!(matches!(err, Error::State(StateError::NotAuthenticated)));
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_failed_select_closes_mailbox() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let select = session.select("Missing");
    server.expect("x3 SELECT Missing").await;
    server.send("x3 NO [NONEXISTENT] no such mailbox\r\n").await;

    let err = select.await.unwrap_err();
    assert_eq!(err.kind().to_string(), "select_error");
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

// === Greeting ===

#[tokio::test]
async fn test_preauth_greeting() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    server.send("* PREAUTH [CAPABILITY IMAP4rev1] welcome back\r\n").await;
    connect.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);

    let list = session.list("", "*");
    server.expect("x1 LIST \"\" \"*\"").await;
    server
        .send("* LIST (\\HasNoChildren) \"/\" INBOX\r\n* LIST (\\HasChildren) \"/\" Archive\r\nx1 OK LIST completed\r\n")
        .await;
    let mailboxes = list.await.unwrap();
    assert_eq!(mailboxes.len(), 2);
    assert_eq!(mailboxes[1].mailbox.as_str(), "Archive");
    assert_eq!(mailboxes[1].delimiter, Some('/'));
}

#[tokio::test]
async fn test_bye_greeting_fails_connect() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    server.send("* BYE too many connections\r\n").await;
    let err = connect.await.unwrap_err();
    assert_eq!(err.kind().to_string(), "stream_error");
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure_stays_disconnected() {
    let (session, _events, _servers, _) = start(config(), 0);
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

// === Authentication ===

#[tokio::test]
async fn test_xoauth2_error_challenge() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    server.greet().await;
    connect.await.unwrap();

    let auth = session.authenticate_xoauth2("user@example.com", "ya29.token");
    let line = server.line().await;
    assert!(line.starts_with("x1 AUTHENTICATE XOAUTH2 "));
    server.send("+ eyJzdGF0dXMiOiI0MDEifQ==\r\n").await;
    server.expect("").await;
    server
        .send("x1 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n")
        .await;

    let err = auth.await.unwrap_err();
    assert_eq!(err.kind().to_string(), "auth_error");
    assert_eq!(session.state(), ConnectionState::Connected);
}

// === Append ===

#[tokio::test]
async fn test_append_literal_round_trip() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let mut message = b"Subject: hello\r\n\r\n".to_vec();
    message.resize(100, b'.');
    let append = session.append("Drafts", message.clone(), &[Flag::Seen], None);

    server.expect("x2 APPEND Drafts (\\Seen) {100}").await;
    server.send("+ Ready for literal data\r\n").await;
    let mut body = vec![0; 102];
    server.io.read_exact(&mut body).await.unwrap();
    assert_eq!(&body[..100], &message[..]);
    assert_eq!(&body[100..], b"\r\n");
    server
        .send("x2 OK [APPENDUID 38505 3955] APPEND completed\r\n")
        .await;

    let uid = append.await.unwrap().unwrap();
    assert_eq!(uid.uid_validity.get(), 38505);
    assert_eq!(uid.uids, vec![Uid::new(3955).unwrap()]);
}

#[tokio::test]
async fn test_append_rejected_before_literal() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let append = session.append("INBOX", vec![b'x'; 100], &[], None);
    server.expect("x2 APPEND INBOX {100}").await;
    server.send("x2 NO [TOOBIG] message too large\r\n").await;
    assert_eq!(
        append.await.unwrap_err().kind().to_string(),
        "append_error"
    );

    // No literal followed the refusal.
    let noop = session.noop();
    server.expect("x3 NOOP").await;
    server.send("x3 OK done\r\n").await;
    noop.await.unwrap();
}

#[tokio::test]
async fn test_append_unparsable_continuation() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let append = session.append("INBOX", vec![b'x'; 100], &[], None);
    server.expect("x2 APPEND INBOX {100}").await;
    server.send("* FLAGS \\Seen\r\n").await;

    let err = append.await.unwrap_err();
    assert_eq!(err.kind().to_string(), "append_error");
    assert!(err.to_string().contains("message probably too large"));

    // The literal was never written and the late refusal is ignored.
    let noop = session.noop();
    server.expect("x3 NOOP").await;
    server
        .send("x2 NO [TOOBIG] message too large\r\nx3 OK done\r\n")
        .await;
    noop.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

// === IDLE ===

#[tokio::test]
async fn test_idle_done_while_waiting() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let idle = session.idle();
    server.expect("x3 IDLE").await;
    server.send("+ idling\r\n").await;
    assert!(session.idle_done().await);
    server.expect("DONE").await;
    server.send("x3 OK IDLE terminated\r\n").await;
    assert!(idle.await.unwrap().is_empty());

    assert!(!session.idle_done().await);
    let noop = session.noop();
    server.expect("x4 NOOP").await;
    server.send("x4 OK done\r\n").await;
    noop.await.unwrap();
}

#[tokio::test]
async fn test_idle_ends_on_data() {
    let (session, mut events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let idle = session.idle();
    server.expect("x3 IDLE").await;
    server.send("+ idling\r\n* OK still here\r\n* 4 EXISTS\r\n").await;
    server.expect("DONE").await;
    assert!(!session.idle_done().await);
    server.send("x3 OK IDLE terminated\r\n").await;

    let data = idle.await.unwrap();
    assert!(data.contains(&UntaggedResponse::Exists(4)));
    // Collected by the idle, not published.
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_second_idle_refused_in_turn() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let noop = session.noop();
    let first = session.idle();
    let mut second = session.idle();
    server.expect("x3 NOOP").await;

    // The refusal waits behind the NOOP and the first IDLE.
    assert!(
        tokio::time::timeout(Duration::from_millis(50), &mut second)
            .await
            .is_err()
    );
    server.send("x3 OK done\r\n").await;
    noop.await.unwrap();

    server.expect("x4 IDLE").await;
    server.send("+ idling\r\n").await;
    assert!(session.idle_done().await);
    server.expect("DONE").await;
    server.send("x4 OK IDLE terminated\r\n").await;
    first.await.unwrap();

    let err = second.await.unwrap_err();
    assert!(matches!(err, Error::State(StateError::AlreadyIdling)));

    // The refused IDLE took no tag and wrote nothing.
    let next = session.noop();
    server.expect("x5 NOOP").await;
    server.send("x5 OK done\r\n").await;
    next.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_done_right_after_idle() {
    for _ in 0..20 {
        let (session, _events, mut servers, _) = start(config(), 1);
        let mut server = servers.pop_front().unwrap();
        open_selected(&session, &mut server).await;

        let idle = session.idle();
        assert!(session.idle_done().await);
        assert!(!session.idle_done().await);

        server.expect("x3 IDLE").await;
        server.send("+ idling\r\n").await;
        server.expect("DONE").await;
        server.send("x3 OK IDLE terminated\r\n").await;
        assert!(idle.await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_idle_done_while_idle_is_queued() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let noop = session.noop();
    let idle = session.idle();
    server.expect("x3 NOOP").await;
    assert!(session.idle_done().await);

    server.send("x3 OK done\r\n").await;
    noop.await.unwrap();
    server.expect("x4 IDLE").await;
    server.send("+ idling\r\n").await;
    server.expect("DONE").await;
    server.send("x4 OK IDLE terminated\r\n").await;
    idle.await.unwrap();
}

// === STARTTLS ===

#[tokio::test]
async fn test_starttls_upgrades_in_place() {
    let (session, _events, mut servers, shared) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    server
        .send("* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n")
        .await;
    connect.await.unwrap();
    assert!(session.capabilities().has(&Capability::StartTls));

    let tls = session.starttls();
    server.expect("x1 STARTTLS").await;
    server.send("x1 OK Begin TLS negotiation now\r\n").await;
    tls.await.unwrap();
    assert_eq!(shared.upgrades.load(Ordering::SeqCst), 1);
    assert!(session.capabilities().is_empty());
    assert_eq!(session.state(), ConnectionState::Connected);

    let caps = session.capability();
    server.expect("x2 CAPABILITY").await;
    server
        .send("* CAPABILITY IMAP4rev1 AUTH=PLAIN\r\nx2 OK done\r\n")
        .await;
    assert!(caps.await.unwrap().has_auth("PLAIN"));
}

#[tokio::test]
async fn test_starttls_refused_keeps_state() {
    let (session, _events, mut servers, shared) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    server.greet().await;
    connect.await.unwrap();

    let tls = session.starttls();
    server.expect("x1 STARTTLS").await;
    server.send("x1 NO not available\r\n").await;
    assert_eq!(tls.await.unwrap_err().kind().to_string(), "starttls_error");
    assert_eq!(shared.upgrades.load(Ordering::SeqCst), 0);
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_starttls_handshake_failure_disconnects() {
    let (session, _events, mut servers, shared) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    shared.fail_tls.store(true, Ordering::SeqCst);

    let connect = session.connect();
    server.greet().await;
    connect.await.unwrap();

    let tls = session.starttls();
    server.expect("x1 STARTTLS").await;
    server.send("x1 OK Begin TLS negotiation now\r\n").await;
    assert_eq!(tls.await.unwrap_err().kind().to_string(), "starttls_error");
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_with_starttls_security() {
    let config = Config::builder("imap.test")
        .security(Security::StartTls)
        .build();
    let (session, _events, mut servers, shared) = start(config, 1);
    let mut server = servers.pop_front().unwrap();

    let connect = session.connect();
    let login = session.login("user", "pass");
    server.greet().await;
    server.expect("x1 STARTTLS").await;
    server.send("x1 OK go ahead\r\n").await;
    server.expect("x2 LOGIN \"user\" \"pass\"").await;
    server.send("x2 OK done\r\n").await;

    assert!(connect.await.unwrap().is_empty());
    login.await.unwrap();
    assert_eq!(shared.upgrades.load(Ordering::SeqCst), 1);
}

// === Teardown ===

#[tokio::test]
async fn test_connection_loss_drains_queue() {
    let (session, mut events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let fetch = session.fetch(SequenceSet::range(1, 2).unwrap(), FetchItems::Fast);
    let search = session.search(vec![SearchCriteria::All]);
    let noop = session.noop();
    server.expect("x3 FETCH 1:2 FAST").await;
    drop(server);

    assert_eq!(fetch.await.unwrap_err().kind().to_string(), "stream_error");
    let err = search.await.unwrap_err();
    assert!(matches!(err, Error::State(StateError::NotConnected)));
    assert!(noop.await.is_err());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn test_local_disconnect_fails_in_flight() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let noop = session.noop();
    server.expect("x2 NOOP").await;
    session.disconnect().await;

    let err = noop.await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(server.line().await, "");
}

#[tokio::test]
async fn test_logout_closes_and_tags_restart() {
    let (session, _events, mut servers, _) = start(config(), 2);
    let mut first = servers.pop_front().unwrap();
    let mut second = servers.pop_front().unwrap();
    open(&session, &mut first).await;

    let noop = session.noop();
    first.expect("x2 NOOP").await;
    first.send("x2 OK done\r\n").await;
    noop.await.unwrap();

    let logout = session.logout();
    first.expect("x3 LOGOUT").await;
    first
        .send("* BYE logging out\r\nx3 OK LOGOUT completed\r\n")
        .await;
    logout.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);

    open(&session, &mut second).await;
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_logout_completed_by_bye_and_eof() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let logout = session.logout();
    server.expect("x2 LOGOUT").await;
    server.send("* BYE see you\r\n").await;
    drop(server);

    logout.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_logs_in_again() {
    let config = Config::builder("imap.test")
        .security(Security::None)
        .credentials(Credentials::password("user", "pass"))
        .build();
    let (session, mut events, mut servers, _) = start(config, 2);
    let mut first = servers.pop_front().unwrap();
    let mut second = servers.pop_front().unwrap();
    open(&session, &mut first).await;

    drop(first);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Disconnected { .. }
    ));

    let server = async {
        second.greet().await;
        second.expect("x1 LOGIN \"user\" \"pass\"").await;
        second.send("x1 OK done\r\n").await;
    };
    let (result, ()) = tokio::join!(session.reconnect(), server);
    result.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

// === Unsolicited data and protocol errors ===

#[tokio::test]
async fn test_unsolicited_data_becomes_events() {
    let (session, mut events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let noop = session.noop();
    server.expect("x3 NOOP").await;
    server
        .send("* 2 EXPUNGE\r\n* 4 EXISTS\r\n* OK [ALERT] maintenance at midnight\r\n* 1 FETCH (FLAGS (\\Seen))\r\nx3 OK NOOP completed\r\n")
        .await;
    noop.await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Expunge(SeqNum::new(2).unwrap())
    );
    assert_eq!(next_event(&mut events).await, SessionEvent::Exists(4));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Alert("maintenance at midnight".to_string())
    );
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Fetch { seq, .. } if seq.get() == 1
    ));
}

#[tokio::test]
async fn test_expunge_reply_is_not_an_event() {
    let (session, mut events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let expunge = session.expunge();
    server.expect("x3 EXPUNGE").await;
    server
        .send("* 3 EXPUNGE\r\n* 3 EXPUNGE\r\nx3 OK EXPUNGE completed\r\n")
        .await;
    let removed = expunge.await.unwrap();
    assert_eq!(removed.len(), 2);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_tag_mismatch_is_protocol_error() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let noop = session.noop();
    server.expect("x2 NOOP").await;
    server.send("x9 OK wrong tag\r\n").await;
    assert_eq!(noop.await.unwrap_err().kind().to_string(), "protocol_error");

    // The late completion for x2 is ignored and the session carries on.
    let next = session.noop();
    server.expect("x3 NOOP").await;
    server.send("x2 OK late\r\nx3 OK done\r\n").await;
    next.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

#[tokio::test]
async fn test_unparsable_reply_fails_its_operation() {
    let (session, _events, mut servers, _) = start(config(), 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let select = session.select("INBOX");
    server.expect("x2 SELECT INBOX").await;
    server.send("* 3 EXISTS\r\n* FLAGS \\Seen\r\n").await;

    let err = select.await.unwrap_err();
    assert_eq!(err.kind().to_string(), "select_error");
    assert!(!err.is_fatal());
    assert_eq!(session.state(), ConnectionState::Authenticated);

    // The connection survives; the abandoned completion is skipped.
    let noop = session.noop();
    server.expect("x3 NOOP").await;
    server
        .send("x2 OK [READ-WRITE] SELECT completed\r\nx3 OK done\r\n")
        .await;
    noop.await.unwrap();
    assert_eq!(session.state(), ConnectionState::Authenticated);
}

// === Watchdog ===

#[tokio::test(start_paused = true)]
async fn test_watchdog_fails_stalled_operation() {
    let config = Config::builder("imap.test")
        .security(Security::None)
        .operation_timeout(Some(Duration::from_secs(30)))
        .build();
    let (session, mut events, mut servers, _) = start(config, 1);
    let mut server = servers.pop_front().unwrap();
    open(&session, &mut server).await;

    let stalled = session.noop();
    let queued = session.check();
    server.expect("x2 NOOP").await;

    let err = stalled.await.unwrap_err();
    assert!(matches!(err, Error::TaskTimeout(after) if after == Duration::from_secs(30)));
    assert_eq!(err.kind().to_string(), "task_timeout");
    assert!(matches!(
        queued.await.unwrap_err(),
        Error::State(StateError::NotConnected)
    ));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::TaskTimeout {
            kind: OperationKind::Noop,
            after: Duration::from_secs(30),
        }
    );
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Disconnected { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_idle_is_exempt_from_watchdog() {
    let config = Config::builder("imap.test")
        .security(Security::None)
        .operation_timeout(Some(Duration::from_secs(30)))
        .build();
    let (session, _events, mut servers, _) = start(config, 1);
    let mut server = servers.pop_front().unwrap();
    open_selected(&session, &mut server).await;

    let idle = session.idle();
    server.expect("x3 IDLE").await;
    server.send("+ idling\r\n").await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(session.state(), ConnectionState::MailboxSelected);

    assert!(session.idle_done().await);
    server.expect("DONE").await;
    server.send("x3 OK IDLE terminated\r\n").await;
    idle.await.unwrap();
}
