//! The session engine.
//!
//! One spawned task owns the transport, the receive buffer, the connection
//! state and the tag counter. Callers talk to it over two channels:
//! queued [`Submission`]s, executed strictly one at a time in arrival
//! order, and [`Control`] messages (`idle_done`, `disconnect`) that act on
//! the running operation immediately. Before a control message is handled,
//! every submission already sent is taken off its channel, so a control
//! message never overtakes a call made before it.
//!
//! Each loop turn promotes queued work while nothing is in flight, then
//! waits on whichever comes first: a control message, a new submission,
//! bytes from the server, or the watchdog deadline.
//!
//! State gating happens at promotion, so an operation queued behind a
//! `login` is checked against the post-login state.

mod operation;
mod reply;
mod state;

use std::collections::{HashSet, VecDeque};
use std::future;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

pub(crate) use self::operation::{Control, Operation, Submission};
pub use self::reply::Reply;
pub use self::state::{AppendPhase, ConnectionState, IdlePhase};
use crate::auth;
use crate::command::{Command, DONE, StatusAttribute, TagCounter};
use crate::connection::{Config, Connector, ReceiveBuffer, Security, Transport, write_all};
use crate::error::{Error, OperationKind, StateError};
use crate::event::{SessionEvent, log_event};
use crate::parser::wire::{Mode, Parsed};
use crate::parser::{Response, UntaggedResponse};
use crate::types::{Capabilities, Capability, ResponseCode, Status, Tag};
use crate::Result;

/// The facade's side of a running engine.
#[derive(Debug, Clone)]
pub(crate) struct Handle {
    pub(crate) requests: mpsc::UnboundedSender<Submission>,
    pub(crate) control: mpsc::UnboundedSender<Control>,
    pub(crate) state: watch::Receiver<ConnectionState>,
    pub(crate) capabilities: watch::Receiver<Capabilities>,
}

/// Starts an engine task. It runs until every request sender is dropped.
pub(crate) fn spawn<C: Connector>(
    config: Config,
    connector: C,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> Handle {
    let (requests, requests_rx) = mpsc::unbounded_channel();
    let (control, control_rx) = mpsc::unbounded_channel();
    let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
    let (caps_tx, capabilities) = watch::channel(Capabilities::default());

    let engine = Engine {
        config,
        connector,
        stream: None,
        buffer: ReceiveBuffer::new(),
        state: ConnectionState::Disconnected,
        state_tx,
        capabilities: Capabilities::default(),
        caps_tx,
        tags: TagCounter::default(),
        queue: VecDeque::new(),
        in_flight: None,
        stale_tags: HashSet::new(),
        bye: None,
        deadline: None,
        events,
    };
    tokio::spawn(engine.run(requests_rx, control_rx));

    Handle {
        requests,
        control,
        state,
        capabilities,
    }
}

/// Where the in-flight exchange stands.
#[derive(Debug)]
enum Phase {
    /// Transport open, waiting for the server greeting.
    Greeting,
    /// STARTTLS sent by `connect` itself for [`Security::StartTls`].
    GreetingStartTls { greeting: Reply },
    /// Ordinary command waiting for its tagged completion.
    Command,
    /// AUTHENTICATE; a continuation is an error challenge.
    Authenticate,
    Append { phase: AppendPhase, literal: Vec<u8> },
    Idle { phase: IdlePhase, cancel: bool },
    StartTls,
}

/// A submission waiting for its turn.
#[derive(Debug)]
struct Queued {
    submission: Submission,
    /// Decided on arrival, delivered at promotion to keep completion order.
    refusal: Option<StateError>,
    /// `idle_done` arrived before this IDLE was started.
    cancel_idle: bool,
}

#[derive(Debug)]
struct InFlight {
    kind: OperationKind,
    /// `None` while connect waits for the greeting.
    tag: Option<Tag>,
    phase: Phase,
    untagged: Vec<UntaggedResponse>,
    reply: oneshot::Sender<Result<Reply>>,
}

impl InFlight {
    fn new(
        kind: OperationKind,
        tag: Option<Tag>,
        phase: Phase,
        reply: oneshot::Sender<Result<Reply>>,
    ) -> Self {
        Self {
            kind,
            tag,
            phase,
            untagged: Vec::new(),
            reply,
        }
    }

    const fn mode(&self) -> Mode {
        match self.phase {
            Phase::Greeting => Mode::Greeting,
            Phase::Authenticate
            | Phase::Append {
                phase: AppendPhase::AwaitingContinuation,
                ..
            }
            | Phase::Idle {
                phase: IdlePhase::AwaitingContinuation,
                ..
            } => Mode::ResponseOrContinuation,
            _ => Mode::Response,
        }
    }

    /// IDLE waiting on the server: no watchdog.
    const fn is_idling(&self) -> bool {
        matches!(
            self.phase,
            Phase::Idle {
                phase: IdlePhase::AwaitingData,
                ..
            }
        )
    }
}

struct Engine<C: Connector> {
    config: Config,
    connector: C,
    stream: Option<C::Stream>,
    buffer: ReceiveBuffer,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    capabilities: Capabilities,
    caps_tx: watch::Sender<Capabilities>,
    tags: TagCounter,
    queue: VecDeque<Queued>,
    in_flight: Option<InFlight>,
    /// Tags of commands failed locally whose completion may still arrive.
    stale_tags: HashSet<Tag>,
    /// Text of the last `* BYE` on this connection.
    bye: Option<String>,
    deadline: Option<Instant>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<C: Connector> Engine<C> {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Submission>,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        loop {
            self.promote().await;
            let deadline = self.deadline;

            tokio::select! {
                Some(message) = control.recv() => {
                    while let Ok(submission) = requests.try_recv() {
                        self.enqueue(submission);
                    }
                    self.on_control(message).await;
                }
                submission = requests.recv() => match submission {
                    Some(submission) => self.enqueue(submission),
                    None => break,
                },
                read = read_some(self.stream.as_mut(), &mut self.buffer) => {
                    self.on_read(read).await;
                }
                () = sleep_until(deadline) => self.on_watchdog(),
            }
        }
        self.shut_down();
    }

    fn enqueue(&mut self, submission: Submission) {
        let kind = submission.operation.kind;
        let refusal = (kind == OperationKind::Idle && self.idle_pending())
            .then_some(StateError::AlreadyIdling);
        trace!(%kind, queued = self.queue.len(), "submitted");
        self.queue.push_back(Queued {
            submission,
            refusal,
            cancel_idle: false,
        });
    }

    /// An accepted IDLE is running or waiting in the queue.
    fn idle_pending(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|op| op.kind == OperationKind::Idle)
            || self.queue.iter().any(|queued| {
                queued.refusal.is_none() && queued.submission.operation.kind == OperationKind::Idle
            })
    }

    /// Starts queued operations until one is in flight or the queue is empty.
    async fn promote(&mut self) {
        while self.in_flight.is_none() {
            let Some(queued) = self.queue.pop_front() else {
                return;
            };
            let kind = queued.submission.operation.kind;
            let gated = queued
                .refusal
                .map_or_else(|| operation::gate(kind, self.state), Err);
            if let Err(err) = gated {
                debug!(%kind, state = %self.state, %err, "rejected");
                let _ = queued.submission.reply.send(Err(err.into()));
                continue;
            }
            self.start(queued).await;
        }
    }

    async fn start(&mut self, queued: Queued) {
        let Queued {
            submission: Submission { operation, reply },
            cancel_idle,
            ..
        } = queued;
        let Operation {
            kind,
            command,
            literal,
        } = operation;
        let Some(mut command) = command else {
            self.open(reply).await;
            return;
        };
        self.prepare(&mut command);

        let tag = self.tags.next_tag();
        let line = match command.serialize(&tag) {
            Ok(line) => line,
            Err(err) => {
                let _ = reply.send(Err(err));
                return;
            }
        };
        debug!(%tag, %kind, line = %command.redacted(&tag, &line), "sending");

        let phase = match (&command, literal) {
            (Command::Append { .. }, Some(literal)) => Phase::Append {
                phase: AppendPhase::AwaitingContinuation,
                literal,
            },
            (Command::Idle, _) => Phase::Idle {
                phase: IdlePhase::AwaitingContinuation,
                cancel: cancel_idle,
            },
            (Command::Authenticate { .. }, _) => Phase::Authenticate,
            (Command::StartTls, _) => Phase::StartTls,
            _ => Phase::Command,
        };
        self.in_flight = Some(InFlight::new(kind, Some(tag), phase, reply));
        self.arm_watchdog();
        self.write(&line).await;
    }

    /// Fills in arguments that depend on what the server advertised.
    fn prepare(&self, command: &mut Command) {
        if let Command::Status { items, .. } = command
            && items.is_empty()
        {
            items.extend(StatusAttribute::DEFAULT);
            if self.capabilities.has(&Capability::CondStore) {
                items.push(StatusAttribute::HighestModSeq);
            }
        }
    }

    async fn open(&mut self, reply: oneshot::Sender<Result<Reply>>) {
        debug!(
            host = %self.config.host,
            port = self.config.port,
            security = ?self.config.security,
            "connecting"
        );
        match self.connector.connect(&self.config).await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.tags.reset();
                self.buffer.clear();
                self.stale_tags.clear();
                self.bye = None;
                self.set_capabilities(Capabilities::default());
                self.in_flight = Some(InFlight::new(
                    OperationKind::Connect,
                    None,
                    Phase::Greeting,
                    reply,
                ));
                self.arm_watchdog();
            }
            Err(err) => {
                warn!(%err, "connect failed");
                let _ = reply.send(Err(err));
            }
        }
    }

    async fn on_control(&mut self, message: Control) {
        match message {
            Control::Disconnect(ack) => {
                if self.stream.is_some() {
                    debug!("disconnecting");
                    let reason = "disconnected by caller".to_string();
                    self.close_transport(reason.clone());
                    if let Some(op) = self.in_flight.take() {
                        let _ = op.reply.send(Err(Error::stream(reason)));
                    }
                }
                let _ = ack.send(());
            }
            Control::IdleDone(ack) => {
                let accepted = self.end_idle().await;
                let _ = ack.send(accepted);
            }
        }
    }

    /// Ends the running or queued IDLE; false if there is none left to end.
    async fn end_idle(&mut self) -> bool {
        let mut send_done = false;
        let accepted = match self.in_flight.as_mut() {
            Some(InFlight {
                phase: Phase::Idle { phase, cancel },
                ..
            }) => match phase {
                phase if phase.done_sent() => false,
                IdlePhase::AwaitingContinuation => !std::mem::replace(cancel, true),
                phase => {
                    *phase = IdlePhase::Cancelled;
                    send_done = true;
                    true
                }
            },
            _ => self
                .queue
                .iter_mut()
                .find(|queued| {
                    queued.refusal.is_none()
                        && queued.submission.operation.kind == OperationKind::Idle
                })
                .is_some_and(|queued| !std::mem::replace(&mut queued.cancel_idle, true)),
        };
        if send_done {
            debug!("ending idle");
            self.arm_watchdog();
            self.write(DONE).await;
        }
        accepted
    }

    async fn on_read(&mut self, read: Result<usize>) {
        match read {
            Err(err) => {
                let reason = format!("read failed: {err}");
                self.drop_connection(reason, err);
            }
            Ok(0) => self.on_eof(),
            Ok(n) => {
                trace!(bytes = n, buffered = self.buffer.len(), "received");
                if self.in_flight.as_ref().is_some_and(|op| !op.is_idling()) {
                    self.arm_watchdog();
                }
                self.drain_buffer().await;
            }
        }
    }

    async fn drain_buffer(&mut self) {
        while self.stream.is_some() {
            let mode = self.in_flight.as_ref().map_or(Mode::Response, InFlight::mode);
            match self.buffer.next_response(mode) {
                Parsed::NeedsMoreData => break,
                Parsed::Ok { response, .. } => {
                    trace!(?response, "response");
                    self.on_response(response).await;
                }
                Parsed::Error { error, .. } => self.on_parse_error(error),
            }
        }
    }

    async fn on_response(&mut self, response: Response) {
        match response {
            Response::Untagged(untagged) => self.on_untagged(untagged).await,
            Response::Continuation { text } => self.on_continuation(text).await,
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => self.on_tagged(tag, status, code, text).await,
        }
    }

    async fn on_untagged(&mut self, untagged: UntaggedResponse) {
        match &untagged {
            UntaggedResponse::Capability(list)
            | UntaggedResponse::Status {
                code: Some(ResponseCode::Capability(list)),
                ..
            } => self.set_capabilities(Capabilities::new(list.clone())),
            _ => {}
        }
        if let UntaggedResponse::Status { status, code, text } = &untagged {
            if *code == Some(ResponseCode::Alert) {
                self.emit(SessionEvent::Alert(text.clone()));
            }
            match status {
                Status::Bye => {
                    self.bye = Some(text.clone());
                    self.emit(SessionEvent::Bye(text.clone()));
                }
                Status::No => warn!(text, "server warning"),
                Status::Bad => warn!(text, "server error"),
                Status::Ok | Status::PreAuth => {}
            }
        }

        let Some(op) = self.in_flight.as_mut() else {
            self.publish(untagged);
            return;
        };
        match op.phase {
            Phase::Greeting => return self.on_greeting(untagged).await,
            Phase::Idle {
                phase: ref mut phase @ IdlePhase::AwaitingData,
                ..
            } if is_idle_data(&untagged) => {
                *phase = IdlePhase::DataReceived;
                op.untagged.push(untagged);
                debug!("idle woke up");
                self.arm_watchdog();
                self.write(DONE).await;
                return;
            }
            _ => {}
        }
        if !solicited(op.kind, &untagged) {
            self.publish(untagged.clone());
        }
        if let Some(op) = self.in_flight.as_mut() {
            op.untagged.push(untagged);
        }
    }

    async fn on_greeting(&mut self, greeting: UntaggedResponse) {
        let UntaggedResponse::Status { status, code, text } = greeting else {
            let reason = "server sent no greeting".to_string();
            return self.drop_connection(reason.clone(), Error::stream(reason));
        };
        match status {
            Status::Ok | Status::PreAuth => {
                debug!(%status, text, "greeted");
                let preauth = status == Status::PreAuth;
                self.set_state(if preauth {
                    ConnectionState::Authenticated
                } else {
                    ConnectionState::Connected
                });
                let greeting = Reply {
                    untagged: Vec::new(),
                    code,
                    text,
                };
                if self.config.security != Security::StartTls {
                    return self.complete(Ok(greeting));
                }
                if preauth {
                    let reason = "PREAUTH greeting leaves no room for STARTTLS".to_string();
                    return self.drop_connection(reason.clone(), Error::Protocol(reason));
                }
                let tag = self.tags.next_tag();
                debug!(%tag, "sending STARTTLS");
                if let Some(op) = self.in_flight.as_mut() {
                    op.tag = Some(tag.clone());
                    op.phase = Phase::GreetingStartTls { greeting };
                }
                self.write(format!("{tag} STARTTLS\r\n").as_bytes()).await;
            }
            Status::Bye | Status::No | Status::Bad => {
                let reason = format!("server refused connection: {text}");
                self.drop_connection(reason.clone(), Error::stream(reason));
            }
        }
    }

    async fn on_continuation(&mut self, text: Option<String>) {
        let Some(op) = self.in_flight.as_mut() else {
            warn!("continuation request with nothing in flight");
            return;
        };
        let to_write: Option<Vec<u8>> = match &mut op.phase {
            Phase::Append {
                phase: phase @ AppendPhase::AwaitingContinuation,
                literal,
            } => {
                *phase = AppendPhase::AwaitingFinal;
                let mut data = std::mem::take(literal);
                debug!(bytes = data.len(), "sending APPEND literal");
                data.extend_from_slice(b"\r\n");
                Some(data)
            }
            Phase::Authenticate => {
                if let Some(detail) = text.as_deref().and_then(auth::decode_challenge) {
                    warn!(detail, "authentication challenge");
                }
                Some(b"\r\n".to_vec())
            }
            Phase::Idle {
                phase: phase @ IdlePhase::AwaitingContinuation,
                cancel,
            } => {
                if *cancel {
                    *phase = IdlePhase::Cancelled;
                    debug!("idle ended before it started");
                    Some(DONE.to_vec())
                } else {
                    *phase = IdlePhase::AwaitingData;
                    debug!("idling");
                    None
                }
            }
            _ => {
                self.fail_in_flight(Error::Protocol(
                    "unexpected continuation request".to_string(),
                ));
                return;
            }
        };
        if self.in_flight.as_ref().is_some_and(InFlight::is_idling) {
            self.deadline = None;
        }
        if let Some(data) = to_write {
            self.write(&data).await;
        }
    }

    async fn on_tagged(
        &mut self,
        tag: Tag,
        status: Status,
        code: Option<ResponseCode>,
        text: String,
    ) {
        if let Some(ResponseCode::Capability(list)) = &code {
            self.set_capabilities(Capabilities::new(list.clone()));
        }
        if code == Some(ResponseCode::Alert) {
            self.emit(SessionEvent::Alert(text.clone()));
        }

        let expected = self.in_flight.as_ref().and_then(|op| op.tag.clone());
        if expected.as_ref() != Some(&tag) {
            if self.stale_tags.remove(&tag) {
                debug!(%tag, "late completion for an abandoned command");
            } else if let Some(expected) = expected {
                self.fail_in_flight(Error::Protocol(format!(
                    "expected completion for {expected}, got {tag}"
                )));
            } else {
                warn!(%tag, "completion with nothing in flight");
            }
            return;
        }
        let Some(op) = self.in_flight.take() else {
            return;
        };
        self.deadline = None;

        match status {
            Status::Ok => self.on_success(op, code, text).await,
            Status::No | Status::Bad => {
                warn!(%tag, kind = %op.kind, %status, text, "command failed");
                self.on_failure(op, status, &text);
            }
            Status::PreAuth | Status::Bye => {
                let _ = op.reply.send(Err(Error::Protocol(format!(
                    "{status} is not a valid completion"
                ))));
            }
        }
    }

    async fn on_success(&mut self, op: InFlight, code: Option<ResponseCode>, text: String) {
        let InFlight {
            kind,
            phase,
            untagged,
            reply,
            ..
        } = op;
        let result = match phase {
            Phase::GreetingStartTls { greeting } => self.upgrade().await.map(|()| Reply {
                code: None,
                ..greeting
            }),
            Phase::StartTls => self.upgrade().await.map(|()| Reply {
                untagged,
                code,
                text,
            }),
            Phase::Append {
                phase: AppendPhase::AwaitingContinuation,
                ..
            } => Err(Error::Protocol(
                "APPEND completed before the literal was sent".to_string(),
            )),
            _ => {
                match kind {
                    OperationKind::Login | OperationKind::Authenticate => {
                        info!("logged in");
                        self.set_state(ConnectionState::Authenticated);
                    }
                    OperationKind::Select | OperationKind::Examine => {
                        self.set_state(ConnectionState::MailboxSelected);
                    }
                    OperationKind::Close => self.set_state(ConnectionState::Authenticated),
                    OperationKind::Logout => self.close_transport("logged out".to_string()),
                    _ => {}
                }
                Ok(Reply {
                    untagged,
                    code,
                    text,
                })
            }
        };
        let _ = reply.send(result);
    }

    fn on_failure(&mut self, op: InFlight, status: Status, text: &str) {
        let error = match op.phase {
            Phase::GreetingStartTls { .. } => {
                let reason = format!("STARTTLS refused: {text}");
                self.close_transport(reason.clone());
                Error::operation(OperationKind::StartTls, reason)
            }
            _ => {
                if matches!(op.kind, OperationKind::Select | OperationKind::Examine)
                    && status == Status::No
                    && self.state == ConnectionState::MailboxSelected
                {
                    self.set_state(ConnectionState::Authenticated);
                }
                Error::operation(op.kind, format!("{status} {text}"))
            }
        };
        let _ = op.reply.send(Err(error));
    }

    fn on_parse_error(&mut self, error: Error) {
        let Some(op) = self.in_flight.as_ref() else {
            warn!(%error, "discarding unparsable server data");
            return;
        };
        match op.phase {
            Phase::Greeting => {
                let reason = format!("bad greeting: {error}");
                self.drop_connection(reason.clone(), Error::stream(reason));
            }
            Phase::Append {
                phase: AppendPhase::AwaitingContinuation,
                ..
            } => {
                warn!(%error, "no continuation for APPEND");
                self.fail_in_flight(Error::operation(
                    OperationKind::Append,
                    format!("message probably too large: {error}"),
                ));
            }
            _ => {
                let kind = op.kind;
                warn!(%kind, %error, "unparsable response");
                self.fail_in_flight(Error::operation(kind, error.to_string()));
            }
        }
    }

    fn on_eof(&mut self) {
        let logging_out = self
            .in_flight
            .as_ref()
            .is_some_and(|op| op.kind == OperationKind::Logout);
        if logging_out && let Some(text) = self.bye.take() {
            self.close_transport("logged out".to_string());
            if let Some(op) = self.in_flight.take() {
                let _ = op.reply.send(Ok(Reply {
                    untagged: op.untagged,
                    code: None,
                    text,
                }));
            }
            return;
        }
        let reason = match self.bye.take() {
            Some(text) => format!("server closed the connection: {text}"),
            None => "connection closed by server".to_string(),
        };
        self.drop_connection(reason.clone(), Error::stream(reason));
    }

    fn on_watchdog(&mut self) {
        self.deadline = None;
        let (Some(after), Some(op)) = (self.config.operation_timeout, self.in_flight.as_ref())
        else {
            return;
        };
        let kind = op.kind;
        warn!(%kind, ?after, "watchdog expired");
        self.emit(SessionEvent::TaskTimeout { kind, after });
        self.drop_connection(format!("{kind} timed out"), Error::TaskTimeout(after));
    }

    /// Swaps the transport for its TLS upgrade.
    ///
    /// Bytes buffered from the cleartext stream are discarded.
    async fn upgrade(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Err(StateError::NotConnected.into());
        };
        self.buffer.clear();
        debug!(host = %self.config.host, "starting TLS");
        match stream.start_tls(self.config.host.clone()).await {
            Ok(tls) => {
                self.stream = Some(tls);
                self.set_capabilities(Capabilities::default());
                debug!("TLS established");
                Ok(())
            }
            Err(err) => {
                let reason = format!("TLS handshake failed: {err}");
                error!(reason, "dropping connection");
                self.close_transport(reason.clone());
                Err(Error::operation(OperationKind::StartTls, reason))
            }
        }
    }

    async fn write(&mut self, data: &[u8]) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if let Err(err) = write_all(stream, data).await {
            let reason = format!("write failed: {err}");
            self.drop_connection(reason, err);
        }
    }

    fn complete(&mut self, result: Result<Reply>) {
        self.deadline = None;
        if let Some(op) = self.in_flight.take() {
            let _ = op.reply.send(result);
        }
    }

    /// Fails the in-flight operation; the connection stays up.
    fn fail_in_flight(&mut self, error: Error) {
        self.deadline = None;
        if let Some(op) = self.in_flight.take() {
            if let Some(tag) = op.tag {
                self.stale_tags.insert(tag);
            }
            let _ = op.reply.send(Err(error));
        }
    }

    /// Forced disconnect: the in-flight operation fails with `error` and
    /// queued operations meet a disconnected session when promoted.
    fn drop_connection(&mut self, reason: String, error: Error) {
        error!(reason, "dropping connection");
        self.close_transport(reason);
        if let Some(op) = self.in_flight.take() {
            let _ = op.reply.send(Err(error));
        }
    }

    /// Drops the transport and publishes `Disconnected` if a session was up.
    fn close_transport(&mut self, reason: String) {
        let had_session = self.state.is_connected();
        self.stream = None;
        self.buffer.clear();
        self.deadline = None;
        self.stale_tags.clear();
        self.set_state(ConnectionState::Disconnected);
        if had_session {
            self.emit(SessionEvent::Disconnected { reason });
        }
    }

    fn shut_down(&mut self) {
        debug!("session dropped, engine stopping");
        self.stream = None;
        if let Some(op) = self.in_flight.take() {
            let _ = op.reply.send(Err(Error::SessionClosed));
        }
        for queued in self.queue.drain(..) {
            let _ = queued.submission.reply.send(Err(Error::SessionClosed));
        }
    }

    fn arm_watchdog(&mut self) {
        self.deadline = self
            .config
            .operation_timeout
            .map(|timeout| Instant::now() + timeout);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "state");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities.clone();
        self.caps_tx.send_replace(capabilities);
    }

    /// Turns unsolicited mailbox data into events.
    fn publish(&self, untagged: UntaggedResponse) {
        let event = match untagged {
            UntaggedResponse::Exists(n) => SessionEvent::Exists(n),
            UntaggedResponse::Recent(n) => SessionEvent::Recent(n),
            UntaggedResponse::Expunge(seq) => SessionEvent::Expunge(seq),
            UntaggedResponse::Fetch { seq, items } => SessionEvent::Fetch { seq, items },
            UntaggedResponse::Flags(flags) => SessionEvent::Flags(flags),
            _ => return,
        };
        self.emit(event);
    }

    fn emit(&self, event: SessionEvent) {
        log_event(&event);
        let _ = self.events.send(event);
    }
}

/// True when `untagged` is part of what `kind` asked for rather than news.
const fn solicited(kind: OperationKind, untagged: &UntaggedResponse) -> bool {
    match untagged {
        UntaggedResponse::Exists(_) | UntaggedResponse::Recent(_) | UntaggedResponse::Flags(_) => {
            matches!(
                kind,
                OperationKind::Select | OperationKind::Examine | OperationKind::Idle
            )
        }
        UntaggedResponse::Fetch { .. } => matches!(
            kind,
            OperationKind::Fetch | OperationKind::Store | OperationKind::Idle
        ),
        UntaggedResponse::Expunge(_) => {
            matches!(kind, OperationKind::Expunge | OperationKind::Idle)
        }
        _ => true,
    }
}

/// Anything but a keepalive `* OK` ends an IDLE.
const fn is_idle_data(untagged: &UntaggedResponse) -> bool {
    !matches!(
        untagged,
        UntaggedResponse::Status {
            status: Status::Ok,
            ..
        }
    )
}

async fn read_some<S: Transport>(
    stream: Option<&mut S>,
    buffer: &mut ReceiveBuffer,
) -> Result<usize> {
    match stream {
        Some(stream) => buffer.fill(stream).await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
