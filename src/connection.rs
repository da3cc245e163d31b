//! Connection management: frame reader, reply routing and command issuing

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, Stream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot, watch, Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{
        build_sendevent, build_sendmsg, execute_headers, notify_headers, validate_no_newlines,
        EslCommand, Evt,
    },
    constants::{
        COMMAND_TERMINATOR, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS,
        HEADER_CONTENT_DISPOSITION, SOCKET_BUF_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EventFormat},
    protocol::{EslMessage, EslParser, MessageType},
};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Connection status
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// Session is active.
    Connected,
    /// Session ended; the reason is final.
    Disconnected(DisconnectReason),
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Peer sent a text/disconnect-notice without linger disposition
    ServerNotice,
    /// Liveness timeout exceeded without any inbound traffic
    HeartbeatExpired,
    /// Socket read or write failed (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Malformed frame or stream desync
    ProtocolError(String),
    /// Clean EOF on the connection
    ConnectionClosed,
    /// Local side called close(), or every handle was dropped
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::HeartbeatExpired => write!(f, "liveness timeout expired"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
        }
    }
}

/// Options fixed at connection time.
///
/// Use [`Default::default()`] for standard settings and struct update syntax
/// to override single fields:
///
/// ```
/// use std::time::Duration;
/// use freeswitch_eventsocket::EslConnectOptions;
///
/// let options = EslConnectOptions {
///     command_timeout: Duration::from_secs(5),
///     ..Default::default()
/// };
/// assert!(options.liveness_timeout.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct EslConnectOptions {
    /// How long a command waits for its reply. Default: 60 seconds.
    pub command_timeout: Duration,
    /// Bound on TCP connect and on the auth handshake. Default: 2 seconds.
    pub connect_timeout: Duration,
    /// Close the connection when nothing is received for this long.
    /// Disabled by default.
    ///
    /// `api` blocks the socket on the FreeSWITCH side, so a long-running
    /// `api` call starves this timer.
    pub liveness_timeout: Option<Duration>,
}

impl Default for EslConnectOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            liveness_timeout: None,
        }
    }
}

/// A registered wait for the next reply.
struct PendingReply {
    tx: oneshot::Sender<EslEvent>,
    /// `command` takes either reply kind; sendevent/sendmsg only command/reply.
    accept_api: bool,
}

#[derive(Default)]
struct ReplySlot {
    waiter: Option<PendingReply>,
    /// Set once the connection is terminal; nothing registers afterwards.
    closed: bool,
}

/// State shared between connection handles and the reader task
struct SharedState {
    replies: Mutex<ReplySlot>,
    status_tx: watch::Sender<ConnectionStatus>,
    stop: Notify,
}

impl SharedState {
    /// Record `reason` unless the connection already ended, release the
    /// reply waiter and stop the reader. Returns the reason that won.
    async fn terminate(&self, reason: DisconnectReason) -> DisconnectReason {
        // Status first: a released waiter reads it to build its error.
        self.status_tx
            .send_if_modified(|status| match status {
                ConnectionStatus::Connected => {
                    *status = ConnectionStatus::Disconnected(reason);
                    true
                }
                ConnectionStatus::Disconnected(_) => false,
            });
        {
            let mut slot = self
                .replies
                .lock()
                .await;
            slot.closed = true;
            slot.waiter
                .take();
        }
        self.stop
            .notify_one();
        self.terminal_reason()
    }

    fn terminal_reason(&self) -> DisconnectReason {
        match &*self
            .status_tx
            .borrow()
        {
            ConnectionStatus::Disconnected(reason) => reason.clone(),
            ConnectionStatus::Connected => DisconnectReason::ConnectionClosed,
        }
    }

    /// Hand a reply to the registered waiter, or drop it when nobody waits.
    async fn deliver_reply(&self, message_type: &MessageType, reply: EslEvent) {
        let mut slot = self
            .replies
            .lock()
            .await;
        let is_api = matches!(message_type, MessageType::ApiResponse);
        match slot
            .waiter
            .take()
        {
            Some(waiter) if waiter.accept_api || !is_api => {
                if waiter
                    .tx
                    .send(reply)
                    .is_err()
                {
                    debug!("Reply waiter went away before {:?} arrived", message_type);
                }
            }
            Some(waiter) => {
                warn!("Received api/response while waiting for command/reply, ignoring");
                slot.waiter = Some(waiter);
            }
            None => {
                warn!(
                    "Received {:?} but no pending command, discarding",
                    message_type
                );
            }
        }
    }
}

struct ConnectionInner {
    writer: Mutex<BoxedWriter>,
    shared: Arc<SharedState>,
    events: Mutex<mpsc::UnboundedReceiver<EslEvent>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    remote_addr: Option<SocketAddr>,
    options: EslConnectOptions,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // Last handle gone: nobody can read events or issue commands.
        self.shared
            .stop
            .notify_one();
    }
}

/// Event Socket connection handle (Clone + Send + Sync).
///
/// All clones share one socket. Commands are serialized through the writer
/// mutex, which is held from the write until the reply arrives, so at most
/// one command is outstanding. A background reader task routes
/// `command/reply` and `api/response` frames to that command and queues
/// everything else for [`read_event`](Self::read_event).
#[derive(Clone)]
pub struct EslConnection {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for EslConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslConnection")
            .field("remote_addr", &self.inner.remote_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(
    addr: impl ToSocketAddrs,
    connect_timeout: Duration,
) -> EslResult<TcpStream> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(stream)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(EslError::Io(e))
        }
        Err(_) => {
            warn!("[CONNECT] TCP connect timed out");
            Err(EslError::Timeout {
                timeout_ms: connect_timeout.as_millis() as u64,
            })
        }
    }
}

/// Read a single message from an unsplit stream into the parser.
///
/// Only used for the auth handshake; the reader task takes over the parser
/// afterwards so bytes already buffered are not lost.
async fn recv_message<S>(
    stream: &mut S,
    parser: &mut EslParser,
    read_buffer: &mut [u8],
) -> EslResult<EslMessage>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(message) = parser.parse_message()? {
            trace!(
                "[RECV] Parsed message from buffer: {:?}",
                message.message_type
            );
            return Ok(message);
        }

        let bytes_read = stream
            .read(read_buffer)
            .await?;
        trace!("[RECV] Read {} bytes from socket", bytes_read);
        if bytes_read == 0 {
            return Err(EslError::Disconnected(DisconnectReason::ConnectionClosed));
        }
        parser.add_data(&read_buffer[..bytes_read])?;
    }
}

/// Wait for `auth/request`, answer with the password and check the reply.
async fn authenticate<S>(stream: &mut S, parser: &mut EslParser, password: &str) -> EslResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    debug!("[AUTH] Waiting for auth request");
    let greeting = recv_message(stream, parser, &mut read_buffer).await?;
    if greeting.message_type != MessageType::AuthRequest {
        return Err(EslError::protocol_error(format!(
            "Expected auth request, got {:?}",
            greeting.message_type
        )));
    }

    let auth_cmd = EslCommand::Auth {
        password: password.to_string(),
    };
    let command_str = auth_cmd.to_wire_format()?;
    debug!("[AUTH] Sending command: auth [REDACTED]");
    stream
        .write_all(command_str.as_bytes())
        .await?;
    stream
        .flush()
        .await?;

    let reply = recv_message(stream, parser, &mut read_buffer).await?;
    if reply.message_type != MessageType::CommandReply {
        return Err(EslError::protocol_error(format!(
            "Expected command/reply to auth, got {:?}",
            reply.message_type
        )));
    }
    let reply = reply.into_event();
    if !reply.is_success() {
        return Err(EslError::auth_failed(
            reply
                .reply_text()
                .unwrap_or("Authentication failed"),
        ));
    }

    debug!("[AUTH] Authentication successful");
    Ok(())
}

/// Put a frame on the generic event queue. `false` once every handle is gone.
fn queue_event(event_tx: &mpsc::UnboundedSender<EslEvent>, event: EslEvent) -> bool {
    if event_tx
        .send(event)
        .is_err()
    {
        debug!("Event receiver dropped, reader exiting");
        return false;
    }
    true
}

/// Route one parsed frame. Returns a reason when the frame ends the session.
async fn route_message(
    message: EslMessage,
    shared: &SharedState,
    event_tx: &mpsc::UnboundedSender<EslEvent>,
) -> Option<DisconnectReason> {
    let message_type = message
        .message_type
        .clone();
    let delivered = match &message_type {
        MessageType::CommandReply | MessageType::ApiResponse => {
            shared
                .deliver_reply(&message_type, message.into_event())
                .await;
            true
        }
        MessageType::Disconnect => {
            if message.header(HEADER_CONTENT_DISPOSITION) == Some("linger") {
                debug!("Received disconnect notice with linger disposition, delivering as event");
                queue_event(event_tx, message.into_event())
            } else {
                info!("Received disconnect notice from server");
                return Some(DisconnectReason::ServerNotice);
            }
        }
        MessageType::Event(format) => {
            let event = match message.decode_event() {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        "Failed to decode {} event body, delivering raw frame: {}",
                        format, e
                    );
                    message.into_event()
                }
            };
            queue_event(event_tx, event)
        }
        MessageType::AuthRequest | MessageType::Log | MessageType::Unknown(_) => {
            trace!("Queueing {:?} frame as generic event", message_type);
            queue_event(event_tx, message.into_event())
        }
    };

    if delivered {
        None
    } else {
        Some(DisconnectReason::ClientRequested)
    }
}

/// Background reader task: runs until the first terminal condition.
async fn reader_loop(
    reader: BoxedReader,
    parser: EslParser,
    shared: Arc<SharedState>,
    event_tx: mpsc::UnboundedSender<EslEvent>,
    liveness_timeout: Option<Duration>,
) {
    let result = std::panic::AssertUnwindSafe(reader_loop_inner(
        reader,
        parser,
        &shared,
        &event_tx,
        liveness_timeout,
    ))
    .catch_unwind()
    .await;

    let reason = match result {
        Ok(reason) => reason,
        Err(_) => {
            tracing::error!("reader task panicked");
            DisconnectReason::IoError("reader task panicked".to_string())
        }
    };
    let reason = shared
        .terminate(reason)
        .await;
    debug!("Reader exited: {}", reason);
    // The queue closes only after the status is final.
    drop(event_tx);
}

async fn reader_loop_inner(
    mut reader: BoxedReader,
    mut parser: EslParser,
    shared: &SharedState,
    event_tx: &mpsc::UnboundedSender<EslEvent>,
    liveness_timeout: Option<Duration>,
) -> DisconnectReason {
    let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

    loop {
        // Drain every complete frame before touching the socket again
        loop {
            match parser.parse_message() {
                Ok(Some(message)) => {
                    if let Some(reason) = route_message(message, shared, event_tx).await {
                        return reason;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Parser error: {}", e);
                    return DisconnectReason::ProtocolError(e.to_string());
                }
            }
        }

        let read = async {
            match liveness_timeout {
                Some(limit) => timeout(limit, reader.read(&mut read_buffer))
                    .await
                    .ok(),
                None => Some(
                    reader
                        .read(&mut read_buffer)
                        .await,
                ),
            }
        };

        let read_result = tokio::select! {
            _ = shared.stop.notified() => {
                debug!("Reader stopping on request");
                return DisconnectReason::ClientRequested;
            }
            result = read => result,
        };

        match read_result {
            Some(Ok(0)) => {
                if parser.has_partial_frame() {
                    warn!("Connection closed in the middle of a frame");
                    return DisconnectReason::IoError("unexpected EOF inside frame".to_string());
                }
                info!("Connection closed (EOF)");
                return DisconnectReason::ConnectionClosed;
            }
            Some(Ok(n)) => {
                trace!("[RECV] Read {} bytes from socket", n);
                if let Err(e) = parser.add_data(&read_buffer[..n]) {
                    warn!("Buffer error: {}", e);
                    return DisconnectReason::ProtocolError(e.to_string());
                }
            }
            Some(Err(e)) => {
                warn!("Read error: {}", e);
                return DisconnectReason::IoError(e.to_string());
            }
            None => {
                warn!(
                    "Liveness timeout: no traffic for {:?}",
                    liveness_timeout.unwrap_or_default()
                );
                return DisconnectReason::HeartbeatExpired;
            }
        }
    }
}

async fn shutdown_writer(writer: &mut BoxedWriter) {
    if let Err(e) = writer
        .shutdown()
        .await
    {
        debug!("Shutdown of write half failed: {}", e);
    }
}

/// Log form of a free-text command with any password hidden.
fn redact(command: &str) -> Cow<'_, str> {
    match command
        .split_whitespace()
        .next()
    {
        Some(verb) if verb.eq_ignore_ascii_case("auth") => Cow::Borrowed("auth [REDACTED]"),
        Some(verb) if verb.eq_ignore_ascii_case("userauth") => {
            Cow::Borrowed("userauth [REDACTED]")
        }
        _ => Cow::Borrowed(command),
    }
}

impl EslConnection {
    /// Connect to FreeSWITCH and authenticate with `password`.
    ///
    /// ```rust,no_run
    /// # async fn example() -> Result<(), freeswitch_eventsocket::EslError> {
    /// use freeswitch_eventsocket::EslConnection;
    ///
    /// let conn = EslConnection::dial("127.0.0.1:8021", "ClueCon").await?;
    /// let reply = conn.api("status").await?;
    /// println!("{}", reply.body().unwrap_or(""));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn dial(addr: impl ToSocketAddrs, password: &str) -> EslResult<Self> {
        Self::dial_with_options(addr, password, EslConnectOptions::default()).await
    }

    /// Like [`dial`](Self::dial) with explicit options.
    pub async fn dial_with_options(
        addr: impl ToSocketAddrs,
        password: &str,
        options: EslConnectOptions,
    ) -> EslResult<Self> {
        let mut stream = tcp_connect_with_timeout(addr, options.connect_timeout).await?;
        let remote_addr = stream
            .peer_addr()
            .ok();
        info!("[CONNECT] Connected to {:?}", remote_addr);

        let mut parser = EslParser::new();
        timeout(
            options.connect_timeout,
            authenticate(&mut stream, &mut parser, password),
        )
        .await
        .map_err(|_| EslError::Timeout {
            timeout_ms: options
                .connect_timeout
                .as_millis() as u64,
        })??;

        let (read_half, write_half) = stream.into_split();
        Ok(Self::spawn(
            Box::new(read_half),
            Box::new(write_half),
            parser,
            remote_addr,
            options,
        ))
    }

    /// Wrap an accepted socket (outbound mode). No authentication happens.
    pub(crate) fn from_tcp(stream: TcpStream, options: EslConnectOptions) -> Self {
        let remote_addr = stream
            .peer_addr()
            .ok();
        let (read_half, write_half) = stream.into_split();
        Self::spawn(
            Box::new(read_half),
            Box::new(write_half),
            EslParser::new(),
            remote_addr,
            options,
        )
    }

    /// Build a connection over any byte stream, without a handshake.
    ///
    /// Must be called from within a tokio runtime: the reader task is
    /// spawned immediately.
    pub fn from_stream<S>(
        stream: S,
        remote_addr: Option<SocketAddr>,
        options: EslConnectOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::spawn(
            Box::new(read_half),
            Box::new(write_half),
            EslParser::new(),
            remote_addr,
            options,
        )
    }

    fn spawn(
        reader: BoxedReader,
        writer: BoxedWriter,
        parser: EslParser,
        remote_addr: Option<SocketAddr>,
        options: EslConnectOptions,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SharedState {
            replies: Mutex::new(ReplySlot::default()),
            status_tx,
            stop: Notify::new(),
        });

        tokio::spawn(reader_loop(
            reader,
            parser,
            shared.clone(),
            event_tx,
            options.liveness_timeout,
        ));

        Self {
            inner: Arc::new(ConnectionInner {
                writer: Mutex::new(writer),
                shared,
                events: Mutex::new(event_rx),
                status_rx,
                remote_addr,
                options,
            }),
        }
    }

    fn disconnected(&self) -> EslError {
        EslError::Disconnected(
            self.inner
                .shared
                .terminal_reason(),
        )
    }

    /// Write `wire` and wait for the reply.
    ///
    /// The writer lock is held through the entire send-and-receive cycle so
    /// the reply slot belongs to exactly one caller (the protocol has no
    /// request ids; replies correlate by order only).
    async fn send_and_wait(&self, wire: &str, accept_api: bool) -> EslResult<EslEvent> {
        let shared = &self
            .inner
            .shared;
        let mut writer = self
            .inner
            .writer
            .lock()
            .await;

        let (tx, rx) = oneshot::channel();
        {
            let mut slot = shared
                .replies
                .lock()
                .await;
            if slot.closed {
                drop(slot);
                shutdown_writer(&mut writer).await;
                return Err(self.disconnected());
            }
            slot.waiter = Some(PendingReply { tx, accept_api });
        }

        let limit = self
            .inner
            .options
            .command_timeout;

        // A peer that stops reading stalls the write; termination and the
        // command timeout both cut it short.
        let write = async {
            match writer
                .write_all(wire.as_bytes())
                .await
            {
                Ok(()) => writer
                    .flush()
                    .await,
                Err(e) => Err(e),
            }
        };
        let write_result = tokio::select! {
            reason = self.closed() => {
                debug!("Write abandoned, connection ended: {}", reason);
                shutdown_writer(&mut writer).await;
                return Err(EslError::Disconnected(reason));
            }
            result = timeout(limit, write) => result,
        };
        match write_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Write error: {}", e);
                let reason = shared
                    .terminate(DisconnectReason::IoError(e.to_string()))
                    .await;
                shutdown_writer(&mut writer).await;
                return Err(EslError::Disconnected(reason));
            }
            Err(_) => {
                // Part of the frame may be on the wire; the stream cannot
                // be reused.
                let timeout_ms = limit.as_millis() as u64;
                warn!("Write timed out after {}ms", timeout_ms);
                shared
                    .terminate(DisconnectReason::IoError(format!(
                        "write timed out after {}ms",
                        timeout_ms
                    )))
                    .await;
                shutdown_writer(&mut writer).await;
                return Err(EslError::Timeout { timeout_ms });
            }
        }

        match timeout(limit, rx).await {
            Ok(Ok(reply)) => {
                debug!(
                    "Received {} reply: success={}",
                    reply
                        .content_type()
                        .unwrap_or("untyped"),
                    reply.is_success()
                );
                Ok(reply)
            }
            Ok(Err(_)) => {
                shutdown_writer(&mut writer).await;
                Err(self.disconnected())
            }
            Err(_) => {
                // Unregister while still holding the writer; a late reply
                // arriving before the next command registers is discarded.
                let closed = {
                    let mut slot = shared
                        .replies
                        .lock()
                        .await;
                    slot.waiter
                        .take();
                    slot.closed
                };
                if closed {
                    shutdown_writer(&mut writer).await;
                }
                let timeout_ms = limit.as_millis() as u64;
                warn!("Command timed out after {}ms", timeout_ms);
                Err(EslError::Timeout { timeout_ms })
            }
        }
    }

    /// Send a raw command line and wait for its `command/reply` or
    /// `api/response`, whichever arrives.
    ///
    /// The reply is returned as-is; use [`EslEvent::into_result`] to turn a
    /// `-ERR` Reply-Text into an error.
    ///
    /// Replies carry no request id. After a [`Timeout`](EslError::Timeout),
    /// the timed-out command's reply is discarded only if it arrives before
    /// the next command is written; later it is taken as that command's
    /// reply.
    pub async fn command(&self, text: &str) -> EslResult<EslEvent> {
        validate_no_newlines(text, "command")?;
        debug!("Sending command: {}", redact(text));
        let mut wire = String::with_capacity(text.len() + COMMAND_TERMINATOR.len());
        wire.push_str(text);
        wire.push_str(COMMAND_TERMINATOR);
        self.send_and_wait(&wire, true)
            .await
    }

    /// Send a typed command and wait for its reply.
    pub async fn send_command(&self, command: EslCommand) -> EslResult<EslEvent> {
        let wire = command.to_wire_format()?;
        match &command {
            EslCommand::Auth { .. } => debug!("Sending command: auth [REDACTED]"),
            _ => debug!("Sending command: {}", wire.trim_end()),
        }
        self.send_and_wait(&wire, true)
            .await
    }

    /// Send a typed command and require `+OK`.
    async fn send_command_ok(&self, command: EslCommand) -> EslResult<EslEvent> {
        self.send_command(command)
            .await?
            .into_result()
    }

    /// Fire a custom event into FreeSWITCH (`sendevent <name>`).
    ///
    /// `body` is transmitted only if `evt` carries a non-empty
    /// `content-length` header; keeping its value equal to the body's byte
    /// length is the caller's job.
    ///
    /// ```rust,no_run
    /// # async fn example(conn: &freeswitch_eventsocket::EslConnection) -> Result<(), freeswitch_eventsocket::EslError> {
    /// use freeswitch_eventsocket::Evt;
    ///
    /// let body = "Hello";
    /// let evt = Evt::new()
    ///     .header("profile", "internal")
    ///     .header("content-type", "text/plain")
    ///     .header("content-length", body.len().to_string());
    /// conn.send_event("SEND_MESSAGE", &evt, body).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_event(&self, name: &str, evt: &Evt, body: &str) -> EslResult<EslEvent> {
        let wire = build_sendevent(name, evt, body)?;
        debug!("Sending sendevent {} ({} headers)", name, evt.len());
        self.send_and_wait(&wire, false)
            .await
    }

    /// Ask the `internal` SIP profile to send a `NOTIFY` with
    /// `event-string: check-sync` to `user@host`, carrying `content`.
    ///
    /// `content-length` is computed from `content`.
    pub async fn send_event_notify(
        &self,
        user: &str,
        host: &str,
        content_type: &str,
        content: &str,
    ) -> EslResult<EslEvent> {
        let evt = notify_headers(user, host, content_type, content);
        self.send_event("NOTIFY", &evt, content)
            .await
    }

    /// Send a `sendmsg` frame, to `uuid` or (outbound mode) to the
    /// connected channel when `uuid` is `None`.
    pub async fn send_msg(&self, uuid: Option<&str>, evt: &Evt, body: &str) -> EslResult<EslEvent> {
        let wire = build_sendmsg(uuid, evt, body)?;
        debug!("Sending sendmsg {}", uuid.unwrap_or("<session>"));
        self.send_and_wait(&wire, false)
            .await
    }

    /// Run a dialplan application on the connected channel (outbound mode).
    ///
    /// Returns once FreeSWITCH accepted the request, not when the application
    /// finished; watch for `CHANNEL_EXECUTE_COMPLETE` for that. With `lock`,
    /// FreeSWITCH queues the application behind the previous one.
    pub async fn execute(&self, app: &str, arg: &str, lock: bool) -> EslResult<EslEvent> {
        self.send_msg(None, &execute_headers(app, arg, lock), "")
            .await
    }

    /// Run a dialplan application on the channel `uuid`.
    pub async fn execute_uuid(
        &self,
        uuid: &str,
        app: &str,
        arg: &str,
        lock: bool,
    ) -> EslResult<EslEvent> {
        self.send_msg(Some(uuid), &execute_headers(app, arg, lock), "")
            .await
    }

    /// Send `auth <password>` on an established connection.
    pub async fn auth(&self, password: &str) -> EslResult<EslEvent> {
        let reply = self
            .send_command(EslCommand::Auth {
                password: password.to_string(),
            })
            .await?;
        if !reply.is_success() {
            return Err(EslError::auth_failed(
                reply
                    .reply_text()
                    .unwrap_or("Authentication failed"),
            ));
        }
        Ok(reply)
    }

    /// Execute API command. Blocks until FreeSWITCH completes the command.
    ///
    /// FreeSWITCH blocks the socket during `api`; no events are delivered
    /// until it returns. Use [`bgapi`](Self::bgapi) for long-running commands.
    pub async fn api(&self, command: &str) -> EslResult<EslEvent> {
        self.send_command(EslCommand::Api {
            command: command.to_string(),
        })
        .await
    }

    /// Execute a background API command. The result arrives later as a
    /// `BACKGROUND_JOB` event carrying the returned `Job-UUID`.
    pub async fn bgapi(&self, command: &str) -> EslResult<EslEvent> {
        self.send_command(EslCommand::BgApi {
            command: command.to_string(),
        })
        .await
    }

    /// Subscribe to events, e.g. `subscribe_events(EventFormat::Plain, "ALL")`.
    pub async fn subscribe_events(&self, format: EventFormat, events: &str) -> EslResult<EslEvent> {
        self.send_command_ok(EslCommand::Events {
            format,
            events: events.to_string(),
        })
        .await
    }

    /// Subscribe to events of the connected session only (outbound mode).
    pub async fn myevents(&self, format: EventFormat) -> EslResult<EslEvent> {
        self.send_command_ok(EslCommand::MyEvents { format })
            .await
    }

    /// Keep the socket open after hangup so final events still arrive.
    pub async fn linger(&self, timeout: Option<u32>) -> EslResult<EslEvent> {
        self.send_command_ok(EslCommand::Linger { timeout })
            .await
    }

    /// Cancel linger mode.
    pub async fn nolinger(&self) -> EslResult<EslEvent> {
        self.send_command_ok(EslCommand::NoLinger)
            .await
    }

    /// Take control of the session (outbound mode). The reply carries the
    /// channel data as headers.
    pub async fn connect_session(&self) -> EslResult<EslEvent> {
        self.send_command(EslCommand::Connect)
            .await
    }

    /// Resume dialplan execution when the socket disconnects.
    pub async fn resume(&self) -> EslResult<EslEvent> {
        self.send_command_ok(EslCommand::Resume)
            .await
    }

    /// Ask FreeSWITCH to close the session.
    pub async fn exit(&self) -> EslResult<EslEvent> {
        self.send_command(EslCommand::Exit)
            .await
    }

    /// Receive the next generic event in arrival order.
    ///
    /// Events queued before the connection ended are still returned; after
    /// that the terminal reason is reported as [`EslError::Disconnected`].
    pub async fn read_event(&self) -> EslResult<EslEvent> {
        let mut events = self
            .inner
            .events
            .lock()
            .await;
        match events
            .recv()
            .await
        {
            Some(event) => Ok(event),
            None => Err(self.disconnected()),
        }
    }

    /// Generic events as a stream that ends when the connection does.
    pub fn event_stream(&self) -> impl Stream<Item = EslEvent> + Send + 'static {
        futures_util::stream::unfold(self.clone(), |conn| async move {
            match conn
                .read_event()
                .await
            {
                Ok(event) => Some((event, conn)),
                Err(e) => {
                    debug!("Event stream ended: {}", e);
                    None
                }
            }
        })
    }

    /// Peer address, `None` for in-memory transports.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner
            .remote_addr
    }

    /// Options this connection was built with.
    pub fn options(&self) -> &EslConnectOptions {
        &self
            .inner
            .options
    }

    /// Whether the connection is alive (not yet disconnected).
    pub fn is_connected(&self) -> bool {
        matches!(
            *self
                .inner
                .status_rx
                .borrow(),
            ConnectionStatus::Connected
        )
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .status_rx
            .borrow()
            .clone()
    }

    /// Wait until the connection ends and return why.
    pub async fn closed(&self) -> DisconnectReason {
        let mut status_rx = self
            .inner
            .status_rx
            .clone();
        loop {
            let current = status_rx
                .borrow_and_update()
                .clone();
            if let ConnectionStatus::Disconnected(reason) = current {
                return reason;
            }
            if status_rx
                .changed()
                .await
                .is_err()
            {
                return self
                    .inner
                    .shared
                    .terminal_reason();
            }
        }
    }

    /// Close the connection: pending and later calls fail with
    /// [`DisconnectReason::ClientRequested`] (unless the connection had
    /// already failed), the reader stops and the write half is shut down.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let reason = self
            .inner
            .shared
            .terminate(DisconnectReason::ClientRequested)
            .await;
        info!("Connection closed by client ({})", reason);

        // A command in flight owns the writer; it sees the terminal status
        // and shuts the write half down itself.
        match self
            .inner
            .writer
            .try_lock()
        {
            Ok(mut writer) => shutdown_writer(&mut writer).await,
            Err(_) => debug!("Writer busy, in-flight command shuts it down"),
        }
    }
}
