//! Chat Session Driver
//!
//! Owns the single WebSocket connection for a chat session. A background
//! task runs the connect / pump / reconnect loop and feeds socket events into
//! [`ChatState`]; callers talk to it through a command channel and observe it
//! through a `watch` snapshot plus a `broadcast` channel of notices.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::reconnect::ReconnectPolicy;
use super::state::{ChatNotice, ChatSnapshot, ChatState, ConnectionState, FrameEffect};
use crate::config::Config;
use crate::session::SessionIdentity;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Capacity of the notice broadcast channel
const NOTICE_CAPACITY: usize = 64;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for a chat session
#[derive(Debug, Clone)]
pub struct ChatSessionConfig {
    /// WebSocket origin, e.g. "ws://localhost:8000"
    pub ws_base: String,
    pub reconnect: ReconnectPolicy,
    /// Deadline for the WebSocket handshake
    pub connect_timeout: Duration,
}

impl ChatSessionConfig {
    pub fn new(ws_base: impl Into<String>, reconnect: ReconnectPolicy) -> Self {
        Self {
            ws_base: ws_base.into(),
            reconnect,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.chat.ws_base(&config.backend), config.chat.reconnect.clone())
            .with_connect_timeout(Duration::from_millis(config.chat.connect_timeout_ms))
    }
}

enum Command {
    Send(String),
    Reconnect,
    Shutdown,
}

/// How a phase of the driver loop ended
enum Flow {
    /// Socket dropped; follow the reconnect policy
    Disconnected,
    /// Reconnect right away
    Reconnect,
    /// Session torn down
    Stop,
}

/// Handle to a running chat session
///
/// Dropping the handle aborts the driver task, cancelling any pending
/// reconnect timer.
pub struct ChatSession {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChatSnapshot>,
    notices: broadcast::Sender<ChatNotice>,
    task: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Start connecting in the background
    pub fn spawn(config: ChatSessionConfig, identity: Arc<SessionIdentity>) -> Self {
        let state = ChatState::new(config.reconnect.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            ws_base: config.ws_base.trim_end_matches('/').to_string(),
            connect_timeout: config.connect_timeout,
            identity,
            state,
            snapshot: snapshot_tx,
            notices: notice_tx.clone(),
            commands: command_rx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            notices: notice_tx,
            task: Some(task),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.snapshot.borrow().connection
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Observe state and transcript changes
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot.clone()
    }

    /// Observe transient notifications
    pub fn notices(&self) -> broadcast::Receiver<ChatNotice> {
        self.notices.subscribe()
    }

    /// Send a chat message
    ///
    /// Returns false, and does nothing, unless the socket is open and the
    /// content is not blank.
    pub fn send(&self, content: &str) -> bool {
        if !self.snapshot.borrow().is_open() || content.trim().is_empty() {
            return false;
        }
        self.commands.send(Command::Send(content.to_string())).is_ok()
    }

    /// Skip any pending delay and connect now
    pub fn reconnect_now(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Close the socket and stop the driver; no reconnect happens afterwards
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Chat driver ended abnormally");
            }
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver {
    ws_base: String,
    connect_timeout: Duration,
    identity: Arc<SessionIdentity>,
    state: ChatState,
    snapshot: watch::Sender<ChatSnapshot>,
    notices: broadcast::Sender<ChatNotice>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Driver {
    async fn run(mut self) {
        let mut next_attempt = Some(Instant::now());

        loop {
            if let Flow::Stop = self.wait_for_attempt(next_attempt).await {
                break;
            }

            self.state.on_connecting();
            self.publish();

            let flow = match self.connect().await {
                Some(Ok(socket)) => {
                    self.state.on_open();
                    self.publish();
                    tracing::info!(url = %self.url(), "Chat socket connected");
                    self.pump(socket).await
                }
                Some(Err(e)) => {
                    tracing::warn!(url = %self.url(), error = %e, "Chat socket connection failed");
                    Flow::Disconnected
                }
                None => Flow::Stop,
            };

            next_attempt = match flow {
                Flow::Stop => break,
                Flow::Reconnect => Some(Instant::now()),
                Flow::Disconnected => {
                    let delay = self.state.on_closed();
                    self.publish();
                    match delay {
                        Some(delay) => {
                            tracing::info!(
                                delay_ms = delay.as_millis() as u64,
                                attempt = self.state.snapshot().reconnect_attempt,
                                "Chat socket closed, reconnect scheduled"
                            );
                            Some(Instant::now() + delay)
                        }
                        None => {
                            tracing::warn!("Chat socket closed, not reconnecting");
                            None
                        }
                    }
                }
            };
        }

        self.state.shutdown();
        self.publish();
        tracing::debug!("Chat driver stopped");
    }

    fn url(&self) -> String {
        let session_id = self.identity.session_id();
        format!(
            "{}/ws/{}",
            self.ws_base,
            urlencoding::encode(session_id.as_str())
        )
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.state.snapshot());
    }

    /// Wait out the reconnect delay while still answering commands
    async fn wait_for_attempt(&mut self, at: Option<Instant>) -> Flow {
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(at.unwrap_or_else(Instant::now)), if at.is_some() => {
                    return Flow::Reconnect;
                }
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => return Flow::Stop,
                    Some(Command::Reconnect) => {
                        tracing::info!("Manual reconnect requested");
                        return Flow::Reconnect;
                    }
                    Some(Command::Send(_)) => {
                        tracing::debug!("Send ignored: socket not open");
                    }
                },
            }
        }
    }

    /// Run the handshake; `None` means shutdown was requested meanwhile
    ///
    /// A handshake that outlives `connect_timeout` fails with a timed-out I/O
    /// error. A reconnect request abandons the attempt and starts over.
    async fn connect(&mut self) -> Option<Result<Socket, WsError>> {
        let timeout = self.connect_timeout;

        loop {
            let url = self.url();
            tracing::debug!(url = %url, "Connecting chat socket");

            let handshake = tokio::time::timeout(timeout, connect_async(url));
            tokio::pin!(handshake);

            loop {
                tokio::select! {
                    result = &mut handshake => {
                        return Some(match result {
                            Ok(connected) => connected.map(|(socket, _response)| socket),
                            Err(_) => Err(WsError::Io(std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                format!("handshake timed out after {}ms", timeout.as_millis()),
                            ))),
                        });
                    }
                    command = self.commands.recv() => match command {
                        None | Some(Command::Shutdown) => return None,
                        Some(Command::Reconnect) => {
                            tracing::info!("Manual reconnect requested, restarting handshake");
                            break;
                        }
                        Some(Command::Send(_)) => {
                            tracing::debug!("Send ignored: socket still connecting");
                        }
                    },
                }
            }
        }
    }

    /// Move frames in both directions until the socket drops
    async fn pump(&mut self, socket: Socket) -> Flow {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!("Dropping binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(frame = ?frame, "Server closed chat socket");
                        return Flow::Disconnected;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Chat socket error");
                        return Flow::Disconnected;
                    }
                    None => return Flow::Disconnected,
                },
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Flow::Stop;
                    }
                    Some(Command::Reconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Flow::Reconnect;
                    }
                    Some(Command::Send(content)) => {
                        let Some(frame) = self.state.prepare_send(&content) else {
                            continue;
                        };
                        self.publish();

                        let text = match frame.encode() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to encode chat frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            tracing::warn!(error = %e, "Chat send failed");
                            return Flow::Disconnected;
                        }
                    }
                },
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        match self.state.on_frame(text) {
            FrameEffect::TranscriptUpdated => self.publish(),
            FrameEffect::Notify(notice) => {
                tracing::info!(notice = %notice, "Chat notice");
                // No subscribers is fine; notices are transient
                let _ = self.notices.send(notice);
            }
            FrameEffect::AdoptSession(id) => self.identity.adopt(id),
            FrameEffect::Ignored => {}
        }
    }
}
