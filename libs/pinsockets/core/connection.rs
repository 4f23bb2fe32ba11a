//! Resilient connection task
//!
//! One task per `connect()` call. It owns the session stream and the retry
//! counter, drives every state transition except the caller's `Closing`, and
//! is the only producer of events.
//!
//! ```text
//!            connect()                 handshake ok
//! CLOSED ───────────────> CONNECTING ───────────────> OPEN
//!                          ▲      │ failure             │ failure
//!                          └──────┴─────────────────────┘  (sleep min(1s * n, 10s))
//!
//! OPEN ── close() / peer close frame ──> CLOSING ──> CLOSED
//! ```

use crate::connection_state::{AtomicConnectionState, ConnectionState};
use crate::event::{Event, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::observers::{Dispatch, ObserverRegistry};
use crate::traits::{DiagnosticLevel, DiagnosticsSink, PinSocketError, ReconnectionStrategy, WsTransport};
use crossbeam_channel::Sender;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Close code reported when the peer's close frame carried no status
const NO_STATUS_RECEIVED: u16 = 1005;

/// Reason attached to the final `Closed` when the strategy stops retrying
pub const RETRIES_EXHAUSTED_REASON: &str = "reconnection attempts exhausted";

/// Commands sent from the client handle to the connection task
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Text frame, tagged with the session generation seen by the caller
    Send { generation: u64, text: String },
    /// Caller requested close
    Close,
}

/// State shared between the client handle and one connection task
pub(crate) struct ConnectionShared {
    pub(crate) state: Arc<AtomicConnectionState>,
    /// Incremented each time a session opens
    pub(crate) generation: Arc<AtomicU64>,
    /// Set by `close()`; checked before every reconnect
    pub(crate) close_requested: Arc<AtomicBool>,
    pub(crate) observers: Arc<ObserverRegistry>,
    pub(crate) dispatch_tx: Sender<Dispatch>,
}

/// Static settings for one connection task
pub(crate) struct ConnectionSettings<T: WsTransport> {
    pub(crate) endpoint: String,
    pub(crate) transport: Arc<T>,
    pub(crate) strategy: Arc<dyn ReconnectionStrategy>,
    pub(crate) diagnostics: Arc<dyn DiagnosticsSink>,
    pub(crate) close_timeout: Duration,
}

type SessionWriter<S> = SplitSink<WebSocketStream<S>, Message>;
type SessionReader<S> = SplitStream<WebSocketStream<S>>;

/// Result of one handshake attempt
enum Attempt<S> {
    Connected(WebSocketStream<S>),
    Failed(PinSocketError),
    CloseRequested,
}

/// How an open session ended
enum SessionEnd {
    /// Network-level failure: take the reconnect edge
    Failed(PinSocketError),
    /// Close handshake finished; events already emitted
    Closed,
}

pub(crate) struct ResilientConnection<T: WsTransport> {
    settings: ConnectionSettings<T>,
    shared: ConnectionShared,
    commands: UnboundedReceiver<ConnectionCommand>,
    retry_count: usize,
}

impl<T: WsTransport> ResilientConnection<T> {
    pub(crate) fn new(
        settings: ConnectionSettings<T>,
        shared: ConnectionShared,
        commands: UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        Self {
            settings,
            shared,
            commands,
            retry_count: 0,
        }
    }

    /// Main connection loop
    pub(crate) async fn run(mut self) {
        loop {
            // A stale wake-up after close() must not reconnect
            if self.close_requested() {
                self.close_without_session();
                break;
            }

            self.shared.state.advance(ConnectionState::Connecting);
            self.record(
                DiagnosticLevel::Debug,
                &format!(
                    "Connecting to {} (retry {})",
                    self.settings.endpoint, self.retry_count
                ),
            );

            let end = match self.attempt().await {
                Attempt::Connected(stream) => self.drive_session(stream).await,
                Attempt::Failed(e) => SessionEnd::Failed(e),
                Attempt::CloseRequested => {
                    self.close_without_session();
                    break;
                }
            };

            let err = match end {
                SessionEnd::Closed => break,
                SessionEnd::Failed(err) => err,
            };

            if self.close_requested() {
                self.close_without_session();
                break;
            }

            self.shared.state.advance(ConnectionState::Connecting);
            error!("Connection to {} failed: {}", self.settings.endpoint, err);
            self.record(DiagnosticLevel::Error, &format!("Connection failed: {}", err));
            self.emit(Event::failure(&err));

            self.retry_count += 1;
            let strategy = &self.settings.strategy;
            let next = if strategy.should_reconnect(self.retry_count) {
                strategy.next_delay(self.retry_count)
            } else {
                None
            };
            match next {
                Some(delay) => {
                    info!(
                        "Reconnecting in {:?} (retry {})",
                        delay, self.retry_count
                    );
                    self.record(
                        DiagnosticLevel::Warn,
                        &format!(
                            "Reconnecting in {}ms (retry {})",
                            delay.as_millis(),
                            self.retry_count
                        ),
                    );

                    if !self.wait_before_retry(delay).await {
                        self.close_without_session();
                        break;
                    }
                }
                None => {
                    warn!("Reconnection strategy exhausted, stopping");
                    self.record(DiagnosticLevel::Warn, RETRIES_EXHAUSTED_REASON);
                    self.finish(ABNORMAL_CLOSURE, RETRIES_EXHAUSTED_REASON.to_string());
                    break;
                }
            }
        }

        debug!("Connection task for {} exiting", self.settings.endpoint);
    }

    /// Run one handshake, abandoning it if the caller closes meanwhile
    async fn attempt(&mut self) -> Attempt<T::Stream> {
        let transport = Arc::clone(&self.settings.transport);
        let endpoint = self.settings.endpoint.clone();
        let handshake = async move { transport.connect(&endpoint).await };
        tokio::pin!(handshake);

        loop {
            tokio::select! {
                result = &mut handshake => {
                    return match result {
                        Ok(stream) => Attempt::Connected(stream),
                        Err(e) => Attempt::Failed(e),
                    };
                }
                cmd = self.commands.recv() => match cmd {
                    Some(ConnectionCommand::Close) | None => return Attempt::CloseRequested,
                    Some(ConnectionCommand::Send { .. }) => {
                        debug!("Discarding message queued for a previous session");
                    }
                }
            }
        }
    }

    /// Pump an open session until it fails or closes
    async fn drive_session(&mut self, stream: WebSocketStream<T::Stream>) -> SessionEnd {
        // Bumped before OPEN is stored; send() depends on this order
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (mut write, mut read) = stream.split();

        if !self.shared.state.advance(ConnectionState::Open) {
            debug!("Close requested during handshake, closing fresh session");
            return self.close_session(&mut write, &mut read).await;
        }

        self.retry_count = 0;
        info!("Connected to {}", self.settings.endpoint);
        self.record(DiagnosticLevel::Debug, "Connection opened");
        self.emit(Event::Opened);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(ConnectionCommand::Send { generation: tagged, text }) => {
                        if tagged != generation {
                            debug!("Discarding message queued for a previous session");
                            continue;
                        }
                        if let Err(e) = write.send(Message::Text(text)).await {
                            return SessionEnd::Failed(PinSocketError::Transport(e.to_string()));
                        }
                    }
                    Some(ConnectionCommand::Close) | None => {
                        return self.close_session(&mut write, &mut read).await;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.emit(Event::message(text)),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => self.emit(Event::message(text)),
                        Err(_) => {
                            warn!("Dropping non UTF-8 binary frame");
                            self.record(DiagnosticLevel::Warn, "Dropped non UTF-8 binary frame");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        return self.peer_closed(frame, &mut read).await;
                    }
                    // Ping/pong replies are handled inside tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return SessionEnd::Failed(PinSocketError::Transport(e.to_string()));
                    }
                    None => {
                        return SessionEnd::Failed(PinSocketError::Transport(
                            "stream ended without a close frame".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// Caller-initiated close of a live session
    async fn close_session(
        &mut self,
        write: &mut SessionWriter<T::Stream>,
        read: &mut SessionReader<T::Stream>,
    ) -> SessionEnd {
        self.shared.state.advance(ConnectionState::Closing);
        info!("Closing connection to {}", self.settings.endpoint);
        self.emit(Event::closing(NORMAL_CLOSURE, ""));

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = write.send(Message::Close(Some(frame))).await {
            debug!("Failed to send close frame: {}", e);
        }

        let echoed = await_peer_close(read, self.settings.close_timeout).await;
        let (code, reason) = match echoed {
            Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
            None => (NORMAL_CLOSURE, String::new()),
        };

        self.finish(code, reason);
        SessionEnd::Closed
    }

    /// Peer sent a close frame first
    async fn peer_closed(
        &mut self,
        frame: Option<CloseFrame<'static>>,
        read: &mut SessionReader<T::Stream>,
    ) -> SessionEnd {
        let (code, reason) = match frame {
            Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
            None => (NO_STATUS_RECEIVED, String::new()),
        };

        self.shared.state.advance(ConnectionState::Closing);
        info!("Server closed connection: {} {}", code, reason);
        self.emit(Event::closing(code, reason.clone()));

        // Reading flushes tungstenite's queued close reply
        let _ = await_peer_close(read, self.settings.close_timeout).await;

        self.finish(code, reason);
        SessionEnd::Closed
    }

    /// Sleep before the next attempt; false if close() arrived meanwhile
    async fn wait_before_retry(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return !self.close_requested(),
                cmd = self.commands.recv() => match cmd {
                    Some(ConnectionCommand::Close) | None => return false,
                    Some(ConnectionCommand::Send { .. }) => {
                        debug!("Discarding message queued for a previous session");
                    }
                }
            }
        }
    }

    /// Closing then Closed without a live session (close during handshake or backoff)
    fn close_without_session(&mut self) {
        self.shared.state.advance(ConnectionState::Closing);
        info!("Closing connection to {}", self.settings.endpoint);
        self.emit(Event::closing(NORMAL_CLOSURE, ""));
        self.finish(NORMAL_CLOSURE, String::new());
    }

    /// Emit the final `Closed`, release observers if the caller closed, then enter CLOSED
    ///
    /// The state is stored last so a new `connect()` cannot start before the
    /// observer cleanup for this run is queued.
    fn finish(&mut self, code: u16, reason: String) {
        self.record(
            DiagnosticLevel::Debug,
            &format!("Connection closed: {} {}", code, reason),
        );
        self.emit(Event::closed(code, reason));

        if self.close_requested() {
            let watermark = self.shared.observers.watermark();
            let _ = self.shared.dispatch_tx.send(Dispatch::ClearObservers(watermark));
        }

        self.shared.state.advance(ConnectionState::Closed);
    }

    #[inline]
    fn close_requested(&self) -> bool {
        self.shared.close_requested.load(Ordering::Acquire)
    }

    fn emit(&self, event: Event) {
        debug!("Emitting {:?}", event);
        let _ = self.shared.dispatch_tx.send(Dispatch::Event(event));
    }

    fn record(&self, level: DiagnosticLevel, message: &str) {
        self.settings.diagnostics.record(level, message);
    }
}

/// Read until the peer's close frame or end of stream, bounded by `close_timeout`
async fn await_peer_close<S>(
    read: &mut SessionReader<S>,
    close_timeout: Duration,
) -> Option<CloseFrame<'static>>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let drain = async {
        let mut echoed = None;
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Close(frame)) => echoed = echoed.or(frame),
                Ok(_) => {}
                Err(_) => break,
            }
        }
        echoed
    };

    match tokio::time::timeout(close_timeout, drain).await {
        Ok(echoed) => echoed,
        Err(_) => {
            warn!("Close handshake timed out after {:?}", close_timeout);
            None
        }
    }
}
