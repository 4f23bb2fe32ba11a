//! Common test utilities for PinSockets integration tests
//!
//! - `ScriptedTransport`: in-memory transport that fails or accepts per a script
//! - `TlsWsServer`: real TLS WebSocket server with a self-signed certificate
//! - helpers for waiting on client state and draining events

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pinsockets::{ConnectionState, Event, PinSocketError, PinnedClient, WsTransport};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const TEST_ENDPOINT: &str = "wss://pinned.test/socket";

/// Pin that no real key hashes to
pub const ZERO_HASH: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Outcome of one scripted connect attempt
#[derive(Debug, Clone)]
pub enum Step {
    Fail(&'static str),
    Accept,
}

/// Server side of an accepted in-memory session
pub type ServerSocket = WebSocketStream<DuplexStream>;

/// Transport that plays back a script of failures and accepts
///
/// Once the script runs out every attempt fails.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
    sessions: mpsc::UnboundedSender<ServerSocket>,
}

/// Test-side view of a `ScriptedTransport`
pub struct ScriptHandle {
    attempts: Arc<Mutex<Vec<Instant>>>,
    pub sessions: mpsc::UnboundedReceiver<ServerSocket>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> (Self, ScriptHandle) {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            script: Mutex::new(steps.into_iter().collect()),
            attempts: Arc::clone(&attempts),
            sessions: tx,
        };
        (transport, ScriptHandle { attempts, sessions: rx })
    }
}

#[async_trait]
impl WsTransport for ScriptedTransport {
    type Stream = DuplexStream;

    async fn connect(&self, endpoint: &str) -> pinsockets::Result<WebSocketStream<DuplexStream>> {
        self.attempts.lock().push(Instant::now());
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(Step::Fail("connection refused"));
        verbose_println!("  connect {} -> {:?}", endpoint, step);

        match step {
            Step::Fail(reason) => Err(PinSocketError::Transport(reason.to_string())),
            Step::Accept => {
                let (client_io, server_io) = tokio::io::duplex(64 * 1024);
                let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
                let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
                let _ = self.sessions.send(server);
                Ok(client)
            }
        }
    }
}

impl ScriptHandle {
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    /// Gaps between consecutive attempts, in milliseconds
    pub fn gaps_ms(&self) -> Vec<u128> {
        self.attempts()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect()
    }

    /// Wait (in tokio time) until at least `count` attempts happened
    pub async fn wait_for_attempts(&self, count: usize) {
        for _ in 0..5_000 {
            if self.attempt_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} attempts, saw {}",
            count,
            self.attempt_count()
        );
    }

    pub async fn next_session(&mut self) -> ServerSocket {
        self.sessions
            .recv()
            .await
            .expect("transport dropped before accepting a session")
    }
}

/// Wait (in tokio time) until the client reports `state`
pub async fn wait_for_state<T: WsTransport>(client: &PinnedClient<T>, state: ConnectionState) {
    for _ in 0..5_000 {
        if client.ready_state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected state {:?}, still {:?}",
        state,
        client.ready_state()
    );
}

/// Drain delivered events until one matches `stop`, inclusive
///
/// Yields to the runtime between polls without advancing tokio time, so the
/// connection task keeps running while the dispatch thread delivers.
pub async fn events_until(
    rx: &crossbeam_channel::Receiver<Event>,
    stop: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => {
                let done = stop(&event);
                events.push(event);
                if done {
                    return events;
                }
            }
            Err(crossbeam_channel::TryRecvError::Empty) if std::time::Instant::now() < deadline => {
                tokio::task::yield_now().await;
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => panic!("stopped waiting for events ({:?}), got {:?}", e, events),
        }
    }
}

pub fn is_closed(event: &Event) -> bool {
    matches!(event, Event::Closed { .. })
}

/// Read texts from a server socket until the client goes away
///
/// Close frames are answered by tungstenite while reading continues.
pub fn spawn_server_reader(mut server: ServerSocket) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(Ok(msg)) = server.next().await {
            let is_close = msg.is_close();
            if tx.send(msg).is_err() {
                break;
            }
            if is_close {
                // Flushes the close reply queued by tungstenite
                let _ = server.close(None).await;
                break;
            }
        }
    });
    rx
}

/// TLS WebSocket server with a fresh self-signed certificate
///
/// Every upgraded session echoes text frames back prefixed with `echo:`.
pub struct TlsWsServer {
    pub addr: SocketAddr,
    /// Pin matching the server's leaf key
    pub key_hash: String,
    /// TCP connections accepted
    pub accepted: Arc<AtomicUsize>,
    /// Sessions that completed the WebSocket upgrade
    pub upgraded: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

impl TlsWsServer {
    pub async fn start() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key_hash = pinsockets::leaf_key_hash(certified.cert.der()).unwrap();

        let key = rustls::pki_types::PrivateKeyDer::Pkcs8(
            rustls::pki_types::PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()),
        );
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![certified.cert.der().clone()], key)
        .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let upgraded = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(Notify::new());

        {
            let accepted = Arc::clone(&accepted);
            let upgraded = Arc::clone(&upgraded);
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            let Ok((stream, _)) = result else { break };
                            accepted.fetch_add(1, Ordering::SeqCst);
                            let acceptor = acceptor.clone();
                            let upgraded = Arc::clone(&upgraded);
                            tokio::spawn(async move {
                                Self::handle_connection(acceptor, stream, upgraded).await;
                            });
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            });
        }

        Self {
            addr,
            key_hash,
            accepted,
            upgraded,
            shutdown,
        }
    }

    async fn handle_connection(
        acceptor: tokio_rustls::TlsAcceptor,
        stream: tokio::net::TcpStream,
        upgraded: Arc<AtomicUsize>,
    ) {
        let tls = match acceptor.accept(stream).await {
            Ok(tls) => tls,
            Err(e) => {
                verbose_println!("  TLS accept failed: {}", e);
                return;
            }
        };
        let ws = match tokio_tungstenite::accept_async(tls).await {
            Ok(ws) => ws,
            Err(e) => {
                verbose_println!("  WebSocket upgrade failed: {}", e);
                return;
            }
        };
        upgraded.fetch_add(1, Ordering::SeqCst);

        let (mut write, mut read) = ws.split();
        while let Some(Ok(msg)) = read.next().await {
            match msg {
                Message::Text(text) => {
                    if write.send(Message::Text(format!("echo:{}", text))).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => {
                    let _ = write.close().await;
                    break;
                }
                _ => {}
            }
        }
    }

    pub fn wss_url(&self) -> String {
        format!("wss://{}/", self.addr)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn upgraded(&self) -> usize {
        self.upgraded.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for TlsWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
