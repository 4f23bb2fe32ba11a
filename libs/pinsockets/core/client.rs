use crate::builder::states::{NoEndpoint, NoTransport};
use crate::builder::PinnedClientBuilder;
use crate::connection::{ConnectionCommand, ConnectionSettings, ConnectionShared, ResilientConnection};
use crate::connection_state::{AtomicConnectionState, ConnectionState};
use crate::event::{Event, EventKind};
use crate::observers::{channel_observer, spawn_dispatcher, Dispatch, ObserverId, ObserverRegistry};
use crate::pinning::ExpectedKeyHash;
use crate::secure_transport::SecureTransportFactory;
use crate::traits::*;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info};

/// Handles of the connection task started by the latest `connect()`
struct ActiveRun {
    command_tx: UnboundedSender<ConnectionCommand>,
    close_requested: Arc<AtomicBool>,
}

/// Pinned, self-healing WebSocket client
///
/// The handle is cheap to query from any thread:
/// - `ready_state()` reads an atomic
/// - `send()` validates the state and queues the text for the connection task
/// - observers run on a dedicated dispatch thread, in the order events occurred
///
/// One `connect()` starts one connection task on the tokio runtime the client
/// was built in. The task reconnects after failures until `close()` is called
/// or the reconnection strategy gives up.
///
/// # Type Parameters
/// - `T`: transport used to open sessions (pinned TLS by default)
pub struct PinnedClient<T: WsTransport = SecureTransportFactory> {
    endpoint: String,
    transport: Arc<T>,
    reconnect_strategy: Arc<dyn ReconnectionStrategy>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    close_timeout: Duration,
    runtime: tokio::runtime::Handle,
    state: Arc<AtomicConnectionState>,
    generation: Arc<AtomicU64>,
    observers: Arc<ObserverRegistry>,
    dispatch_tx: Sender<Dispatch>,
    /// Serialises connect() and close() against each other
    active: Mutex<Option<ActiveRun>>,
}

impl PinnedClient<SecureTransportFactory> {
    /// Client for `endpoint` that trusts only the key hashed by `expected`
    ///
    /// Starts in CLOSED; nothing connects until `connect()`.
    pub fn new(endpoint: impl Into<String>, expected: ExpectedKeyHash) -> Result<Self> {
        Self::builder().endpoint(endpoint).pin(expected)?.build()
    }

    /// Start the type-state builder
    pub fn builder() -> PinnedClientBuilder<NoEndpoint, NoTransport> {
        PinnedClientBuilder::new()
    }
}

impl<T: WsTransport> PinnedClient<T> {
    /// Called by the builder's `build()` method
    pub(crate) fn new_with(
        endpoint: String,
        transport: Arc<T>,
        reconnect_strategy: Arc<dyn ReconnectionStrategy>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        close_timeout: Duration,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            PinSocketError::Configuration(format!("client must be built inside a tokio runtime: {}", e))
        })?;

        let observers = Arc::new(ObserverRegistry::new());
        let (dispatch_tx, dispatch_rx) = crossbeam_channel::unbounded();
        // Detached: the thread exits once the client and every connection task drop their senders
        spawn_dispatcher(Arc::clone(&observers), dispatch_rx).map_err(|e| {
            PinSocketError::Configuration(format!("failed to spawn dispatch thread: {}", e))
        })?;

        Ok(Self {
            endpoint,
            transport,
            reconnect_strategy,
            diagnostics,
            close_timeout,
            runtime,
            state: Arc::new(AtomicConnectionState::default()),
            generation: Arc::new(AtomicU64::new(0)),
            observers,
            dispatch_tx,
            active: Mutex::new(None),
        })
    }

    /// Start connecting; legal only from CLOSED
    ///
    /// Returns immediately. The outcome arrives as an `Opened` or `Failure` event.
    pub fn connect(&self) -> Result<()> {
        let mut active = self.active.lock();

        if !self
            .state
            .transition(ConnectionState::Closed, ConnectionState::Connecting)
        {
            return Err(PinSocketError::InvalidState(format!(
                "connect() requires CLOSED, current state is {:?}",
                self.state.get()
            )));
        }

        info!("Connecting to {}", self.endpoint);

        let (command_tx, command_rx) = unbounded_channel();
        let close_requested = Arc::new(AtomicBool::new(false));

        let settings = ConnectionSettings {
            endpoint: self.endpoint.clone(),
            transport: Arc::clone(&self.transport),
            strategy: Arc::clone(&self.reconnect_strategy),
            diagnostics: Arc::clone(&self.diagnostics),
            close_timeout: self.close_timeout,
        };
        let shared = ConnectionShared {
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            close_requested: Arc::clone(&close_requested),
            observers: Arc::clone(&self.observers),
            dispatch_tx: self.dispatch_tx.clone(),
        };

        let connection = ResilientConnection::new(settings, shared, command_rx);
        self.runtime.spawn(connection.run());

        *active = Some(ActiveRun {
            command_tx,
            close_requested,
        });
        Ok(())
    }

    /// Send a text message over the open session
    ///
    /// Fails with `NotOpen` unless the state is OPEN. A message accepted here
    /// is dropped if the session ends before it is written.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        let generation = open_generation(&self.state, &self.generation)?;

        let active = self.active.lock();
        let run = active.as_ref().ok_or(PinSocketError::NotOpen {
            state: self.state.get(),
        })?;
        run.command_tx
            .send(ConnectionCommand::Send {
                generation,
                text: text.into(),
            })
            .map_err(|e| PinSocketError::ChannelSend(e.to_string()))
    }

    /// Serialise `value` with serde_json and send it as text
    pub fn send_json<V: Serialize + ?Sized>(&self, value: &V) -> Result<()> {
        let state = self.state.get();
        if state != ConnectionState::Open {
            return Err(PinSocketError::NotOpen { state });
        }
        let text = serde_json::to_string(value)?;
        self.send(text)
    }

    /// Close with a normal-closure frame and stop reconnecting
    ///
    /// Observers are deregistered once CLOSED is reached: after the resulting
    /// `Closed` event when a session or retry loop is live, right away when
    /// the client is already CLOSED. No-op while CLOSING.
    pub fn close(&self) {
        let active = self.active.lock();
        if let Some(run) = active.as_ref() {
            if self.state.begin_close() {
                info!("Close requested for {}", self.endpoint);
                run.close_requested.store(true, Ordering::Release);
                if run.command_tx.send(ConnectionCommand::Close).is_err() {
                    debug!("Connection task already gone");
                }
                return;
            }
        }

        match self.state.get() {
            ConnectionState::Closed => {
                debug!("close() while CLOSED, releasing observers");
                let watermark = self.observers.watermark();
                let _ = self.dispatch_tx.send(Dispatch::ClearObservers(watermark));
            }
            state => debug!("close() ignored in state {:?}", state),
        }
    }

    /// Current lifecycle state
    #[inline]
    pub fn ready_state(&self) -> ConnectionState {
        self.state.get()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Observe one event kind
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> ObserverId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.observers.subscribe(Some(kind), Arc::new(callback))
    }

    /// Observe every event kind
    pub fn subscribe_all<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.observers.subscribe(None, Arc::new(callback))
    }

    /// Observe every event kind through a channel
    ///
    /// The channel disconnects once the observer is deregistered.
    pub fn subscribe_channel(&self) -> (ObserverId, Receiver<Event>) {
        let (observer, rx) = channel_observer();
        (self.observers.subscribe(None, observer), rx)
    }

    /// Remove an observer; unknown ids are ignored
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<T: WsTransport> Drop for PinnedClient<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Generation of the session that is OPEN right now
///
/// A session bumps the generation before it stores OPEN, so a changed
/// generation after the state check means a newer session opened in between.
fn open_generation(state: &AtomicConnectionState, generation: &AtomicU64) -> Result<u64> {
    let mut seen = generation.load(Ordering::Acquire);
    loop {
        let current_state = state.get();
        if current_state != ConnectionState::Open {
            return Err(PinSocketError::NotOpen {
                state: current_state,
            });
        }
        let current = generation.load(Ordering::Acquire);
        if current == seen {
            return Ok(current);
        }
        seen = current;
    }
}

impl<T: WsTransport> std::fmt::Debug for PinnedClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedClient")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .field("observers", &self.observers.len())
            .finish()
    }
}
