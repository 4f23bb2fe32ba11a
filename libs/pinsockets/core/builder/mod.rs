pub mod states;

use crate::client::PinnedClient;
use crate::pinning::ExpectedKeyHash;
use crate::secure_transport::SecureTransportFactory;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Default time to wait for the server's close frame after `close()`
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Type-state builder for PinnedClient
///
/// The endpoint and a transport are required; the type system refuses to
/// `build()` until both are set. `pin()` installs the pinned TLS transport,
/// `transport()` installs any other [`WsTransport`] (used by tests).
pub struct PinnedClientBuilder<E, T>
where
    E: EndpointState,
{
    _state: TypeState<E>,
    endpoint: Option<String>,
    transport: T,
    reconnect_strategy: Option<Arc<dyn ReconnectionStrategy>>,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
    close_timeout: Duration,
}

impl PinnedClientBuilder<NoEndpoint, NoTransport> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            endpoint: None,
            transport: NoTransport,
            reconnect_strategy: None,
            diagnostics: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl Default for PinnedClientBuilder<NoEndpoint, NoTransport> {
    fn default() -> Self {
        Self::new()
    }
}

// Endpoint setting
impl<T> PinnedClientBuilder<NoEndpoint, T> {
    /// WebSocket server URL; must use the `wss` scheme
    pub fn endpoint(self, endpoint: impl Into<String>) -> PinnedClientBuilder<HasEndpoint, T> {
        PinnedClientBuilder {
            _state: TypeState::new(),
            endpoint: Some(endpoint.into()),
            transport: self.transport,
            reconnect_strategy: self.reconnect_strategy,
            diagnostics: self.diagnostics,
            close_timeout: self.close_timeout,
        }
    }
}

// Transport setting
impl<E> PinnedClientBuilder<E, NoTransport>
where
    E: EndpointState,
{
    /// Trust only servers whose leaf public key hashes to `expected`
    pub fn pin(self, expected: ExpectedKeyHash) -> Result<PinnedClientBuilder<E, SecureTransportFactory>> {
        let transport = SecureTransportFactory::new(expected)?;
        Ok(self.transport(transport))
    }

    /// Use a custom transport instead of the pinned TLS one
    pub fn transport<NewT>(self, transport: NewT) -> PinnedClientBuilder<E, NewT>
    where
        NewT: WsTransport,
    {
        PinnedClientBuilder {
            _state: TypeState::new(),
            endpoint: self.endpoint,
            transport,
            reconnect_strategy: self.reconnect_strategy,
            diagnostics: self.diagnostics,
            close_timeout: self.close_timeout,
        }
    }
}

// Optional configuration methods
impl<E, T> PinnedClientBuilder<E, T>
where
    E: EndpointState,
{
    /// Replace the default linear backoff (1s per failure, capped at 10s, unlimited)
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Arc::new(strategy));
        self
    }

    /// Receive lifecycle diagnostics (default: dropped)
    pub fn diagnostics(mut self, sink: impl DiagnosticsSink + 'static) -> Self {
        self.diagnostics = Some(Arc::new(sink));
        self
    }

    /// How long `close()` waits for the server's close frame
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

// Build method - only available when all required fields are set
impl<T> PinnedClientBuilder<HasEndpoint, T>
where
    T: WsTransport,
{
    /// Build the client; must be called inside a tokio runtime
    ///
    /// Nothing connects until `connect()` is called.
    pub fn build(self) -> Result<PinnedClient<T>> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| PinSocketError::Configuration("endpoint must be set".to_string()))?;
        crate::secure_transport::validate_endpoint(&endpoint)?;

        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Arc::new(LinearBackoff::default()));
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Arc::new(NoopDiagnostics));

        PinnedClient::new_with(
            endpoint,
            Arc::new(self.transport),
            reconnect_strategy,
            diagnostics,
            self.close_timeout,
        )
    }
}
