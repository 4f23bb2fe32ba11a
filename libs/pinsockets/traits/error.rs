use crate::core::connection_state::ConnectionState;
use thiserror::Error;

/// Reasons the pinned trust evaluator rejects a server certificate chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrustError {
    /// The handshake presented no certificate at all
    #[error("No server certificate provided")]
    EmptyChain,

    /// The leaf certificate's public key does not hash to the pinned value
    #[error("Pinning failed: expected key hash {expected}, server presented {actual}")]
    PinMismatch { expected: String, actual: String },

    /// The leaf certificate could not be decoded far enough to extract its public key
    #[error("Malformed server certificate: {0}")]
    MalformedCertificate(String),
}

/// Main error type for pinsockets
#[derive(Error, Debug)]
pub enum PinSocketError {
    /// `send` was called while the connection was not open
    #[error("WebSocket is not open (current state: {state:?})")]
    NotOpen { state: ConnectionState },

    /// Operation is not legal in the current connection state
    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    /// The server failed certificate pinning
    #[error("Certificate pinning rejected the server: {0}")]
    Trust(#[from] TrustError),

    /// Socket, TLS or WebSocket handshake failure
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Endpoint is not a usable `wss://` URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Expected key hash is not a base64 SHA-256 digest
    #[error("Invalid expected key hash: {0}")]
    InvalidKeyHash(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Outgoing value could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl PinSocketError {
    /// True when the error came from the pinning check rather than the network
    pub fn is_trust_failure(&self) -> bool {
        matches!(self, PinSocketError::Trust(_))
    }
}

/// Result type for pinsockets operations
pub type Result<T> = std::result::Result<T, PinSocketError>;
