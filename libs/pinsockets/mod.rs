//! # PinSockets
//!
//! A WebSocket client that trusts a server only by the SHA-256 hash of its
//! leaf certificate's public key, and heals itself after network failures.
//!
//! ## Features
//!
//! - **Key pinning**: Custom rustls verifier; chain, expiry and hostname are not consulted
//! - **Self-healing**: Linear backoff reconnection, pluggable through `ReconnectionStrategy`
//! - **Ordered events**: One dispatch thread delivers events in the order they occurred
//! - **Type-state builder**: Compile-time guarantees for required configuration
//! - **Pluggable transport**: Swap the TLS transport for an in-memory one in tests

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, connection_state, event, key_format, observers, pinning, secure_transport,
    builder::{states, PinnedClientBuilder, DEFAULT_CLOSE_TIMEOUT},
    client::PinnedClient,
    connection_state::{AtomicConnectionState, ConnectionState},
    event::{Event, EventKind, ABNORMAL_CLOSURE, NORMAL_CLOSURE},
    key_format::pkcs8_to_pkcs1_if_needed,
    observers::{Observer, ObserverId, ObserverRegistry},
    pinning::{leaf_key_hash, spki_sha256_base64, ExpectedKeyHash, PinnedTrustEvaluator},
    secure_transport::{validate_endpoint, SecureTransportFactory},
    RETRIES_EXHAUSTED_REASON,
};
pub(crate) use self::core::connection;

// Convenience function
pub use self::core::builder as client_builder;

/// Type alias for Result with PinSocketError
pub type Result<T> = std::result::Result<T, traits::PinSocketError>;
