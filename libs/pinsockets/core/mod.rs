//! # Core
//!
//! Concrete pieces of the pinned client:
//!
//! - **pinning**: SPKI hashing and the rustls certificate verifier that enforces the pin
//! - **secure_transport**: TLS + WebSocket upgrade through the pinned verifier
//! - **connection**: the reconnecting session loop
//! - **client / builder**: the caller-facing handle and its type-state builder
//!
//! ## Example
//!
//! ```rust,ignore
//! use pinsockets::{EventKind, ExpectedKeyHash, LinearBackoff, PinnedClient};
//!
//! #[tokio::main]
//! async fn main() -> pinsockets::Result<()> {
//!     let client = PinnedClient::builder()
//!         .endpoint("wss://api.example.com/stream")
//!         .pin(ExpectedKeyHash::parse("47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=")?)?
//!         .reconnect_strategy(LinearBackoff::bounded(5))
//!         .build()?;
//!
//!     client.subscribe(EventKind::Message, |event| println!("{:?}", event));
//!     client.connect()?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub(crate) mod connection;
pub mod connection_state;
pub mod event;
pub mod key_format;
pub mod observers;
pub mod pinning;
pub mod secure_transport;

// Re-export main types
pub use builder::{states, PinnedClientBuilder, DEFAULT_CLOSE_TIMEOUT};
pub use client::PinnedClient;
pub use connection::RETRIES_EXHAUSTED_REASON;
pub use connection_state::{AtomicConnectionState, ConnectionState};
pub use event::{Event, EventKind, ABNORMAL_CLOSURE, NORMAL_CLOSURE};
pub use key_format::pkcs8_to_pkcs1_if_needed;
pub use observers::{Observer, ObserverId, ObserverRegistry};
pub use pinning::{leaf_key_hash, spki_sha256_base64, ExpectedKeyHash, PinnedTrustEvaluator};
pub use secure_transport::{validate_endpoint, SecureTransportFactory};

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new client builder
///
/// Convenience for `PinnedClient::builder()`.
pub fn builder() -> PinnedClientBuilder<states::NoEndpoint, states::NoTransport> {
    PinnedClientBuilder::new()
}
