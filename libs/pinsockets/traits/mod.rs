//! # PinSockets Traits
//!
//! Seams of the pinned WebSocket client:
//!
//! - **WsTransport**: Open one WebSocket session (TLS + upgrade)
//! - **ReconnectionStrategy**: Map consecutive failures to a reconnect delay
//! - **DiagnosticsSink**: Receive lifecycle records without a global logger
//! - **PinSocketError / TrustError**: Error kinds surfaced by the client

pub mod diagnostics;
pub mod error;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use diagnostics::{DiagnosticLevel, DiagnosticsSink, NoopDiagnostics, TracingDiagnostics};
pub use error::{PinSocketError, Result, TrustError};
pub use reconnect::{FixedDelay, LinearBackoff, NeverReconnect, ReconnectionStrategy};
pub use transport::WsTransport;
