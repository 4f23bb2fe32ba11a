//! Pinned WebSocket client - Main Library
//!
//! ## Architecture
//!
//! - **pinsockets**: Pinned, self-healing WebSocket client (re-exported from workspace)
//! - **bin_common**: Common utilities for binary executables (env config, runners)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use pinned_ws::bin_common::{init_tracing, ProbeConfig};
//! use pinned_ws::pinsockets::PinnedClient;
//! ```

// Re-export workspace libraries for convenience
pub use pinsockets;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{parse_args, ProbeConfig};
    pub use runner::{init_tracing, BinaryRunner, RunConfig, ShutdownManager};
}
