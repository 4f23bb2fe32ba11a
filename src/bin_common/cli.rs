//! CLI utilities for binaries
//!
//! Handles configuration loading from `.env` and environment variables
//! for the probe binary.

use anyhow::{anyhow, Context, Result};
use pinsockets::{ExpectedKeyHash, LinearBackoff};

/// Endpoint to probe (`wss://` only)
pub const URL_VAR: &str = "PINWS_URL";
/// Base64 SHA-256 of the server's SubjectPublicKeyInfo
pub const PIN_VAR: &str = "PINWS_PIN";
/// Optional text sent once the session opens
pub const MESSAGE_VAR: &str = "PINWS_MESSAGE";
/// Optional cap on consecutive reconnect attempts
pub const MAX_RETRIES_VAR: &str = "PINWS_MAX_RETRIES";

/// Probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub url: String,
    pub pin: ExpectedKeyHash,
    pub message: Option<String>,
    pub max_retries: Option<usize>,
}

impl ProbeConfig {
    /// Load `.env` (if present), then read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get(URL_VAR).ok_or_else(|| anyhow!("{} must be set", URL_VAR))?;
        let pin = get(PIN_VAR).ok_or_else(|| anyhow!("{} must be set", PIN_VAR))?;
        let pin = ExpectedKeyHash::parse(pin.trim()).with_context(|| format!("invalid {}", PIN_VAR))?;

        let max_retries = get(MAX_RETRIES_VAR)
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .with_context(|| format!("{} must be a non-negative integer", MAX_RETRIES_VAR))
            })
            .transpose()?;

        Ok(Self {
            url: url.trim().to_string(),
            pin,
            message: get(MESSAGE_VAR),
            max_retries,
        })
    }

    /// Unlimited linear backoff, or the bounded variant when a cap is set
    pub fn reconnect_strategy(&self) -> LinearBackoff {
        match self.max_retries {
            Some(max) => LinearBackoff::bounded(max),
            None => LinearBackoff::default(),
        }
    }
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
