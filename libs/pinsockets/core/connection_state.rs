//! Lock-free connection state
//!
//! The state lives in an `AtomicU8` so the caller-facing handle can read it
//! from any thread while the connection task drives transitions.

use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Caller-visible lifecycle of a pinned WebSocket (its readyState)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake in flight, or waiting to retry after a failure
    Connecting = 0,
    /// Upgrade completed, messages may be sent
    Open = 1,
    /// Close handshake started
    Closing = 2,
    /// No session; initial and terminal state
    Closed = 3,
}

impl ConnectionState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    /// Numeric readyState as exposed by browser WebSocket APIs
    #[inline]
    pub fn ready_state(self) -> u8 {
        self as u8
    }
}

/// Atomic wrapper around [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Unconditionally store a state
    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to` only if the current state is still `from`
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.inner
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `to` unless a close is already under way
    ///
    /// Once the state is `Closing`, only `Closed` may follow; a connection
    /// task that lost the race against `close()` cannot reopen the state.
    /// Returns whether the store happened.
    pub fn advance(&self, to: ConnectionState) -> bool {
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let current = ConnectionState::from_u8(current);
                let blocked = current == ConnectionState::Closing
                    && matches!(to, ConnectionState::Connecting | ConnectionState::Open);
                (!blocked).then_some(to as u8)
            })
            .is_ok()
    }

    /// Enter `Closing` from `Connecting` or `Open`; false if already closing or closed
    pub fn begin_close(&self) -> bool {
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ConnectionState::from_u8(current) {
                    ConnectionState::Connecting | ConnectionState::Open => {
                        Some(ConnectionState::Closing as u8)
                    }
                    ConnectionState::Closing | ConnectionState::Closed => None,
                }
            })
            .is_ok()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }

    #[inline]
    pub fn is_connecting(&self) -> bool {
        self.get() == ConnectionState::Connecting
    }

    #[inline]
    pub fn is_closing(&self) -> bool {
        self.get() == ConnectionState::Closing
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.get() == ConnectionState::Closed
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Closed)
    }
}
