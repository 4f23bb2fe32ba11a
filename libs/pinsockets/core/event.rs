use serde::Serialize;

/// Normal closure status code
pub const NORMAL_CLOSURE: u16 = 1000;

/// Reported when the session ends without a close frame from the peer
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Lifecycle and message events delivered to observers
///
/// Serializes as a tagged record (`{"type": "closed", "code": 1000, ...}`)
/// so a host bridge can forward it without inspecting payload shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Pinned TLS and WebSocket handshakes completed
    Opened,
    /// Text message received from the server
    Message { text: String },
    /// Close handshake started
    Closing { code: u16, reason: String },
    /// Close handshake finished; the session is gone
    Closed { code: u16, reason: String },
    /// Handshake or socket failure; a reconnect follows unless the strategy gives up
    Failure { error: String },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Opened => EventKind::Opened,
            Event::Message { .. } => EventKind::Message,
            Event::Closing { .. } => EventKind::Closing,
            Event::Closed { .. } => EventKind::Closed,
            Event::Failure { .. } => EventKind::Failure,
        }
    }

    pub(crate) fn message(text: impl Into<String>) -> Self {
        Event::Message { text: text.into() }
    }

    pub(crate) fn closing(code: u16, reason: impl Into<String>) -> Self {
        Event::Closing {
            code,
            reason: reason.into(),
        }
    }

    pub(crate) fn closed(code: u16, reason: impl Into<String>) -> Self {
        Event::Closed {
            code,
            reason: reason.into(),
        }
    }

    pub(crate) fn failure(error: impl ToString) -> Self {
        Event::Failure {
            error: error.to_string(),
        }
    }

    /// JSON form handed across a host bridge
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Discriminant of [`Event`], used to filter observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Opened,
    Message,
    Closing,
    Closed,
    Failure,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Opened,
        EventKind::Message,
        EventKind::Closing,
        EventKind::Closed,
        EventKind::Failure,
    ];

    /// Event name used by JavaScript host bridges
    pub fn bridge_name(self) -> &'static str {
        match self {
            EventKind::Opened => "onOpen",
            EventKind::Message => "onMessage",
            EventKind::Closing => "onClosing",
            EventKind::Closed => "onClosed",
            EventKind::Failure => "onFailure",
        }
    }
}
