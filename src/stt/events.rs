//! Wire model for transcription connection events.

use serde::Deserialize;

/// Event tag the service attaches when a speaker's turn has ended.
pub const END_OF_TURN: &str = "EndOfTurn";

/// One decoded transcript message from the service.
///
/// The wire format is a superset of what we consume; unknown fields are
/// ignored and both fields are optional so keepalive/metadata messages
/// decode to an ignorable event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptEvent {
    /// Turn marker, e.g. "Update" or "EndOfTurn".
    #[serde(default)]
    pub event: Option<String>,
    /// Transcript text for the current turn, cumulative across partials.
    #[serde(default)]
    pub transcript: Option<String>,
}

impl TranscriptEvent {
    /// True when this event finalizes the speaker's turn.
    pub fn is_end_of_turn(&self) -> bool {
        self.event.as_deref() == Some(END_OF_TURN)
    }
}

/// Lifecycle events delivered to a [`ConnectionHandler`].
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The connection handshake completed and the service accepts audio.
    Opened,
    /// A transcript message arrived.
    Message(TranscriptEvent),
    /// A transport or protocol error. The connection may still be alive.
    Error(String),
    /// The connection ended.
    Closed,
}
