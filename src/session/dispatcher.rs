//! Reacts to transcription connection events and hands finalized
//! utterances across the thread boundary.

use crate::session::gate::ReadyGate;
use crate::session::queue::{Utterance, UtteranceSender};
use crate::stt::connection::ConnectionHandler;
use crate::stt::events::TranscriptEvent;
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where the current turn stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// No transcript text seen yet for this turn.
    Listening,
    /// Partial transcripts are arriving.
    Accumulating,
    /// The turn ended and its utterance was handed off.
    Finalized,
}

/// Mutable transcript bookkeeping, owned exclusively by the dispatcher.
#[derive(Debug)]
pub struct TranscriptState {
    /// Most recent transcript text, kept for diagnostics even on partials.
    pub latest_text: String,
    /// Timestamp of the last emission, for the debounce window.
    pub last_emit: Option<Instant>,
    pub phase: TurnPhase,
}

/// Runs on the listener thread; everything it touches stays on that thread
/// except the utterance handoff, whose `send` never blocks.
pub struct Dispatcher {
    state: TranscriptState,
    debounce_window: Duration,
    utterances: UtteranceSender,
    ready: Arc<ReadyGate>,
    verbosity: u8,
}

impl Dispatcher {
    pub fn new(
        utterances: UtteranceSender,
        ready: Arc<ReadyGate>,
        debounce_window: Duration,
        verbosity: u8,
    ) -> Self {
        Self {
            state: TranscriptState {
                latest_text: String::new(),
                last_emit: None,
                phase: TurnPhase::Listening,
            },
            debounce_window,
            utterances,
            ready,
            verbosity,
        }
    }

    pub fn state(&self) -> &TranscriptState {
        &self.state
    }

    /// Process one transcript event at `now`.
    ///
    /// Finalization always enqueues; the debounce window below only tracks
    /// emit times and can never suppress a finalized turn.
    fn observe(&mut self, event: TranscriptEvent, now: Instant) {
        let is_end_of_turn = event.is_end_of_turn();
        let Some(transcript) = event.transcript else {
            return;
        };
        if transcript.is_empty() {
            return;
        }

        if is_end_of_turn {
            if self.verbosity >= 1 {
                eprintln!("turn finalized (was: {:?})", self.state.latest_text);
            }
            let _ = self.utterances.send(Utterance::new(transcript.clone()));
            self.state.phase = TurnPhase::Finalized;
        } else {
            self.state.phase = TurnPhase::Accumulating;
        }

        self.state.latest_text = transcript;

        if let Some(last) = self.state.last_emit
            && now.duration_since(last) < self.debounce_window
        {
            return;
        }
        self.state.last_emit = Some(now);
    }
}

impl ConnectionHandler for Dispatcher {
    fn on_open(&mut self) {
        eprintln!("{}", "Connected. Listening...".green());
        self.ready.signal();
    }

    fn on_message(&mut self, event: TranscriptEvent) {
        self.observe(event, Instant::now());
    }

    fn on_error(&mut self, message: &str) {
        eprintln!("voxloop: transcription error: {message}");
    }

    fn on_close(&mut self) {
        eprintln!("voxloop: transcription connection closed");
    }
}
