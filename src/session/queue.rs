//! Finalized utterances and their cross-thread handoff queue.

use std::time::Instant;
use tokio::sync::mpsc;

/// A finalized unit of spoken input.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub received_at: Instant,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Instant::now(),
        }
    }
}

pub type UtteranceSender = mpsc::UnboundedSender<Utterance>;
pub type UtteranceReceiver = mpsc::UnboundedReceiver<Utterance>;

/// Build the dispatcher → orchestrator handoff queue.
///
/// Unbounded so the producer side never blocks the capture-domain thread;
/// in practice depth is bounded by dispatch rate × generation latency,
/// since the orchestrator drains one utterance per generation teardown.
pub fn handoff_queue() -> (UtteranceSender, UtteranceReceiver) {
    mpsc::unbounded_channel()
}
