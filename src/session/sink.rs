//! Pluggable token output for generation workers.

use crate::session::worker::WorkerOutcome;
use owo_colors::OwoColorize;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Output handler for one generation's token stream.
/// Pairs with the capture source at the other end of the pipeline.
pub trait TokenSink: Send {
    /// Called once before the first token of a generation.
    fn begin(&mut self) {}

    /// Handle one token. Flush-on-write semantics; no buffering delay.
    fn token(&mut self, token: &str);

    /// Called once when the generation ends, with its outcome.
    fn end(&mut self, _outcome: WorkerOutcome) {}

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Prints tokens to stdout as they arrive.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl TokenSink for StdoutSink {
    fn begin(&mut self) {
        print!("\n{} ", "assistant:".cyan().bold());
        let _ = std::io::stdout().flush();
    }

    fn token(&mut self, token: &str) {
        print!("{token}");
        let _ = std::io::stdout().flush();
    }

    fn end(&mut self, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Cancelled => println!("\n{}", "[cancelled]".dimmed()),
            WorkerOutcome::Completed | WorkerOutcome::Failed => println!(),
        }
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// One recorded sink call, tagged with the worker it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Begin { worker: usize },
    Token { worker: usize, text: String },
    End { worker: usize, outcome: WorkerOutcome },
}

/// Shared event log written by [`CollectorSink`] instances.
pub type SharedLog = Arc<Mutex<Vec<SinkEvent>>>;

/// Records every sink call into a shared log, for asserting ordering and
/// interleaving across workers in tests.
pub struct CollectorSink {
    worker: usize,
    log: SharedLog,
}

impl CollectorSink {
    pub fn new(worker: usize, log: SharedLog) -> Self {
        Self { worker, log }
    }

    fn push(&self, event: SinkEvent) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl TokenSink for CollectorSink {
    fn begin(&mut self) {
        self.push(SinkEvent::Begin {
            worker: self.worker,
        });
    }

    fn token(&mut self, token: &str) {
        self.push(SinkEvent::Token {
            worker: self.worker,
            text: token.to_string(),
        });
    }

    fn end(&mut self, outcome: WorkerOutcome) {
        self.push(SinkEvent::End {
            worker: self.worker,
            outcome,
        });
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
