//! Generation worker: streams one completion, cancellable between chunks.

use crate::llm::client::{ChatMessage, CompletionService};
use crate::session::queue::Utterance;
use crate::session::sink::TokenSink;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a generation worker ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The completion stream was exhausted normally.
    Completed,
    /// A cancellation request preempted the stream.
    Cancelled,
    /// A request or transport failure ended the stream early. Logged, not fatal.
    Failed,
}

/// Build the single user message combining the utterance with the static
/// instruction text.
pub fn compose_prompt(utterance: &str, instructions: &str) -> String {
    format!("{utterance}\n\nInstructions:\n{instructions}")
}

/// Stream one completion for `utterance` into `sink`.
///
/// Cancellation is cooperative: the token is checked before the request
/// and at every chunk boundary, and the loop yields after each chunk so a
/// pending cancellation preempts promptly. All failures are consumed here;
/// the returned outcome is the only signal the orchestrator sees.
pub async fn run(
    service: Arc<dyn CompletionService>,
    model: String,
    utterance: Utterance,
    instructions: Arc<str>,
    cancel: CancellationToken,
    mut sink: Box<dyn TokenSink>,
) -> WorkerOutcome {
    let messages = vec![ChatMessage::user(compose_prompt(
        &utterance.text,
        &instructions,
    ))];

    sink.begin();

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            sink.end(WorkerOutcome::Cancelled);
            return WorkerOutcome::Cancelled;
        }
        opened = service.stream_completion(&model, &messages) => match opened {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("voxloop: {e}");
                sink.end(WorkerOutcome::Failed);
                return WorkerOutcome::Failed;
            }
        },
    };

    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break WorkerOutcome::Cancelled,
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => {
                    if let Some(text) = chunk.text {
                        sink.token(&text);
                    }
                    // Yield point: a pending cancellation wins the next select.
                    tokio::task::yield_now().await;
                }
                Some(Err(e)) => {
                    eprintln!("voxloop: {e}");
                    break WorkerOutcome::Failed;
                }
                None => break WorkerOutcome::Completed,
            },
        }
    };

    // Release the in-flight request before reporting completion.
    drop(stream);
    sink.end(outcome);
    outcome
}
