//! Single-flight generation orchestrator.
//!
//! At most one generation worker streams at any instant. A newer utterance
//! cancels the active worker and waits for its teardown before starting
//! the replacement, so outputs never interleave.

use crate::llm::client::CompletionService;
use crate::session::queue::{Utterance, UtteranceReceiver};
use crate::session::sink::TokenSink;
use crate::session::worker::{self, WorkerOutcome};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builds one sink per generation.
pub type SinkFactory = Box<dyn FnMut() -> Box<dyn TokenSink> + Send>;

/// Handle to a running generation worker: a cancellation request plus the
/// completion signal (the join handle).
pub struct GenerationHandle {
    token: CancellationToken,
    task: JoinHandle<WorkerOutcome>,
}

impl GenerationHandle {
    /// Request cooperative cancellation. The worker keeps running until it
    /// reaches a yield point; await [`GenerationHandle::join`] to observe
    /// teardown.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to end and observe its outcome.
    ///
    /// Returns None when the task itself died (panic); that is logged and
    /// treated like any other observed teardown.
    pub async fn join(self) -> Option<WorkerOutcome> {
        match self.task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                if !e.is_cancelled() {
                    eprintln!("voxloop: generation task panicked: {e}");
                }
                None
            }
        }
    }
}

/// Owns the active generation handle and the dequeue loop.
pub struct Orchestrator {
    service: Arc<dyn CompletionService>,
    model: String,
    instructions: Arc<str>,
    make_sink: SinkFactory,
    active: Option<GenerationHandle>,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn CompletionService>,
        model: String,
        instructions: Arc<str>,
        make_sink: SinkFactory,
    ) -> Self {
        Self {
            service,
            model,
            instructions,
            make_sink,
            active: None,
        }
    }

    /// True while a generation worker is still streaming.
    pub fn generation_in_flight(&self) -> bool {
        self.active.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel the active generation (if any) and wait for its completion
    /// signal, discarding the outcome. Never leaves a cancelled worker
    /// running unobserved.
    async fn retire_active(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.cancel();
            let _ = handle.join().await;
        }
    }

    /// Start a generation for `utterance`, tearing down the previous one
    /// first. Teardown is synchronous relative to the replacement's start.
    pub async fn dispatch(&mut self, utterance: Utterance) {
        self.retire_active().await;

        let token = CancellationToken::new();
        let task = tokio::spawn(worker::run(
            self.service.clone(),
            self.model.clone(),
            utterance,
            self.instructions.clone(),
            token.clone(),
            (self.make_sink)(),
        ));
        self.active = Some(GenerationHandle { token, task });
    }

    /// Dequeue utterances until shutdown is requested or the queue closes.
    ///
    /// On exit the active generation is cancelled and its teardown
    /// observed, so no cancellation escapes past this loop.
    pub async fn run(mut self, mut utterances: UtteranceReceiver, shutdown: CancellationToken) {
        loop {
            let utterance = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = utterances.recv() => match received {
                    Some(utterance) => utterance,
                    None => break,
                },
            };
            self.dispatch(utterance).await;
        }
        self.retire_active().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::llm::client::{ChatMessage, ChunkStream, CompletionChunk, CompletionService};
    use crate::session::sink::{CollectorSink, SharedLog, SinkEvent};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Yields one token every `delay` until cancelled or exhausted.
    struct SlowService {
        tokens: usize,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl SlowService {
        fn new(tokens: usize, delay: Duration) -> Self {
            Self {
                tokens,
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionService for SlowService {
        async fn stream_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> Result<ChunkStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            Ok(stream::iter(0..self.tokens)
                .then(move |i| async move {
                    tokio::time::sleep(delay).await;
                    Ok(CompletionChunk {
                        text: Some(format!("t{i}")),
                    })
                })
                .boxed())
        }
    }

    fn sink_factory(log: &SharedLog) -> SinkFactory {
        let log = log.clone();
        let mut next = 0usize;
        Box::new(move || {
            next += 1;
            Box::new(CollectorSink::new(next, log.clone())) as Box<dyn TokenSink>
        })
    }

    fn worker_of(event: &SinkEvent) -> usize {
        match event {
            SinkEvent::Begin { worker }
            | SinkEvent::Token { worker, .. }
            | SinkEvent::End { worker, .. } => *worker,
        }
    }

    #[tokio::test]
    async fn test_dispatch_retires_active_before_starting_next() {
        let log: SharedLog = Default::default();
        let service = Arc::new(SlowService::new(100, Duration::from_millis(10)));
        let mut orchestrator = Orchestrator::new(
            service,
            "test-model".to_string(),
            Arc::from(""),
            sink_factory(&log),
        );

        orchestrator.dispatch(Utterance::new("first")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(orchestrator.generation_in_flight());

        orchestrator.dispatch(Utterance::new("second")).await;
        orchestrator.retire_active().await;

        let events = log.lock().unwrap().clone();
        let boundary = events
            .iter()
            .position(|e| {
                matches!(
                    e,
                    SinkEvent::End {
                        worker: 1,
                        outcome: WorkerOutcome::Cancelled
                    }
                )
            })
            .expect("first worker should end cancelled");

        // Every worker-1 event precedes every worker-2 event.
        assert!(events[..=boundary].iter().all(|e| worker_of(e) == 1));
        assert!(events[boundary + 1..].iter().all(|e| worker_of(e) == 2));
    }

    #[tokio::test]
    async fn test_completed_generation_is_not_in_flight() {
        let log: SharedLog = Default::default();
        let service = Arc::new(SlowService::new(2, Duration::from_millis(5)));
        let mut orchestrator = Orchestrator::new(
            service,
            "test-model".to_string(),
            Arc::from(""),
            sink_factory(&log),
        );

        orchestrator.dispatch(Utterance::new("hi")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!orchestrator.generation_in_flight());
    }

    #[tokio::test]
    async fn test_run_drains_queue_in_push_order_and_shuts_down_cleanly() {
        let log: SharedLog = Default::default();
        let service = Arc::new(SlowService::new(3, Duration::from_millis(5)));
        let orchestrator = Orchestrator::new(
            service.clone(),
            "test-model".to_string(),
            Arc::from(""),
            sink_factory(&log),
        );

        let (tx, rx) = crate::session::queue::handoff_queue();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

        // Gaps let each worker open its request before being preempted.
        for text in ["one", "two", "three"] {
            tx.send(Utterance::new(text)).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        shutdown.cancel();
        task.await.expect("orchestrator loop should exit cleanly");

        assert_eq!(service.calls.load(Ordering::SeqCst), 3);

        // Begin events appear in push order.
        let begins: Vec<usize> = log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Begin { worker } => Some(*worker),
                _ => None,
            })
            .collect();
        assert_eq!(begins, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_active_worker() {
        let log: SharedLog = Default::default();
        let service = Arc::new(SlowService::new(1000, Duration::from_millis(10)));
        let orchestrator = Orchestrator::new(
            service,
            "test-model".to_string(),
            Arc::from(""),
            sink_factory(&log),
        );

        let (tx, rx) = crate::session::queue::handoff_queue();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

        tx.send(Utterance::new("long answer")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        task.await.expect("orchestrator loop should exit cleanly");

        let events = log.lock().unwrap().clone();
        assert_eq!(
            events.last(),
            Some(&SinkEvent::End {
                worker: 1,
                outcome: WorkerOutcome::Cancelled
            })
        );
    }

    #[tokio::test]
    async fn test_queue_close_ends_loop() {
        let log: SharedLog = Default::default();
        let service = Arc::new(SlowService::new(1, Duration::from_millis(1)));
        let orchestrator = Orchestrator::new(
            service,
            "test-model".to_string(),
            Arc::from(""),
            sink_factory(&log),
        );

        let (tx, rx) = crate::session::queue::handoff_queue();
        let task = tokio::spawn(orchestrator.run(rx, CancellationToken::new()));

        drop(tx);
        task.await.expect("orchestrator loop should exit cleanly");
    }
}
