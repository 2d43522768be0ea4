//! End-to-end orchestration properties over mock services:
//! single-flight, preemption ordering, push-order dequeue, clean shutdown.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use voxloop::llm::client::{ChatMessage, ChunkStream, CompletionChunk, CompletionService};
use voxloop::session::orchestrator::{Orchestrator, SinkFactory};
use voxloop::session::sink::{CollectorSink, SharedLog, SinkEvent};
use voxloop::session::queue::handoff_queue;
use voxloop::{Result, Utterance, WorkerOutcome};

/// Completion service that yields `tokens` chunks, `delay` apart, and
/// records the user content of every request.
struct ScriptedService {
    tokens: Vec<&'static str>,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedService {
    fn new(tokens: Vec<&'static str>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            tokens,
            delay,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn stream_completion(
        &self,
        _model: &str,
        messages: &[ChatMessage],
    ) -> Result<ChunkStream> {
        self.prompts
            .lock()
            .unwrap()
            .extend(messages.iter().map(|m| m.content.clone()));

        let delay = self.delay;
        let tokens: Vec<&'static str> = self.tokens.clone();
        Ok(stream::iter(tokens)
            .then(move |token| async move {
                tokio::time::sleep(delay).await;
                Ok(CompletionChunk {
                    text: Some(token.to_string()),
                })
            })
            .boxed())
    }
}

/// Sink factory handing out worker ids 1, 2, 3, … over a shared log.
fn numbered_sinks(log: &SharedLog) -> SinkFactory {
    let log = log.clone();
    let counter = AtomicUsize::new(0);
    Box::new(move || {
        let worker = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Box::new(CollectorSink::new(worker, log.clone())) as Box<dyn voxloop::TokenSink>
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
async fn no_two_workers_ever_interleave_output() {
    let log: SharedLog = Default::default();
    let service = ScriptedService::new(vec!["tok"; 200], Duration::from_millis(5));
    let orchestrator = Orchestrator::new(
        service,
        "test-model".to_string(),
        Arc::from("Answer briefly."),
        numbered_sinks(&log),
    );

    let (tx, rx) = handoff_queue();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

    // Three utterances land while earlier generations are still streaming.
    for (text, pause_ms) in [("first", 40), ("second", 40), ("third", 40)] {
        tx.send(Utterance::new(text)).unwrap();
        tokio::time::sleep(Duration::from_millis(pause_ms)).await;
    }

    shutdown.cancel();
    task.await.expect("orchestrator loop should exit cleanly");

    let events = log.lock().unwrap().clone();

    // Workers appear as contiguous blocks: once a worker's events stop,
    // that worker never produces again.
    let mut seen = Vec::new();
    for event in &events {
        let worker = worker_of(event);
        if seen.last() != Some(&worker) {
            assert!(
                !seen.contains(&worker),
                "worker {worker} produced output after being superseded: {events:?}"
            );
            seen.push(worker);
        }
    }
    assert_eq!(seen, vec![1, 2, 3]);

    // Each superseded worker's completion was observed before its
    // successor's first event.
    for superseded in [1usize, 2] {
        let end = events
            .iter()
            .position(|e| matches!(e, SinkEvent::End { worker, .. } if *worker == superseded))
            .expect("superseded worker must end");
        let next_begin = events
            .iter()
            .position(
                |e| matches!(e, SinkEvent::Begin { worker } if *worker == superseded + 1),
            )
            .expect("successor must begin");
        assert!(end < next_begin);
    }
}

#[tokio::test]
async fn preempted_worker_is_cancelled_and_terminates_first() {
    let log: SharedLog = Default::default();
    let service = ScriptedService::new(vec!["tok"; 500], Duration::from_millis(5));
    let orchestrator = Orchestrator::new(
        service,
        "test-model".to_string(),
        Arc::from(""),
        numbered_sinks(&log),
    );

    let (tx, rx) = handoff_queue();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

    tx.send(Utterance::new("U1")).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    tx.send(Utterance::new("U2")).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    shutdown.cancel();
    task.await.expect("orchestrator loop should exit cleanly");

    let events = log.lock().unwrap().clone();
    let u1_end = events
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
        .expect("U1's worker should end cancelled");

    let u2_first_token = events
        .iter()
        .position(|e| matches!(e, SinkEvent::Token { worker: 2, .. }))
        .expect("U2's worker should stream");

    assert!(
        u1_end < u2_first_token,
        "U1 must terminate before U2's first chunk"
    );
    assert!(
        events[u1_end + 1..]
            .iter()
            .all(|e| worker_of(e) != 1),
        "no U1 chunks after its completion signal"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn utterances_are_dequeued_in_push_order() {
    let log: SharedLog = Default::default();
    let service = ScriptedService::new(vec!["."; 10], Duration::from_millis(5));
    let orchestrator = Orchestrator::new(
        service.clone(),
        "test-model".to_string(),
        Arc::from("inst"),
        numbered_sinks(&log),
    );

    let (tx, rx) = handoff_queue();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

    // Push from a separate OS thread, like the dispatcher does. The gaps
    // leave each worker time to open its request before being preempted.
    let producer = std::thread::spawn(move || {
        for text in ["U1", "U2", "U3"] {
            tx.send(Utterance::new(text)).unwrap();
            std::thread::sleep(Duration::from_millis(30));
        }
    });
    producer.join().unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.cancel();
    task.await.expect("orchestrator loop should exit cleanly");

    let prompts = service.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].starts_with("U1"));
    assert!(prompts[1].starts_with("U2"));
    assert!(prompts[2].starts_with("U3"));
}

#[tokio::test]
async fn shutdown_cancels_loop_and_observes_active_worker_once() {
    let log: SharedLog = Default::default();
    let service = ScriptedService::new(vec!["tok"; 10_000], Duration::from_millis(10));
    let orchestrator = Orchestrator::new(
        service,
        "test-model".to_string(),
        Arc::from(""),
        numbered_sinks(&log),
    );

    let (tx, rx) = handoff_queue();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

    tx.send(Utterance::new("long answer")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    shutdown.cancel();
    // The loop exits on its own; no cancellation escapes the join.
    task.await.expect("orchestrator loop should exit cleanly");

    let events = log.lock().unwrap().clone();
    let ends: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SinkEvent::End { .. }))
        .collect();
    assert_eq!(ends.len(), 1, "exactly one completion signal: {events:?}");
    assert_eq!(
        events.last(),
        Some(&SinkEvent::End {
            worker: 1,
            outcome: WorkerOutcome::Cancelled
        })
    );
}

#[tokio::test]
async fn single_utterance_streams_to_completion() {
    let log: SharedLog = Default::default();
    let service = ScriptedService::new(vec!["Lights", " are", " on."], Duration::from_millis(5));
    let orchestrator = Orchestrator::new(
        service.clone(),
        "test-model".to_string(),
        Arc::from("Answer briefly."),
        numbered_sinks(&log),
    );

    let (tx, rx) = handoff_queue();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(orchestrator.run(rx, shutdown.clone()));

    tx.send(Utterance::new("turn on the lights")).unwrap();

    // No subsequent utterance arrives; the generation runs to completion
    // and the orchestrator goes back to waiting on the queue.
    tokio::time::sleep(Duration::from_secs(2)).await;

    shutdown.cancel();
    task.await.expect("orchestrator loop should exit cleanly");

    // Exactly one worker was created.
    let prompts = service.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("turn on the lights"));
    assert!(prompts[0].contains("Answer briefly."));

    let events = log.lock().unwrap().clone();
    assert_eq!(events.first(), Some(&SinkEvent::Begin { worker: 1 }));
    assert_eq!(
        events.last(),
        Some(&SinkEvent::End {
            worker: 1,
            outcome: WorkerOutcome::Completed
        })
    );

    let streamed: String = events
        .iter()
        .filter_map(|event| match event {
            SinkEvent::Token { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "Lights are on.");
}
