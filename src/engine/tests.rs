use super::catalog;
use super::orchestrator::{ChannelSink, NullSink, Orchestrator, OrchestratorError, DEFAULT_SETTLE_DEADLINE};
use super::query::{SearchQuery, MAX_QUERY_CHARS};
use super::sources::{Source, SourceError};
use super::types::{PartialResult, SearchPage, SearchResult, SourceDescriptor, SourceOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

enum Behavior {
    Results { count: usize, total: Option<u64> },
    Fail(SourceError),
    Hang,
    Panic,
}

struct FakeSource {
    descriptor: SourceDescriptor,
    delay: Duration,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl FakeSource {
    fn new(descriptor: SourceDescriptor, delay_ms: u64, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            delay: Duration::from_millis(delay_ms),
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for FakeSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            Behavior::Results { count, total } => Ok(SearchPage {
                results: (0..*count)
                    .map(|i| {
                        SearchResult::new(
                            format!("{} #{}", query, i),
                            format!("https://{}.example/{}", self.descriptor.id, i),
                            "",
                        )
                    })
                    .collect(),
                total_count: *total,
            }),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("adapter bug"),
        }
    }
}

fn ok(count: usize) -> Behavior {
    Behavior::Results { count, total: None }
}

fn orchestrator(sources: &[Arc<FakeSource>]) -> Orchestrator {
    Orchestrator::new(sources.iter().map(|s| s.clone() as Arc<dyn Source>).collect()).unwrap()
}

/// Sink that records events in arrival order.
fn recorder() -> (Arc<Mutex<Vec<PartialResult>>>, impl Fn(PartialResult) + Send + Sync) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = events.clone();
        move |event: PartialResult| events.lock().unwrap().push(event)
    };
    (events, sink)
}

#[tokio::test(start_paused = true)]
async fn every_source_gets_exactly_one_entry() {
    let sources = [
        FakeSource::new(catalog::GITHUB, 10, Behavior::Results { count: 30, total: Some(150) }),
        FakeSource::new(catalog::LINUXDO, 20, Behavior::Fail(SourceError::AuthRequired)),
        FakeSource::new(catalog::X, 30, Behavior::Fail(SourceError::Upstream { status: 500 })),
        FakeSource::new(catalog::STACKOVERFLOW, 40, Behavior::Fail(SourceError::Timeout)),
        FakeSource::new(catalog::REDDIT, 50, Behavior::Fail(SourceError::Network("dns error".into()))),
        FakeSource::new(catalog::HACKERNEWS, 60, ok(0)),
    ];
    let (events, sink) = recorder();

    let run = orchestrator(&sources).run_aggregate("rust", &sink).await.unwrap();

    assert_eq!(run.results.len(), 6);
    assert_eq!(events.lock().unwrap().len(), 6);

    let github = &run.results["github"];
    assert_eq!(github.results().len(), 30);
    assert_eq!(github.count_label().as_deref(), Some("30+"));

    assert_eq!(run.results["linuxdo"], SourceOutcome::AuthRequired);
    assert_eq!(run.results["x"].error(), Some("HTTP 500"));
    assert_eq!(run.results["stackoverflow"].error(), Some("Request timeout"));
    assert_eq!(run.results["reddit"].error(), Some("dns error"));
    assert_eq!(run.results["hackernews"].count_label().as_deref(), Some("0"));

    for outcome in run.results.values() {
        assert!(!(outcome.needs_login() && outcome.error().is_some()));
        if !matches!(outcome, SourceOutcome::Ok { .. }) {
            assert!(outcome.results().is_empty());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn delivery_follows_completion_order() {
    let sources = [
        FakeSource::new(catalog::GITHUB, 300, ok(1)),
        FakeSource::new(catalog::REDDIT, 100, ok(1)),
        FakeSource::new(catalog::HACKERNEWS, 200, Behavior::Fail(SourceError::Upstream { status: 503 })),
    ];
    let (events, sink) = recorder();

    let run = orchestrator(&sources).run_aggregate("rust", &sink).await.unwrap();

    let events = events.lock().unwrap();
    let order: Vec<&str> = events.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(order, ["reddit", "hackernews", "github"]);
    assert!(events.iter().all(|e| e.query_id == run.query_id));
    for event in events.iter() {
        assert_eq!(&event.outcome, &run.results[&event.source_id]);
    }
}

#[tokio::test]
async fn invalid_queries_touch_no_source() {
    let sources = [FakeSource::new(catalog::GITHUB, 0, ok(1))];
    let orchestrator = orchestrator(&sources);
    let (events, sink) = recorder();

    let too_long = "a".repeat(MAX_QUERY_CHARS + 1);
    for raw in ["", "   \t\n", too_long.as_str()] {
        let err = orchestrator.run_aggregate(raw, &sink).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidQuery(_)), "{:?}", raw);
    }
    assert_eq!(sources[0].calls(), 0);
    assert!(events.lock().unwrap().is_empty());

    let run = orchestrator
        .run_aggregate(&"a".repeat(MAX_QUERY_CHARS), &sink)
        .await
        .unwrap();
    assert_eq!(run.results.len(), 1);
    assert_eq!(sources[0].calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_source_is_failed_at_the_deadline() {
    let sources = [
        FakeSource::new(catalog::GITHUB, 0, Behavior::Hang),
        FakeSource::new(catalog::REDDIT, 50, ok(2)),
    ];
    let start = Instant::now();

    let run = orchestrator(&sources).run_aggregate("rust", &NullSink).await.unwrap();

    assert!(start.elapsed() >= DEFAULT_SETTLE_DEADLINE);
    assert_eq!(run.results["github"].error(), Some("Request timeout"));
    assert_eq!(run.results["reddit"].results().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn settle_deadline_is_configurable() {
    let sources = [FakeSource::new(catalog::GITHUB, 0, Behavior::Hang)];
    let orchestrator = orchestrator(&sources).with_settle_deadline(Duration::from_secs(1));
    let start = Instant::now();

    let outcome = orchestrator.run_single("rust", "github").await.unwrap();

    assert_eq!(outcome.error(), Some("Request timeout"));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn panicking_source_is_contained() {
    let sources = [
        FakeSource::new(catalog::GITHUB, 0, Behavior::Panic),
        FakeSource::new(catalog::REDDIT, 0, ok(1)),
    ];
    let run = orchestrator(&sources).run_aggregate("rust", &NullSink).await.unwrap();

    assert_eq!(run.results["github"].error(), Some("Source crashed"));
    assert_eq!(run.results["reddit"].results().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_keep_separate_maps() {
    let sources = [
        FakeSource::new(catalog::GITHUB, 100, ok(1)),
        FakeSource::new(catalog::REDDIT, 50, ok(1)),
    ];
    let orchestrator = orchestrator(&sources);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sink = ChannelSink(tx);

    let (first, second) = tokio::join!(
        orchestrator.run_aggregate("first", &sink),
        orchestrator.run_aggregate("second", &sink)
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    drop(sink);

    assert_ne!(first.query_id, second.query_id);
    for (run, text) in [(&first, "first"), (&second, "second")] {
        assert_eq!(run.results.len(), 2);
        for outcome in run.results.values() {
            assert_eq!(outcome.results()[0].title, format!("{} #0", text));
        }
    }

    let mut per_query = std::collections::HashMap::new();
    while let Some(event) = rx.recv().await {
        *per_query.entry(event.query_id).or_insert(0) += 1;
    }
    assert_eq!(per_query[&first.query_id], 2);
    assert_eq!(per_query[&second.query_id], 2);
}

#[tokio::test]
async fn run_single_is_repeatable() {
    let sources = [
        FakeSource::new(catalog::GITHUB, 0, Behavior::Results { count: 3, total: Some(99) }),
        FakeSource::new(catalog::REDDIT, 0, ok(1)),
    ];
    let orchestrator = orchestrator(&sources);

    let a = orchestrator.run_single("rust", "github").await.unwrap();
    let b = orchestrator.run_single("rust", "github").await.unwrap();

    assert_eq!(a, b);
    assert_eq!(a.count_label().as_deref(), Some("3+"));
    assert_eq!(sources[0].calls(), 2);
    assert_eq!(sources[1].calls(), 0);
}

#[tokio::test]
async fn run_single_validates_and_resolves_ids() {
    let sources = [FakeSource::new(catalog::GITHUB, 0, ok(1))];
    let orchestrator = orchestrator(&sources);

    assert!(matches!(
        orchestrator.run_single(" ", "github").await,
        Err(OrchestratorError::InvalidQuery(_))
    ));
    assert!(matches!(
        orchestrator.run_single("rust", "myspace").await,
        Err(OrchestratorError::UnknownSource(id)) if id == "myspace"
    ));
    assert_eq!(sources[0].calls(), 0);
}

#[test]
fn duplicate_ids_are_rejected() {
    let sources: Vec<Arc<dyn Source>> = vec![
        FakeSource::new(catalog::GITHUB, 0, ok(1)),
        FakeSource::new(catalog::GITHUB, 0, ok(2)),
    ];
    assert!(matches!(
        Orchestrator::new(sources),
        Err(OrchestratorError::DuplicateSource(id)) if id == "github"
    ));
}
