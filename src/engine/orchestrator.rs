//! Fan-out/fan-in coordinator: one query, every source, results delivered
//! as each source settles.

use super::query::{QueryError, SearchQuery};
use super::sources::{Source, SourceError};
use super::types::{AggregateResultMap, PartialResult, QueryId, SourceDescriptor, SourceOutcome};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{self, Instant};
use tracing::{info, trace, warn};
use uuid::Uuid;

/// Upper bound on one source's settlement, above the transport timeout.
pub const DEFAULT_SETTLE_DEADLINE: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),
    #[error("Unknown source: {0}")]
    UnknownSource(String),
    #[error("Duplicate source id: {0}")]
    DuplicateSource(String),
}

/// Receives one event per source per aggregate call.
pub trait DeliverySink: Send + Sync {
    fn deliver(&self, event: PartialResult);
}

impl<F> DeliverySink for F
where
    F: Fn(PartialResult) + Send + Sync,
{
    fn deliver(&self, event: PartialResult) {
        self(event)
    }
}

/// Discards events.
pub struct NullSink;

impl DeliverySink for NullSink {
    fn deliver(&self, _event: PartialResult) {}
}

/// Forwards events to a channel; a closed receiver drops them.
pub struct ChannelSink(pub UnboundedSender<PartialResult>);

impl DeliverySink for ChannelSink {
    fn deliver(&self, event: PartialResult) {
        if self.0.send(event).is_err() {
            trace!("delivery receiver gone");
        }
    }
}

/// Outcome of one aggregate call.
#[derive(Debug, Clone)]
pub struct AggregateRun {
    pub query_id: QueryId,
    pub results: AggregateResultMap,
}

pub struct Orchestrator {
    sources: Vec<Arc<dyn Source>>,
    settle_deadline: Duration,
}

impl Orchestrator {
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Result<Self, OrchestratorError> {
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.id()) {
                return Err(OrchestratorError::DuplicateSource(source.id().to_string()));
            }
        }
        Ok(Self {
            sources,
            settle_deadline: DEFAULT_SETTLE_DEADLINE,
        })
    }

    pub fn with_settle_deadline(mut self, deadline: Duration) -> Self {
        self.settle_deadline = deadline;
        self
    }

    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        self.sources.iter().map(|s| *s.descriptor()).collect()
    }

    /// Query every source concurrently.
    ///
    /// Invalid input is rejected before any source runs. After that no error
    /// escapes: each source's settlement is delivered to `sink` the moment it
    /// is known and the returned map holds exactly one entry per source.
    pub async fn run_aggregate(
        &self,
        raw: &str,
        sink: &dyn DeliverySink,
    ) -> Result<AggregateRun, OrchestratorError> {
        let query = SearchQuery::parse(raw)?;
        let query_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%query_id, sources = self.sources.len(), "aggregate search started");

        let query = &query;
        let deadline = self.settle_deadline;
        let mut pending: FuturesUnordered<_> = self
            .sources
            .iter()
            .map(|source| async move { (source.id(), settle(source.as_ref(), query, deadline).await) })
            .collect();

        let mut results = AggregateResultMap::with_capacity(self.sources.len());
        while let Some((source_id, outcome)) = pending.next().await {
            sink.deliver(PartialResult {
                query_id,
                source_id: source_id.to_string(),
                outcome: outcome.clone(),
            });
            results.insert(source_id.to_string(), outcome);
        }

        info!(
            %query_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregate search finished"
        );
        Ok(AggregateRun { query_id, results })
    }

    /// Re-run one source with the same validation and classification. Nothing
    /// is delivered.
    pub async fn run_single(&self, raw: &str, source_id: &str) -> Result<SourceOutcome, OrchestratorError> {
        let query = SearchQuery::parse(raw)?;
        let source = self
            .sources
            .iter()
            .find(|s| s.id() == source_id)
            .ok_or_else(|| OrchestratorError::UnknownSource(source_id.to_string()))?;
        Ok(settle(source.as_ref(), &query, self.settle_deadline).await)
    }
}

/// Run one source to a classified outcome. Never fails.
async fn settle(source: &dyn Source, query: &SearchQuery, deadline: Duration) -> SourceOutcome {
    let started = Instant::now();
    let search = AssertUnwindSafe(source.search(query)).catch_unwind();

    let outcome = match time::timeout(deadline, search).await {
        Ok(Ok(Ok(page))) => SourceOutcome::from(page),
        Ok(Ok(Err(SourceError::AuthRequired))) => SourceOutcome::AuthRequired,
        Ok(Ok(Err(e))) => SourceOutcome::Failed { message: e.to_string() },
        Ok(Err(_)) => {
            warn!(source = source.id(), "source panicked");
            SourceOutcome::Failed {
                message: "Source crashed".to_string(),
            }
        }
        Err(_) => SourceOutcome::Failed {
            message: SourceError::Timeout.to_string(),
        },
    };

    info!(
        source = source.id(),
        outcome = outcome.kind(),
        results = outcome.results().len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "source settled"
    );
    outcome
}
