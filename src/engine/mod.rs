//! Public façade for the search engine layer.

pub mod auth;
pub mod catalog;
pub mod credentials;
pub mod orchestrator;
pub mod query;
pub mod sources;
pub mod surface;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

pub use auth::{AuthChanged, AuthListener, AuthProbe};
pub use credentials::{CredentialContext, CredentialStore, StoredCookie};
pub use orchestrator::{AggregateRun, ChannelSink, DeliverySink, NullSink, Orchestrator, OrchestratorError};
pub use query::{QueryError, SearchQuery};
pub use sources::{Source, SourceError};
pub use types::{
    AggregateResultMap, PartialResult, QueryId, SearchPage, SearchResult, SourceDescriptor, SourceOutcome,
    SourceReport,
};
