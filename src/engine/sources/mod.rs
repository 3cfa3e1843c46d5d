//! Common traits + source registry.

pub mod github;
pub mod hackernews;
pub mod linuxdo;
pub mod reddit;
pub mod stackoverflow;
pub mod text;
pub mod x;


use super::auth::AuthProbe;
use super::catalog;
use super::query::SearchQuery;
use super::surface::SurfaceFactory;
use super::transport::{FetchResponse, HttpTransport, TransportError};
use super::types::{SearchPage, SourceDescriptor};
use crate::config::LauncherConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

/// How a single source search can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The source wants a signed-in session. Rendered as a login prompt, not an error.
    #[error("Authentication required")]
    AuthRequired,
    #[error("HTTP {status}")]
    Upstream { status: u16 },
    #[error("Request timeout")]
    Timeout,
    #[error("{0}")]
    Network(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<TransportError> for SourceError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => SourceError::Timeout,
            TransportError::Network(msg) | TransportError::Client(msg) => SourceError::Network(msg),
        }
    }
}

#[async_trait]
pub trait Source: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Key used in result maps and delivery events.
    fn id(&self) -> &'static str {
        self.descriptor().id
    }

    /// Perform the actual search.
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage, SourceError>;
}

/// 401/403/429 mean "log in"; anything else outside 2xx is an upstream failure.
pub(crate) fn check_status(response: &FetchResponse) -> Result<(), SourceError> {
    match response.status {
        401 | 403 | 429 => Err(SourceError::AuthRequired),
        _ if response.is_success() => Ok(()),
        status => Err(SourceError::Upstream { status }),
    }
}

/// Decode a JSON body. Sources behind bot challenges answer with an HTML page
/// instead, which is treated as a login prompt.
pub(crate) fn parse_json<T: DeserializeOwned>(
    response: &FetchResponse,
    challenge_gated: bool,
) -> Result<T, SourceError> {
    response.json().map_err(|e| {
        if challenge_gated {
            SourceError::AuthRequired
        } else {
            SourceError::Malformed(e.to_string())
        }
    })
}

/// The six built-in sources, wired to the shared transport.
pub fn default_sources(
    config: &LauncherConfig,
    transport: Arc<HttpTransport>,
    probe: Arc<AuthProbe>,
    surfaces: Arc<dyn SurfaceFactory>,
) -> Vec<Arc<dyn Source>> {
    let endpoints = &config.endpoints;
    let mut sources: Vec<Arc<dyn Source>> = Vec::with_capacity(catalog::SOURCES.len());
    for descriptor in catalog::SOURCES {
        let source: Arc<dyn Source> = match descriptor.id {
            "github" => Arc::new(github::GitHubSource::new(transport.clone(), &endpoints.github_api)),
            "linuxdo" => Arc::new(linuxdo::LinuxDoSource::new(transport.clone(), &endpoints.linuxdo)),
            "x" => Arc::new(x::XSource::new(
                probe.clone(),
                surfaces.clone(),
                transport.credentials().clone(),
                &endpoints.x,
                config.scrape.clone(),
            )),
            "stackoverflow" => Arc::new(stackoverflow::StackOverflowSource::new(
                transport.clone(),
                &endpoints.stackexchange_api,
            )),
            "reddit" => Arc::new(reddit::RedditSource::new(transport.clone(), &endpoints.reddit)),
            "hackernews" => Arc::new(hackernews::HackerNewsSource::new(
                transport.clone(),
                &endpoints.hackernews_api,
            )),
            _ => continue,
        };
        sources.push(source);
    }
    sources
}

pub(crate) fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}
